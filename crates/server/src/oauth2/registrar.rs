//! Database-backed client registry.
//!
//! Looks up registered apps, checks redirect URIs against the registered
//! list and authenticates clients at the token endpoint.

use crate::entity::app;
use crate::error::OAuthError;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct ClientRegistry {
    db: Arc<DatabaseConnection>,
}

impl ClientRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn lookup(&self, client_id: &str) -> Result<Option<app::Model>, OAuthError> {
        if client_id.is_empty() {
            return Ok(None);
        }
        let app = app::Entity::find()
            .filter(app::Column::ClientId.eq(client_id))
            .one(self.db.as_ref())
            .await?;
        Ok(app.filter(app::Model::is_active))
    }

    /// Returns the active app registered under `client_id`.
    #[tracing::instrument(skip(self))]
    pub async fn find_client(&self, client_id: &str) -> Result<app::Model, OAuthError> {
        self.lookup(client_id).await?.ok_or(OAuthError::UnknownClient)
    }

    /// Exact-string membership of `candidate` in the app's registered URIs.
    pub fn validate_redirect_uri(app: &app::Model, candidate: &str) -> Result<(), OAuthError> {
        if app.is_redirect_uri_allowed(candidate) {
            Ok(())
        } else {
            Err(OAuthError::RedirectMismatch)
        }
    }

    /// Client authentication for the token endpoint.
    ///
    /// Unknown clients and wrong secrets fail identically with `InvalidClient`.
    #[tracing::instrument(skip(self, client_secret))]
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<app::Model, OAuthError> {
        let Some(app) = self.lookup(client_id).await? else {
            return Err(OAuthError::InvalidClient);
        };
        let matches: bool = app
            .client_secret
            .as_bytes()
            .ct_eq(client_secret.as_bytes())
            .into();
        if matches {
            Ok(app)
        } else {
            Err(OAuthError::InvalidClient)
        }
    }
}
