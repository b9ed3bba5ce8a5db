//! Authorization code issuance.

use crate::entity::{app, oauth_authorization, oauth_code};
use crate::error::OAuthError;
use crate::oauth2::password::generate_token;
use crate::oauth2::principal::{Capability, Principal, require};
use crate::oauth2::registrar::ClientRegistry;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set},
    DatabaseConnection, TransactionTrait,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

#[derive(Clone)]
pub struct CodeIssuer {
    db: Arc<DatabaseConnection>,
    lifetime: Duration,
}

impl CodeIssuer {
    pub fn new(db: Arc<DatabaseConnection>, lifetime_secs: i64) -> Self {
        Self {
            db,
            lifetime: Duration::seconds(lifetime_secs),
        }
    }

    /// Records the principal's consent for `app` and returns a fresh one-time code.
    ///
    /// The consent row and the code row are written in one transaction.
    /// Consent rows are never deduplicated.
    #[tracing::instrument(skip(self, principal, app), fields(user_id = principal.user_id, app_id = app.id))]
    pub async fn issue_code(
        &self,
        principal: &Principal,
        app: &app::Model,
        redirect_uri: &str,
        scope: Option<&str>,
    ) -> Result<String, OAuthError> {
        require(principal, Capability::Authorize)?;
        ClientRegistry::validate_redirect_uri(app, redirect_uri)?;

        let code = generate_token()?;
        let now = OffsetDateTime::now_utc();
        let scope = scope.map(str::trim).filter(|s| !s.is_empty());

        let txn = self.db.begin().await?;
        oauth_authorization::ActiveModel {
            id: NotSet,
            user_id: Set(principal.user_id),
            app_id: Set(app.id),
            authorized_at: Set(now),
            revoked: Set(false),
        }
        .insert(&txn)
        .await?;
        oauth_code::ActiveModel {
            id: NotSet,
            code: Set(code.clone()),
            user_id: Set(principal.user_id),
            app_id: Set(app.id),
            redirect_uri: Set(redirect_uri.to_string()),
            scope: Set(scope.map(str::to_string)),
            expires_at: Set(now + self.lifetime),
            used: Set(false),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        tracing::info!("authorization code issued");
        Ok(code)
    }
}
