//! Administrative revocation of consent, accounts and apps.
//!
//! In [`RevocationMode::Legacy`] revoking consent or an account leaves
//! already-issued access tokens untouched. Tokens of a revoked account are
//! still refused at resolution because the owner check fails, but tokens of a
//! revoked consent keep working until they expire. [`RevocationMode::Cascade`]
//! revokes the matching tokens in the same transaction.

use crate::config::RevocationMode;
use crate::entity::{
    app, oauth_authorization, oauth_code,
    oauth_log::{self, Action},
    oauth_token,
    user::{self, Role},
};
use crate::error::OAuthError;
use crate::oauth2::principal::{Capability, Principal, require};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Rows removed alongside a deleted app.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AppRemoval {
    pub authorizations: u64,
    pub codes: u64,
    pub tokens: u64,
}

#[derive(Clone)]
pub struct RevocationManager {
    db: Arc<DatabaseConnection>,
    mode: RevocationMode,
}

impl RevocationManager {
    pub fn new(db: Arc<DatabaseConnection>, mode: RevocationMode) -> Self {
        Self { db, mode }
    }

    pub fn mode(&self) -> RevocationMode {
        self.mode
    }

    /// Marks the consent rows of an app (optionally only one user's) as revoked.
    ///
    /// Returns how many rows changed state.
    #[tracing::instrument(skip(self, principal), fields(admin = principal.user_id))]
    pub async fn revoke_authorization(
        &self,
        principal: &Principal,
        client_id: &str,
        user_id: Option<i32>,
    ) -> Result<u64, OAuthError> {
        require(principal, Capability::Administer)?;
        let app = app::Entity::find()
            .filter(app::Column::ClientId.eq(client_id))
            .one(self.db.as_ref())
            .await?
            .ok_or(OAuthError::UnknownClient)?;

        let txn = self.db.begin().await?;
        let mut consents = oauth_authorization::Entity::update_many()
            .col_expr(oauth_authorization::Column::Revoked, Expr::value(true))
            .filter(oauth_authorization::Column::AppId.eq(app.id))
            .filter(oauth_authorization::Column::Revoked.eq(false));
        if let Some(user_id) = user_id {
            consents = consents.filter(oauth_authorization::Column::UserId.eq(user_id));
        }
        let revoked = consents.exec(&txn).await?.rows_affected;

        if self.mode == RevocationMode::Cascade {
            let mut tokens = oauth_token::Entity::update_many()
                .col_expr(oauth_token::Column::Revoked, Expr::value(true))
                .filter(oauth_token::Column::AppId.eq(app.id))
                .filter(oauth_token::Column::Revoked.eq(false));
            if let Some(user_id) = user_id {
                tokens = tokens.filter(oauth_token::Column::UserId.eq(user_id));
            }
            let cascaded = tokens.exec(&txn).await?.rows_affected;
            tracing::debug!(tokens = cascaded, "cascaded consent revocation to tokens");
        }

        oauth_log::append(&txn, user_id, Some(app.id), Action::Revoke).await?;
        txn.commit().await?;

        tracing::info!(app_id = app.id, revoked, "authorizations revoked");
        Ok(revoked)
    }

    /// Sets the account's role to `revoked`. Administrators cannot revoke themselves.
    #[tracing::instrument(skip(self, principal), fields(admin = principal.user_id))]
    pub async fn revoke_user(
        &self,
        principal: &Principal,
        user_id: i32,
    ) -> Result<user::Model, OAuthError> {
        require(principal, Capability::Administer)?;
        if principal.user_id == user_id {
            return Err(OAuthError::InvalidRequest(
                "you cannot revoke your own account".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let target = user::Entity::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| OAuthError::NotFound(format!("user {user_id}")))?;
        let mut active: user::ActiveModel = target.into();
        active.role = Set(Role::Revoked.as_str().to_string());
        let updated = active.update(&txn).await?;

        if self.mode == RevocationMode::Cascade {
            oauth_token::Entity::update_many()
                .col_expr(oauth_token::Column::Revoked, Expr::value(true))
                .filter(oauth_token::Column::UserId.eq(user_id))
                .filter(oauth_token::Column::Revoked.eq(false))
                .exec(&txn)
                .await?;
        }

        oauth_log::append(&txn, Some(user_id), None, Action::RevokeUser).await?;
        txn.commit().await?;

        tracing::info!(user_id, "user revoked");
        Ok(updated)
    }

    /// Deletes an app with its consents, codes and tokens. Irreversible.
    #[tracing::instrument(skip(self, principal), fields(admin = principal.user_id))]
    pub async fn revoke_app(
        &self,
        principal: &Principal,
        client_id: &str,
    ) -> Result<AppRemoval, OAuthError> {
        require(principal, Capability::Administer)?;

        let txn = self.db.begin().await?;
        let app = app::Entity::find()
            .filter(app::Column::ClientId.eq(client_id))
            .one(&txn)
            .await?
            .ok_or_else(|| OAuthError::NotFound(format!("app {client_id}")))?;

        let codes = oauth_code::Entity::delete_many()
            .filter(oauth_code::Column::AppId.eq(app.id))
            .exec(&txn)
            .await?
            .rows_affected;
        let tokens = oauth_token::Entity::delete_many()
            .filter(oauth_token::Column::AppId.eq(app.id))
            .exec(&txn)
            .await?
            .rows_affected;
        let authorizations = oauth_authorization::Entity::delete_many()
            .filter(oauth_authorization::Column::AppId.eq(app.id))
            .exec(&txn)
            .await?
            .rows_affected;
        app::Entity::delete_by_id(app.id).exec(&txn).await?;

        oauth_log::append(&txn, Some(app.owner_id), None, Action::DeleteApp).await?;
        txn.commit().await?;

        let removal = AppRemoval {
            authorizations,
            codes,
            tokens,
        };
        tracing::warn!(app_id = app.id, client_id, ?removal, "app deleted");
        Ok(removal)
    }
}
