//! Access token resolution for resource endpoints.

use crate::entity::{oauth_token, user};
use crate::error::OAuthError;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Profile handed to an app holding a valid access token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub app_password: String,
}

impl From<user::Model> for UserInfo {
    fn from(user: user::Model) -> Self {
        Self {
            username: user.username,
            email: user.email,
            name: user.name,
            phone: user.phone,
            app_password: user.app_password,
        }
    }
}

#[derive(Clone)]
pub struct TokenValidator {
    db: Arc<DatabaseConnection>,
}

impl TokenValidator {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolves an access token to its owner's profile.
    ///
    /// Revocation is reported ahead of expiry. A token whose owner has been
    /// revoked or disabled counts as revoked. Consent revocation does not
    /// affect the token unless revocation runs in cascade mode.
    #[tracing::instrument(skip_all)]
    pub async fn resolve(&self, access_token: &str) -> Result<UserInfo, OAuthError> {
        if access_token.is_empty() {
            return Err(OAuthError::MissingToken);
        }
        let (token, owner) = oauth_token::Entity::find()
            .filter(oauth_token::Column::AccessToken.eq(access_token))
            .find_also_related(user::Entity)
            .one(self.db.as_ref())
            .await?
            .ok_or(OAuthError::InvalidToken)?;
        let owner = owner.ok_or(OAuthError::InvalidToken)?;

        if token.revoked || owner.is_revoked() {
            return Err(OAuthError::RevokedToken);
        }
        if token.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(OAuthError::ExpiredToken);
        }
        Ok(owner.into())
    }
}
