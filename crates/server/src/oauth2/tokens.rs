//! Authorization code exchange.

use crate::entity::{
    oauth_code,
    oauth_log::{self, Action},
    oauth_token,
};
use crate::error::OAuthError;
use crate::oauth2::password::generate_token;
use crate::oauth2::registrar::ClientRegistry;
use sea_orm::{
    ActiveModelTrait,
    ActiveValue::{NotSet, Set},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const TOKEN_TYPE_BEARER: &str = "bearer";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `bearer`
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Stored with the token; there is no refresh grant.
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    db: Arc<DatabaseConnection>,
    registry: ClientRegistry,
    access_token_lifetime: i64,
}

impl TokenIssuer {
    pub fn new(
        db: Arc<DatabaseConnection>,
        registry: ClientRegistry,
        access_token_lifetime: i64,
    ) -> Self {
        Self {
            db,
            registry,
            access_token_lifetime,
        }
    }

    /// Redeems an authorization code for an access/refresh token pair.
    ///
    /// The conditional claim of the code, the token insert and the audit
    /// entry commit together or not at all. Of several concurrent exchanges of the
    /// same code exactly one wins; the rest fail with `InvalidCode`.
    #[tracing::instrument(skip(self, client_secret, code, redirect_uri))]
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        grant_type: &str,
        redirect_uri: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        if grant_type != GRANT_AUTHORIZATION_CODE {
            return Err(OAuthError::UnsupportedGrantType);
        }
        let app = self.registry.authenticate(client_id, client_secret).await?;
        if code.is_empty() {
            return Err(OAuthError::InvalidCode);
        }

        let now = OffsetDateTime::now_utc();
        let txn = self.db.begin().await?;

        // Claim first so the transaction takes the write lock before any read.
        let mut claim = oauth_code::Entity::update_many()
            .col_expr(oauth_code::Column::Used, Expr::value(true))
            .filter(oauth_code::Column::Code.eq(code))
            .filter(oauth_code::Column::AppId.eq(app.id))
            .filter(oauth_code::Column::Used.eq(false));
        if let Some(uri) = redirect_uri {
            claim = claim.filter(oauth_code::Column::RedirectUri.eq(uri));
        }
        let claimed = claim.exec(&txn).await?;
        if claimed.rows_affected == 0 {
            txn.rollback().await?;
            return Err(self.unclaimable(code, app.id, now).await?);
        }

        let row = oauth_code::Entity::find()
            .filter(oauth_code::Column::Code.eq(code))
            .one(&txn)
            .await?
            .ok_or(OAuthError::InvalidCode)?;
        if row.is_expired_at(now) {
            txn.rollback().await?;
            return Err(OAuthError::ExpiredCode);
        }

        let access_token = generate_token()?;
        let refresh_token = generate_token()?;
        oauth_token::ActiveModel {
            id: NotSet,
            user_id: Set(row.user_id),
            app_id: Set(app.id),
            access_token: Set(access_token.clone()),
            refresh_token: Set(Some(refresh_token.clone())),
            expires_at: Set(now + Duration::seconds(self.access_token_lifetime)),
            created_at: Set(now),
            revoked: Set(false),
        }
        .insert(&txn)
        .await?;
        oauth_log::append(&txn, Some(row.user_id), Some(app.id), Action::TokenIssued).await?;
        txn.commit().await?;

        tracing::info!(user_id = row.user_id, app_id = app.id, "access token issued");
        Ok(TokenResponse {
            access_token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: self.access_token_lifetime,
            refresh_token,
        })
    }

    /// Error for a code the conditional claim did not match. Only an unused,
    /// expired code of this client reports `ExpiredCode`.
    async fn unclaimable(
        &self,
        code: &str,
        app_id: i32,
        now: OffsetDateTime,
    ) -> Result<OAuthError, OAuthError> {
        let row = oauth_code::Entity::find()
            .filter(oauth_code::Column::Code.eq(code))
            .one(self.db.as_ref())
            .await?;
        Ok(match row {
            Some(row) if !row.used && row.app_id == app_id && row.is_expired_at(now) => {
                OAuthError::ExpiredCode
            }
            _ => OAuthError::InvalidCode,
        })
    }
}
