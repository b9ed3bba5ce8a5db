//! Login sessions.
//!
//! A session is an HS256 JWT carried in an `HttpOnly` cookie. The
//! [`Principal`] extractor validates it and reloads the account on every
//! request so role changes and revocations take effect immediately.

use crate::config::SessionConfig;
use crate::entity::user;
use crate::error::OAuthError;
use crate::oauth2::principal::Principal;
use crate::oauth2::state::OAuth2State;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

/// A freshly signed session token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub cookie_name: String,
    lifetime: time::Duration,
}

impl SessionKeys {
    pub fn new(config: &SessionConfig) -> Self {
        let secret = config.secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            cookie_name: config.cookie_name.clone(),
            lifetime: time::Duration::days(config.lifetime_days),
        }
    }

    pub fn issue(&self, user_id: i32) -> Result<IssuedSession, OAuthError> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.lifetime;
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: expires_at.unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| OAuthError::Internal(format!("failed to sign session: {e}")))?;
        Ok(IssuedSession { token, expires_at })
    }

    /// Returns the user id carried by a valid, unexpired session token.
    pub fn verify(&self, token: &str) -> Result<i32, OAuthError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        let data = decode::<SessionClaims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "rejected session token");
            OAuthError::LoginRequired
        })?;
        data.claims
            .sub
            .parse()
            .map_err(|_| OAuthError::LoginRequired)
    }

    pub fn cookie(&self, session: &IssuedSession) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name,
            session.token,
            self.lifetime.whole_seconds()
        )
    }

    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
            self.cookie_name
        )
    }
}

/// Finds the value of `name` across all `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

impl FromRequestParts<OAuth2State> for Principal {
    type Rejection = OAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &OAuth2State,
    ) -> Result<Self, Self::Rejection> {
        let token = read_cookie(&parts.headers, &state.sessions.cookie_name)
            .ok_or(OAuthError::LoginRequired)?;
        let user_id = state.sessions.verify(token)?;

        let user = user::Entity::find_by_id(user_id)
            .one(state.db.as_ref())
            .await?
            .ok_or(OAuthError::LoginRequired)?;
        if user.is_revoked() {
            return Err(OAuthError::AccountRevoked);
        }
        Ok(Principal::from(&user))
    }
}
