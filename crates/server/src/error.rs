use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Every failure the authorization server can report.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unsupported response type")]
    UnsupportedResponseType,
    #[error("Unsupported grant type")]
    UnsupportedGrantType,
    #[error("Unknown client")]
    UnknownClient,
    #[error("Redirect URI is not registered for this client")]
    RedirectMismatch,
    #[error("Client authentication failed")]
    InvalidClient,
    #[error("Authorization code is invalid or already used")]
    InvalidCode,
    #[error("Authorization code has expired")]
    ExpiredCode,
    #[error("Access token missing")]
    MissingToken,
    #[error("Access token is invalid")]
    InvalidToken,
    #[error("Access token has been revoked")]
    RevokedToken,
    #[error("Access token has expired")]
    ExpiredToken,
    #[error("Authentication required")]
    LoginRequired,
    #[error("Invalid username/email or password")]
    InvalidCredentials,
    #[error("Account has been revoked")]
    AccountRevoked,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Store(#[from] sea_orm::DbErr),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OAuthError {
    /// Stable error code sent on the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::MissingParameter(_)
            | OAuthError::InvalidRequest(_)
            | OAuthError::RedirectMismatch => "invalid_request",
            OAuthError::UnsupportedResponseType => "unsupported_response_type",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::UnknownClient | OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidCode | OAuthError::ExpiredCode => "invalid_code",
            OAuthError::MissingToken => "missing_token",
            OAuthError::InvalidToken => "invalid_token",
            OAuthError::RevokedToken => "revoked_token",
            OAuthError::ExpiredToken => "expired_token",
            OAuthError::LoginRequired => "login_required",
            OAuthError::InvalidCredentials => "invalid_credentials",
            OAuthError::AccountRevoked => "account_revoked",
            OAuthError::Forbidden => "forbidden",
            OAuthError::NotFound(_) => "not_found",
            OAuthError::Conflict(_) => "conflict",
            OAuthError::Store(_) | OAuthError::Internal(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::MissingParameter(_)
            | OAuthError::InvalidRequest(_)
            | OAuthError::UnsupportedResponseType
            | OAuthError::UnsupportedGrantType
            | OAuthError::UnknownClient
            | OAuthError::RedirectMismatch
            | OAuthError::InvalidClient
            | OAuthError::InvalidCode
            | OAuthError::ExpiredCode
            | OAuthError::MissingToken => StatusCode::BAD_REQUEST,
            OAuthError::InvalidToken
            | OAuthError::RevokedToken
            | OAuthError::ExpiredToken
            | OAuthError::LoginRequired
            | OAuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            OAuthError::AccountRevoked | OAuthError::Forbidden => StatusCode::FORBIDDEN,
            OAuthError::NotFound(_) => StatusCode::NOT_FOUND,
            OAuthError::Conflict(_) => StatusCode::CONFLICT,
            OAuthError::Store(_) | OAuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable detail. Client authentication failures carry none so
    /// the response never reveals which credential mismatched.
    pub fn description(&self) -> Option<String> {
        match self {
            OAuthError::UnknownClient
            | OAuthError::InvalidClient
            | OAuthError::Store(_)
            | OAuthError::Internal(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Code reuse, unknown codes and bad client credentials are logged at the boundary.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            OAuthError::InvalidCode
                | OAuthError::ExpiredCode
                | OAuthError::InvalidClient
                | OAuthError::RedirectMismatch
                | OAuthError::Forbidden
        )
    }

    /// Whether obtaining a fresh token could make the same request succeed.
    pub fn is_token_refreshable(&self) -> bool {
        matches!(self, OAuthError::ExpiredToken)
    }
}

/// JSON error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&OAuthError> for ErrorResponse {
    fn from(err: &OAuthError) -> Self {
        Self {
            error: err.error_code().to_string(),
            error_description: err.description(),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        match &self {
            OAuthError::Store(e) => tracing::error!("Database error: {}", e),
            OAuthError::Internal(e) => tracing::error!("Internal error: {}", e),
            e if e.is_security_relevant() => {
                tracing::warn!(error = e.error_code(), "Rejected request: {}", e)
            }
            _ => {}
        }
        (self.status(), Json(ErrorResponse::from(&self))).into_response()
    }
}
