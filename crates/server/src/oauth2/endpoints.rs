//! OAuth2 HTTP endpoints.
//!
//! Implements the authorization server endpoints:
//! - Authorization endpoint (consent prompt and decision)
//! - Token endpoint
//! - Administrative consent revocation and audit log
//! - Profile lookup by access token

use crate::entity::{app, oauth_log};
use crate::error::{ErrorResponse, OAuthError};
use crate::oauth2::{
    OAUTH2_TAG,
    principal::{Capability, Principal, require},
    registrar::ClientRegistry,
    state::OAuth2State,
    tokens::{GRANT_AUTHORIZATION_CODE, TokenResponse},
    validator::UserInfo,
};
use axum::{
    Form, Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use sea_orm::{EntityTrait, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize_prompt, authorize_decision))
        .routes(routes!(token))
        .routes(routes!(revoke))
        .routes(routes!(logs))
        .routes(routes!(userinfo))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Authorization request parameters.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(default)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeRequest {
    /// Client identifier issued when the app was approved
    pub client_id: String,
    /// Must exactly match one of the app's registered redirect URIs
    pub redirect_uri: String,
    /// Space-separated list of requested scopes
    pub scope: String,
    /// Opaque value returned unchanged in the redirect
    pub state: String,
    /// Must be `code` when present
    pub response_type: String,
}

/// Consent decision submitted by the signed-in user.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct AuthorizeDecision {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub response_type: String,
    /// `approve` or `deny`
    pub action: String,
}

impl AuthorizeDecision {
    fn params(&self) -> AuthorizeRequest {
        AuthorizeRequest {
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            scope: self.scope.clone(),
            state: self.state.clone(),
            response_type: self.response_type.clone(),
        }
    }
}

/// What the user is asked to consent to.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsentPrompt {
    pub client_name: String,
    pub client_id: String,
    pub description: Option<String>,
    pub redirect_uri: String,
    pub scope: String,
    pub scopes: Vec<String>,
    pub state: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct TokenRequest {
    /// Defaults to `authorization_code`
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub client_id: String,
    /// Restrict revocation to one user
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeResponse {
    pub status: String,
    /// Number of consent rows revoked
    pub revoked: u64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogsQuery {
    /// Maximum entries to return (default 100, at most 1000)
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogEntry {
    pub id: i32,
    pub user_id: Option<i32>,
    pub app_id: Option<i32>,
    pub action: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl From<oauth_log::Model> for LogEntry {
    fn from(log: oauth_log::Model) -> Self {
        Self {
            id: log.id,
            user_id: log.user_id,
            app_id: log.app_id,
            action: log.action,
            timestamp: log.timestamp,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UserInfoRequest {
    pub access_token: Option<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// Consent prompt.
#[tracing::instrument(skip(state, principal), fields(user_id = principal.user_id))]
#[utoipa::path(
    get,
    path = "/oauth/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize Prompt",
    summary = "Show the consent prompt for an app",
    description = "Validates the client and redirect URI and returns what the signed-in user is asked to approve.\n\n\
                   Validation failures are answered with an error body and never redirect, so an unregistered \
                   redirect URI is never followed.",
    params(AuthorizeRequest),
    responses(
        (status = 200, description = "Consent prompt", body = ConsentPrompt),
        (status = 400, description = "Missing parameter, unknown client, unregistered redirect URI or unsupported response type", body = ErrorResponse),
        (status = 401, description = "No session", body = ErrorResponse),
    )
)]
pub async fn authorize_prompt(
    principal: Principal,
    State(state): State<OAuth2State>,
    Query(params): Query<AuthorizeRequest>,
) -> Result<Json<ConsentPrompt>, OAuthError> {
    require(&principal, Capability::Authorize)?;
    let app = validate_authorize_request(&state, &params).await?;

    let mut scopes: Vec<String> = params.scope.split_whitespace().map(str::to_string).collect();
    if scopes.is_empty() {
        scopes = state.default_scopes.clone();
    }
    Ok(Json(ConsentPrompt {
        client_name: app.name,
        client_id: app.client_id,
        description: app.description,
        redirect_uri: params.redirect_uri,
        scope: params.scope,
        scopes,
        state: params.state,
    }))
}

/// Consent decision.
#[tracing::instrument(skip(state, principal, decision), fields(user_id = principal.user_id, client_id = %decision.client_id))]
#[utoipa::path(
    post,
    path = "/oauth/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize Decision",
    summary = "Approve or deny an app",
    description = "On `approve` a single-use authorization code is issued and the user is redirected to \
                   `redirect_uri?code=...&state=...`. On `deny` the redirect carries `error=access_denied`.\n\n\
                   Requests that fail validation are answered with an error body and no redirect.",
    request_body(
        content = AuthorizeDecision,
        content_type = "application/x-www-form-urlencoded",
        description = "Authorization parameters and the decision"
    ),
    responses(
        (status = 303, description = "Redirect back to the client"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "No session", body = ErrorResponse),
    )
)]
pub async fn authorize_decision(
    principal: Principal,
    State(state): State<OAuth2State>,
    Form(decision): Form<AuthorizeDecision>,
) -> Result<Response, OAuthError> {
    require(&principal, Capability::Authorize)?;
    let params = decision.params();
    let app = validate_authorize_request(&state, &params).await?;

    match decision.action.as_str() {
        "approve" => {
            let scope = Some(params.scope.as_str()).filter(|s| !s.trim().is_empty());
            let code = state
                .codes
                .issue_code(&principal, &app, &params.redirect_uri, scope)
                .await?;
            let location = redirect_with(
                &params.redirect_uri,
                &[("code", code.as_str()), ("state", params.state.as_str())],
            )?;
            Ok(Redirect::to(&location).into_response())
        }
        "deny" => {
            oauth_log::append(
                state.db.as_ref(),
                Some(principal.user_id),
                Some(app.id),
                oauth_log::Action::Deny,
            )
            .await?;
            let location = redirect_with(
                &params.redirect_uri,
                &[("error", "access_denied"), ("state", params.state.as_str())],
            )?;
            Ok(Redirect::to(&location).into_response())
        }
        "" => Err(OAuthError::MissingParameter("action")),
        other => Err(OAuthError::InvalidRequest(format!(
            "action must be approve or deny, got {other}"
        ))),
    }
}

/// Token endpoint.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/oauth/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code for tokens",
    description = "Redeems a single-use authorization code for an access token and refresh token.\n\n\
                   **Supported grant types:** `authorization_code` only.\n\n\
                   **Client authentication:** HTTP Basic auth, or `client_id` and `client_secret` in the body. \
                   A failed authentication never reveals which of the two was wrong.\n\n\
                   Unknown, already used, expired and foreign codes are all reported as `invalid_code`.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "`unsupported_grant_type`, `invalid_client` or `invalid_code`", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Result<Response, OAuthError> {
    let grant_type = params
        .grant_type
        .as_deref()
        .filter(|g| !g.is_empty())
        .unwrap_or(GRANT_AUTHORIZATION_CODE);
    let (client_id, client_secret) = extract_client_credentials(&headers, &params);
    let redirect_uri = params.redirect_uri.as_deref().filter(|u| !u.is_empty());

    let response = state
        .tokens
        .exchange_code(
            client_id.as_deref().unwrap_or_default(),
            client_secret.as_deref().unwrap_or_default(),
            params.code.as_deref().unwrap_or_default(),
            grant_type,
            redirect_uri,
        )
        .await?;

    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response())
}

/// Consent revocation.
#[tracing::instrument(skip(state, principal), fields(admin = principal.user_id))]
#[utoipa::path(
    post,
    path = "/oauth/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Authorization",
    summary = "Revoke consent given to an app",
    description = "Marks every consent for the app as revoked, or only those of `user_id` when given. \
                   Administrators only.\n\n\
                   With the default `legacy` revocation mode, access tokens already issued stay valid until \
                   they expire. The `cascade` mode revokes them as well.",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "App and optional user"
    ),
    responses(
        (status = 200, description = "Consent revoked", body = RevokeResponse),
        (status = 400, description = "Unknown client or malformed user id", body = ErrorResponse),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn revoke(
    principal: Principal,
    State(state): State<OAuth2State>,
    Form(params): Form<RevokeRequest>,
) -> Result<Json<RevokeResponse>, OAuthError> {
    let user_id = match params.user_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<i32>()
                .map_err(|_| OAuthError::InvalidRequest(format!("invalid user_id {raw}")))?,
        ),
    };
    let revoked = state
        .revocation
        .revoke_authorization(&principal, params.client_id.trim(), user_id)
        .await?;
    Ok(Json(RevokeResponse {
        status: "revoked".to_string(),
        revoked,
    }))
}

/// Audit log.
#[tracing::instrument(skip(state, principal), fields(admin = principal.user_id))]
#[utoipa::path(
    get,
    path = "/oauth/logs",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Audit Log",
    summary = "List audit log entries, newest first",
    params(LogsQuery),
    responses(
        (status = 200, description = "Audit entries", body = [LogEntry]),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn logs(
    principal: Principal,
    State(state): State<OAuth2State>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<LogEntry>>, OAuthError> {
    require(&principal, Capability::Administer)?;
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let entries = oauth_log::Entity::find()
        .order_by_desc(oauth_log::Column::Timestamp)
        .order_by_desc(oauth_log::Column::Id)
        .limit(limit)
        .all(state.db.as_ref())
        .await?;
    Ok(Json(entries.into_iter().map(LogEntry::from).collect()))
}

/// Profile lookup by access token.
#[tracing::instrument(skip(state, headers, body))]
#[utoipa::path(
    post,
    path = "/api/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 UserInfo",
    summary = "Resolve an access token to the user's profile",
    description = "Accepts the access token as JSON `{\"access_token\": ...}` or as a Bearer token.\n\n\
                   Errors distinguish `invalid_token` (unknown), `revoked_token` (token or account revoked) \
                   and `expired_token` (obtaining a new token may help).",
    request_body(content = UserInfoRequest, description = "Access token", content_type = "application/json"),
    security(
        (),
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "User profile", body = UserInfo),
        (status = 400, description = "`missing_token`", body = ErrorResponse),
        (status = 401, description = "`invalid_token`, `revoked_token` or `expired_token`", body = ErrorResponse),
    )
)]
pub async fn userinfo(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UserInfo>, OAuthError> {
    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<UserInfoRequest>(&body)
            .map_err(|e| OAuthError::InvalidRequest(format!("malformed JSON body: {e}")))?
            .access_token
    };
    let access_token = from_body
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers).map(str::to_string))
        .ok_or(OAuthError::MissingToken)?;

    Ok(Json(state.validator.resolve(&access_token).await?))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Client, redirect URI and response type checks shared by prompt and decision.
async fn validate_authorize_request(
    state: &OAuth2State,
    params: &AuthorizeRequest,
) -> Result<app::Model, OAuthError> {
    if params.client_id.trim().is_empty() {
        return Err(OAuthError::MissingParameter("client_id"));
    }
    if params.redirect_uri.trim().is_empty() {
        return Err(OAuthError::MissingParameter("redirect_uri"));
    }
    let response_type = params.response_type.trim();
    if !response_type.is_empty() && !response_type.eq_ignore_ascii_case("code") {
        return Err(OAuthError::UnsupportedResponseType);
    }
    let app = state.registry.find_client(params.client_id.trim()).await?;
    ClientRegistry::validate_redirect_uri(&app, &params.redirect_uri)?;
    Ok(app)
}

/// Merges `params` into the query of `redirect_uri`, replacing keys that are
/// already present. Empty values are left out.
fn redirect_with(redirect_uri: &str, params: &[(&str, &str)]) -> Result<String, OAuthError> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|e| OAuthError::InvalidRequest(format!("invalid redirect_uri: {e}")))?;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !params.iter().any(|(k, _)| **k == **key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .extend_pairs(params.iter().filter(|(_, v)| !v.is_empty()));
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url.into())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn extract_client_credentials(
    headers: &HeaderMap,
    params: &TokenRequest,
) -> (Option<String>, Option<String>) {
    // Try Basic auth first
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, auth.trim())
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        return (Some(id.to_string()), Some(secret.to_string()));
    }

    // Fall back to form body
    (params.client_id.clone(), params.client_secret.clone())
}
