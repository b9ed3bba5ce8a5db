//! Account endpoints: registration, login, the signed-in user's overview,
//! app requests and app edits.

use crate::entity::{
    app_request,
    user::{self, Role},
};
use crate::error::{ErrorResponse, OAuthError};
use crate::oauth2::{
    OAuth2State, Principal,
    apps::{AppCredentials, AppUpdate, NewAppRequest},
    credentials::NewAccount,
};
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const ACCOUNTS_TAG: &str = "Accounts";

/// Creates the account router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(register))
        .routes(routes!(login))
        .routes(routes!(logout))
        .routes(routes!(me))
        .routes(routes!(request_app))
        .routes(routes!(update_app))
        .routes(routes!(profile))
        .with_state(state)
}

/// An account as seen by its owner or an administrator.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountView {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<user::Model> for AccountView {
    fn from(user: user::Model) -> Self {
        Self {
            role: user.role(),
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
            phone: user.phone,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AppRequestView {
    pub id: i32,
    pub user_id: i32,
    pub app_name: String,
    pub redirect_uris: Vec<String>,
    pub description: Option<String>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

impl From<app_request::Model> for AppRequestView {
    fn from(request: app_request::Model) -> Self {
        Self {
            redirect_uris: request
                .redirect_uri
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            id: request.id,
            user_id: request.user_id,
            app_name: request.app_name,
            description: request.description,
            status: request.status,
            submitted_at: request.submitted_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email address
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Session token, also set as an `HttpOnly` cookie
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub account: AccountView,
}

/// An app the user has consented to.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizedApp {
    pub name: String,
    pub client_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub authorized_at: OffsetDateTime,
    pub revoked: bool,
}

/// Everything the signed-in user sees on their dashboard.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Overview {
    pub account: AccountView,
    /// Apps owned by the user, with credentials
    pub owned_apps: Vec<AppCredentials>,
    /// One entry per consent given, newest first
    pub authorized_apps: Vec<AuthorizedApp>,
    pub pending_request: Option<AppRequestView>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicProfile {
    pub username: String,
    pub name: Option<String>,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub member_since: OffsetDateTime,
}

/// Account registration.
#[tracing::instrument(skip(state, account))]
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = ACCOUNTS_TAG,
    operation_id = "Register",
    summary = "Create a user or developer account",
    request_body(content = NewAccount, description = "Account details"),
    responses(
        (status = 201, description = "Account created", body = AccountView),
        (status = 400, description = "Missing or invalid field", body = ErrorResponse),
        (status = 409, description = "Username or email already taken", body = ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<OAuth2State>,
    Json(account): Json<NewAccount>,
) -> Result<(StatusCode, Json<AccountView>), OAuthError> {
    let created = state.credentials.register(account).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Password login.
#[tracing::instrument(skip(state, request))]
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = ACCOUNTS_TAG,
    operation_id = "Login",
    summary = "Sign in with username or email and password",
    description = "Returns a session token and sets it as an `HttpOnly` cookie. \
                   Revoked and disabled accounts are refused with `account_revoked`.",
    request_body(content = LoginRequest, description = "Credentials"),
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Wrong username/email or password", body = ErrorResponse),
        (status = 403, description = "Account revoked or disabled", body = ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<OAuth2State>,
    Json(request): Json<LoginRequest>,
) -> Result<Response, OAuthError> {
    let user = state
        .credentials
        .authenticate(&request.username_or_email, &request.password)
        .await?;
    let session = state.sessions.issue(user.id)?;
    let cookie = state.sessions.cookie(&session);
    tracing::info!(user_id = user.id, "signed in");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            token: session.token,
            expires_at: session.expires_at,
            account: user.into(),
        }),
    )
        .into_response())
}

/// Logout.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = ACCOUNTS_TAG,
    operation_id = "Logout",
    summary = "Clear the session cookie",
    responses(
        (status = 204, description = "Signed out"),
    )
)]
pub async fn logout(State(state): State<OAuth2State>) -> Response {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, state.sessions.clear_cookie())],
    )
        .into_response()
}

/// Dashboard overview.
#[tracing::instrument(skip(state, principal), fields(user_id = principal.user_id))]
#[utoipa::path(
    get,
    path = "/api/me",
    tag = ACCOUNTS_TAG,
    operation_id = "Overview",
    summary = "Signed-in user's profile, apps and consents",
    responses(
        (status = 200, description = "Overview", body = Overview),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Account revoked", body = ErrorResponse),
    )
)]
pub async fn me(
    principal: Principal,
    State(state): State<OAuth2State>,
) -> Result<Json<Overview>, OAuthError> {
    let account = state.credentials.find_by_id(principal.user_id).await?;
    let owned_apps = state
        .apps
        .owned_apps(principal.user_id)
        .await?
        .into_iter()
        .map(AppCredentials::from)
        .collect();
    let authorized_apps = state
        .apps
        .authorized_apps(principal.user_id)
        .await?
        .into_iter()
        .map(|(consent, app)| AuthorizedApp {
            name: app.name,
            client_id: app.client_id,
            authorized_at: consent.authorized_at,
            revoked: consent.revoked,
        })
        .collect();
    let pending_request = state
        .apps
        .latest_pending_request(principal.user_id)
        .await?
        .map(AppRequestView::from);

    Ok(Json(Overview {
        account: account.into(),
        owned_apps,
        authorized_apps,
        pending_request,
    }))
}

/// App request submission.
#[tracing::instrument(skip(state, principal, request), fields(user_id = principal.user_id))]
#[utoipa::path(
    post,
    path = "/api/apps/requests",
    tag = ACCOUNTS_TAG,
    operation_id = "Request App",
    summary = "Ask an administrator to register a new app",
    request_body(content = NewAppRequest, description = "App name, redirect URIs and description"),
    responses(
        (status = 201, description = "Request submitted", body = AppRequestView),
        (status = 400, description = "Missing field or invalid redirect URI", body = ErrorResponse),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Only developers can request apps", body = ErrorResponse),
    )
)]
pub async fn request_app(
    principal: Principal,
    State(state): State<OAuth2State>,
    Json(request): Json<NewAppRequest>,
) -> Result<(StatusCode, Json<AppRequestView>), OAuthError> {
    let created = state.apps.submit_request(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// App edit.
#[tracing::instrument(skip(state, principal, update), fields(user_id = principal.user_id))]
#[utoipa::path(
    put,
    path = "/api/apps/{client_id}",
    tag = ACCOUNTS_TAG,
    operation_id = "Update App",
    summary = "Change an owned app's name, redirect URIs or description",
    params(("client_id" = String, Path, description = "Client identifier of the app")),
    request_body(content = AppUpdate, description = "New values"),
    responses(
        (status = 200, description = "Updated app", body = AppCredentials),
        (status = 400, description = "Missing field or invalid redirect URI", body = ErrorResponse),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 404, description = "No such app owned by the caller", body = ErrorResponse),
    )
)]
pub async fn update_app(
    principal: Principal,
    State(state): State<OAuth2State>,
    Path(client_id): Path<String>,
    Json(update): Json<AppUpdate>,
) -> Result<Json<AppCredentials>, OAuthError> {
    let updated = state.apps.update_app(&principal, &client_id, update).await?;
    Ok(Json(updated.into()))
}

/// Public profile.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/profile/{username}",
    tag = ACCOUNTS_TAG,
    operation_id = "Public Profile",
    summary = "Public profile of a user",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "Profile", body = PublicProfile),
        (status = 404, description = "No such user", body = ErrorResponse),
    )
)]
pub async fn profile(
    State(state): State<OAuth2State>,
    Path(username): Path<String>,
) -> Result<Json<PublicProfile>, OAuthError> {
    let user = state.credentials.find_by_username(&username).await?;
    Ok(Json(PublicProfile {
        role: user.role(),
        username: user.username,
        name: user.name,
        member_since: user.created_at,
    }))
}
