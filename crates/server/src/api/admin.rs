//! Administration endpoints: app approval, account management and revocation.

use crate::api::accounts::{AccountView, AppRequestView};
use crate::error::{ErrorResponse, OAuthError};
use crate::oauth2::{
    OAuth2State, Principal,
    apps::AppCredentials,
    credentials::AccountUpdate,
    revocation::AppRemoval,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const ADMIN_TAG: &str = "Admin";

/// Creates the admin router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(list_app_requests))
        .routes(routes!(approve_app_request))
        .routes(routes!(deny_app_request))
        .routes(routes!(list_apps))
        .routes(routes!(delete_app))
        .routes(routes!(list_users))
        .routes(routes!(update_user))
        .routes(routes!(revoke_user))
        .with_state(state)
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteAppParams {
    /// Must repeat the app's client_id
    pub confirm: Option<String>,
}

#[tracing::instrument(skip(state, principal), fields(admin = principal.user_id))]
#[utoipa::path(
    get,
    path = "/admin/app-requests",
    tag = ADMIN_TAG,
    operation_id = "List App Requests",
    summary = "Pending app requests, oldest first",
    responses(
        (status = 200, description = "Pending requests", body = [AppRequestView]),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn list_app_requests(
    principal: Principal,
    State(state): State<OAuth2State>,
) -> Result<Json<Vec<AppRequestView>>, OAuthError> {
    let pending = state.apps.pending_requests(&principal).await?;
    Ok(Json(pending.into_iter().map(AppRequestView::from).collect()))
}

#[tracing::instrument(skip(state, principal), fields(admin = principal.user_id))]
#[utoipa::path(
    post,
    path = "/admin/app-requests/{id}/approve",
    tag = ADMIN_TAG,
    operation_id = "Approve App Request",
    summary = "Create the requested app with fresh client credentials",
    params(("id" = i32, Path, description = "App request id")),
    responses(
        (status = 201, description = "App created", body = AppCredentials),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
        (status = 404, description = "No pending request with this id", body = ErrorResponse),
    )
)]
pub async fn approve_app_request(
    principal: Principal,
    State(state): State<OAuth2State>,
    Path(id): Path<i32>,
) -> Result<(StatusCode, Json<AppCredentials>), OAuthError> {
    let created = state.apps.approve_request(&principal, id).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[tracing::instrument(skip(state, principal), fields(admin = principal.user_id))]
#[utoipa::path(
    post,
    path = "/admin/app-requests/{id}/deny",
    tag = ADMIN_TAG,
    operation_id = "Deny App Request",
    summary = "Deny a pending app request",
    params(("id" = i32, Path, description = "App request id")),
    responses(
        (status = 200, description = "Request denied", body = AppRequestView),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
        (status = 404, description = "No pending request with this id", body = ErrorResponse),
    )
)]
pub async fn deny_app_request(
    principal: Principal,
    State(state): State<OAuth2State>,
    Path(id): Path<i32>,
) -> Result<Json<AppRequestView>, OAuthError> {
    let denied = state.apps.deny_request(&principal, id).await?;
    Ok(Json(denied.into()))
}

#[tracing::instrument(skip(state, principal), fields(admin = principal.user_id))]
#[utoipa::path(
    get,
    path = "/admin/apps",
    tag = ADMIN_TAG,
    operation_id = "List Apps",
    summary = "All registered apps with credentials",
    responses(
        (status = 200, description = "Apps", body = [AppCredentials]),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn list_apps(
    principal: Principal,
    State(state): State<OAuth2State>,
) -> Result<Json<Vec<AppCredentials>>, OAuthError> {
    let apps = state.apps.list_apps(&principal).await?;
    Ok(Json(apps.into_iter().map(AppCredentials::from).collect()))
}

#[tracing::instrument(skip(state, principal), fields(admin = principal.user_id))]
#[utoipa::path(
    delete,
    path = "/admin/apps/{client_id}",
    tag = ADMIN_TAG,
    operation_id = "Delete App",
    summary = "Delete an app with its consents, codes and tokens",
    description = "Irreversible. The `confirm` query parameter must repeat the client_id.",
    params(
        ("client_id" = String, Path, description = "Client identifier of the app"),
        DeleteAppParams
    ),
    responses(
        (status = 200, description = "App deleted", body = AppRemoval),
        (status = 400, description = "Missing or mismatched confirmation", body = ErrorResponse),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
        (status = 404, description = "No such app", body = ErrorResponse),
    )
)]
pub async fn delete_app(
    principal: Principal,
    State(state): State<OAuth2State>,
    Path(client_id): Path<String>,
    Query(params): Query<DeleteAppParams>,
) -> Result<Json<AppRemoval>, OAuthError> {
    match params.confirm.as_deref() {
        None | Some("") => return Err(OAuthError::MissingParameter("confirm")),
        Some(confirm) if confirm != client_id => {
            return Err(OAuthError::InvalidRequest(
                "confirm must repeat the client_id".into(),
            ));
        }
        Some(_) => {}
    }
    let removal = state.revocation.revoke_app(&principal, &client_id).await?;
    Ok(Json(removal))
}

#[tracing::instrument(skip(state, principal), fields(admin = principal.user_id))]
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = ADMIN_TAG,
    operation_id = "List Users",
    summary = "All accounts",
    responses(
        (status = 200, description = "Accounts", body = [AccountView]),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
    )
)]
pub async fn list_users(
    principal: Principal,
    State(state): State<OAuth2State>,
) -> Result<Json<Vec<AccountView>>, OAuthError> {
    let users = state.credentials.list_users(&principal).await?;
    Ok(Json(users.into_iter().map(AccountView::from).collect()))
}

#[tracing::instrument(skip(state, principal), fields(admin = principal.user_id))]
#[utoipa::path(
    post,
    path = "/admin/users/{id}",
    tag = ADMIN_TAG,
    operation_id = "Update User",
    summary = "Change an account's role or enable/disable it",
    params(("id" = i32, Path, description = "User id")),
    request_body(content = AccountUpdate, description = "New role and/or active flag"),
    responses(
        (status = 200, description = "Updated account", body = AccountView),
        (status = 400, description = "Invalid change", body = ErrorResponse),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse),
    )
)]
pub async fn update_user(
    principal: Principal,
    State(state): State<OAuth2State>,
    Path(id): Path<i32>,
    Json(update): Json<AccountUpdate>,
) -> Result<Json<AccountView>, OAuthError> {
    let updated = state
        .credentials
        .update_account(&principal, id, update)
        .await?;
    Ok(Json(updated.into()))
}

#[tracing::instrument(skip(state, principal), fields(admin = principal.user_id))]
#[utoipa::path(
    post,
    path = "/admin/users/{id}/revoke",
    tag = ADMIN_TAG,
    operation_id = "Revoke User",
    summary = "Revoke an account",
    description = "Sets the account's role to `revoked`. The account can no longer sign in and its \
                   access tokens stop resolving. Administrators cannot revoke themselves.",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "Revoked account", body = AccountView),
        (status = 400, description = "Attempt to revoke own account", body = ErrorResponse),
        (status = 401, description = "No session", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse),
    )
)]
pub async fn revoke_user(
    principal: Principal,
    State(state): State<OAuth2State>,
    Path(id): Path<i32>,
) -> Result<Json<AccountView>, OAuthError> {
    let revoked = state.revocation.revoke_user(&principal, id).await?;
    Ok(Json(revoked.into()))
}
