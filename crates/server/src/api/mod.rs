//! API module providing the HTTP surface of the authorization server.
//!
//! This module is organized into submodules:
//! - `accounts` - Registration, login and the signed-in user's endpoints (/auth/*, /api/*)
//! - `admin` - Administration endpoints (/admin/*)
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration
//!
//! The OAuth endpoints themselves live in [`crate::oauth2::endpoints`].

pub mod accounts;
pub mod admin;
pub mod health;
pub mod openapi;

pub use accounts::ACCOUNTS_TAG;
pub use admin::ADMIN_TAG;
pub use health::MISC_TAG;

use crate::oauth2::{self, OAuth2State};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_redoc::{Redoc, Servable};

/// Builds the complete router, with the OpenAPI document served at `/api-docs`.
pub fn app_router(state: OAuth2State) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(oauth2::router(state.clone()))
        .merge(accounts::router(state.clone()))
        .merge(admin::router(state.clone()))
        .merge(health::router(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(state))]
pub async fn start_webserver(state: OAuth2State, listen_addr: &str) -> color_eyre::Result<()> {
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = listen_addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
