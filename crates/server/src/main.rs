use sea_orm::Database;
use std::sync::Arc;
use stybase_oauth::api::start_webserver;
use stybase_oauth::config::load_config_or_panic;
use stybase_oauth::oauth2::OAuth2State;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "stybase_oauth=info,sea_orm=info,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    initialize_tracing();

    // Load config
    let config = load_config_or_panic();
    tracing::info!(
        listen_addr = %config.listen_addr,
        revocation_mode = ?config.oauth.revocation_mode,
        code_lifetime = config.oauth.code_lifetime,
        access_token_lifetime = config.oauth.access_token_lifetime,
        "configuration loaded"
    );

    // Set up SeaORM database connection
    let db = Arc::new(Database::connect(&config.database_url).await?);
    let state = OAuth2State::new(db, &config);

    if let Some(admin) = &config.admin {
        match state.credentials.ensure_admin(admin).await {
            Ok(Some(created)) => {
                tracing::info!(user_id = created.id, username = %created.username, "administrator account created")
            }
            Ok(None) => tracing::debug!(username = %admin.username, "administrator account exists"),
            Err(e) => return Err(color_eyre::eyre::eyre!("admin bootstrap failed: {e}")),
        }
    }

    start_webserver(state, &config.listen_addr).await?;
    Ok(())
}
