use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

const MAX_CODE_LIFETIME: i64 = 24 * 60 * 60;
const MAX_ACCESS_TOKEN_LIFETIME: i64 = 365 * 24 * 60 * 60;
const MAX_SESSION_LIFETIME_DAYS: i64 = 365;

/// Whether revoking consent also revokes tokens already issued under it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevocationMode {
    /// Tokens stay valid until they expire or are revoked individually.
    #[default]
    Legacy,
    /// Revoking an authorization or a user also revokes the matching tokens.
    Cascade,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OAuthConfig {
    /// Authorization code lifetime in seconds
    #[serde(default = "default_code_lifetime")]
    pub code_lifetime: i64,
    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    /// Scopes advertised to clients. Stored on codes, never enforced.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub revocation_mode: RevocationMode,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            code_lifetime: default_code_lifetime(),
            access_token_lifetime: default_access_token_lifetime(),
            scopes: default_scopes(),
            revocation_mode: RevocationMode::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    /// HMAC key for session tokens, at least 32 characters
    pub secret: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_session_lifetime_days")]
    pub lifetime_days: i64,
}

/// Administrator account created at startup when no user with this name exists.
#[derive(Clone, Debug, Deserialize)]
pub struct AdminBootstrapConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub session: SessionConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub admin: Option<AdminBootstrapConfig>,
}

fn default_database_url() -> String {
    "sqlite://stybase.db?mode=rwc".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_code_lifetime() -> i64 {
    600
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_scopes() -> Vec<String> {
    ["profile", "email", "openid"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cookie_name() -> String {
    "stybase_session".to_string()
}

fn default_session_lifetime_days() -> i64 {
    7
}

impl AppConfig {
    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.secret.len() < 32 {
            return Err(ConfigError::Validation(
                "session.secret must be at least 32 characters".into(),
            ));
        }
        check_range(
            "session.lifetime_days",
            self.session.lifetime_days,
            MAX_SESSION_LIFETIME_DAYS,
        )?;
        check_range(
            "oauth.code_lifetime",
            self.oauth.code_lifetime,
            MAX_CODE_LIFETIME,
        )?;
        check_range(
            "oauth.access_token_lifetime",
            self.oauth.access_token_lifetime,
            MAX_ACCESS_TOKEN_LIFETIME,
        )?;
        if let Some(admin) = &self.admin
            && (admin.username.is_empty() || admin.password.is_empty())
        {
            return Err(ConfigError::Validation(
                "admin.username and admin.password must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn check_range(key: &str, value: i64, max: i64) -> Result<(), ConfigError> {
    if value <= 0 || value > max {
        return Err(ConfigError::Validation(format!(
            "{key} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(())
}

/// Load application configuration from an optional `config.yaml` + environment overrides.
///
/// Any variable matching the key path separated by double underscores
/// (e.g. `OAUTH__ACCESS_TOKEN_LIFETIME`, `SESSION__SECRET`) overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
