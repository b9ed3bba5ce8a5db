//! OAuth2 authorization server.
//!
//! Implements the authorization-code flow for registered apps: consent and
//! code issuance, single-use code exchange, access token resolution and
//! administrative revocation, plus the account and app onboarding around it.
//!
//! ## Endpoints
//!
//! - `GET/POST /oauth/authorize` - Consent prompt and decision
//! - `POST /oauth/token` - Code exchange
//! - `POST /oauth/revoke` - Consent revocation (admin)
//! - `GET /oauth/logs` - Audit log (admin)
//! - `POST /api/userinfo` - Profile lookup by access token

pub mod apps;
pub mod codes;
pub mod credentials;
pub mod endpoints;
pub mod password;
pub mod principal;
pub mod registrar;
pub mod revocation;
pub mod session;
mod state;
pub mod tokens;
pub mod validator;

pub use endpoints::router;
pub use password::{generate_token, hash_password, verify_password};
pub use principal::{Capability, Principal, can};
pub use state::OAuth2State;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
