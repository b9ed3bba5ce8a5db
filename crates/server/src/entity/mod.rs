//! SeaORM entities for the authorization server schema.

pub mod app;
pub mod app_request;
pub mod oauth_authorization;
pub mod oauth_code;
pub mod oauth_log;
pub mod oauth_token;
pub mod user;
