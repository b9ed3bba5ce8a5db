//! OAuth2 state management.
//!
//! Provides the shared state handed to every HTTP handler.

use crate::config::AppConfig;
use crate::oauth2::{
    apps::AppService, codes::CodeIssuer, credentials::CredentialStore, registrar::ClientRegistry,
    revocation::RevocationManager, session::SessionKeys, tokens::TokenIssuer,
    validator::TokenValidator,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// OAuth2 state containing all components needed for the authorization server.
#[derive(Clone)]
pub struct OAuth2State {
    pub db: Arc<DatabaseConnection>,
    pub registry: ClientRegistry,
    pub codes: CodeIssuer,
    pub tokens: TokenIssuer,
    pub validator: TokenValidator,
    pub revocation: RevocationManager,
    pub credentials: CredentialStore,
    pub apps: AppService,
    pub sessions: SessionKeys,
    /// Scopes shown on the consent prompt when the client asks for none
    pub default_scopes: Vec<String>,
}

impl OAuth2State {
    pub fn new(db: Arc<DatabaseConnection>, config: &AppConfig) -> Self {
        let registry = ClientRegistry::new(db.clone());
        Self {
            codes: CodeIssuer::new(db.clone(), config.oauth.code_lifetime),
            tokens: TokenIssuer::new(
                db.clone(),
                registry.clone(),
                config.oauth.access_token_lifetime,
            ),
            validator: TokenValidator::new(db.clone()),
            revocation: RevocationManager::new(db.clone(), config.oauth.revocation_mode),
            credentials: CredentialStore::new(db.clone()),
            apps: AppService::new(db.clone()),
            sessions: SessionKeys::new(&config.session),
            default_scopes: config.oauth.scopes.clone(),
            registry,
            db,
        }
    }
}
