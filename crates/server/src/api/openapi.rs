//! OpenAPI/Utoipa configuration.

use crate::api::{accounts::ACCOUNTS_TAG, admin::ADMIN_TAG, health::MISC_TAG};
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{
        ApiKey, ApiKeyValue, AuthorizationCode, Flow, HttpAuthScheme, HttpBuilder, OAuth2, Scopes,
        SecurityScheme,
    },
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        // Access tokens issued by /oauth/token
        let bearer = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .description(Some(
                "Access token obtained from the `/oauth/token` endpoint.",
            ))
            .build();
        components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));

        // Browser session set by /auth/login
        components.add_security_scheme(
            "session",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "stybase_session",
                "Session cookie set by `/auth/login`.",
            ))),
        );

        let oauth2 = OAuth2::new([Flow::AuthorizationCode(AuthorizationCode::new(
            "/oauth/authorize",
            "/oauth/token",
            Scopes::from_iter([
                ("openid", "Verify your identity"),
                ("email", "Access your email address"),
                ("profile", "Access your profile information"),
            ]),
        ))]);
        components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Stybase OAuth API",
        version = "0.1.0",
        description = "Authorization server granting registered apps delegated access to user profiles."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 authorization-code flow"),
        (name = ACCOUNTS_TAG, description = "Accounts and app onboarding"),
        (name = ADMIN_TAG, description = "Administration")
    )
)]
pub struct ApiDoc;
