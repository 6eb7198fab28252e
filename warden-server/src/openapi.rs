//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 document served at `/api-docs/openapi.json`.

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::handlers::{
    AuthenticatorChallenge, HealthResponse, LoginForm, LoginFormState, LoginPage,
    OrganizationSummary, PromptField, ReadyResponse,
};
use crate::session::{FlashMessage, MessageLevel};

/// Warden - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Warden",
        version = "0.1.0",
        description = r#"
## Second-factor challenges and organization SSO login

- **Authenticators** - `GET /api/0/authenticators/` activates the caller's
  U2F device and returns the challenge to sign, either as a U2F sign request
  or as WebAuthn authentication data when the `organizations:webauthn-login`
  feature is enabled for any of the caller's organizations.
- **Login** - organization login pages hand off to the organization's
  identity provider, or fall back to username/password login.

Pages are returned as JSON documents naming the template to render.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Authenticators", description = "Second-factor challenge issuance"),
        (name = "Login", description = "Organization login and SSO handshake"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::authenticators::list_authenticators,
        crate::handlers::login::login_page,
        crate::handlers::login::login_submit,
        crate::handlers::organization_login::organization_login_page,
        crate::handlers::organization_login::organization_login_submit,
        crate::handlers::sso::sso_callback,
        crate::handlers::sso::sso_callback_submit,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            AuthenticatorChallenge,
            LoginForm,
            LoginPage,
            LoginFormState,
            OrganizationSummary,
            PromptField,
            FlashMessage,
            MessageLevel,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("id"))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_login_paths() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/api/0/authenticators/"));
        assert!(paths.contains_key("/auth/login/{organization_slug}/"));
        assert!(paths.contains_key("/auth/sso/"));
        assert!(paths.contains_key("/health"));
    }

    #[test]
    fn test_security_schemes_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_token"));
        assert!(components.security_schemes.contains_key("session_cookie"));
    }
}
