//! Identity provider registry and pipelines.
//!
//! A provider is resolved from an organization's [`AuthProvider`] row. Each
//! provider kind contributes a fixed pipeline of [`PipelineStep`]s that the
//! handshake walks through.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, Result};
use crate::organization::AuthProvider;

/// Provider keys this build understands, with their display names.
const REGISTRY: &[(&str, &str)] = &[
    ("dummy", "Dummy"),
    ("google", "Google"),
    ("github", "GitHub"),
    ("oauth2", "OAuth2"),
];

/// Display name for a provider key.
pub fn display_name(key: &str) -> Option<&'static str> {
    REGISTRY
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, name)| *name)
}

/// One step of a provider pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    /// Ask the user for an e-mail address (local test provider)
    AskEmail,
    /// Send the user to the provider's authorize endpoint
    OAuth2Authorize,
    /// Verify the provider's redirect back
    OAuth2Callback,
}

const DUMMY_PIPELINE: &[PipelineStep] = &[PipelineStep::AskEmail];
const OAUTH2_PIPELINE: &[PipelineStep] =
    &[PipelineStep::OAuth2Authorize, PipelineStep::OAuth2Callback];

#[derive(Debug, Deserialize)]
struct RawOAuth2Config {
    authorize_url: String,
    token_url: String,
    userinfo_url: String,
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default)]
    scope: Option<String>,
}

/// OAuth2 authorization-code settings.
#[derive(Clone)]
pub struct OAuth2Config {
    pub authorize_url: Url,
    pub token_url: Url,
    pub userinfo_url: Url,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

impl std::fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("authorize_url", &self.authorize_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("userinfo_url", &self.userinfo_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

impl OAuth2Config {
    fn from_config(config: &serde_json::Value) -> Result<Self> {
        let raw: RawOAuth2Config = serde_json::from_value(config.clone())
            .map_err(|e| AuthError::InvalidProvider(format!("oauth2 config: {}", e)))?;

        let parse = |field: &str, value: &str| {
            Url::parse(value)
                .map_err(|e| AuthError::InvalidProvider(format!("{}: {}", field, e)))
        };

        Ok(Self {
            authorize_url: parse("authorize_url", &raw.authorize_url)?,
            token_url: parse("token_url", &raw.token_url)?,
            userinfo_url: parse("userinfo_url", &raw.userinfo_url)?,
            client_id: raw.client_id,
            client_secret: raw.client_secret,
            scope: raw.scope.unwrap_or_else(|| "openid email profile".to_string()),
        })
    }

    /// Authorize URL the user is redirected to.
    pub fn authorize_redirect(&self, callback_url: &Url, state_token: &str) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scope)
            .append_pair("redirect_uri", callback_url.as_str())
            .append_pair("state", state_token);
        url
    }
}

#[derive(Debug, Clone)]
pub enum ProviderKind {
    Dummy,
    OAuth2(OAuth2Config),
}

/// A resolved identity provider.
#[derive(Debug, Clone)]
pub struct Provider {
    pub key: String,
    pub name: String,
    pub kind: ProviderKind,
}

impl Provider {
    /// Resolve the provider configured for an organization.
    pub fn from_auth_provider(auth_provider: &AuthProvider) -> Result<Self> {
        let key = auth_provider.provider.as_str();
        let name = display_name(key).ok_or_else(|| AuthError::UnknownProvider(key.to_string()))?;

        let kind = match key {
            "dummy" => ProviderKind::Dummy,
            _ => ProviderKind::OAuth2(OAuth2Config::from_config(&auth_provider.config)?),
        };

        Ok(Self {
            key: key.to_string(),
            name: name.to_string(),
            kind,
        })
    }

    pub fn pipeline(&self) -> &'static [PipelineStep] {
        match self.kind {
            ProviderKind::Dummy => DUMMY_PIPELINE,
            ProviderKind::OAuth2(_) => OAUTH2_PIPELINE,
        }
    }
}

/// The identity a provider vouched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-scoped subject identifier
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn oauth_config() -> serde_json::Value {
        serde_json::json!({
            "authorize_url": "https://idp.test/authorize",
            "token_url": "https://idp.test/token",
            "userinfo_url": "https://idp.test/userinfo",
            "client_id": "warden",
            "client_secret": "s3cret"
        })
    }

    #[test]
    fn test_registry_names() {
        assert_eq!(display_name("dummy"), Some("Dummy"));
        assert_eq!(display_name("github"), Some("GitHub"));
        assert_eq!(display_name("saml2"), None);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let ap = AuthProvider::new(Uuid::new_v4(), "saml2", serde_json::json!({}));
        assert!(matches!(
            Provider::from_auth_provider(&ap),
            Err(AuthError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_oauth2_requires_urls() {
        let ap = AuthProvider::new(
            Uuid::new_v4(),
            "google",
            serde_json::json!({"client_id": "x"}),
        );
        assert!(matches!(
            Provider::from_auth_provider(&ap),
            Err(AuthError::InvalidProvider(_))
        ));
    }

    #[test]
    fn test_authorize_redirect_carries_state() {
        let ap = AuthProvider::new(Uuid::new_v4(), "google", oauth_config());
        let provider = Provider::from_auth_provider(&ap).unwrap();
        let ProviderKind::OAuth2(config) = &provider.kind else {
            panic!("expected oauth2");
        };

        let callback = Url::parse("https://warden.test/auth/sso/").unwrap();
        let url = config.authorize_redirect(&callback, "tok");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("state".into(), "tok".into())));
        assert!(pairs.contains(&("client_id".into(), "warden".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "https://warden.test/auth/sso/".into())));
        assert_eq!(provider.pipeline().len(), 2);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let ap = AuthProvider::new(Uuid::new_v4(), "github", oauth_config());
        let provider = Provider::from_auth_provider(&ap).unwrap();
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("s3cret"));
    }
}
