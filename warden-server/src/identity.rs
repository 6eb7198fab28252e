//! Identity resolution for completed SSO handshakes.
//!
//! The local test provider vouches for an identity directly. OAuth2 providers
//! hand back an authorization code, which is exchanged at the token endpoint
//! and then used to read the userinfo endpoint.

use serde::Deserialize;
use url::Url;
use warden_core::{Identity, OAuth2Config, PendingIdentity, Provider, ProviderKind};

use crate::error::ApiError;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Userinfo payload; OIDC providers send `sub`, GitHub sends a numeric `id`.
#[derive(Deserialize)]
struct UserInfo {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    id: Option<serde_json::Value>,
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl UserInfo {
    fn into_identity(self) -> Option<Identity> {
        let email = self.email.filter(|e| !e.is_empty())?;
        let id = self
            .sub
            .or_else(|| {
                self.id.map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
            })
            .unwrap_or_else(|| email.clone());
        Some(Identity {
            id,
            email: email.to_lowercase(),
            name: self.name,
        })
    }
}

/// HTTP client for provider identity lookups
pub struct IdentityClient {
    http_client: reqwest::Client,
}

impl Default for IdentityClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityClient {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    /// Turn the data a pipeline collected into a verified identity.
    pub async fn resolve(
        &self,
        provider: &Provider,
        pending: &PendingIdentity,
        callback_url: &Url,
    ) -> Result<Identity, ApiError> {
        match &provider.kind {
            ProviderKind::Dummy => pending
                .local_identity()
                .ok_or_else(|| ApiError::internal("dummy handshake finished without an email")),
            ProviderKind::OAuth2(config) => {
                let code = pending.authorization_code().ok_or_else(|| {
                    ApiError::internal("oauth2 handshake finished without a code")
                })?;
                let token = self.exchange_code(config, code, callback_url).await?;
                self.fetch_userinfo(config, &token).await
            }
        }
    }

    async fn exchange_code(
        &self,
        config: &OAuth2Config,
        code: &str,
        callback_url: &Url,
    ) -> Result<String, ApiError> {
        let response = self
            .http_client
            .post(config.token_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", callback_url.as_str()),
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach OAuth2 token endpoint");
                ApiError::service_unavailable("Identity provider temporarily unavailable")
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "OAuth2 token endpoint returned error");
            return Err(ApiError::internal("Identity provider rejected the code"));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse OAuth2 token response");
            ApiError::internal("Identity provider returned an invalid token response")
        })?;
        Ok(token.access_token)
    }

    async fn fetch_userinfo(
        &self,
        config: &OAuth2Config,
        access_token: &str,
    ) -> Result<Identity, ApiError> {
        let response = self
            .http_client
            .get(config.userinfo_url.clone())
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, "warden-server")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach OAuth2 userinfo endpoint");
                ApiError::service_unavailable("Identity provider temporarily unavailable")
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "OAuth2 userinfo endpoint returned error");
            return Err(ApiError::internal("Identity provider rejected the token"));
        }

        let info: UserInfo = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse OAuth2 userinfo response");
            ApiError::internal("Identity provider returned invalid user info")
        })?;

        info.into_identity()
            .ok_or_else(|| ApiError::internal("Identity provider did not share an email"))
    }
}
