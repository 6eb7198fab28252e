//! U2F hardware key interface.
//!
//! Activation draws a fresh challenge and renders it in one of two shapes:
//!
//! - legacy U2F: a sign request object (`appId`, websafe `challenge`,
//!   `registeredKeys`) handed to the client unchanged
//! - WebAuthn: CBOR-encoded `PublicKeyCredentialRequestOptions` whose raw
//!   bytes the caller base64-wraps

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ciborium::Value;
use serde::{Deserialize, Serialize};

use super::ActivationContext;
use crate::challenge::{Challenge, ChallengeShape};
use crate::error::{AuthError, Result};

/// Timeout advertised to WebAuthn clients, in milliseconds.
const WEBAUTHN_TIMEOUT_MS: u32 = 60_000;

/// Relying party identity the interface signs challenges for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct U2fSettings {
    /// U2F facet / AppID (usually the public origin)
    pub app_id: String,
    /// WebAuthn relying party id (usually the origin host)
    pub rp_id: String,
}

impl U2fSettings {
    pub fn new(app_id: impl Into<String>, rp_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            rp_id: rp_id.into(),
        }
    }
}

/// A registered U2F key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct U2fDevice {
    /// Websafe base64 key handle
    pub key_handle: String,
    /// Websafe base64 public key
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct U2fConfig {
    #[serde(default)]
    devices: Vec<U2fDevice>,
}

/// Legacy U2F sign request, the native challenge shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct U2fSignRequest {
    pub app_id: String,
    /// Websafe base64 of the challenge bytes
    pub challenge: String,
    pub registered_keys: Vec<RegisteredKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredKey {
    pub version: String,
    pub key_handle: String,
    pub app_id: String,
}

/// U2F interface for one user.
#[derive(Debug, Clone)]
pub struct U2fInterface {
    devices: Vec<U2fDevice>,
    settings: U2fSettings,
}

impl U2fInterface {
    pub fn new(devices: Vec<U2fDevice>, settings: U2fSettings) -> Self {
        Self { devices, settings }
    }

    pub fn from_config(config: &serde_json::Value, settings: U2fSettings) -> Result<Self> {
        let parsed: U2fConfig = serde_json::from_value(config.clone())
            .map_err(|e| AuthError::InvalidAuthenticator(format!("u2f config: {}", e)))?;
        Ok(Self::new(parsed.devices, settings))
    }

    pub fn devices(&self) -> &[U2fDevice] {
        &self.devices
    }

    /// Enrolled once at least one key is registered.
    pub fn is_enrolled(&self) -> bool {
        !self.devices.is_empty()
    }

    /// Draw a challenge, register it as pending for the user and render it.
    pub(super) fn activate(&self, ctx: &ActivationContext<'_>, webauthn: bool) -> Result<Challenge> {
        let bytes = ctx.entropy.get_entropy()?;

        let shape = if webauthn {
            ChallengeShape::WebAuthn(self.request_options(&bytes)?)
        } else {
            ChallengeShape::Legacy(self.sign_request(&bytes))
        };

        ctx.store.issue(ctx.user_id, bytes, webauthn, ctx.now);

        tracing::debug!(
            user_id = %ctx.user_id,
            webauthn = webauthn,
            keys = self.devices.len(),
            source = %ctx.entropy.source_id(),
            "U2F challenge issued"
        );

        Ok(Challenge::new(bytes, shape))
    }

    fn sign_request(&self, bytes: &[u8]) -> U2fSignRequest {
        U2fSignRequest {
            app_id: self.settings.app_id.clone(),
            challenge: URL_SAFE_NO_PAD.encode(bytes),
            registered_keys: self
                .devices
                .iter()
                .map(|d| RegisteredKey {
                    version: "U2F_V2".to_string(),
                    key_handle: d.key_handle.clone(),
                    app_id: self.settings.app_id.clone(),
                })
                .collect(),
        }
    }

    /// CBOR-encode the WebAuthn request options for the registered keys.
    fn request_options(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut allow_credentials = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            let id = URL_SAFE_NO_PAD
                .decode(device.key_handle.trim_end_matches('='))
                .map_err(|e| {
                    AuthError::InvalidAuthenticator(format!("key handle is not base64: {}", e))
                })?;
            allow_credentials.push(Value::Map(vec![
                (Value::Text("type".into()), Value::Text("public-key".into())),
                (Value::Text("id".into()), Value::Bytes(id)),
            ]));
        }

        let options = Value::Map(vec![
            (Value::Text("challenge".into()), Value::Bytes(bytes.to_vec())),
            (
                Value::Text("timeout".into()),
                Value::Integer(WEBAUTHN_TIMEOUT_MS.into()),
            ),
            (
                Value::Text("rpId".into()),
                Value::Text(self.settings.rp_id.clone()),
            ),
            (
                Value::Text("allowCredentials".into()),
                Value::Array(allow_credentials),
            ),
            (
                Value::Text("userVerification".into()),
                Value::Text("discouraged".into()),
            ),
            (
                Value::Text("extensions".into()),
                Value::Map(vec![(
                    Value::Text("appid".into()),
                    Value::Text(self.settings.app_id.clone()),
                )]),
            ),
        ]);

        let mut encoded = Vec::new();
        ciborium::into_writer(&options, &mut encoded)
            .map_err(|e| AuthError::SerializationError(e.to_string()))?;
        Ok(encoded)
    }
}
