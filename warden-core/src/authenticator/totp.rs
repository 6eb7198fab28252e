//! Time-based one-time password interface.

use serde::Deserialize;

use crate::error::{AuthError, Result};

#[derive(Debug, Default, Deserialize)]
struct TotpConfig {
    #[serde(default)]
    secret: Option<String>,
}

/// Authenticator-app interface. Enrolled once a shared secret is stored.
#[derive(Debug, Clone)]
pub struct TotpInterface {
    secret: Option<String>,
}

impl TotpInterface {
    pub fn from_config(config: &serde_json::Value) -> Result<Self> {
        let parsed: TotpConfig = serde_json::from_value(config.clone())
            .map_err(|e| AuthError::InvalidAuthenticator(format!("totp config: {}", e)))?;
        Ok(Self {
            secret: parsed.secret,
        })
    }

    pub fn is_enrolled(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrollment_requires_secret() {
        let empty = TotpInterface::from_config(&serde_json::json!({})).unwrap();
        assert!(!empty.is_enrolled());

        let blank = TotpInterface::from_config(&serde_json::json!({"secret": ""})).unwrap();
        assert!(!blank.is_enrolled());

        let set = TotpInterface::from_config(&serde_json::json!({"secret": "ABC"})).unwrap();
        assert!(set.is_enrolled());
    }
}
