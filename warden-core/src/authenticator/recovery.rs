//! Recovery code interface.

use serde::Deserialize;

use crate::error::{AuthError, Result};

#[derive(Debug, Default, Deserialize)]
struct RecoveryConfig {
    #[serde(default)]
    codes: Vec<String>,
    #[serde(default)]
    used: u32,
}

/// One-time recovery codes. Enrolled while at least one code is unused.
#[derive(Debug, Clone)]
pub struct RecoveryInterface {
    total: usize,
    used: u32,
}

impl RecoveryInterface {
    pub fn from_config(config: &serde_json::Value) -> Result<Self> {
        let parsed: RecoveryConfig = serde_json::from_value(config.clone())
            .map_err(|e| AuthError::InvalidAuthenticator(format!("recovery config: {}", e)))?;
        Ok(Self {
            total: parsed.codes.len(),
            used: parsed.used,
        })
    }

    /// Codes not yet spent. `used` is a bitmask over the stored codes.
    pub fn remaining(&self) -> usize {
        (0..self.total.min(32))
            .filter(|i| self.used & (1 << i) == 0)
            .count()
    }

    pub fn is_enrolled(&self) -> bool {
        self.remaining() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spent_codes_unenroll() {
        let iface = RecoveryInterface::from_config(&serde_json::json!({
            "codes": ["aaaa", "bbbb"],
            "used": 0b11
        }))
        .unwrap();
        assert_eq!(iface.remaining(), 0);
        assert!(!iface.is_enrolled());

        let iface = RecoveryInterface::from_config(&serde_json::json!({
            "codes": ["aaaa", "bbbb"],
            "used": 0b01
        }))
        .unwrap();
        assert_eq!(iface.remaining(), 1);
        assert!(iface.is_enrolled());
    }
}
