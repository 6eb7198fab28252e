//! Second-factor authenticator interfaces.
//!
//! Each stored authenticator row resolves to one variant of
//! [`AuthenticatorInterface`]. The enum is the whole dispatch table: every
//! variant answers [`AuthenticatorInterface::is_enrolled`] and
//! [`AuthenticatorInterface::activate`], and nothing else is required of it.
//!
//! - `u2f`: hardware keys, activation issues a [`Challenge`]
//! - `totp`: authenticator apps, activation only prompts for a code
//! - `recovery`: one-time recovery codes, activation only prompts for a code

mod recovery;
mod totp;
mod u2f;

pub use recovery::RecoveryInterface;
pub use totp::TotpInterface;
pub use u2f::{RegisteredKey, U2fDevice, U2fInterface, U2fSettings, U2fSignRequest};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::challenge::{Challenge, ChallengeStore};
use crate::entropy::EntropySource;
use crate::error::{AuthError, Result};

/// Stored authenticator type, persisted as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticatorKind {
    Recovery = 0,
    Totp = 1,
    /// Reserved; SMS codes are not supported.
    Sms = 2,
    U2f = 3,
}

impl AuthenticatorKind {
    /// Interface identifier used in API payloads.
    pub fn interface_id(&self) -> &'static str {
        match self {
            Self::Recovery => "recovery",
            Self::Totp => "totp",
            Self::Sms => "sms",
            Self::U2f => "u2f",
        }
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(Self::Recovery),
            1 => Some(Self::Totp),
            2 => Some(Self::Sms),
            3 => Some(Self::U2f),
            _ => None,
        }
    }
}

impl From<AuthenticatorKind> for i16 {
    fn from(kind: AuthenticatorKind) -> Self {
        kind as i16
    }
}

/// Everything an activation needs besides the interface itself.
pub struct ActivationContext<'a> {
    /// The user the challenge is bound to
    pub user_id: Uuid,
    /// Source of challenge bytes
    pub entropy: &'a dyn EntropySource,
    /// Single-use store the challenge is registered in
    pub store: &'a ChallengeStore,
    /// Activation time, start of the validity window
    pub now: DateTime<Utc>,
}

/// Result of activating an interface.
#[derive(Debug, Clone)]
pub enum Activation {
    /// A fresh challenge the client must sign
    Challenge(Challenge),
    /// Nothing to sign; the client is told what to enter
    Message(String),
}

/// Enum-dispatched second-factor interface.
#[derive(Debug, Clone)]
pub enum AuthenticatorInterface {
    Totp(TotpInterface),
    U2f(U2fInterface),
    Recovery(RecoveryInterface),
}

impl AuthenticatorInterface {
    /// Build the interface for a stored authenticator row.
    pub fn from_record(
        kind: AuthenticatorKind,
        config: &serde_json::Value,
        settings: &U2fSettings,
    ) -> Result<Self> {
        match kind {
            AuthenticatorKind::Totp => Ok(Self::Totp(TotpInterface::from_config(config)?)),
            AuthenticatorKind::U2f => Ok(Self::U2f(U2fInterface::from_config(
                config,
                settings.clone(),
            )?)),
            AuthenticatorKind::Recovery => {
                Ok(Self::Recovery(RecoveryInterface::from_config(config)?))
            }
            AuthenticatorKind::Sms => Err(AuthError::InvalidAuthenticator(
                "sms authenticators are not supported".into(),
            )),
        }
    }

    pub fn kind(&self) -> AuthenticatorKind {
        match self {
            Self::Totp(_) => AuthenticatorKind::Totp,
            Self::U2f(_) => AuthenticatorKind::U2f,
            Self::Recovery(_) => AuthenticatorKind::Recovery,
        }
    }

    pub fn is_enrolled(&self) -> bool {
        match self {
            Self::Totp(i) => i.is_enrolled(),
            Self::U2f(i) => i.is_enrolled(),
            Self::Recovery(i) => i.is_enrolled(),
        }
    }

    /// Activate the interface for one login attempt.
    ///
    /// `webauthn` selects the newer protocol shape where the interface has
    /// one. Unenrolled interfaces are rejected before any entropy is drawn.
    pub fn activate(&self, ctx: &ActivationContext<'_>, webauthn: bool) -> Result<Activation> {
        if !self.is_enrolled() {
            return Err(AuthError::ChallengeRejected(format!(
                "{} interface is not enrolled",
                self.kind().interface_id()
            )));
        }

        match self {
            Self::U2f(i) => i.activate(ctx, webauthn).map(Activation::Challenge),
            Self::Totp(_) => Ok(Activation::Message(
                "Enter the code from your authenticator app.".to_string(),
            )),
            Self::Recovery(_) => Ok(Activation::Message(
                "Enter one of your unused recovery codes.".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::MockEntropy;

    fn settings() -> U2fSettings {
        U2fSettings::new("https://warden.test", "warden.test")
    }

    #[test]
    fn test_kind_round_trip_through_id() {
        for kind in [
            AuthenticatorKind::Recovery,
            AuthenticatorKind::Totp,
            AuthenticatorKind::Sms,
            AuthenticatorKind::U2f,
        ] {
            assert_eq!(AuthenticatorKind::from_id(i16::from(kind)), Some(kind));
        }
        assert_eq!(AuthenticatorKind::from_id(42), None);
    }

    #[test]
    fn test_sms_is_rejected() {
        let err = AuthenticatorInterface::from_record(
            AuthenticatorKind::Sms,
            &serde_json::json!({}),
            &settings(),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::InvalidAuthenticator(_)));
    }

    #[test]
    fn test_totp_activation_is_message_only() {
        let iface = AuthenticatorInterface::from_record(
            AuthenticatorKind::Totp,
            &serde_json::json!({"secret": "JBSWY3DPEHPK3PXP"}),
            &settings(),
        )
        .unwrap();
        let entropy = MockEntropy::default();
        let store = ChallengeStore::new();
        let ctx = ActivationContext {
            user_id: Uuid::new_v4(),
            entropy: &entropy,
            store: &store,
            now: Utc::now(),
        };

        let activation = iface.activate(&ctx, false).unwrap();
        assert!(matches!(activation, Activation::Message(_)));
        assert_eq!(entropy.draws(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_unenrolled_interface_never_issues_challenge() {
        let iface = AuthenticatorInterface::from_record(
            AuthenticatorKind::U2f,
            &serde_json::json!({"devices": []}),
            &settings(),
        )
        .unwrap();
        assert!(!iface.is_enrolled());

        let entropy = MockEntropy::default();
        let store = ChallengeStore::new();
        let ctx = ActivationContext {
            user_id: Uuid::new_v4(),
            entropy: &entropy,
            store: &store,
            now: Utc::now(),
        };

        assert!(iface.activate(&ctx, true).is_err());
        assert_eq!(entropy.draws(), 0);
        assert!(store.is_empty());
    }
}
