//! Second-factor challenges and the challenge issuer.
//!
//! A [`Challenge`] is 32 bytes of fresh entropy bound to one user and one
//! activation. Pending challenges live in the [`ChallengeStore`] until they
//! are consumed or expire; consuming removes the entry, so a challenge can
//! never be answered twice.
//!
//! This crate only issues challenges. Checking the signed response belongs
//! to the second-factor verifier, which calls [`ChallengeStore::consume`]
//! with the challenge bytes it recovered from the device's answer.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authenticator::{
    Activation, ActivationContext, AuthenticatorInterface, AuthenticatorKind, U2fSignRequest,
};
use crate::entropy::ENTROPY_BYTES;
use crate::error::{AuthError, Result, CHALLENGE_EXPIRY_SECS};
use crate::features::{FeatureFlags, WEBAUTHN_LOGIN};

/// How a challenge is presented to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeShape {
    /// Legacy U2F sign request, passed through as-is
    Legacy(U2fSignRequest),
    /// Raw CBOR request options, base64-wrapped on the way out
    WebAuthn(Vec<u8>),
}

/// A freshly activated challenge.
#[derive(Debug, Clone)]
pub struct Challenge {
    bytes: [u8; ENTROPY_BYTES],
    shape: ChallengeShape,
}

impl Challenge {
    pub fn new(bytes: [u8; ENTROPY_BYTES], shape: ChallengeShape) -> Self {
        Self { bytes, shape }
    }

    /// The random challenge value the client must sign.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shape(&self) -> &ChallengeShape {
        &self.shape
    }

    /// Render the challenge for the API response.
    pub fn into_payload(self) -> ChallengePayload {
        match self.shape {
            ChallengeShape::Legacy(request) => ChallengePayload::Native(request),
            ChallengeShape::WebAuthn(raw) => ChallengePayload::WebAuthn {
                web_authn_authentication_data: BASE64.encode(raw),
            },
        }
    }
}

/// Challenge payload as serialized in `[{"id": "u2f", "challenge": ...}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChallengePayload {
    WebAuthn {
        #[serde(rename = "webAuthnAuthenticationData")]
        web_authn_authentication_data: String,
    },
    Native(U2fSignRequest),
}

/// One entry of the challenge listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedChallenge {
    pub id: String,
    pub challenge: ChallengePayload,
}

/// Pending challenge entry with expiration
struct PendingChallenge {
    bytes: [u8; ENTROPY_BYTES],
    webauthn: bool,
    expires_at: DateTime<Utc>,
}

/// Thread-safe store of outstanding challenges, one per user.
///
/// Re-activating replaces the user's previous challenge.
#[derive(Default)]
pub struct ChallengeStore {
    pending: DashMap<Uuid, PendingChallenge>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly drawn challenge for a user.
    pub fn issue(
        &self,
        user_id: Uuid,
        bytes: [u8; ENTROPY_BYTES],
        webauthn: bool,
        now: DateTime<Utc>,
    ) {
        self.pending.insert(
            user_id,
            PendingChallenge {
                bytes,
                webauthn,
                expires_at: now + Duration::seconds(CHALLENGE_EXPIRY_SECS),
            },
        );
    }

    /// Consume the user's outstanding challenge.
    ///
    /// The entry is removed whether or not the presented bytes match.
    /// Returns whether the challenge was issued for the WebAuthn protocol.
    pub fn consume(&self, user_id: Uuid, presented: &[u8], now: DateTime<Utc>) -> Result<bool> {
        let (_, entry) = self
            .pending
            .remove(&user_id)
            .ok_or_else(|| AuthError::ChallengeRejected("no outstanding challenge".into()))?;

        if entry.expires_at <= now {
            return Err(AuthError::ChallengeRejected("challenge expired".into()));
        }
        if entry.bytes.as_slice() != presented {
            return Err(AuthError::ChallengeRejected("challenge mismatch".into()));
        }
        Ok(entry.webauthn)
    }

    /// Remove expired challenges
    pub fn cleanup_expired(&self, now: DateTime<Utc>) {
        self.pending.retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl std::fmt::Debug for ChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeStore")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Who a challenge listing is for.
pub struct ChallengeSubject<'a> {
    pub user_id: Uuid,
    /// Every organization the user is a member of
    pub organization_ids: &'a [Uuid],
}

/// Issue the second-factor challenges for a user.
///
/// Returns an empty list when the user has no enrolled U2F interface; that
/// is a valid terminal state, not an error. The WebAuthn flag is a single
/// batched feature query across all of the user's organizations.
pub async fn issue_challenges(
    subject: &ChallengeSubject<'_>,
    interface: Option<AuthenticatorInterface>,
    flags: &dyn FeatureFlags,
    ctx: &ActivationContext<'_>,
) -> Result<Vec<IssuedChallenge>> {
    let interface = match interface {
        Some(i) if i.kind() == AuthenticatorKind::U2f && i.is_enrolled() => i,
        _ => return Ok(Vec::new()),
    };

    let webauthn = flags
        .has_any(WEBAUTHN_LOGIN, subject.organization_ids, subject.user_id)
        .await?;

    let challenge = match interface.activate(ctx, webauthn)? {
        Activation::Challenge(challenge) => challenge,
        Activation::Message(_) => return Ok(Vec::new()),
    };

    Ok(vec![IssuedChallenge {
        id: interface.kind().interface_id().to_string(),
        challenge: challenge.into_payload(),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_is_single_use() {
        let store = ChallengeStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        store.issue(user, [7u8; 32], false, now);

        assert!(!store.consume(user, &[7u8; 32], now).unwrap());
        assert!(store.consume(user, &[7u8; 32], now).is_err());
    }

    #[test]
    fn test_expired_challenge_rejected() {
        let store = ChallengeStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        store.issue(user, [1u8; 32], true, now);

        let later = now + Duration::seconds(CHALLENGE_EXPIRY_SECS + 1);
        assert!(matches!(
            store.consume(user, &[1u8; 32], later),
            Err(AuthError::ChallengeRejected(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_mismatch_still_burns_challenge() {
        let store = ChallengeStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        store.issue(user, [1u8; 32], false, now);

        assert!(store.consume(user, &[2u8; 32], now).is_err());
        assert!(store.consume(user, &[1u8; 32], now).is_err());
    }

    #[test]
    fn test_reissue_replaces_previous() {
        let store = ChallengeStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        store.issue(user, [1u8; 32], false, now);
        store.issue(user, [2u8; 32], false, now);

        assert_eq!(store.len(), 1);
        assert!(store.consume(user, &[2u8; 32], now).is_ok());
    }

    #[test]
    fn test_cleanup_expired() {
        let store = ChallengeStore::new();
        let now = Utc::now();
        store.issue(Uuid::new_v4(), [1u8; 32], false, now - Duration::seconds(600));
        store.issue(Uuid::new_v4(), [2u8; 32], false, now);

        store.cleanup_expired(now);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_webauthn_payload_serialization() {
        let challenge = Challenge::new([0u8; 32], ChallengeShape::WebAuthn(vec![1, 2, 3]));
        let json = serde_json::to_value(challenge.into_payload()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"webAuthnAuthenticationData": "AQID"})
        );
    }
}
