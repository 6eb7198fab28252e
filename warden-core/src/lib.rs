//! Warden Core - second-factor challenges and SSO handshakes
//!
//! This crate holds the login domain shared by the Warden server: the
//! authenticator interfaces and the challenge issuer that activates them,
//! and the organization SSO handshake state machine.
//!
//! # Features
//!
//! - Enum-dispatched authenticator interfaces (U2F, TOTP, recovery codes)
//! - Single-use, expiring challenges backed by an in-process store
//! - WebAuthn or legacy U2F challenge shapes, picked by a batched feature flag
//! - Explicit, serializable SSO handshake states
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use uuid::Uuid;
//! use warden_core::{
//!     issue_challenges, ActivationContext, AuthenticatorInterface, AuthenticatorKind,
//!     ChallengeStore, ChallengeSubject, MockEntropy, StaticFeatureFlags, U2fSettings,
//! };
//!
//! # async fn example() -> warden_core::Result<()> {
//! let settings = U2fSettings::new("https://warden.test", "warden.test");
//! let config = serde_json::json!({
//!     "devices": [{"keyHandle": "a2V5", "publicKey": "cHVi", "name": "YubiKey"}]
//! });
//! let interface = AuthenticatorInterface::from_record(AuthenticatorKind::U2f, &config, &settings)?;
//!
//! let entropy = MockEntropy::default();
//! let store = ChallengeStore::new();
//! let user_id = Uuid::new_v4();
//! let ctx = ActivationContext { user_id, entropy: &entropy, store: &store, now: Utc::now() };
//! let subject = ChallengeSubject { user_id, organization_ids: &[] };
//!
//! let issued = issue_challenges(&subject, Some(interface), &StaticFeatureFlags::new(), &ctx).await?;
//! assert_eq!(issued.len(), 1);
//! assert_eq!(issued[0].id, "u2f");
//! # Ok(())
//! # }
//! ```

pub mod authenticator;
pub mod challenge;
pub mod entropy;
pub mod error;
pub mod features;
pub mod handshake;
pub mod organization;
pub mod provider;

pub use authenticator::{
    Activation, ActivationContext, AuthenticatorInterface, AuthenticatorKind, U2fDevice,
    U2fInterface, U2fSettings, U2fSignRequest,
};
pub use challenge::{
    issue_challenges, Challenge, ChallengePayload, ChallengeShape, ChallengeStore,
    ChallengeSubject, IssuedChallenge,
};
pub use entropy::{EntropyOrigin, EntropySource, MockEntropy, OsEntropy, ENTROPY_BYTES};
pub use error::{AuthError, Result, CHALLENGE_EXPIRY_SECS, HANDSHAKE_EXPIRY_SECS};
pub use features::{FeatureFlags, StaticFeatureFlags, WEBAUTHN_LOGIN};
pub use handshake::{
    AuthFlow, AuthHelper, HandshakeSession, HandshakeState, PendingIdentity, Prompt,
    StepContext, StepInput, StepOutcome,
};
pub use organization::{AuthProvider, Organization, OrganizationStatus};
pub use provider::{Identity, OAuth2Config, Provider, ProviderKind};
