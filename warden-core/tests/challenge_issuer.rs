//! End-to-end tests for challenge issuance.
//!
//! These exercise the issuer the way the server does: resolve an interface
//! from a stored row, ask the feature flags once, activate, and then answer
//! the challenge through the store.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use uuid::Uuid;
use warden_core::{
    issue_challenges, ActivationContext, AuthenticatorInterface, AuthenticatorKind,
    ChallengePayload, ChallengeStore, ChallengeSubject, MockEntropy, StaticFeatureFlags,
    U2fSettings, WEBAUTHN_LOGIN,
};

fn settings() -> U2fSettings {
    U2fSettings::new("https://warden.test", "warden.test")
}

fn enrolled_u2f() -> AuthenticatorInterface {
    let config = serde_json::json!({
        "devices": [
            {"keyHandle": "a2V5LW9uZQ", "publicKey": "cHViLW9uZQ", "name": "YubiKey"},
            {"keyHandle": "a2V5LXR3bw", "publicKey": "cHViLXR3bw", "name": "Backup"}
        ]
    });
    AuthenticatorInterface::from_record(AuthenticatorKind::U2f, &config, &settings())
        .expect("valid u2f config")
}

#[tokio::test]
async fn test_legacy_challenge_when_flag_disabled() {
    let entropy = MockEntropy::default();
    let store = ChallengeStore::new();
    let flags = StaticFeatureFlags::new();
    let user_id = Uuid::new_v4();
    let orgs = [Uuid::new_v4()];

    let ctx = ActivationContext {
        user_id,
        entropy: &entropy,
        store: &store,
        now: Utc::now(),
    };
    let subject = ChallengeSubject {
        user_id,
        organization_ids: &orgs,
    };

    let issued = issue_challenges(&subject, Some(enrolled_u2f()), &flags, &ctx)
        .await
        .unwrap();

    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].id, "u2f");
    let ChallengePayload::Native(request) = &issued[0].challenge else {
        panic!("expected legacy sign request");
    };
    assert_eq!(request.app_id, "https://warden.test");
    assert_eq!(request.registered_keys.len(), 2);

    // The sign request challenge answers the pending entry exactly once
    let bytes = URL_SAFE_NO_PAD.decode(&request.challenge).unwrap();
    assert!(!store.consume(user_id, &bytes, Utc::now()).unwrap());
    assert!(store.consume(user_id, &bytes, Utc::now()).is_err());
}

#[tokio::test]
async fn test_webauthn_challenge_when_any_organization_enabled() {
    let entropy = MockEntropy::default();
    let store = ChallengeStore::new();
    let flags = StaticFeatureFlags::new();
    let user_id = Uuid::new_v4();
    let orgs = [Uuid::new_v4(), Uuid::new_v4()];
    flags.enable_for_organization(WEBAUTHN_LOGIN, orgs[1]);

    let ctx = ActivationContext {
        user_id,
        entropy: &entropy,
        store: &store,
        now: Utc::now(),
    };
    let subject = ChallengeSubject {
        user_id,
        organization_ids: &orgs,
    };

    let issued = issue_challenges(&subject, Some(enrolled_u2f()), &flags, &ctx)
        .await
        .unwrap();

    let json = serde_json::to_value(&issued).unwrap();
    let data = json[0]["challenge"]["webAuthnAuthenticationData"]
        .as_str()
        .expect("webauthn payload");
    let raw = STANDARD.decode(data).unwrap();
    let options: ciborium::Value = ciborium::from_reader(raw.as_slice()).unwrap();
    assert!(options.is_map());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_no_interface_yields_empty_list() {
    let entropy = MockEntropy::default();
    let store = ChallengeStore::new();
    let user_id = Uuid::new_v4();
    let ctx = ActivationContext {
        user_id,
        entropy: &entropy,
        store: &store,
        now: Utc::now(),
    };
    let subject = ChallengeSubject {
        user_id,
        organization_ids: &[],
    };

    let issued = issue_challenges(&subject, None, &StaticFeatureFlags::new(), &ctx)
        .await
        .unwrap();
    assert!(issued.is_empty());
    assert_eq!(entropy.draws(), 0);
}

#[tokio::test]
async fn test_unenrolled_u2f_yields_empty_list() {
    let entropy = MockEntropy::default();
    let store = ChallengeStore::new();
    let user_id = Uuid::new_v4();
    let ctx = ActivationContext {
        user_id,
        entropy: &entropy,
        store: &store,
        now: Utc::now(),
    };
    let subject = ChallengeSubject {
        user_id,
        organization_ids: &[],
    };
    let iface = AuthenticatorInterface::from_record(
        AuthenticatorKind::U2f,
        &serde_json::json!({}),
        &settings(),
    )
    .unwrap();

    let issued = issue_challenges(&subject, Some(iface), &StaticFeatureFlags::new(), &ctx)
        .await
        .unwrap();
    assert!(issued.is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_consecutive_activations_differ() {
    let entropy = MockEntropy::default();
    let store = ChallengeStore::new();
    let flags = StaticFeatureFlags::new();
    let user_id = Uuid::new_v4();
    let ctx = ActivationContext {
        user_id,
        entropy: &entropy,
        store: &store,
        now: Utc::now(),
    };
    let subject = ChallengeSubject {
        user_id,
        organization_ids: &[],
    };

    let first = issue_challenges(&subject, Some(enrolled_u2f()), &flags, &ctx)
        .await
        .unwrap();
    let second = issue_challenges(&subject, Some(enrolled_u2f()), &flags, &ctx)
        .await
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(store.len(), 1);
}
