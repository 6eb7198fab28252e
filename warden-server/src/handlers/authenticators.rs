//! Second-factor challenge listing
//!
//! `GET /api/0/authenticators/` activates the caller's U2F interface and
//! returns the challenge it must sign, shaped for either the legacy U2F
//! JavaScript API or WebAuthn.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use warden_core::{
    issue_challenges, ActivationContext, AuthenticatorInterface, AuthenticatorKind,
    ChallengeSubject, FeatureFlags, IssuedChallenge,
};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::handlers::AppState;

/// One activated interface and its challenge
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthenticatorChallenge {
    /// Interface id
    #[schema(example = "u2f")]
    pub id: String,
    /// Either a U2F sign request or `{"webAuthnAuthenticationData": <base64>}`
    #[schema(value_type = Object)]
    pub challenge: serde_json::Value,
}

impl TryFrom<IssuedChallenge> for AuthenticatorChallenge {
    type Error = ApiError;

    fn try_from(issued: IssuedChallenge) -> Result<Self, Self::Error> {
        let challenge = serde_json::to_value(&issued.challenge)
            .map_err(|e| ApiError::internal(format!("challenge serialization: {}", e)))?;
        Ok(Self {
            id: issued.id,
            challenge,
        })
    }
}

/// List second-factor challenges for the caller
///
/// Returns an empty list when the caller has no enrolled U2F device.
#[utoipa::path(
    get,
    path = "/api/0/authenticators/",
    tag = "Authenticators",
    responses(
        (status = 200, description = "Challenges issued", body = [AuthenticatorChallenge]),
        (status = 401, description = "Not authenticated")
    ),
    security(
        ("bearer_token" = []),
        ("session_cookie" = [])
    )
)]
pub async fn list_authenticators(
    State(state): State<AppState>,
    AuthenticatedUser { user }: AuthenticatedUser,
) -> Result<Json<Vec<AuthenticatorChallenge>>, ApiError> {
    let Some(record) = state
        .directory
        .find_authenticator(user.id, AuthenticatorKind::U2f)
        .await?
    else {
        tracing::debug!(user_id = %user.id, "No U2F authenticator on file");
        return Ok(Json(Vec::new()));
    };

    let interface = AuthenticatorInterface::from_record(
        record.kind,
        &record.config,
        &state.config.u2f_settings(),
    )?;
    let organization_ids = state.directory.organization_ids_for_user(user.id).await?;

    let subject = ChallengeSubject {
        user_id: user.id,
        organization_ids: &organization_ids,
    };
    let now = Utc::now();
    let ctx = ActivationContext {
        user_id: user.id,
        entropy: state.entropy.as_ref(),
        store: &state.challenges,
        now,
    };

    state.challenges.cleanup_expired(now);
    let flags: &dyn FeatureFlags = state.directory.as_ref();
    let issued = issue_challenges(&subject, Some(interface), flags, &ctx).await?;

    tracing::info!(
        user_id = %user.id,
        organizations = organization_ids.len(),
        issued = issued.len(),
        "Second-factor challenges issued"
    );

    let challenges = issued
        .into_iter()
        .map(AuthenticatorChallenge::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(challenges))
}
