//! SSO handshake state machine.
//!
//! A handshake walks a provider pipeline across several requests. Its state
//! is explicit and serializable so it can live in the user's session between
//! requests:
//!
//! ```text
//! Uninitialized --initialize--> AwaitingProviderResponse{step}
//! AwaitingProviderResponse{step} --step done--> AwaitingProviderResponse{step + 1}
//! AwaitingProviderResponse{last} --step done--> Complete{identity}
//! AwaitingProviderResponse{_} --step fails--> Failed{reason}
//! ```
//!
//! [`AuthHelper::current_step`] is total over these states, so callers never
//! need to know how many steps remain.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::entropy::EntropySource;
use crate::error::{Result, HANDSHAKE_EXPIRY_SECS};
use crate::organization::Organization;
use crate::provider::{Identity, PipelineStep, Provider, ProviderKind};

/// Direction of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFlow {
    /// Log a member in through the organization's provider
    Login,
    /// Link a provider to an organization
    Setup,
}

impl AuthFlow {
    /// Where the user lands once the handshake completes.
    pub fn success_path(&self, organization: &Organization) -> String {
        match self {
            Self::Login => format!("/organizations/{}/issues/", organization.slug),
            Self::Setup => format!("/settings/{}/auth/", organization.slug),
        }
    }
}

/// Provider data collected by a completed pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIdentity {
    pub provider_key: String,
    pub data: BTreeMap<String, String>,
}

impl PendingIdentity {
    /// Identity available without talking to the provider again.
    ///
    /// Only the local test provider has one; OAuth2 identities need the
    /// recorded code exchanged first.
    pub fn local_identity(&self) -> Option<Identity> {
        if self.provider_key != "dummy" {
            return None;
        }
        let email = self.data.get("email")?;
        Some(Identity {
            id: email.clone(),
            email: email.clone(),
            name: None,
        })
    }

    /// Authorization code recorded by an OAuth2 callback.
    pub fn authorization_code(&self) -> Option<&str> {
        self.data.get("code").map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HandshakeState {
    Uninitialized,
    AwaitingProviderResponse {
        step: usize,
        #[serde(default)]
        data: BTreeMap<String, String>,
    },
    Complete {
        identity: PendingIdentity,
    },
    Failed {
        reason: String,
    },
}

/// Handshake state as stored in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeSession {
    pub organization_id: Uuid,
    pub provider_key: String,
    pub flow: AuthFlow,
    /// Random value echoed back by redirect-based providers
    pub state_token: String,
    pub started_at: DateTime<Utc>,
    pub state: HandshakeState,
}

impl HandshakeSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at >= Duration::seconds(HANDSHAKE_EXPIRY_SECS)
    }
}

/// Request parameters a step can read (query string and form body merged).
#[derive(Debug, Clone, Default)]
pub struct StepInput {
    params: BTreeMap<String, String>,
}

impl StepInput {
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self { params }
    }

    /// Non-empty parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StepInput {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Per-request context for stepping.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Where redirect-based providers send the user back to
    pub callback_url: Url,
    pub now: DateTime<Utc>,
}

/// Something the user has to fill in before the pipeline can continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    Email,
}

impl Prompt {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Email => "email",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Email => "Email",
        }
    }
}

/// What the controller should answer with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Send the user to the provider
    Redirect(Url),
    /// Render a prompt page
    Prompt(Prompt),
    /// Pipeline complete
    Finished(PendingIdentity),
    /// Handshake is unusable; the reason is for logs only
    Failed(String),
}

enum StepResult {
    Respond(StepOutcome),
    Next,
    Fail(String),
}

/// Drives one organization's handshake for one session.
pub struct AuthHelper<'a> {
    organization: &'a Organization,
    provider: &'a Provider,
    flow: AuthFlow,
    session: Option<HandshakeSession>,
}

impl<'a> AuthHelper<'a> {
    /// Wrap whatever handshake the session currently holds.
    pub fn new(
        organization: &'a Organization,
        provider: &'a Provider,
        flow: AuthFlow,
        stored: Option<HandshakeSession>,
    ) -> Self {
        Self {
            organization,
            provider,
            flow,
            session: stored,
        }
    }

    /// Start a fresh handshake, discarding any previous one.
    pub fn initialize(&mut self, entropy: &dyn EntropySource, now: DateTime<Utc>) -> Result<()> {
        let state_token = entropy.token()?;
        self.session = Some(HandshakeSession {
            organization_id: self.organization.id,
            provider_key: self.provider.key.clone(),
            flow: self.flow,
            state_token,
            started_at: now,
            state: HandshakeState::AwaitingProviderResponse {
                step: 0,
                data: BTreeMap::new(),
            },
        });

        tracing::info!(
            organization = %self.organization.slug,
            provider = %self.provider.key,
            flow = ?self.flow,
            "SSO handshake initialized"
        );
        Ok(())
    }

    pub fn state(&self) -> &HandshakeState {
        const UNINITIALIZED: &HandshakeState = &HandshakeState::Uninitialized;
        self.session
            .as_ref()
            .map(|s| &s.state)
            .unwrap_or(UNINITIALIZED)
    }

    pub fn flow(&self) -> AuthFlow {
        self.flow
    }

    /// Whether the stored handshake belongs to this organization, provider
    /// and flow, is still fresh and has not failed.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        let Some(session) = &self.session else {
            return false;
        };

        session.organization_id == self.organization.id
            && session.provider_key == self.provider.key
            && session.flow == self.flow
            && !session.is_expired(now)
            && !matches!(
                session.state,
                HandshakeState::Uninitialized | HandshakeState::Failed { .. }
            )
    }

    /// Advance as far as the input allows and report what to answer with.
    pub fn current_step(&mut self, input: &StepInput, ctx: &StepContext) -> StepOutcome {
        let provider = self.provider;
        let Some(session) = self.session.as_mut() else {
            return StepOutcome::Failed("handshake was never initialized".into());
        };

        loop {
            let transition = match &mut session.state {
                HandshakeState::Uninitialized => {
                    return StepOutcome::Failed("handshake was never initialized".into())
                }
                HandshakeState::Failed { reason } => return StepOutcome::Failed(reason.clone()),
                HandshakeState::Complete { identity } => {
                    return StepOutcome::Finished(identity.clone())
                }
                HandshakeState::AwaitingProviderResponse { step, data } => {
                    match provider.pipeline().get(*step) {
                        None => HandshakeState::Complete {
                            identity: PendingIdentity {
                                provider_key: provider.key.clone(),
                                data: std::mem::take(data),
                            },
                        },
                        Some(current) => {
                            match dispatch(*current, provider, input, data, &session.state_token, ctx)
                            {
                                StepResult::Respond(outcome) => return outcome,
                                StepResult::Next => {
                                    tracing::debug!(step = *step, "SSO pipeline step complete");
                                    *step += 1;
                                    continue;
                                }
                                StepResult::Fail(reason) => HandshakeState::Failed { reason },
                            }
                        }
                    }
                }
            };
            session.state = transition;
        }
    }

    /// The handshake to persist back into the session.
    pub fn into_session(self) -> Option<HandshakeSession> {
        self.session
    }
}

fn dispatch(
    step: PipelineStep,
    provider: &Provider,
    input: &StepInput,
    data: &mut BTreeMap<String, String>,
    state_token: &str,
    ctx: &StepContext,
) -> StepResult {
    match step {
        PipelineStep::AskEmail => match input.get("email") {
            Some(email) if email.contains('@') => {
                data.insert("email".into(), email.to_lowercase());
                StepResult::Next
            }
            _ => StepResult::Respond(StepOutcome::Prompt(Prompt::Email)),
        },
        PipelineStep::OAuth2Authorize => {
            if input.get("code").is_some() || input.get("error").is_some() {
                return StepResult::Next;
            }
            match &provider.kind {
                ProviderKind::OAuth2(config) => StepResult::Respond(StepOutcome::Redirect(
                    config.authorize_redirect(&ctx.callback_url, state_token),
                )),
                ProviderKind::Dummy => StepResult::Fail("provider is not OAuth2".into()),
            }
        }
        PipelineStep::OAuth2Callback => {
            if let Some(error) = input.get("error") {
                return StepResult::Fail(format!("provider returned error: {}", error));
            }
            if input.get("state") != Some(state_token) {
                return StepResult::Fail("state token mismatch".into());
            }
            match input.get("code") {
                Some(code) => {
                    data.insert("code".into(), code.to_string());
                    StepResult::Next
                }
                None => StepResult::Fail("missing authorization code".into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::MockEntropy;
    use crate::organization::AuthProvider;

    fn ctx() -> StepContext {
        StepContext {
            callback_url: Url::parse("https://warden.test/auth/sso/").unwrap(),
            now: Utc::now(),
        }
    }

    fn dummy(org: &Organization) -> Provider {
        Provider::from_auth_provider(&AuthProvider::new(org.id, "dummy", serde_json::json!({})))
            .unwrap()
    }

    fn oauth(org: &Organization) -> Provider {
        Provider::from_auth_provider(&AuthProvider::new(
            org.id,
            "google",
            serde_json::json!({
                "authorize_url": "https://idp.test/authorize",
                "token_url": "https://idp.test/token",
                "userinfo_url": "https://idp.test/userinfo",
                "client_id": "warden"
            }),
        ))
        .unwrap()
    }

    #[test]
    fn test_uninitialized_is_invalid_and_fails() {
        let org = Organization::new("acme", "Acme");
        let provider = dummy(&org);
        let mut helper = AuthHelper::new(&org, &provider, AuthFlow::Login, None);

        assert_eq!(helper.state(), &HandshakeState::Uninitialized);
        assert!(!helper.is_valid(Utc::now()));
        assert!(matches!(
            helper.current_step(&StepInput::default(), &ctx()),
            StepOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_dummy_pipeline_prompts_then_finishes() {
        let org = Organization::new("acme", "Acme");
        let provider = dummy(&org);
        let mut helper = AuthHelper::new(&org, &provider, AuthFlow::Login, None);
        helper.initialize(&MockEntropy::default(), Utc::now()).unwrap();
        assert!(helper.is_valid(Utc::now()));

        let outcome = helper.current_step(&StepInput::default(), &ctx());
        assert_eq!(outcome, StepOutcome::Prompt(Prompt::Email));

        let input: StepInput = [("email", "Jane@Example.com")].into_iter().collect();
        let StepOutcome::Finished(pending) = helper.current_step(&input, &ctx()) else {
            panic!("expected finished");
        };
        assert_eq!(pending.local_identity().unwrap().email, "jane@example.com");

        // Complete is sticky: stepping again yields the same identity
        let again = helper.current_step(&StepInput::default(), &ctx());
        assert_eq!(again, StepOutcome::Finished(pending));
    }

    #[test]
    fn test_oauth_pipeline_round_trip() {
        let org = Organization::new("acme", "Acme");
        let provider = oauth(&org);
        let mut helper = AuthHelper::new(&org, &provider, AuthFlow::Login, None);
        helper.initialize(&MockEntropy::default(), Utc::now()).unwrap();

        let StepOutcome::Redirect(url) = helper.current_step(&StepInput::default(), &ctx()) else {
            panic!("expected redirect");
        };
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let session = helper.into_session().unwrap();
        let mut helper = AuthHelper::new(&org, &provider, AuthFlow::Login, Some(session));
        let input: StepInput = [("code", "abc"), ("state", state.as_str())]
            .into_iter()
            .collect();
        let StepOutcome::Finished(pending) = helper.current_step(&input, &ctx()) else {
            panic!("expected finished");
        };
        assert_eq!(pending.authorization_code(), Some("abc"));
        assert!(pending.local_identity().is_none());
    }

    #[test]
    fn test_state_mismatch_fails_handshake() {
        let org = Organization::new("acme", "Acme");
        let provider = oauth(&org);
        let mut helper = AuthHelper::new(&org, &provider, AuthFlow::Login, None);
        helper.initialize(&MockEntropy::default(), Utc::now()).unwrap();

        let input: StepInput = [("code", "abc"), ("state", "forged")].into_iter().collect();
        assert!(matches!(
            helper.current_step(&input, &ctx()),
            StepOutcome::Failed(_)
        ));
        assert!(matches!(helper.state(), HandshakeState::Failed { .. }));
        assert!(!helper.is_valid(Utc::now()));
    }

    #[test]
    fn test_provider_error_fails_handshake() {
        let org = Organization::new("acme", "Acme");
        let provider = oauth(&org);
        let mut helper = AuthHelper::new(&org, &provider, AuthFlow::Login, None);
        helper.initialize(&MockEntropy::default(), Utc::now()).unwrap();

        let input: StepInput = [("error", "access_denied")].into_iter().collect();
        assert!(matches!(
            helper.current_step(&input, &ctx()),
            StepOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_handshake_for_other_organization_is_invalid() {
        let org = Organization::new("acme", "Acme");
        let other = Organization::new("globex", "Globex");
        let provider = dummy(&org);

        let mut helper = AuthHelper::new(&other, &provider, AuthFlow::Login, None);
        helper.initialize(&MockEntropy::default(), Utc::now()).unwrap();
        let stored = helper.into_session();

        let helper = AuthHelper::new(&org, &provider, AuthFlow::Login, stored.clone());
        assert!(!helper.is_valid(Utc::now()));

        let helper = AuthHelper::new(&other, &provider, AuthFlow::Setup, stored);
        assert!(!helper.is_valid(Utc::now()));
    }

    #[test]
    fn test_expired_handshake_is_invalid() {
        let org = Organization::new("acme", "Acme");
        let provider = dummy(&org);
        let start = Utc::now() - Duration::seconds(HANDSHAKE_EXPIRY_SECS + 5);
        let mut helper = AuthHelper::new(&org, &provider, AuthFlow::Login, None);
        helper.initialize(&MockEntropy::default(), start).unwrap();

        assert!(!helper.is_valid(Utc::now()));
    }

    #[test]
    fn test_session_serializes_with_state_tag() {
        let org = Organization::new("acme", "Acme");
        let provider = dummy(&org);
        let mut helper = AuthHelper::new(&org, &provider, AuthFlow::Login, None);
        helper.initialize(&MockEntropy::default(), Utc::now()).unwrap();

        let json = serde_json::to_value(helper.into_session().unwrap()).unwrap();
        assert_eq!(json["state"]["state"], "awaiting_provider_response");
        assert_eq!(json["flow"], "login");
    }

    #[test]
    fn test_success_paths() {
        let org = Organization::new("acme", "Acme");
        assert_eq!(AuthFlow::Login.success_path(&org), "/organizations/acme/issues/");
        assert_eq!(AuthFlow::Setup.success_path(&org), "/settings/acme/auth/");
    }
}
