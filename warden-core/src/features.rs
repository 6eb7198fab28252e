//! Feature-flag capability.
//!
//! Flag checks are batched: callers ask once whether a feature is enabled in
//! *any* of a set of organizations instead of looping per organization.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::Result;

/// Gates the WebAuthn challenge shape for second-factor login.
pub const WEBAUTHN_LOGIN: &str = "organizations:webauthn-login";

/// Runtime feature toggles, scoped per organization with per-actor overrides.
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    /// Whether `feature` is enabled for `actor` in at least one of
    /// `organization_ids`. An empty organization list only consults the
    /// actor overrides.
    async fn has_any(&self, feature: &str, organization_ids: &[Uuid], actor: Uuid)
        -> Result<bool>;
}

/// In-process feature flags.
#[derive(Default)]
pub struct StaticFeatureFlags {
    organizations: DashMap<String, HashSet<Uuid>>,
    actors: DashMap<String, HashSet<Uuid>>,
}

impl StaticFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_for_organization(&self, feature: &str, organization_id: Uuid) {
        self.organizations
            .entry(feature.to_string())
            .or_default()
            .insert(organization_id);
    }

    pub fn enable_for_actor(&self, feature: &str, actor: Uuid) {
        self.actors
            .entry(feature.to_string())
            .or_default()
            .insert(actor);
    }

    fn check(&self, feature: &str, organization_ids: &[Uuid], actor: Uuid) -> bool {
        let by_actor = self
            .actors
            .get(feature)
            .is_some_and(|actors| actors.contains(&actor));

        by_actor
            || self.organizations.get(feature).is_some_and(|orgs| {
                organization_ids.iter().any(|id| orgs.contains(id))
            })
    }
}

#[async_trait]
impl FeatureFlags for StaticFeatureFlags {
    async fn has_any(
        &self,
        feature: &str,
        organization_ids: &[Uuid],
        actor: Uuid,
    ) -> Result<bool> {
        Ok(self.check(feature, organization_ids, actor))
    }
}

impl std::fmt::Debug for StaticFeatureFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticFeatureFlags")
            .field("organization_features", &self.organizations.len())
            .field("actor_features", &self.actors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_any_organization_enables() {
        let flags = StaticFeatureFlags::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let actor = Uuid::new_v4();
        flags.enable_for_organization(WEBAUTHN_LOGIN, b);

        assert!(flags.has_any(WEBAUTHN_LOGIN, &[a, b], actor).await.unwrap());
        assert!(!flags.has_any(WEBAUTHN_LOGIN, &[a], actor).await.unwrap());
        assert!(!flags.has_any(WEBAUTHN_LOGIN, &[], actor).await.unwrap());
        assert!(!flags.has_any("organizations:other", &[b], actor).await.unwrap());
    }

    #[tokio::test]
    async fn test_actor_override() {
        let flags = StaticFeatureFlags::new();
        let actor = Uuid::new_v4();
        flags.enable_for_actor(WEBAUTHN_LOGIN, actor);

        assert!(flags.has_any(WEBAUTHN_LOGIN, &[], actor).await.unwrap());
        assert!(!flags
            .has_any(WEBAUTHN_LOGIN, &[], Uuid::new_v4())
            .await
            .unwrap());
    }
}
