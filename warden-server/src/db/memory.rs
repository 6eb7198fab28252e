//! In-memory directory backend (development and tests)
//!
//! Lookups go straight to concurrent maps; there is nothing to roll back, so a
//! login transaction over this backend only stages session writes.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use uuid::Uuid;
use warden_core::{
    AuthProvider, AuthenticatorKind, FeatureFlags, Organization, StaticFeatureFlags,
};

use super::models::{AuthenticatorRecord, User};
use super::StorageError;

/// In-memory directory with builder-style seeding
#[derive(Default)]
pub struct MemoryDirectory {
    users: DashMap<Uuid, User>,
    authenticators: DashMap<(Uuid, AuthenticatorKind), AuthenticatorRecord>,
    organizations: DashMap<String, Organization>,
    members: DashMap<Uuid, Vec<Uuid>>,
    providers: DashMap<Uuid, AuthProvider>,
    features: StaticFeatureFlags,
    provider_lookups: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: User) -> Self {
        self.users.insert(user.id, user);
        self
    }

    pub fn with_authenticator(self, record: AuthenticatorRecord) -> Self {
        self.authenticators
            .insert((record.user_id, record.kind), record);
        self
    }

    pub fn with_organization(self, organization: Organization) -> Self {
        self.organizations
            .insert(organization.slug.clone(), organization);
        self
    }

    pub fn with_member(self, organization_id: Uuid, user_id: Uuid) -> Self {
        self.members.entry(user_id).or_default().push(organization_id);
        self
    }

    /// Replaces any provider already bound to the organization.
    pub fn with_auth_provider(self, provider: AuthProvider) -> Self {
        self.providers.insert(provider.organization_id, provider);
        self
    }

    pub fn with_organization_feature(self, feature: &str, organization_id: Uuid) -> Self {
        self.features.enable_for_organization(feature, organization_id);
        self
    }

    /// How many auth provider lookups have been served.
    pub fn provider_lookups(&self) -> usize {
        self.provider_lookups.load(Ordering::SeqCst)
    }

    pub(super) fn find_user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    pub(super) fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| u.clone())
    }

    pub(super) fn find_authenticator(
        &self,
        user_id: Uuid,
        kind: AuthenticatorKind,
    ) -> Option<AuthenticatorRecord> {
        self.authenticators.get(&(user_id, kind)).map(|r| r.clone())
    }

    pub(super) fn organization_ids_for_user(&self, user_id: Uuid) -> Vec<Uuid> {
        self.members
            .get(&user_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    pub(super) fn organization_by_slug(&self, slug: &str) -> Option<Organization> {
        self.organizations.get(slug).map(|o| o.clone())
    }

    pub(super) fn organization_by_id(&self, id: Uuid) -> Option<Organization> {
        self.organizations
            .iter()
            .find(|o| o.id == id)
            .map(|o| o.clone())
    }

    pub(super) fn auth_provider_for(&self, organization_id: Uuid) -> Option<AuthProvider> {
        self.provider_lookups.fetch_add(1, Ordering::SeqCst);
        self.providers.get(&organization_id).map(|p| p.clone())
    }

    pub(super) async fn feature_enabled_any(
        &self,
        feature: &str,
        organization_ids: &[Uuid],
        actor: Uuid,
    ) -> Result<bool, StorageError> {
        self.features
            .has_any(feature, organization_ids, actor)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))
    }
}

impl std::fmt::Debug for MemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDirectory")
            .field("users", &self.users.len())
            .field("organizations", &self.organizations.len())
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::WEBAUTHN_LOGIN;

    #[test]
    fn test_email_lookup_is_case_insensitive() {
        let user = User::new("jane@example.com", None);
        let id = user.id;
        let dir = MemoryDirectory::new().with_user(user);

        assert_eq!(dir.find_user_by_email("JANE@example.com").map(|u| u.id), Some(id));
        assert!(dir.find_user_by_email("john@example.com").is_none());
    }

    #[test]
    fn test_provider_lookups_are_counted() {
        let org = Organization::new("acme", "Acme");
        let dir = MemoryDirectory::new().with_organization(org.clone());

        assert_eq!(dir.provider_lookups(), 0);
        assert!(dir.auth_provider_for(org.id).is_none());
        assert_eq!(dir.provider_lookups(), 1);
    }

    #[tokio::test]
    async fn test_features_follow_memberships() {
        let org = Organization::new("acme", "Acme");
        let actor = Uuid::new_v4();
        let dir = MemoryDirectory::new().with_organization_feature(WEBAUTHN_LOGIN, org.id);

        assert!(dir
            .feature_enabled_any(WEBAUTHN_LOGIN, &[org.id], actor)
            .await
            .unwrap());
        assert!(!dir
            .feature_enabled_any(WEBAUTHN_LOGIN, &[], actor)
            .await
            .unwrap());
    }
}
