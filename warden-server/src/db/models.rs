//! Directory entities and their row mappings.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use warden_core::{AuthProvider, AuthenticatorKind, Organization, OrganizationStatus};

use super::StorageError;

/// User entity from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    /// Argon2 PHC string; `None` for SSO-only accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into().to_lowercase(),
            name,
            password_hash: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Set the login password, hashing it with argon2.
    pub fn with_password(mut self, password: &str) -> Result<Self, StorageError> {
        self.password_hash = Some(hash_password(password)?);
        Ok(self)
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Constant-time password check against the stored hash.
    pub fn check_password(&self, password: &str) -> bool {
        let Some(stored) = self.password_hash.as_deref() else {
            return false;
        };
        match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(user_id = %self.id, error = %e, "Stored password hash is malformed");
                false
            }
        }
    }
}

/// Hash a password using argon2.
pub fn hash_password(password: &str) -> Result<String, StorageError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| StorageError::Serialization(format!("password hash: {}", e)))
}

/// Stored second-factor authenticator.
#[derive(Debug, Clone)]
pub struct AuthenticatorRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: AuthenticatorKind,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl AuthenticatorRecord {
    pub fn new(user_id: Uuid, kind: AuthenticatorKind, config: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            config,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}

#[derive(Debug, FromRow)]
pub(super) struct AuthenticatorRow {
    id: Uuid,
    user_id: Uuid,
    kind: i16,
    config: serde_json::Value,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl TryFrom<AuthenticatorRow> for AuthenticatorRecord {
    type Error = StorageError;

    fn try_from(row: AuthenticatorRow) -> Result<Self, Self::Error> {
        let kind = AuthenticatorKind::from_id(row.kind).ok_or_else(|| {
            StorageError::Serialization(format!("unknown authenticator kind {}", row.kind))
        })?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            kind,
            config: row.config,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(super) struct OrganizationRow {
    id: Uuid,
    slug: String,
    name: String,
    status: i16,
    created_at: DateTime<Utc>,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            status: OrganizationStatus::from(row.status),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(super) struct AuthProviderRow {
    id: Uuid,
    organization_id: Uuid,
    provider: String,
    config: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<AuthProviderRow> for AuthProvider {
    fn from(row: AuthProviderRow) -> Self {
        Self {
            id: row.id,
            organization_id: row.organization_id,
            provider: row.provider,
            config: row.config,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let user = User::new("Jane@Example.com", None)
            .with_password("correct horse")
            .unwrap();
        assert_eq!(user.email, "jane@example.com");
        assert!(user.check_password("correct horse"));
        assert!(!user.check_password("Correct horse"));
    }

    #[test]
    fn test_user_without_password_never_matches() {
        let user = User::new("sso@example.com", None);
        assert!(!user.check_password(""));
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("a@example.com", None).with_password("pw").unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_unknown_authenticator_kind_rejected() {
        let row = AuthenticatorRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: 9,
            config: serde_json::json!({}),
            created_at: Utc::now(),
            last_used_at: None,
        };
        assert!(AuthenticatorRecord::try_from(row).is_err());
    }
}
