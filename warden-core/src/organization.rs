//! Organizations and their auth provider binding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Organization lifecycle status, persisted as a small integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStatus {
    #[default]
    Visible = 0,
    PendingDeletion = 1,
    DeletionInProgress = 2,
}

impl OrganizationStatus {
    pub fn is_visible(&self) -> bool {
        matches!(self, Self::Visible)
    }
}

impl From<i16> for OrganizationStatus {
    fn from(value: i16) -> Self {
        match value {
            0 => Self::Visible,
            1 => Self::PendingDeletion,
            // Unknown statuses are never treated as visible
            _ => Self::DeletionInProgress,
        }
    }
}

impl From<OrganizationStatus> for i16 {
    fn from(status: OrganizationStatus) -> Self {
        status as i16
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    /// Unique, immutable identifier used in URLs
    pub slug: String,
    pub name: String,
    pub status: OrganizationStatus,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            name: name.into(),
            status: OrganizationStatus::Visible,
            created_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: OrganizationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn login_path(&self) -> String {
        format!("/auth/login/{}/", self.slug)
    }
}

/// Binds an organization to an external identity provider.
///
/// An organization has at most one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthProvider {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// Provider key, e.g. `dummy`, `google`
    pub provider: String,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuthProvider {
    pub fn new(organization_id: Uuid, provider: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            provider: provider.into(),
            config,
            created_at: Utc::now(),
        }
    }
}
