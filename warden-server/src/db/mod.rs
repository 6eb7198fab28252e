//! Directory module
//!
//! Users, authenticators, organizations, memberships, auth providers and
//! organization features. Backed by PostgreSQL when `DATABASE_URL` is set,
//! otherwise by an in-memory directory (development only, nothing survives a
//! restart).

mod memory;
mod models;
mod postgres;

pub use memory::MemoryDirectory;
pub use models::{hash_password, AuthenticatorRecord, User};
pub use postgres::PgDirectory;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;
use warden_core::{AuthProvider, AuthenticatorKind, FeatureFlags, Organization};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

/// Directory storage backend
pub enum Directory {
    /// PostgreSQL storage (production)
    Postgres(PgDirectory),
    /// In-memory storage (development fallback)
    Memory(Arc<MemoryDirectory>),
}

impl Directory {
    /// Connect to PostgreSQL and run migrations
    pub async fn with_postgres(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StorageError> {
        let pg = PgDirectory::connect(database_url, max_connections, min_connections).await?;
        pg.migrate().await?;
        Ok(Self::Postgres(pg))
    }

    /// Create directory with in-memory backend (development only)
    pub fn in_memory(directory: Arc<MemoryDirectory>) -> Self {
        tracing::warn!("Using in-memory directory - data will be lost on restart!");
        Self::Memory(directory)
    }

    /// Check if using persistent storage
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Postgres(_))
    }

    /// Check database health (always Ok for memory backend)
    pub async fn check_health(&self) -> Result<(), StorageError> {
        match self {
            Self::Postgres(pg) => pg.check_health().await,
            Self::Memory(_) => Ok(()),
        }
    }

    /// Open a transaction for one login request.
    pub async fn begin(&self) -> Result<DirectoryTx, StorageError> {
        match self {
            Self::Postgres(pg) => Ok(DirectoryTx::Postgres(pg.begin().await?)),
            Self::Memory(mem) => Ok(DirectoryTx::Memory(Arc::clone(mem))),
        }
    }

    pub async fn find_user(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        match self {
            Self::Postgres(pg) => postgres::find_user(&pg.pool, id).await,
            Self::Memory(mem) => Ok(mem.find_user(id)),
        }
    }

    pub async fn find_authenticator(
        &self,
        user_id: Uuid,
        kind: AuthenticatorKind,
    ) -> Result<Option<AuthenticatorRecord>, StorageError> {
        match self {
            Self::Postgres(pg) => postgres::find_authenticator(&pg.pool, user_id, kind).await,
            Self::Memory(mem) => Ok(mem.find_authenticator(user_id, kind)),
        }
    }

    pub async fn organization_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        match self {
            Self::Postgres(pg) => postgres::organization_ids_for_user(&pg.pool, user_id).await,
            Self::Memory(mem) => Ok(mem.organization_ids_for_user(user_id)),
        }
    }
}

#[async_trait]
impl FeatureFlags for Directory {
    async fn has_any(
        &self,
        feature: &str,
        organization_ids: &[Uuid],
        actor: Uuid,
    ) -> warden_core::Result<bool> {
        let result = match self {
            Self::Postgres(pg) => {
                postgres::feature_enabled_any(&pg.pool, feature, organization_ids, actor).await
            }
            Self::Memory(mem) => mem.feature_enabled_any(feature, organization_ids, actor).await,
        };
        result.map_err(|e| warden_core::AuthError::FeatureLookup(e.to_string()))
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self {
            Self::Postgres(_) => "PostgreSQL",
            Self::Memory(_) => "Memory",
        };
        f.debug_struct("Directory").field("backend", &backend).finish()
    }
}

/// Directory reads scoped to one request.
///
/// Dropping without [`DirectoryTx::commit`] rolls the PostgreSQL transaction
/// back.
pub enum DirectoryTx {
    Postgres(Transaction<'static, Postgres>),
    Memory(Arc<MemoryDirectory>),
}

impl DirectoryTx {
    pub async fn organization_by_slug(
        &mut self,
        slug: &str,
    ) -> Result<Option<Organization>, StorageError> {
        match self {
            Self::Postgres(tx) => postgres::organization_by_slug(&mut **tx, slug).await,
            Self::Memory(mem) => Ok(mem.organization_by_slug(slug)),
        }
    }

    pub async fn organization_by_id(
        &mut self,
        id: Uuid,
    ) -> Result<Option<Organization>, StorageError> {
        match self {
            Self::Postgres(tx) => postgres::organization_by_id(&mut **tx, id).await,
            Self::Memory(mem) => Ok(mem.organization_by_id(id)),
        }
    }

    pub async fn auth_provider_for(
        &mut self,
        organization_id: Uuid,
    ) -> Result<Option<AuthProvider>, StorageError> {
        match self {
            Self::Postgres(tx) => postgres::auth_provider_for(&mut **tx, organization_id).await,
            Self::Memory(mem) => Ok(mem.auth_provider_for(organization_id)),
        }
    }

    pub async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, StorageError> {
        match self {
            Self::Postgres(tx) => postgres::find_user_by_email(&mut **tx, email).await,
            Self::Memory(mem) => Ok(mem.find_user_by_email(email)),
        }
    }

    pub async fn commit(self) -> Result<(), StorageError> {
        match self {
            Self::Postgres(tx) => tx.commit().await.map_err(StorageError::from),
            Self::Memory(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_directory() {
        let directory = Directory::in_memory(Arc::new(MemoryDirectory::new()));
        assert!(!directory.is_persistent());
    }

    #[tokio::test]
    async fn test_memory_transaction_reads_directory() {
        let org = Organization::new("acme", "Acme");
        let directory = Directory::in_memory(Arc::new(
            MemoryDirectory::new().with_organization(org.clone()),
        ));

        let mut tx = directory.begin().await.unwrap();
        assert_eq!(tx.organization_by_slug("acme").await.unwrap(), Some(org.clone()));
        assert_eq!(tx.organization_by_id(org.id).await.unwrap(), Some(org));
        assert!(tx.organization_by_slug("globex").await.unwrap().is_none());
        tx.commit().await.unwrap();
    }
}
