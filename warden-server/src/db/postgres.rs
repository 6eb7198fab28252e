//! PostgreSQL directory backend
//!
//! Queries are written against `PgExecutor` so the same statement runs on the
//! pool or inside a login transaction.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;
use warden_core::{AuthProvider, AuthenticatorKind, Organization};

use super::models::{AuthProviderRow, AuthenticatorRecord, AuthenticatorRow, OrganizationRow, User};
use super::StorageError;

const USER_COLUMNS: &str = "id, email, name, password_hash, is_active, created_at";

/// PostgreSQL-backed directory
pub struct PgDirectory {
    pub(super) pool: PgPool,
}

impl PgDirectory {
    /// Connect with the configured pool bounds
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        tracing::info!("Connected to PostgreSQL database");
        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Check database connection health
    pub async fn check_health(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, StorageError> {
        self.pool.begin().await.map_err(StorageError::from)
    }
}

pub(super) async fn find_user<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<User>, StorageError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?)
}

pub(super) async fn find_user_by_email<'e>(
    exec: impl PgExecutor<'e>,
    email: &str,
) -> Result<Option<User>, StorageError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(exec)
        .await?)
}

pub(super) async fn find_authenticator<'e>(
    exec: impl PgExecutor<'e>,
    user_id: Uuid,
    kind: AuthenticatorKind,
) -> Result<Option<AuthenticatorRecord>, StorageError> {
    let row = sqlx::query_as::<_, AuthenticatorRow>(
        r#"
        SELECT id, user_id, kind, config, created_at, last_used_at
        FROM authenticators
        WHERE user_id = $1 AND kind = $2
        "#,
    )
    .bind(user_id)
    .bind(i16::from(kind))
    .fetch_optional(exec)
    .await?;

    row.map(AuthenticatorRecord::try_from).transpose()
}

pub(super) async fn organization_ids_for_user<'e>(
    exec: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Vec<Uuid>, StorageError> {
    Ok(sqlx::query_scalar::<_, Uuid>(
        "SELECT organization_id FROM organization_members WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_all(exec)
    .await?)
}

pub(super) async fn organization_by_slug<'e>(
    exec: impl PgExecutor<'e>,
    slug: &str,
) -> Result<Option<Organization>, StorageError> {
    let row = sqlx::query_as::<_, OrganizationRow>(
        "SELECT id, slug, name, status, created_at FROM organizations WHERE slug = $1",
    )
    .bind(slug)
    .fetch_optional(exec)
    .await?;
    Ok(row.map(Organization::from))
}

pub(super) async fn organization_by_id<'e>(
    exec: impl PgExecutor<'e>,
    id: Uuid,
) -> Result<Option<Organization>, StorageError> {
    let row = sqlx::query_as::<_, OrganizationRow>(
        "SELECT id, slug, name, status, created_at FROM organizations WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;
    Ok(row.map(Organization::from))
}

pub(super) async fn auth_provider_for<'e>(
    exec: impl PgExecutor<'e>,
    organization_id: Uuid,
) -> Result<Option<AuthProvider>, StorageError> {
    let row = sqlx::query_as::<_, AuthProviderRow>(
        r#"
        SELECT id, organization_id, provider, config, created_at
        FROM auth_providers
        WHERE organization_id = $1
        "#,
    )
    .bind(organization_id)
    .fetch_optional(exec)
    .await?;
    Ok(row.map(AuthProvider::from))
}

/// One round trip for the whole organization set.
pub(super) async fn feature_enabled_any<'e>(
    exec: impl PgExecutor<'e>,
    feature: &str,
    organization_ids: &[Uuid],
    actor: Uuid,
) -> Result<bool, StorageError> {
    Ok(sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM organization_features
            WHERE feature = $1 AND organization_id = ANY($2)
        ) OR EXISTS (
            SELECT 1 FROM user_features
            WHERE feature = $1 AND user_id = $3
        )
        "#,
    )
    .bind(feature)
    .bind(organization_ids)
    .bind(actor)
    .fetch_one(exec)
    .await?)
}
