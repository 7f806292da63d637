//! Tenant registry backed by SQLite.

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use crate::core::{Backend, BackendKind};
use crate::error::{BackendError, StorageResult};
use crate::tenant::{TenantId, TenantRecord, TenantRegistry, TenantStatus};

use super::backend::{build_pool, SqliteBackendConfig};
use super::{format_timestamp, internal_error, schema, serialization_error};

/// The central registry database.
pub struct SqliteTenantRegistry {
    pool: Pool<SqliteConnectionManager>,
    is_memory: bool,
}

impl Debug for SqliteTenantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTenantRegistry")
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

impl SqliteTenantRegistry {
    /// Creates an in-memory registry with its schema.
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default())
    }

    /// Opens or creates a registry database file.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Opens a registry with custom pool configuration and initializes its schema.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
    ) -> StorageResult<Self> {
        let (pool, is_memory) = build_pool(path, &config)?;
        let registry = Self { pool, is_memory };
        {
            let conn = registry.pool.get()?;
            schema::initialize_registry_schema(&conn)?;
        }
        Ok(registry)
    }

    /// Lists every tenant, ordered by id.
    pub fn list(&self) -> StorageResult<Vec<TenantRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, display_name, database_identifier, connection_secret, status
                 FROM tenants ORDER BY id",
            )
            .map_err(|e| internal_error(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], read_row)
            .map_err(|e| internal_error(format!("Failed to list tenants: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| internal_error(format!("Failed to read row: {}", e)))?;
            records.push(into_record(raw)?);
        }
        Ok(records)
    }
}

type RawTenant = (String, String, String, String, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTenant> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn into_record(raw: RawTenant) -> StorageResult<TenantRecord> {
    let (id, display_name, database_identifier, connection_secret, status) = raw;
    let status: TenantStatus = status.parse().map_err(serialization_error)?;
    Ok(TenantRecord::new(id, display_name, database_identifier, connection_secret).with_status(status))
}

#[async_trait]
impl TenantRegistry for SqliteTenantRegistry {
    async fn fetch(&self, tenant_id: &TenantId) -> StorageResult<Option<TenantRecord>> {
        let conn = self.pool.get()?;
        let raw = conn
            .query_row(
                "SELECT id, display_name, database_identifier, connection_secret, status
                 FROM tenants WHERE id = ?1",
                [tenant_id.as_str()],
                read_row,
            )
            .optional()
            .map_err(|e| internal_error(format!("Failed to read tenant: {}", e)))?;
        raw.map(into_record).transpose()
    }

    async fn register(&self, record: &TenantRecord) -> StorageResult<()> {
        let conn = self.pool.get()?;
        let now = format_timestamp(&Utc::now());
        conn.execute(
            "INSERT INTO tenants (id, display_name, database_identifier, connection_secret,
                 status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 database_identifier = excluded.database_identifier,
                 connection_secret = excluded.connection_secret,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
            params![
                record.id.as_str(),
                record.display_name,
                record.database_identifier,
                record.connection_secret,
                record.status.as_str(),
                now,
            ],
        )
        .map_err(|e| internal_error(format!("Failed to register tenant: {}", e)))?;

        tracing::info!(tenant_id = %record.id, status = %record.status, "registered tenant");
        Ok(())
    }

    async fn set_status(&self, tenant_id: &TenantId, status: TenantStatus) -> StorageResult<bool> {
        let conn = self.pool.get()?;
        let changed = conn
            .execute(
                "UPDATE tenants SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![tenant_id.as_str(), status.as_str(), format_timestamp(&Utc::now())],
            )
            .map_err(|e| internal_error(format!("Failed to update tenant status: {}", e)))?;

        if changed > 0 {
            tracing::info!(tenant_id = %tenant_id, status = %status, "tenant status changed");
        }
        Ok(changed > 0)
    }
}

#[async_trait]
impl Backend for SqliteTenantRegistry {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn name(&self) -> &'static str {
        "sqlite-registry"
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let conn = self.pool.get().map_err(|_| BackendError::Unavailable {
            backend_name: "sqlite-registry".to_string(),
            message: "Failed to get connection".to_string(),
        })?;
        conn.query_row("SELECT COUNT(*) FROM tenants", [], |_| Ok(()))
            .map_err(|e| BackendError::Internal {
                backend_name: "sqlite-registry".to_string(),
                message: format!("Health check failed: {}", e),
                source: None,
            })
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        let conn = self.pool.get().map_err(|e| BackendError::ConnectionFailed {
            backend_name: "sqlite-registry".to_string(),
            message: e.to_string(),
        })?;
        schema::initialize_registry_schema(&conn).map_err(|e| BackendError::MigrationError {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_fetch_and_status() {
        let registry = SqliteTenantRegistry::in_memory().unwrap();
        let id = TenantId::new("grace");

        assert!(registry.fetch(&id).await.unwrap().is_none());

        registry
            .register(&TenantRecord::new("grace", "Grace Chapel", "grace_db", "s3cret"))
            .await
            .unwrap();
        let record = registry.fetch(&id).await.unwrap().unwrap();
        assert_eq!(record.display_name, "Grace Chapel");
        assert_eq!(record.status, TenantStatus::Active);

        assert!(registry.set_status(&id, TenantStatus::Suspended).await.unwrap());
        let record = registry.fetch(&id).await.unwrap().unwrap();
        assert_eq!(record.status, TenantStatus::Suspended);

        assert!(!registry
            .set_status(&TenantId::new("nobody"), TenantStatus::Deleted)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_list_and_health() {
        let registry = SqliteTenantRegistry::in_memory().unwrap();
        for id in ["b", "a"] {
            registry
                .register(&TenantRecord::new(id, id, format!("{}_db", id), "s"))
                .await
                .unwrap();
        }
        let ids: Vec<_> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(registry.health_check().await.is_ok());
    }
}
