//! Opens tenant databases as SQLite files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Backend, TenantStore};
use crate::error::StorageResult;
use crate::tenant::{TenantConnector, TenantId, TenantManagerConfig, TenantRecord};

use super::backend::{SqliteBackend, SqliteBackendConfig};

/// Opens one SQLite database per tenant.
///
/// A tenant's `database_identifier` names its file under `data_dir`. Without
/// a `data_dir` every tenant gets a private in-memory database, which is what
/// tests use. The connection secret is not needed for local files and is
/// ignored.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    data_dir: Option<PathBuf>,
    extension: String,
    config: SqliteBackendConfig,
}

impl SqliteConnector {
    /// Creates a connector writing files under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            extension: ".db".to_string(),
            config: SqliteBackendConfig::default(),
        }
    }

    /// Creates a connector that keeps every tenant in memory.
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            extension: ".db".to_string(),
            config: SqliteBackendConfig::default(),
        }
    }

    /// Creates a connector from the manager configuration.
    pub fn from_config(config: &TenantManagerConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            extension: config.database_extension.clone(),
            config: SqliteBackendConfig::default(),
        }
    }

    /// Sets the per-tenant pool configuration.
    pub fn with_backend_config(mut self, config: SqliteBackendConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the database path for a tenant, or `None` for in-memory.
    pub fn database_path(&self, record: &TenantRecord) -> Option<PathBuf> {
        // Reuse the tenant id sanitizer so identifiers cannot escape data_dir
        let file = TenantId::new(record.database_identifier.as_str()).sanitized();
        self.data_dir
            .as_deref()
            .map(|dir: &Path| dir.join(format!("{}{}", file, self.extension)))
    }
}

#[async_trait]
impl TenantConnector for SqliteConnector {
    async fn connect(&self, record: &TenantRecord) -> StorageResult<Arc<dyn TenantStore>> {
        let backend = match self.database_path(record) {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(crate::error::BackendError::from)?;
                }
                tracing::debug!(
                    tenant_id = %record.id,
                    path = %path.display(),
                    "opening tenant database"
                );
                SqliteBackend::with_config(&path, self.config.clone())?
            }
            None => SqliteBackend::with_config(":memory:", self.config.clone())?,
        };
        backend.initialize().await?;
        Ok(Arc::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RecordStore;
    use crate::types::RecordQuery;

    #[test]
    fn test_database_path_is_sanitized() {
        let connector = SqliteConnector::new("/data");
        let record = TenantRecord::new("grace", "Grace", "../grace db", "s");
        assert_eq!(
            connector.database_path(&record),
            Some(PathBuf::from("/data/___grace_db.db"))
        );
        assert_eq!(SqliteConnector::in_memory().database_path(&record), None);
    }

    #[tokio::test]
    async fn test_connect_creates_initialized_file() {
        let dir = tempfile::tempdir().unwrap();
        let connector = SqliteConnector::new(dir.path().join("tenants"));
        let record = TenantRecord::new("grace", "Grace", "grace_db", "s");

        let store = connector.connect(&record).await.unwrap();
        assert!(dir.path().join("tenants/grace_db.db").exists());
        assert_eq!(
            store.count(&RecordQuery::collection("contacts")).await.unwrap(),
            0
        );
    }
}
