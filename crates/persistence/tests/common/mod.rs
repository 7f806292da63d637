//! Test infrastructure for the persistence layer.
//!
//! [`TestEnv`] wires a file-backed registry and per-tenant SQLite files under
//! a temporary directory, the same shape a deployment uses.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chorus_persistence::backends::sqlite::{SqliteConnector, SqliteTenantRegistry};
use chorus_persistence::tenant::{
    TenantConnectionManager, TenantId, TenantManagerConfig, TenantRecord, TenantRegistry,
    TenantStatus,
};
use tempfile::TempDir;

/// Hex-encoded 256-bit key used by crypto tests.
pub const TEST_KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// A registry and tenant data directory that live as long as the value.
pub struct TestEnv {
    dir: TempDir,
    /// The central registry.
    pub registry: Arc<SqliteTenantRegistry>,
    /// The manager resolving tenants against `registry`.
    pub manager: Arc<TenantConnectionManager>,
}

impl TestEnv {
    /// Creates an environment with registry caching disabled, so status
    /// changes are seen by the next resolve.
    pub fn new() -> Self {
        Self::with_config(TenantManagerConfig::default().with_registry_cache_ttl_secs(0))
    }

    /// Creates an environment with a custom manager configuration.
    ///
    /// `data_dir` is always pointed at the temporary directory.
    pub fn with_config(config: TenantManagerConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = config.with_data_dir(dir.path().join("tenants"));
        let registry = Arc::new(
            SqliteTenantRegistry::open(dir.path().join("registry.db"))
                .expect("Failed to open registry"),
        );
        let connector = Arc::new(SqliteConnector::from_config(&config));
        let manager = Arc::new(
            TenantConnectionManager::new(config, registry.clone(), connector)
                .expect("Invalid tenant pattern"),
        );
        Self {
            dir,
            registry,
            manager,
        }
    }

    /// Registers an active tenant whose database is named after its id.
    pub async fn add_tenant(&self, id: &str) -> TenantId {
        let record = TenantRecord::new(id, format!("{} church", id), id.replace('-', "_"), "secret");
        self.registry
            .register(&record)
            .await
            .expect("Failed to register tenant");
        TenantId::new(id)
    }

    /// Changes a tenant's status in the registry.
    pub async fn set_status(&self, tenant_id: &TenantId, status: TenantStatus) {
        let found = self
            .registry
            .set_status(tenant_id, status)
            .await
            .expect("Failed to set status");
        assert!(found, "tenant {} not registered", tenant_id);
    }

    /// The directory holding tenant database files.
    pub fn tenant_dir(&self) -> PathBuf {
        self.dir.path().join("tenants")
    }
}
