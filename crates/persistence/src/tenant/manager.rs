//! Tenant resolution.
//!
//! [`TenantConnectionManager`] turns a [`TenantId`] into a [`TenantHandle`]:
//!
//! 1. the identifier is checked against the configured naming pattern,
//! 2. the registry record is read, or taken from a short-lived local cache,
//! 3. non-active tenants are rejected,
//! 4. the tenant's pooled store is returned, opening it on first use.
//!
//! Status changes in the registry become visible after at most
//! `registry_cache_ttl_secs`, or immediately after [`invalidate`].
//!
//! [`invalidate`]: TenantConnectionManager::invalidate

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::TenantStore;
use crate::error::{StorageResult, TenantError};

use super::handle::TenantHandle;
use super::id::TenantId;
use super::record::{TenantRecord, TenantStatus};
use super::registry::{TenantConnector, TenantRegistry};

/// Configuration for the tenant connection manager.
///
/// # Example
///
/// ```
/// use chorus_persistence::tenant::TenantManagerConfig;
///
/// let config = TenantManagerConfig::default()
///     .with_max_pools(20)
///     .with_data_dir("/var/lib/chorus/tenants");
/// assert_eq!(config.registry_cache_ttl_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantManagerConfig {
    /// How long a registry record is reused before it is read again.
    ///
    /// Zero disables the cache.
    #[serde(default = "default_registry_cache_ttl")]
    pub registry_cache_ttl_secs: u64,

    /// Maximum number of tenant pools kept open.
    ///
    /// If exceeded, least recently used pools are closed.
    #[serde(default = "default_max_pools")]
    pub max_pools: usize,

    /// Pools unused for longer than this are closed by `evict_idle`.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Directory holding tenant database files. `None` keeps them in memory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// File extension appended to a tenant's database identifier.
    #[serde(default = "default_database_extension")]
    pub database_extension: String,

    /// Allowed tenant identifiers (regex pattern).
    #[serde(default = "default_tenant_id_pattern")]
    pub tenant_id_pattern: String,
}

fn default_registry_cache_ttl() -> u64 {
    30
}

fn default_max_pools() -> usize {
    100
}

fn default_idle_timeout() -> u64 {
    300 // 5 minutes
}

fn default_database_extension() -> String {
    ".db".to_string()
}

fn default_tenant_id_pattern() -> String {
    r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$".to_string()
}

impl Default for TenantManagerConfig {
    fn default() -> Self {
        Self {
            registry_cache_ttl_secs: default_registry_cache_ttl(),
            max_pools: default_max_pools(),
            idle_timeout_secs: default_idle_timeout(),
            data_dir: None,
            database_extension: default_database_extension(),
            tenant_id_pattern: default_tenant_id_pattern(),
        }
    }
}

impl TenantManagerConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the registry cache TTL.
    pub fn with_registry_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.registry_cache_ttl_secs = secs;
        self
    }

    /// Sets the maximum number of pools.
    pub fn with_max_pools(mut self, max: usize) -> Self {
        self.max_pools = max;
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// Sets the tenant database directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Sets the tenant id pattern.
    pub fn with_tenant_id_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.tenant_id_pattern = pattern.into();
        self
    }

    /// Returns the registry cache TTL as a duration.
    pub fn registry_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_cache_ttl_secs)
    }
}

#[derive(Debug, Clone)]
struct CachedRecord {
    record: TenantRecord,
    fetched_at: Instant,
}

/// Resolves tenants to handles over pooled per-tenant stores.
///
/// One manager is created per process and shared (behind an `Arc`) by every
/// component that needs tenant storage.
pub struct TenantConnectionManager {
    config: TenantManagerConfig,
    tenant_pattern: Regex,
    registry: Arc<dyn TenantRegistry>,
    connector: Arc<dyn TenantConnector>,
    records: RwLock<HashMap<TenantId, CachedRecord>>,
    pools: RwLock<HashMap<TenantId, Arc<dyn TenantStore>>>,
    /// Tracks last access times for LRU eviction.
    pool_access_times: RwLock<HashMap<TenantId, Instant>>,
    /// Serializes pool creation so a tenant is never opened twice.
    connect_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for TenantConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConnectionManager")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("pools", &self.pools.read().len())
            .finish_non_exhaustive()
    }
}

impl TenantConnectionManager {
    /// Creates a manager.
    ///
    /// Fails if `tenant_id_pattern` is not a valid regex.
    pub fn new(
        config: TenantManagerConfig,
        registry: Arc<dyn TenantRegistry>,
        connector: Arc<dyn TenantConnector>,
    ) -> Result<Self, regex::Error> {
        let tenant_pattern = Regex::new(&config.tenant_id_pattern)?;
        Ok(Self {
            config,
            tenant_pattern,
            registry,
            connector,
            records: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
            pool_access_times: RwLock::new(HashMap::new()),
            connect_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TenantManagerConfig {
        &self.config
    }

    /// Returns the registry this manager reads from.
    pub fn registry(&self) -> &Arc<dyn TenantRegistry> {
        &self.registry
    }

    /// Resolves a tenant to a handle.
    ///
    /// # Errors
    ///
    /// - [`TenantError::InvalidTenant`] if the identifier is blank or does not
    ///   match the configured pattern
    /// - [`TenantError::NotFound`] if no record exists or the tenant was deleted
    /// - [`TenantError::Suspended`] if the tenant is suspended
    /// - any registry or connector error, unchanged
    pub async fn resolve(&self, tenant_id: &TenantId) -> StorageResult<TenantHandle> {
        self.validate(tenant_id)?;
        let record = self.lookup(tenant_id).await?;

        match record.status {
            TenantStatus::Active => {}
            TenantStatus::Suspended => {
                self.close(tenant_id);
                return Err(TenantError::Suspended {
                    tenant_id: tenant_id.clone(),
                }
                .into());
            }
            TenantStatus::Deleted => {
                self.close(tenant_id);
                return Err(TenantError::NotFound {
                    tenant_id: tenant_id.clone(),
                }
                .into());
            }
        }

        let store = self.store_for(&record).await?;
        Ok(TenantHandle::new(record.id, record.display_name, store))
    }

    /// Drops the cached registry record for a tenant.
    ///
    /// The next `resolve` reads the registry again.
    pub fn invalidate(&self, tenant_id: &TenantId) {
        if self.records.write().remove(tenant_id).is_some() {
            debug!(tenant_id = %tenant_id, "invalidated cached tenant record");
        }
    }

    /// Closes a tenant's pool. Handles already resolved keep working.
    pub fn close(&self, tenant_id: &TenantId) -> bool {
        self.pool_access_times.write().remove(tenant_id);
        let removed = self.pools.write().remove(tenant_id).is_some();
        if removed {
            info!(tenant_id = %tenant_id, "closed tenant pool");
        }
        removed
    }

    /// Closes every pool unused for longer than `idle_timeout_secs`.
    ///
    /// Returns the tenants whose pools were closed.
    pub fn evict_idle(&self) -> Vec<TenantId> {
        let idle = self.idle_tenants();
        for tenant_id in &idle {
            self.close(tenant_id);
        }
        idle
    }

    /// Returns the number of open tenant pools.
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    /// Returns `true` if the tenant currently has an open pool.
    pub fn is_pooled(&self, tenant_id: &TenantId) -> bool {
        self.pools.read().contains_key(tenant_id)
    }

    fn validate(&self, tenant_id: &TenantId) -> StorageResult<()> {
        if tenant_id.is_blank() {
            return Err(TenantError::InvalidTenant {
                tenant_id: tenant_id.clone(),
                reason: "tenant id is empty".to_string(),
            }
            .into());
        }
        if !self.tenant_pattern.is_match(tenant_id.as_str()) {
            return Err(TenantError::InvalidTenant {
                tenant_id: tenant_id.clone(),
                reason: format!("does not match pattern {}", self.config.tenant_id_pattern),
            }
            .into());
        }
        Ok(())
    }

    async fn lookup(&self, tenant_id: &TenantId) -> StorageResult<TenantRecord> {
        let ttl = self.config.registry_cache_ttl();

        if !ttl.is_zero() {
            let cached = self.records.read().get(tenant_id).cloned();
            if let Some(cached) = cached {
                if cached.fetched_at.elapsed() < ttl {
                    debug!(tenant_id = %tenant_id, "registry cache hit");
                    return Ok(cached.record);
                }
            }
        }

        debug!(tenant_id = %tenant_id, "registry cache miss");
        match self.registry.fetch(tenant_id).await? {
            Some(record) => {
                if !ttl.is_zero() {
                    self.records.write().insert(
                        tenant_id.clone(),
                        CachedRecord {
                            record: record.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                }
                Ok(record)
            }
            None => {
                self.records.write().remove(tenant_id);
                Err(TenantError::NotFound {
                    tenant_id: tenant_id.clone(),
                }
                .into())
            }
        }
    }

    async fn store_for(&self, record: &TenantRecord) -> StorageResult<Arc<dyn TenantStore>> {
        if let Some(store) = self.pooled(&record.id) {
            return Ok(store);
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(store) = self.pooled(&record.id) {
            return Ok(store);
        }

        let store = self.connector.connect(record).await?;
        info!(
            tenant_id = %record.id,
            backend = store.name(),
            "opened tenant pool"
        );
        self.pools
            .write()
            .insert(record.id.clone(), Arc::clone(&store));
        self.touch(&record.id);

        for tenant_id in self.tenants_to_evict() {
            warn!(tenant_id = %tenant_id, max_pools = self.config.max_pools, "evicting least recently used tenant pool");
            self.close(&tenant_id);
        }

        Ok(store)
    }

    fn pooled(&self, tenant_id: &TenantId) -> Option<Arc<dyn TenantStore>> {
        let store = self.pools.read().get(tenant_id).cloned();
        if store.is_some() {
            self.touch(tenant_id);
        }
        store
    }

    /// Records access to a tenant's pool (for LRU tracking).
    fn touch(&self, tenant_id: &TenantId) {
        self.pool_access_times
            .write()
            .insert(tenant_id.clone(), Instant::now());
    }

    /// Returns tenants that should be evicted based on LRU.
    fn tenants_to_evict(&self) -> Vec<TenantId> {
        let times = self.pool_access_times.read();
        let max_pools = self.config.max_pools.max(1);

        if times.len() <= max_pools {
            return Vec::new();
        }

        let mut entries: Vec<_> = times.iter().collect();
        entries.sort_by_key(|(_, time)| **time);

        let to_evict = times.len() - max_pools;
        entries
            .into_iter()
            .take(to_evict)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Returns tenants with pools that have exceeded the idle timeout.
    fn idle_tenants(&self) -> Vec<TenantId> {
        let times = self.pool_access_times.read();
        let timeout = Duration::from_secs(self.config.idle_timeout_secs);
        let now = Instant::now();

        times
            .iter()
            .filter(|(_, last_access)| now.duration_since(**last_access) > timeout)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::backends::sqlite::SqliteBackend;
    use crate::error::StorageError;

    #[derive(Debug, Default)]
    struct MemoryRegistry {
        records: Mutex<HashMap<TenantId, TenantRecord>>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl TenantRegistry for MemoryRegistry {
        async fn fetch(&self, tenant_id: &TenantId) -> StorageResult<Option<TenantRecord>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.lock().get(tenant_id).cloned())
        }

        async fn register(&self, record: &TenantRecord) -> StorageResult<()> {
            self.records.lock().insert(record.id.clone(), record.clone());
            Ok(())
        }

        async fn set_status(
            &self,
            tenant_id: &TenantId,
            status: TenantStatus,
        ) -> StorageResult<bool> {
            Ok(match self.records.lock().get_mut(tenant_id) {
                Some(record) => {
                    record.status = status;
                    true
                }
                None => false,
            })
        }
    }

    #[derive(Debug, Default)]
    struct MemoryConnector {
        opened: AtomicUsize,
    }

    #[async_trait]
    impl TenantConnector for MemoryConnector {
        async fn connect(&self, _record: &TenantRecord) -> StorageResult<Arc<dyn TenantStore>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let backend = SqliteBackend::in_memory()?;
            backend.init_schema()?;
            Ok(Arc::new(backend))
        }
    }

    fn record(id: &str, status: TenantStatus) -> TenantRecord {
        TenantRecord::new(TenantId::new(id), id, format!("{}_db", id), "secret").with_status(status)
    }

    async fn setup(
        config: TenantManagerConfig,
        records: Vec<TenantRecord>,
    ) -> (
        TenantConnectionManager,
        Arc<MemoryRegistry>,
        Arc<MemoryConnector>,
    ) {
        let registry = Arc::new(MemoryRegistry::default());
        for r in &records {
            registry.register(r).await.unwrap();
        }
        let connector = Arc::new(MemoryConnector::default());
        let manager =
            TenantConnectionManager::new(config, registry.clone(), connector.clone()).unwrap();
        (manager, registry, connector)
    }

    #[tokio::test]
    async fn test_resolve_active_tenant_reuses_pool() {
        let (manager, _, connector) = setup(
            TenantManagerConfig::default(),
            vec![record("grace", TenantStatus::Active)],
        )
        .await;

        let id = TenantId::new("grace");
        let first = manager.resolve(&id).await.unwrap();
        let second = manager.resolve(&id).await.unwrap();

        assert_eq!(first.tenant_id(), &id);
        assert_eq!(second.display_name(), "grace");
        assert!(Arc::ptr_eq(first.store(), second.store()));
        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);
        assert!(manager.is_pooled(&id));
    }

    #[tokio::test]
    async fn test_resolve_unknown_tenant() {
        let (manager, _, _) = setup(TenantManagerConfig::default(), vec![]).await;

        let err = manager.resolve(&TenantId::new("nobody")).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Tenant(TenantError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_rejects_inactive_tenants() {
        let (manager, _, connector) = setup(
            TenantManagerConfig::default(),
            vec![
                record("paused", TenantStatus::Suspended),
                record("gone", TenantStatus::Deleted),
            ],
        )
        .await;

        let err = manager.resolve(&TenantId::new("paused")).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Tenant(TenantError::Suspended { .. })
        ));

        let err = manager.resolve(&TenantId::new("gone")).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Tenant(TenantError::NotFound { .. })
        ));

        assert_eq!(connector.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resolve_validates_tenant_id() {
        let (manager, registry, _) = setup(TenantManagerConfig::default(), vec![]).await;

        for bad in ["", "   ", "has space", "../etc", "-leading-dash"] {
            let err = manager.resolve(&TenantId::new(bad)).await.unwrap_err();
            assert!(
                matches!(err, StorageError::Tenant(TenantError::InvalidTenant { .. })),
                "expected invalid tenant for {:?}",
                bad
            );
        }
        assert_eq!(registry.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_rejected() {
        let registry = Arc::new(MemoryRegistry::default());
        let connector = Arc::new(MemoryConnector::default());
        let config = TenantManagerConfig::default().with_tenant_id_pattern("([a-z");
        assert!(TenantConnectionManager::new(config, registry, connector).is_err());
    }

    #[tokio::test]
    async fn test_registry_cache_and_invalidate() {
        let (manager, registry, _) = setup(
            TenantManagerConfig::default(),
            vec![record("grace", TenantStatus::Active)],
        )
        .await;
        let id = TenantId::new("grace");

        manager.resolve(&id).await.unwrap();
        manager.resolve(&id).await.unwrap();
        assert_eq!(registry.fetches.load(Ordering::SeqCst), 1);

        registry
            .set_status(&id, TenantStatus::Suspended)
            .await
            .unwrap();

        // Stale within the TTL
        assert!(manager.resolve(&id).await.is_ok());

        manager.invalidate(&id);
        let err = manager.resolve(&id).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Tenant(TenantError::Suspended { .. })
        ));
        assert!(!manager.is_pooled(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_cache_expires() {
        let (manager, registry, _) = setup(
            TenantManagerConfig::default().with_registry_cache_ttl_secs(30),
            vec![record("grace", TenantStatus::Active)],
        )
        .await;
        let id = TenantId::new("grace");

        manager.resolve(&id).await.unwrap();
        registry
            .set_status(&id, TenantStatus::Suspended)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;

        assert!(manager.resolve(&id).await.is_err());
        assert_eq!(registry.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let (manager, registry, _) = setup(
            TenantManagerConfig::default().with_registry_cache_ttl_secs(0),
            vec![record("grace", TenantStatus::Active)],
        )
        .await;
        let id = TenantId::new("grace");

        manager.resolve(&id).await.unwrap();
        manager.resolve(&id).await.unwrap();
        assert_eq!(registry.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction() {
        let (manager, _, _) = setup(
            TenantManagerConfig::default().with_max_pools(2),
            vec![
                record("a", TenantStatus::Active),
                record("b", TenantStatus::Active),
                record("c", TenantStatus::Active),
            ],
        )
        .await;

        manager.resolve(&TenantId::new("a")).await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        manager.resolve(&TenantId::new("b")).await.unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        manager.resolve(&TenantId::new("c")).await.unwrap();

        assert_eq!(manager.pool_count(), 2);
        assert!(!manager.is_pooled(&TenantId::new("a")));
        assert!(manager.is_pooled(&TenantId::new("c")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle() {
        let (manager, _, _) = setup(
            TenantManagerConfig::default().with_idle_timeout_secs(60),
            vec![
                record("a", TenantStatus::Active),
                record("b", TenantStatus::Active),
            ],
        )
        .await;

        manager.resolve(&TenantId::new("a")).await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        manager.resolve(&TenantId::new("b")).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        let evicted = manager.evict_idle();
        assert_eq!(evicted, vec![TenantId::new("a")]);
        assert_eq!(manager.pool_count(), 1);
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: TenantManagerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.registry_cache_ttl_secs, 30);
        assert_eq!(config.max_pools, 100);
        assert_eq!(config.idle_timeout_secs, 300);
        assert_eq!(config.database_extension, ".db");
        assert!(config.data_dir.is_none());
    }
}
