//! Primary/replica dispatch for tenant record operations.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{Backend, RecordStore, TenantStore, TransactionOptions};
use crate::error::StorageResult;
use crate::tenant::TenantHandle;
use crate::types::{Record, RecordKey, RecordQuery, RecordWrite};

use super::operation::{Operation, OperationKind};

/// How reads pick a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaSelection {
    /// Rotate through replicas.
    #[default]
    RoundRobin,
    /// Always use the first replica.
    First,
}

/// Where a routed operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The primary store.
    Primary,
    /// The replica at this index.
    Replica(usize),
}

struct Replica {
    store: Arc<dyn TenantStore>,
    failures: AtomicU64,
}

/// Sends writes to the primary and reads to a replica.
///
/// A failed replica read is logged and returned as-is. The router never
/// retries a read on the primary, so replica lag or outage is never hidden
/// behind a successful answer. Callers that need fresh data read through
/// [`primary`](Self::primary).
pub struct ReadWriteRouter {
    primary: Arc<dyn TenantStore>,
    replicas: Vec<Replica>,
    selection: ReplicaSelection,
    next: AtomicUsize,
}

impl std::fmt::Debug for ReadWriteRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadWriteRouter")
            .field("primary", &self.primary.name())
            .field("replicas", &self.replicas.len())
            .field("selection", &self.selection)
            .finish()
    }
}

impl ReadWriteRouter {
    /// Creates a router. With no replicas every operation uses the primary.
    pub fn new(primary: Arc<dyn TenantStore>, replicas: Vec<Arc<dyn TenantStore>>) -> Self {
        Self {
            primary,
            replicas: replicas
                .into_iter()
                .map(|store| Replica {
                    store,
                    failures: AtomicU64::new(0),
                })
                .collect(),
            selection: ReplicaSelection::default(),
            next: AtomicUsize::new(0),
        }
    }

    /// Creates a router whose primary is a resolved tenant's store.
    pub fn from_handle(handle: &TenantHandle, replicas: Vec<Arc<dyn TenantStore>>) -> Self {
        Self::new(Arc::clone(handle.store()), replicas)
    }

    /// Sets the replica selection strategy.
    pub fn with_selection(mut self, selection: ReplicaSelection) -> Self {
        self.selection = selection;
        self
    }

    /// The primary store, for reads that must not be stale.
    pub fn primary(&self) -> &Arc<dyn TenantStore> {
        &self.primary
    }

    /// Number of replicas.
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Failed reads observed on a replica.
    pub fn replica_failures(&self, index: usize) -> u64 {
        self.replicas
            .get(index)
            .map(|r| r.failures.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Picks the target for an operation.
    pub fn target(&self, operation: Operation) -> Target {
        match operation.kind() {
            OperationKind::Write => Target::Primary,
            OperationKind::Read if self.replicas.is_empty() => Target::Primary,
            OperationKind::Read => match self.selection {
                ReplicaSelection::First => Target::Replica(0),
                ReplicaSelection::RoundRobin => {
                    Target::Replica(self.next.fetch_add(1, Ordering::Relaxed) % self.replicas.len())
                }
            },
        }
    }

    /// Runs `f` against the store chosen for `operation`.
    pub async fn dispatch<T, F, Fut>(&self, operation: Operation, f: F) -> StorageResult<T>
    where
        F: FnOnce(Arc<dyn TenantStore>) -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        match self.target(operation) {
            Target::Primary => {
                debug!(operation = %operation, "Routing to primary");
                f(Arc::clone(&self.primary)).await
            }
            Target::Replica(index) => {
                let replica = &self.replicas[index];
                debug!(operation = %operation, replica = index, "Routing to replica");
                let result = f(Arc::clone(&replica.store)).await;
                if let Err(e) = &result {
                    let failures = replica.failures.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        operation = %operation,
                        replica = index,
                        failures,
                        error = %e,
                        "Replica read failed"
                    );
                }
                result
            }
        }
    }

    /// Fetches one record.
    pub async fn find(&self, key: &RecordKey) -> StorageResult<Option<Record>> {
        self.dispatch(Operation::FindUnique, |store| async move {
            store.find(key).await
        })
        .await
    }

    /// Fetches records matching a query.
    pub async fn find_many(&self, query: &RecordQuery) -> StorageResult<Vec<Record>> {
        self.dispatch(Operation::FindMany, |store| async move {
            store.find_many(query).await
        })
        .await
    }

    /// Counts records matching a query.
    pub async fn count(&self, query: &RecordQuery) -> StorageResult<u64> {
        self.dispatch(Operation::Count, |store| async move { store.count(query).await })
            .await
    }

    /// Inserts one record.
    pub async fn create(&self, item: &RecordWrite) -> StorageResult<u64> {
        self.create_many(std::slice::from_ref(item)).await
    }

    /// Inserts records.
    pub async fn create_many(&self, items: &[RecordWrite]) -> StorageResult<u64> {
        self.dispatch(Operation::CreateMany, |store| async move {
            store.create_many(items, &TransactionOptions::default()).await
        })
        .await
    }

    /// Replaces records.
    pub async fn update_many(&self, items: &[RecordWrite]) -> StorageResult<u64> {
        self.dispatch(Operation::UpdateMany, |store| async move {
            store.update_many(items, &TransactionOptions::default()).await
        })
        .await
    }

    /// Inserts or replaces records.
    pub async fn upsert_many(&self, items: &[RecordWrite]) -> StorageResult<u64> {
        self.dispatch(Operation::UpsertMany, |store| async move {
            store.upsert_many(items, &TransactionOptions::default()).await
        })
        .await
    }

    /// Deletes records.
    pub async fn delete_many(&self, keys: &[RecordKey]) -> StorageResult<u64> {
        self.dispatch(Operation::DeleteMany, |store| async move {
            store.delete_many(keys, &TransactionOptions::default()).await
        })
        .await
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::backends::sqlite::SqliteBackend;
    use crate::error::StorageError;
    use serde_json::json;

    fn store() -> Arc<dyn TenantStore> {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema().unwrap();
        Arc::new(backend)
    }

    fn broken_store() -> Arc<dyn TenantStore> {
        // No schema, so every query fails
        Arc::new(SqliteBackend::in_memory().unwrap())
    }

    fn hymn(id: &str) -> RecordWrite {
        RecordWrite::new("hymns", id, json!({"title": "Amazing Grace"}))
    }

    #[tokio::test]
    async fn test_writes_go_to_primary_reads_to_replica() {
        let primary = store();
        let replica = store();
        let router = ReadWriteRouter::new(primary.clone(), vec![replica.clone()]);

        router.create(&hymn("h1")).await.unwrap();

        // The replica has not caught up, and the router does not hide that
        assert!(router.find(&RecordKey::new("hymns", "h1")).await.unwrap().is_none());
        assert!(primary.find(&RecordKey::new("hymns", "h1")).await.unwrap().is_some());

        // The primary accessor gives a fresh read
        let fresh = router.primary().count(&RecordQuery::collection("hymns")).await.unwrap();
        assert_eq!(fresh, 1);
    }

    #[tokio::test]
    async fn test_no_replicas_reads_primary() {
        let router = ReadWriteRouter::new(store(), Vec::new());
        router.create(&hymn("h1")).await.unwrap();
        assert_eq!(router.target(Operation::FindMany), Target::Primary);
        assert_eq!(
            router.count(&RecordQuery::collection("hymns")).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_round_robin_and_first() {
        let router = ReadWriteRouter::new(store(), vec![store(), store(), store()]);
        let targets: Vec<_> = (0..4).map(|_| router.target(Operation::Count)).collect();
        assert_eq!(
            targets,
            vec![
                Target::Replica(0),
                Target::Replica(1),
                Target::Replica(2),
                Target::Replica(0)
            ]
        );
        assert_eq!(router.target(Operation::DeleteMany), Target::Primary);

        let router = router.with_selection(ReplicaSelection::First);
        assert_eq!(router.target(Operation::Count), Target::Replica(0));
        assert_eq!(router.target(Operation::Count), Target::Replica(0));
    }

    #[tokio::test]
    async fn test_replica_failure_propagates_without_fallback() {
        let primary = store();
        let router = ReadWriteRouter::new(primary.clone(), vec![broken_store()]);
        router.create(&hymn("h1")).await.unwrap();

        let err = router
            .find_many(&RecordQuery::collection("hymns"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
        assert_eq!(router.replica_failures(0), 1);
    }
}
