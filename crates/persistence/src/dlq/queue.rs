use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::core::DeadLetterStore;
use crate::error::{DlqError, StorageError, StorageResult};
use crate::tenant::{TenantConnectionManager, TenantId};
use crate::types::{DlqEntry, DlqFilter, DlqStats, DlqStatus, NewDlqEntry, Page, PageRequest};

/// What a replay did to the entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    /// The operation succeeded and the entry is now `RESOLVED`.
    Resolved(DlqEntry),
    /// The operation failed again; the entry stays `PENDING` with its retry
    /// count bumped.
    StillPending {
        /// The updated entry.
        entry: DlqEntry,
        /// Why the replay failed.
        error: String,
    },
}

impl ReplayOutcome {
    /// Returns the entry in its new state.
    pub fn entry(&self) -> &DlqEntry {
        match self {
            ReplayOutcome::Resolved(entry) | ReplayOutcome::StillPending { entry, .. } => entry,
        }
    }

    /// Returns `true` if the replay resolved the entry.
    pub fn is_resolved(&self) -> bool {
        matches!(self, ReplayOutcome::Resolved(_))
    }
}

/// Per-tenant dead-letter queue.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use chorus_persistence::dlq::DeadLetterQueue;
/// use chorus_persistence::tenant::{TenantConnectionManager, TenantId};
/// use chorus_persistence::types::{DlqCategory, NewDlqEntry};
/// use serde_json::json;
///
/// # async fn example(manager: Arc<TenantConnectionManager>) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = DeadLetterQueue::new(manager);
/// let tenant = TenantId::new("grace-chapel");
///
/// let id = dlq
///     .add(
///         &tenant,
///         NewDlqEntry::new(
///             DlqCategory::SmsSend,
///             json!({"to": "+15550100"}),
///             "provider returned 503 after 4 attempts",
///         ),
///     )
///     .await?;
///
/// dlq.mark_dead(&tenant, &id, "number disconnected").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeadLetterQueue {
    tenants: Arc<TenantConnectionManager>,
}

impl DeadLetterQueue {
    /// Creates a queue over the given tenant manager.
    pub fn new(tenants: Arc<TenantConnectionManager>) -> Self {
        Self { tenants }
    }

    /// Persists a failed operation and returns the new entry id.
    ///
    /// A failure here loses the record of last resort, so it is logged at
    /// error level before being returned.
    pub async fn add(&self, tenant_id: &TenantId, entry: NewDlqEntry) -> StorageResult<String> {
        let category = entry.category;
        let external_id = entry.external_id.clone();

        let result: StorageResult<DlqEntry> = async {
            let handle = self.tenants.resolve(tenant_id).await?;
            handle.insert_entry(entry).await
        }
        .await;

        match result {
            Ok(stored) => {
                info!(
                    tenant_id = %tenant_id,
                    entry_id = %stored.id,
                    category = %category,
                    "Dead-letter entry recorded"
                );
                Ok(stored.id)
            }
            Err(e) => {
                error!(
                    tenant_id = %tenant_id,
                    category = %category,
                    external_id = external_id.as_deref().unwrap_or(""),
                    error = %e,
                    "Failed to persist dead-letter entry"
                );
                Err(e)
            }
        }
    }

    /// Lists entries matching `filter`, newest attempt first.
    pub async fn list(
        &self,
        tenant_id: &TenantId,
        filter: &DlqFilter,
        page: PageRequest,
    ) -> StorageResult<Page<DlqEntry>> {
        let handle = self.tenants.resolve(tenant_id).await?;
        handle.list_entries(filter, page).await
    }

    /// Fetches one entry.
    pub async fn get(&self, tenant_id: &TenantId, id: &str) -> StorageResult<Option<DlqEntry>> {
        let handle = self.tenants.resolve(tenant_id).await?;
        handle.get_entry(id).await
    }

    /// Marks a pending entry resolved, merging `metadata` into its metadata.
    pub async fn resolve(
        &self,
        tenant_id: &TenantId,
        id: &str,
        metadata: Option<Value>,
    ) -> StorageResult<DlqEntry> {
        let handle = self.tenants.resolve(tenant_id).await?;
        let entry = handle
            .transition_entry(id, DlqStatus::Resolved, metadata)
            .await?;
        info!(tenant_id = %tenant_id, entry_id = %id, "Dead-letter entry resolved");
        Ok(entry)
    }

    /// Gives up on a pending entry. The reason is kept in its metadata.
    pub async fn mark_dead(
        &self,
        tenant_id: &TenantId,
        id: &str,
        reason: &str,
    ) -> StorageResult<DlqEntry> {
        let handle = self.tenants.resolve(tenant_id).await?;
        let entry = handle
            .transition_entry(
                id,
                DlqStatus::DeadLetter,
                Some(json!({
                    "dead_letter_reason": reason,
                    "dead_lettered_at": Utc::now().to_rfc3339(),
                })),
            )
            .await?;
        warn!(tenant_id = %tenant_id, entry_id = %id, reason, "Dead-letter entry marked dead");
        Ok(entry)
    }

    /// Records a failed replay attempt on a pending entry.
    pub async fn increment_retry(
        &self,
        tenant_id: &TenantId,
        id: &str,
        error_message: Option<&str>,
    ) -> StorageResult<DlqEntry> {
        let handle = self.tenants.resolve(tenant_id).await?;
        handle.increment_entry_retry(id, error_message).await
    }

    /// Deletes resolved entries whose last attempt is older than `days`.
    ///
    /// Returns the number of entries removed. A horizon reaching past the
    /// earliest representable timestamp matches nothing.
    pub async fn purge_resolved_older_than(
        &self,
        tenant_id: &TenantId,
        days: u32,
    ) -> StorageResult<u64> {
        let handle = self.tenants.resolve(tenant_id).await?;
        let Some(cutoff) = ChronoDuration::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            debug!(tenant_id = %tenant_id, days, "Purge horizon predates any entry");
            return Ok(0);
        };
        let purged = handle.purge_resolved_before(cutoff).await?;
        if purged > 0 {
            info!(tenant_id = %tenant_id, purged, days, "Purged resolved dead-letter entries");
        }
        Ok(purged)
    }

    /// Counts entries per status.
    pub async fn stats(&self, tenant_id: &TenantId) -> StorageResult<DlqStats> {
        let handle = self.tenants.resolve(tenant_id).await?;
        handle.entry_stats().await
    }

    /// Re-runs a pending entry through `operation`.
    ///
    /// On success the entry becomes `RESOLVED` and the returned value is stored
    /// under `replay_result` in its metadata. On failure the entry stays
    /// `PENDING` with its retry count incremented.
    ///
    /// # Errors
    ///
    /// [`DlqError::EntryNotFound`] for an unknown id and
    /// [`DlqError::InvalidTransition`] for an entry that is no longer pending.
    /// Failures of `operation` itself are reported through
    /// [`ReplayOutcome::StillPending`], not as errors.
    pub async fn replay<F, Fut, E>(
        &self,
        tenant_id: &TenantId,
        id: &str,
        operation: F,
    ) -> StorageResult<ReplayOutcome>
    where
        F: FnOnce(DlqEntry) -> Fut,
        Fut: Future<Output = Result<Value, E>>,
        E: fmt::Display,
    {
        let handle = self.tenants.resolve(tenant_id).await?;
        let entry = handle
            .get_entry(id)
            .await?
            .ok_or_else(|| StorageError::DeadLetter(DlqError::EntryNotFound { id: id.to_string() }))?;

        if entry.status != DlqStatus::Pending {
            return Err(DlqError::InvalidTransition {
                id: id.to_string(),
                from: entry.status.to_string(),
                to: DlqStatus::Resolved.to_string(),
            }
            .into());
        }

        // The handle is not held across the caller's operation
        drop(handle);

        match operation(entry).await {
            Ok(value) => {
                let resolved = self
                    .resolve(tenant_id, id, Some(json!({ "replay_result": value })))
                    .await?;
                Ok(ReplayOutcome::Resolved(resolved))
            }
            Err(e) => {
                let message = e.to_string();
                warn!(tenant_id = %tenant_id, entry_id = %id, error = %message, "Replay failed");
                let entry = self
                    .increment_retry(tenant_id, id, Some(&message))
                    .await?;
                Ok(ReplayOutcome::StillPending {
                    entry,
                    error: message,
                })
            }
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::backends::sqlite::{SqliteConnector, SqliteTenantRegistry};
    use crate::error::TenantError;
    use crate::tenant::{TenantManagerConfig, TenantRecord, TenantRegistry, TenantStatus};
    use crate::types::DlqCategory;

    async fn queue() -> (DeadLetterQueue, Arc<SqliteTenantRegistry>, TenantId) {
        let registry = Arc::new(SqliteTenantRegistry::in_memory().unwrap());
        registry
            .register(&TenantRecord::new(
                "grace-chapel",
                "Grace Chapel",
                "grace_chapel",
                "secret",
            ))
            .await
            .unwrap();
        let manager = TenantConnectionManager::new(
            TenantManagerConfig::default().with_registry_cache_ttl_secs(0),
            registry.clone(),
            Arc::new(SqliteConnector::in_memory()),
        )
        .unwrap();
        (
            DeadLetterQueue::new(Arc::new(manager)),
            registry,
            TenantId::new("grace-chapel"),
        )
    }

    fn sms(sid: &str) -> NewDlqEntry {
        NewDlqEntry::new(
            DlqCategory::SmsSend,
            json!({"to": "+15550100", "body": "Choir practice moved to 7pm"}),
            "provider returned 503",
        )
        .with_external_id(sid)
    }

    #[tokio::test]
    async fn test_add_get_and_stats() {
        let (dlq, _, tenant) = queue().await;
        let id = dlq.add(&tenant, sms("SM1")).await.unwrap();

        let entry = dlq.get(&tenant, &id).await.unwrap().unwrap();
        assert_eq!(entry.status, DlqStatus::Pending);
        assert_eq!(entry.external_id.as_deref(), Some("SM1"));

        let stats = dlq.stats(&tenant).await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total(), 1);
    }

    #[tokio::test]
    async fn test_add_for_suspended_tenant_fails() {
        let (dlq, registry, tenant) = queue().await;
        registry
            .set_status(&tenant, TenantStatus::Suspended)
            .await
            .unwrap();

        let err = dlq.add(&tenant, sms("SM1")).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Tenant(TenantError::Suspended { .. })
        ));
    }

    #[tokio::test]
    async fn test_mark_dead_records_reason() {
        let (dlq, _, tenant) = queue().await;
        let id = dlq.add(&tenant, sms("SM2")).await.unwrap();

        let queued_at = dlq.get(&tenant, &id).await.unwrap().unwrap().last_attempt_at;
        let entry = dlq.mark_dead(&tenant, &id, "landline").await.unwrap();
        assert_eq!(entry.status, DlqStatus::DeadLetter);
        assert!(entry.last_attempt_at >= queued_at);
        assert_eq!(entry.metadata["dead_letter_reason"], "landline");

        // Terminal states never move back
        let err = dlq.resolve(&tenant, &id, None).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::DeadLetter(DlqError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_replay_success_resolves() {
        let (dlq, _, tenant) = queue().await;
        let id = dlq.add(&tenant, sms("SM3")).await.unwrap();

        let outcome = dlq
            .replay(&tenant, &id, |entry| async move {
                assert_eq!(entry.original_payload["to"], "+15550100");
                Ok::<_, String>(json!({"sid": "SM3-retry"}))
            })
            .await
            .unwrap();

        assert!(outcome.is_resolved());
        assert_eq!(outcome.entry().status, DlqStatus::Resolved);
        assert_eq!(outcome.entry().metadata["replay_result"]["sid"], "SM3-retry");
    }

    #[tokio::test]
    async fn test_replay_failure_stays_pending() {
        let (dlq, _, tenant) = queue().await;
        let id = dlq.add(&tenant, sms("SM4")).await.unwrap();

        let outcome = dlq
            .replay(&tenant, &id, |_| async {
                Err::<Value, _>("still 503".to_string())
            })
            .await
            .unwrap();

        match outcome {
            ReplayOutcome::StillPending { entry, error } => {
                assert_eq!(entry.status, DlqStatus::Pending);
                assert_eq!(entry.retry_count, 1);
                assert_eq!(entry.error_message, "still 503");
                assert_eq!(error, "still 503");
            }
            other => panic!("expected StillPending, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_replay_rejects_terminal_and_unknown() {
        let (dlq, _, tenant) = queue().await;
        let id = dlq.add(&tenant, sms("SM5")).await.unwrap();
        dlq.resolve(&tenant, &id, None).await.unwrap();

        let err = dlq
            .replay(&tenant, &id, |_| async { Ok::<_, String>(Value::Null) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::DeadLetter(DlqError::InvalidTransition { .. })
        ));

        let err = dlq
            .replay(&tenant, "missing", |_| async { Ok::<_, String>(Value::Null) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::DeadLetter(DlqError::EntryNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_purge_keeps_recent_and_unresolved() {
        let (dlq, _, tenant) = queue().await;
        let pending = dlq.add(&tenant, sms("SM6")).await.unwrap();
        let resolved = dlq.add(&tenant, sms("SM7")).await.unwrap();
        dlq.resolve(&tenant, &resolved, None).await.unwrap();

        // Resolved just now, so a 30 day horizon keeps it
        assert_eq!(dlq.purge_resolved_older_than(&tenant, 30).await.unwrap(), 0);
        // A zero day horizon removes it but never the pending entry
        assert_eq!(dlq.purge_resolved_older_than(&tenant, 0).await.unwrap(), 1);
        assert!(dlq.get(&tenant, &pending).await.unwrap().is_some());
        assert!(dlq.get(&tenant, &resolved).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_with_huge_horizon_matches_nothing() {
        let (dlq, _, tenant) = queue().await;
        let resolved = dlq.add(&tenant, sms("SM8")).await.unwrap();
        dlq.resolve(&tenant, &resolved, None).await.unwrap();

        assert_eq!(dlq.purge_resolved_older_than(&tenant, u32::MAX).await.unwrap(), 0);
        assert_eq!(dlq.purge_resolved_older_than(&tenant, 1_000_000_000).await.unwrap(), 0);
        assert!(dlq.get(&tenant, &resolved).await.unwrap().is_some());
    }
}
