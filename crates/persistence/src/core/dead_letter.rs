//! Dead-letter storage trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::StorageResult;
use crate::types::{DlqEntry, DlqFilter, DlqStats, DlqStatus, NewDlqEntry, Page, PageRequest};

/// Persistence of a tenant's dead-letter queue.
///
/// Implementations enforce the entry state machine: only `PENDING` entries
/// may change status or have their retry count incremented.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Persists a new `PENDING` entry.
    async fn insert_entry(&self, entry: NewDlqEntry) -> StorageResult<DlqEntry>;

    /// Reads one entry.
    async fn get_entry(&self, id: &str) -> StorageResult<Option<DlqEntry>>;

    /// Lists entries, newest failure first.
    async fn list_entries(
        &self,
        filter: &DlqFilter,
        page: PageRequest,
    ) -> StorageResult<Page<DlqEntry>>;

    /// Moves an entry to a terminal status, merging `metadata` into the
    /// entry's metadata object.
    async fn transition_entry(
        &self,
        id: &str,
        to: DlqStatus,
        metadata: Option<Value>,
    ) -> StorageResult<DlqEntry>;

    /// Records a failed replay: increments the retry count and refreshes
    /// `last_attempt_at`, replacing the error message when one is given.
    async fn increment_entry_retry(
        &self,
        id: &str,
        error_message: Option<&str>,
    ) -> StorageResult<DlqEntry>;

    /// Removes `RESOLVED` entries last attempted before `cutoff`.
    async fn purge_resolved_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    /// Counts entries per status.
    async fn entry_stats(&self) -> StorageResult<DlqStats>;
}
