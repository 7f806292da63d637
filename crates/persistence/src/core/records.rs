//! Record storage trait.
//!
//! Every bulk method applies its whole slice as one statement group inside a
//! single transaction: either all rows of the call are committed or none are.
//! Callers that need bounded transactions split their input first (see
//! [`BatchExecutor`](crate::batch::BatchExecutor)).

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::types::{Record, RecordKey, RecordQuery, RecordWrite};

use super::transaction::TransactionOptions;

/// CRUD over the generic `records` table of a tenant store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts all records. Fails if any key already exists.
    async fn create_many(
        &self,
        records: &[RecordWrite],
        options: &TransactionOptions,
    ) -> StorageResult<u64>;

    /// Replaces the body of existing records. Returns the number of rows matched.
    async fn update_many(
        &self,
        records: &[RecordWrite],
        options: &TransactionOptions,
    ) -> StorageResult<u64>;

    /// Inserts or replaces all records.
    async fn upsert_many(
        &self,
        records: &[RecordWrite],
        options: &TransactionOptions,
    ) -> StorageResult<u64>;

    /// Deletes the given keys. Returns the number of rows removed.
    async fn delete_many(
        &self,
        keys: &[RecordKey],
        options: &TransactionOptions,
    ) -> StorageResult<u64>;

    /// Reads one record.
    async fn find(&self, key: &RecordKey) -> StorageResult<Option<Record>>;

    /// Lists records of one collection.
    async fn find_many(&self, query: &RecordQuery) -> StorageResult<Vec<Record>>;

    /// Counts records matching the query (limit and offset are ignored).
    async fn count(&self, query: &RecordQuery) -> StorageResult<u64>;
}
