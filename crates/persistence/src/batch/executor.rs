//! Chunked bulk mutations against a tenant's record store.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::core::{RecordStore, TenantStore, TransactionOptions};
use crate::error::{BatchError, StorageResult};
use crate::tenant::{TenantConnectionManager, TenantId};
use crate::types::{RecordKey, RecordWrite};

use super::config::BatchConfig;
use super::result::{BatchOperationResult, ChunkFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchKind {
    Create,
    Update,
    Upsert,
    Delete,
}

impl BatchKind {
    fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Create => "create",
            BatchKind::Update => "update",
            BatchKind::Upsert => "upsert",
            BatchKind::Delete => "delete",
        }
    }
}

enum Chunk<'a> {
    Writes(&'a [RecordWrite]),
    Keys(&'a [RecordKey]),
}

impl Chunk<'_> {
    fn len(&self) -> usize {
        match self {
            Chunk::Writes(items) => items.len(),
            Chunk::Keys(keys) => keys.len(),
        }
    }
}

async fn apply(
    store: &dyn TenantStore,
    kind: BatchKind,
    chunk: Chunk<'_>,
    options: &TransactionOptions,
) -> StorageResult<u64> {
    match (kind, chunk) {
        (BatchKind::Create, Chunk::Writes(items)) => store.create_many(items, options).await,
        (BatchKind::Update, Chunk::Writes(items)) => store.update_many(items, options).await,
        (BatchKind::Upsert, Chunk::Writes(items)) => store.upsert_many(items, options).await,
        (BatchKind::Delete, Chunk::Keys(keys)) => store.delete_many(keys, options).await,
        (kind, _) => Err(BatchError::InvalidConfig {
            message: format!("mismatched input for batch {}", kind.as_str()),
        }
        .into()),
    }
}

/// Applies large mutations in fixed-size chunks.
///
/// Chunks run in input order, each in its own transaction. There is no
/// transaction across chunks: when chunk `n` fails, chunks `0..n` stay
/// committed. Delivery is therefore at-least-once per chunk, not
/// all-or-nothing.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    tenants: Arc<TenantConnectionManager>,
}

impl BatchExecutor {
    /// Creates an executor over the given tenant manager.
    pub fn new(tenants: Arc<TenantConnectionManager>) -> Self {
        Self { tenants }
    }

    /// Inserts new records.
    pub async fn batch_create(
        &self,
        tenant_id: &TenantId,
        items: &[RecordWrite],
        config: &BatchConfig,
    ) -> StorageResult<BatchOperationResult> {
        self.run(tenant_id, BatchKind::Create, items, config, Chunk::Writes)
            .await
    }

    /// Replaces the data of existing records.
    pub async fn batch_update(
        &self,
        tenant_id: &TenantId,
        items: &[RecordWrite],
        config: &BatchConfig,
    ) -> StorageResult<BatchOperationResult> {
        self.run(tenant_id, BatchKind::Update, items, config, Chunk::Writes)
            .await
    }

    /// Inserts or replaces records.
    pub async fn batch_upsert(
        &self,
        tenant_id: &TenantId,
        items: &[RecordWrite],
        config: &BatchConfig,
    ) -> StorageResult<BatchOperationResult> {
        self.run(tenant_id, BatchKind::Upsert, items, config, Chunk::Writes)
            .await
    }

    /// Deletes records by key.
    pub async fn batch_delete(
        &self,
        tenant_id: &TenantId,
        keys: &[RecordKey],
        config: &BatchConfig,
    ) -> StorageResult<BatchOperationResult> {
        self.run(tenant_id, BatchKind::Delete, keys, config, Chunk::Keys)
            .await
    }

    async fn run<'a, T>(
        &self,
        tenant_id: &TenantId,
        kind: BatchKind,
        items: &'a [T],
        config: &BatchConfig,
        wrap: fn(&'a [T]) -> Chunk<'a>,
    ) -> StorageResult<BatchOperationResult> {
        config.validate()?;

        let started = Instant::now();
        let mut result = BatchOperationResult::new(items.len());
        if items.is_empty() {
            return Ok(result);
        }

        let handle = self.tenants.resolve(tenant_id).await?;
        let options = config.transaction_options();
        let mut chunks = 0;

        for (chunk_index, slice) in items.chunks(config.chunk_size).enumerate() {
            chunks += 1;
            let chunk = wrap(slice);
            let size = chunk.len();
            let chunk_started = Instant::now();

            match apply(handle.store().as_ref(), kind, chunk, &options).await {
                Ok(affected) => {
                    result.successful += size;
                    result.affected += affected;
                    debug!(
                        tenant_id = %tenant_id,
                        operation = kind.as_str(),
                        chunk_index,
                        size,
                        affected,
                        elapsed_ms = chunk_started.elapsed().as_millis() as u64,
                        "Batch chunk committed"
                    );
                }
                Err(e) => {
                    warn!(
                        tenant_id = %tenant_id,
                        operation = kind.as_str(),
                        chunk_index,
                        size,
                        error = %e,
                        "Batch chunk failed"
                    );
                    if !config.ignore_errors {
                        return Err(BatchError::Chunk {
                            chunk_index,
                            message: e.to_string(),
                        }
                        .into());
                    }
                    result.failed += size;
                    result.errors.push(ChunkFailure {
                        chunk_index,
                        error: e.to_string(),
                    });
                }
            }
        }

        result.finish(started.elapsed(), chunks);
        debug!(
            tenant_id = %tenant_id,
            operation = kind.as_str(),
            total = result.total,
            successful = result.successful,
            failed = result.failed,
            "Batch finished"
        );
        Ok(result)
    }
}
