//! Batch execution options.

use serde::{Deserialize, Serialize};

use crate::core::{
    DEFAULT_TRANSACTION_MAX_WAIT_MS, DEFAULT_TRANSACTION_TIMEOUT_MS, IsolationLevel,
    TransactionOptions,
};
use crate::error::BatchError;

/// Default number of items per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of chunks processed at once by `parallel_batch_process`.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Options for one batch call.
///
/// # Example
///
/// ```
/// use chorus_persistence::batch::BatchConfig;
/// use chorus_persistence::core::IsolationLevel;
///
/// let config = BatchConfig::default()
///     .with_chunk_size(250)
///     .with_ignore_errors(true)
///     .with_isolation_level(IsolationLevel::Serializable);
/// assert_eq!(config.transaction_options().timeout_ms, 30_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per chunk. Each chunk is one statement batch in one transaction.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Keep going after a chunk fails, collecting its error.
    #[serde(default)]
    pub ignore_errors: bool,

    /// Isolation requested for each chunk's transaction.
    #[serde(default)]
    pub isolation_level: IsolationLevel,

    /// Per-chunk transaction timeout.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// How long a chunk may wait for a connection.
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_timeout() -> u64 {
    DEFAULT_TRANSACTION_TIMEOUT_MS
}

fn default_max_wait() -> u64 {
    DEFAULT_TRANSACTION_MAX_WAIT_MS
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            ignore_errors: false,
            isolation_level: IsolationLevel::default(),
            timeout_ms: default_timeout(),
            max_wait_ms: default_max_wait(),
        }
    }
}

impl BatchConfig {
    /// Sets the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets whether chunk failures are collected instead of aborting.
    pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    /// Sets the isolation level.
    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// Sets the per-chunk timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the connection wait bound.
    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }

    /// Transaction options applied to every chunk.
    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::new()
            .isolation_level(self.isolation_level)
            .timeout_ms(self.timeout_ms)
            .max_wait_ms(self.max_wait_ms)
    }

    /// Rejects unusable settings.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::InvalidConfig {
                message: "chunk_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
