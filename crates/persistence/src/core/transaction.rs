//! Transaction options passed down to the underlying store.
//!
//! The isolation level is a hint: stores map it onto whatever their engine
//! offers and are not required to enforce it exactly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    /// Read committed - sees only committed data.
    #[default]
    ReadCommitted,
    /// Repeatable read - consistent reads within transaction.
    RepeatableRead,
    /// Serializable - full isolation (may reduce concurrency).
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadCommitted => write!(f, "read-committed"),
            IsolationLevel::RepeatableRead => write!(f, "repeatable-read"),
            IsolationLevel::Serializable => write!(f, "serializable"),
        }
    }
}

/// Default transaction timeout in milliseconds.
pub const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 30_000;

/// Default time to wait for a transaction slot in milliseconds.
pub const DEFAULT_TRANSACTION_MAX_WAIT_MS: u64 = 5_000;

/// Options for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOptions {
    /// The isolation level hint.
    pub isolation_level: IsolationLevel,
    /// Maximum duration of the transaction in milliseconds (0 = no timeout).
    pub timeout_ms: u64,
    /// Maximum time to wait to start the transaction in milliseconds.
    pub max_wait_ms: u64,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation_level: IsolationLevel::default(),
            timeout_ms: DEFAULT_TRANSACTION_TIMEOUT_MS,
            max_wait_ms: DEFAULT_TRANSACTION_MAX_WAIT_MS,
        }
    }
}

impl TransactionOptions {
    /// Creates new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the isolation level.
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// Sets the timeout.
    pub fn timeout_ms(mut self, timeout: u64) -> Self {
        self.timeout_ms = timeout;
        self
    }

    /// Sets the maximum wait.
    pub fn max_wait_ms(mut self, max_wait: u64) -> Self {
        self.max_wait_ms = max_wait;
        self
    }
}
