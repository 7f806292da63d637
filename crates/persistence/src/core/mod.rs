//! Core storage traits and abstractions.
//!
//! This module provides the foundational traits for the data-access layer:
//!
//! - [`Backend`] - Database driver lifecycle
//! - [`RecordStore`] - Bulk mutation and reads over tenant records
//! - [`DeadLetterStore`] - Per-tenant dead-letter persistence
//! - [`TransactionOptions`] - Isolation level and timeout hints
//!
//! A tenant database implements all three store traits; the combination is
//! the [`TenantStore`] trait object carried by every
//! [`TenantHandle`](crate::tenant::TenantHandle).
//!
//! ```text
//! Backend ─┐
//! RecordStore ─┼── TenantStore
//! DeadLetterStore ─┘
//! ```

pub mod backend;
pub mod dead_letter;
pub mod records;
pub mod transaction;

pub use backend::{Backend, BackendKind};
pub use dead_letter::DeadLetterStore;
pub use records::RecordStore;
pub use transaction::{
    DEFAULT_TRANSACTION_MAX_WAIT_MS, DEFAULT_TRANSACTION_TIMEOUT_MS, IsolationLevel,
    TransactionOptions,
};

/// Everything a tenant database offers.
pub trait TenantStore: Backend + RecordStore + DeadLetterStore {}

impl<T> TenantStore for T where T: Backend + RecordStore + DeadLetterStore {}
