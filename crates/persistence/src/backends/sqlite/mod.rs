//! SQLite backend implementation.
//!
//! This module provides a SQLite implementation of every storage trait. It
//! supports both in-memory databases (great for testing) and file-based
//! databases (one file per tenant).
//!
//! # Features
//!
//! - In-memory and file-based modes
//! - Bulk record writes, each call in one transaction
//! - Per-tenant dead-letter queue
//! - Central tenant registry
//!
//! # Example
//!
//! ```no_run
//! use chorus_persistence::backends::sqlite::SqliteBackend;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory database
//! let backend = SqliteBackend::in_memory()?;
//!
//! // Initialize the schema
//! backend.init_schema()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! -- Registry database
//! CREATE TABLE tenants (
//!     id TEXT PRIMARY KEY,
//!     display_name TEXT NOT NULL,
//!     database_identifier TEXT NOT NULL UNIQUE,
//!     connection_secret TEXT NOT NULL,
//!     status TEXT NOT NULL DEFAULT 'active',
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL
//! );
//!
//! -- Tenant database
//! CREATE TABLE records (
//!     collection TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     data TEXT NOT NULL,  -- JSON data
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     PRIMARY KEY (collection, id)
//! );
//!
//! CREATE TABLE dead_letter_queue (
//!     id TEXT PRIMARY KEY,
//!     category TEXT NOT NULL,
//!     external_id TEXT,
//!     original_payload TEXT NOT NULL,
//!     error_message TEXT NOT NULL,
//!     error_stack TEXT,
//!     metadata TEXT NOT NULL DEFAULT '{}',
//!     retry_count INTEGER NOT NULL DEFAULT 0,
//!     status TEXT NOT NULL DEFAULT 'PENDING',
//!     first_attempt_at TEXT NOT NULL,
//!     last_attempt_at TEXT NOT NULL
//! );
//! ```

mod backend;
mod connector;
mod dlq;
mod records;
mod registry;
mod schema;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{BackendError, StorageError};

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use connector::SqliteConnector;
pub use registry::SqliteTenantRegistry;
pub use schema::{REGISTRY_SCHEMA_VERSION, TENANT_SCHEMA_VERSION};

fn internal_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message,
        source: None,
    })
}

fn serialization_error(message: String) -> StorageError {
    StorageError::Backend(BackendError::SerializationError { message })
}

/// Fixed-width timestamps so that text comparison orders them correctly.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| serialization_error(format!("Invalid timestamp '{}': {}", value, e)))
}
