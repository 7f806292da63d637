//! Chorus Persistence Layer
//!
//! This crate provides the resilient, multi-tenant data-access layer behind the
//! Chorus church messaging platform. Each church organisation owns an isolated
//! database; this crate resolves tenants to pooled connections and wraps every
//! outbound and database interaction in the recovery machinery a messaging
//! service needs.
//!
//! # Features
//!
//! - **Database per tenant**: registry lookup, record caching, pool reuse and idle eviction
//! - **Field encryption**: AES-256-GCM with per-value salts, legacy plaintext passthrough
//! - **Retries**: exponential backoff with jitter and transient/permanent classification
//! - **Dead-letter queue**: per-tenant record of failed sends with replay and purge
//! - **Batching**: chunked bulk writes and streaming/parallel chunk processing
//! - **Read/write routing**: reads to replicas, writes to the primary
//! - **Cache-aside**: best-effort caching with trigger and broadcast invalidation
//!
//! # Backend Features
//!
//! - `sqlite` (default) - tenant stores and the registry on SQLite, in-memory or file-based
//!
//! # Architecture
//!
//! - [`tenant`] - Tenant identity, registry seams and the connection manager
//! - [`core`] - Storage traits implemented by every tenant database
//! - [`types`] - Records, dead-letter entries and pagination
//! - [`crypto`] - Encryption vault and display masking
//! - [`resilience`] - Retry executor and circuit breaker
//! - [`dlq`] - Dead-letter queue service
//! - [`batch`] - Chunked bulk operations
//! - [`routing`] - Read/write split across primary and replicas
//! - [`cache`] - Cache-aside over a shared cache service
//! - [`backends`] - Backend implementations
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use chorus_persistence::backends::sqlite::{SqliteConnector, SqliteTenantRegistry};
//! use chorus_persistence::dlq::DeadLetterQueue;
//! use chorus_persistence::error::ProviderError;
//! use chorus_persistence::resilience::{RetryExecutor, RetryPolicy};
//! use chorus_persistence::tenant::{
//!     TenantConnectionManager, TenantId, TenantManagerConfig, TenantRecord, TenantRegistry,
//! };
//! use chorus_persistence::types::{DlqCategory, NewDlqEntry};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(SqliteTenantRegistry::in_memory()?);
//! registry
//!     .register(&TenantRecord::new("grace-chapel", "Grace Chapel", "grace_chapel", "secret"))
//!     .await?;
//!
//! let manager = Arc::new(TenantConnectionManager::new(
//!     TenantManagerConfig::default(),
//!     registry,
//!     Arc::new(SqliteConnector::in_memory()),
//! )?);
//! let dlq = DeadLetterQueue::new(Arc::clone(&manager));
//! let tenant = TenantId::new("grace-chapel");
//!
//! let retry = RetryExecutor::new("sms", RetryPolicy::sms().with_max_retries(0));
//! let sent: Result<(), ProviderError> = retry
//!     .execute(|| async { Err(ProviderError::from_http_status("twilio", 400, "invalid number")) })
//!     .await;
//!
//! if let Err(e) = sent {
//!     let payload = json!({"to": "+15550100", "body": "Choir practice moved to 7pm"});
//!     dlq.add(&tenant, NewDlqEntry::from_error(DlqCategory::SmsSend, payload, &e))
//!         .await?;
//! }
//! assert_eq!(dlq.stats(&tenant).await?.pending, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod batch;
pub mod cache;
pub mod core;
pub mod crypto;
pub mod dlq;
pub mod error;
pub mod resilience;
pub mod routing;
pub mod tenant;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use tenant::{TenantConnectionManager, TenantHandle, TenantId};
pub use types::{Page, Pagination};

// Re-export core traits
pub use core::{Backend, BackendKind, DeadLetterStore, RecordStore, TenantStore};

// Re-export the services
pub use batch::BatchExecutor;
pub use cache::CacheAside;
pub use crypto::EncryptionVault;
pub use dlq::DeadLetterQueue;
pub use resilience::{CircuitBreaker, RetryExecutor, RetryPolicy};
pub use routing::ReadWriteRouter;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
