//! Tenant resolution for database-per-tenant storage.
//!
//! Every church organisation is a tenant with its own isolated database. The
//! central registry maps a [`TenantId`] to a [`TenantRecord`] naming that
//! database; the [`TenantConnectionManager`] turns an identifier into a
//! request-scoped [`TenantHandle`].
//!
//! # Core Types
//!
//! - [`TenantId`] - Opaque tenant identifier
//! - [`TenantRecord`] / [`TenantStatus`] - Registry rows and their lifecycle
//! - [`TenantRegistry`] - Seam over the registry store
//! - [`TenantConnector`] - Seam that opens a tenant's pooled store
//! - [`TenantConnectionManager`] - Resolution, record caching and pool reuse
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chorus_persistence::backends::sqlite::{SqliteConnector, SqliteTenantRegistry};
//! use chorus_persistence::tenant::{TenantConnectionManager, TenantId, TenantManagerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TenantManagerConfig::default().with_data_dir("/var/lib/chorus/tenants");
//! let registry = Arc::new(SqliteTenantRegistry::open("/var/lib/chorus/registry.db")?);
//! let connector = Arc::new(SqliteConnector::from_config(&config));
//! let manager = TenantConnectionManager::new(config, registry, connector)?;
//!
//! let handle = manager.resolve(&TenantId::new("grace-chapel")).await?;
//! handle.health_check().await?;
//! # Ok(())
//! # }
//! ```

mod handle;
mod id;
mod manager;
mod record;
mod registry;

pub use handle::TenantHandle;
pub use id::TenantId;
pub use manager::{TenantConnectionManager, TenantManagerConfig};
pub use record::{TenantRecord, TenantStatus};
pub use registry::{TenantConnector, TenantRegistry};
