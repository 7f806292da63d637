//! Registry and connector seams used by the connection manager.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::TenantStore;
use crate::error::StorageResult;

use super::id::TenantId;
use super::record::{TenantRecord, TenantStatus};

/// The central store mapping tenant identifiers to their databases.
///
/// Rows are created by the provisioning flow; the manager only reads them.
/// `register` and `set_status` exist for that flow and for lifecycle events.
#[async_trait]
pub trait TenantRegistry: Send + Sync + Debug {
    /// Looks up a tenant record regardless of its status.
    async fn fetch(&self, tenant_id: &TenantId) -> StorageResult<Option<TenantRecord>>;

    /// Inserts or replaces a tenant record.
    async fn register(&self, record: &TenantRecord) -> StorageResult<()>;

    /// Changes a tenant's status. Returns `false` if the tenant does not exist.
    async fn set_status(&self, tenant_id: &TenantId, status: TenantStatus) -> StorageResult<bool>;
}

/// Opens the physical store behind a tenant record.
///
/// The returned store owns its own connection pool and is shared by every
/// handle resolved for the same tenant.
#[async_trait]
pub trait TenantConnector: Send + Sync + Debug {
    /// Opens (and initializes, if needed) the tenant's database.
    async fn connect(&self, record: &TenantRecord) -> StorageResult<Arc<dyn TenantStore>>;
}
