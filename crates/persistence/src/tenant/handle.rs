//! Request-scoped tenant handles.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tokio::time::Instant;

use crate::core::TenantStore;

use super::id::TenantId;

/// A resolved tenant, valid for one logical operation.
///
/// The handle borrows a pooled store that other concurrently resolved handles
/// for the same tenant share. Do not keep it beyond the operation it was
/// resolved for: a later status change is only observed by resolving again.
pub struct TenantHandle {
    tenant_id: TenantId,
    display_name: String,
    store: Arc<dyn TenantStore>,
    resolved_at: Instant,
}

impl TenantHandle {
    pub(crate) fn new(
        tenant_id: TenantId,
        display_name: String,
        store: Arc<dyn TenantStore>,
    ) -> Self {
        Self {
            tenant_id,
            display_name,
            store,
            resolved_at: Instant::now(),
        }
    }

    /// Returns the tenant this handle was resolved for.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Returns the tenant's display name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the pooled tenant store.
    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// Returns when the handle was resolved.
    pub fn resolved_at(&self) -> Instant {
        self.resolved_at
    }
}

impl Deref for TenantHandle {
    type Target = dyn TenantStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

impl fmt::Debug for TenantHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantHandle")
            .field("tenant_id", &self.tenant_id)
            .field("backend", &self.store.name())
            .finish_non_exhaustive()
    }
}
