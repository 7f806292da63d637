//! Registry records describing a tenant's isolated database.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::id::TenantId;

/// Lifecycle status of a tenant.
///
/// Only [`TenantStatus::Active`] tenants can be resolved to a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    /// The tenant can be served.
    #[default]
    Active,
    /// The tenant exists but must not be served (billing hold, abuse).
    Suspended,
    /// The tenant has been removed.
    Deleted,
}

impl TenantStatus {
    /// Returns the registry column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Deleted => "deleted",
        }
    }

    /// Returns `true` if the tenant may be resolved.
    pub fn is_active(&self) -> bool {
        matches!(self, TenantStatus::Active)
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "deleted" => Ok(TenantStatus::Deleted),
            other => Err(format!("unknown tenant status: {}", other)),
        }
    }
}

/// A tenant as stored in the registry.
///
/// Created by the external provisioning flow; this crate only reads it and
/// applies status transitions.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Primary key in the registry.
    pub id: TenantId,
    /// Human readable organisation name.
    pub display_name: String,
    /// Names the tenant's isolated database.
    pub database_identifier: String,
    /// Credential used when connecting to the tenant database.
    pub connection_secret: String,
    /// Lifecycle status.
    pub status: TenantStatus,
}

impl TenantRecord {
    /// Creates an active tenant record.
    pub fn new(
        id: impl Into<TenantId>,
        display_name: impl Into<String>,
        database_identifier: impl Into<String>,
        connection_secret: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            database_identifier: database_identifier.into(),
            connection_secret: connection_secret.into(),
            status: TenantStatus::Active,
        }
    }

    /// Returns a copy with the given status.
    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = status;
        self
    }
}

// The connection secret must never reach logs.
impl fmt::Debug for TenantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantRecord")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("database_identifier", &self.database_identifier)
            .field("connection_secret", &"<redacted>")
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            TenantStatus::Active,
            TenantStatus::Suspended,
            TenantStatus::Deleted,
        ] {
            assert_eq!(status.as_str().parse::<TenantStatus>().unwrap(), status);
        }
        assert!("archived".parse::<TenantStatus>().is_err());
    }

    #[test]
    fn test_only_active_is_active() {
        assert!(TenantStatus::Active.is_active());
        assert!(!TenantStatus::Suspended.is_active());
        assert!(!TenantStatus::Deleted.is_active());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let record = TenantRecord::new("grace", "Grace Chapel", "grace_db", "hunter2");
        let debug = format!("{:?}", record);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("grace_db"));
    }

    #[test]
    fn test_with_status() {
        let record = TenantRecord::new("grace", "Grace Chapel", "grace_db", "s")
            .with_status(TenantStatus::Suspended);
        assert_eq!(record.status, TenantStatus::Suspended);
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&TenantStatus::Suspended).unwrap();
        assert_eq!(json, "\"suspended\"");
    }
}
