//! Tenant identifier type.
//!
//! This module defines the [`TenantId`] type, an opaque identifier naming one
//! isolated customer (one church organisation) in the registry store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An opaque tenant identifier.
///
/// The identifier is the primary key of a [`TenantRecord`](super::TenantRecord)
/// in the registry store. It carries no structure of its own; validation
/// against a naming pattern happens in the
/// [`TenantConnectionManager`](super::TenantConnectionManager) before the
/// registry is consulted.
///
/// # Examples
///
/// ```
/// use chorus_persistence::tenant::TenantId;
///
/// let tenant = TenantId::new("grace-chapel");
/// assert_eq!(tenant.as_str(), "grace-chapel");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a new tenant ID from the given string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the tenant ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Returns a form of the identifier that is safe to use in file names.
    ///
    /// Every character outside `[A-Za-z0-9_-]` is replaced with `_`.
    ///
    /// ```
    /// use chorus_persistence::tenant::TenantId;
    ///
    /// assert_eq!(TenantId::new("first.baptist/east").sanitized(), "first_baptist_east");
    /// ```
    pub fn sanitized(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({:?})", self.0)
    }
}

impl FromStr for TenantId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TenantId::new(s))
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        TenantId(s)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_creation() {
        let tenant = TenantId::new("grace-chapel");
        assert_eq!(tenant.as_str(), "grace-chapel");
        assert!(!tenant.is_blank());
        assert!(TenantId::new("  ").is_blank());
    }

    #[test]
    fn test_sanitized() {
        assert_eq!(TenantId::new("grace-chapel").sanitized(), "grace-chapel");
        assert_eq!(TenantId::new("st. mark's").sanitized(), "st__mark_s");
        assert_eq!(TenantId::new("../etc").sanitized(), "___etc");
    }

    #[test]
    fn test_serde_roundtrip() {
        let tenant = TenantId::new("grace-chapel");
        let json = serde_json::to_string(&tenant).unwrap();
        assert_eq!(json, "\"grace-chapel\"");

        let parsed: TenantId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tenant);
    }

    #[test]
    fn test_from_string() {
        let tenant: TenantId = "grace-chapel".into();
        assert_eq!(tenant.as_str(), "grace-chapel");

        let tenant2: TenantId = String::from("grace-chapel").into();
        assert_eq!(tenant2, tenant);

        let parsed: TenantId = "grace-chapel".parse().unwrap();
        assert_eq!(parsed, tenant);
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(
            format!("{:?}", TenantId::new("grace")),
            "TenantId(\"grace\")"
        );
    }
}
