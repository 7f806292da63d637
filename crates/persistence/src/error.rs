//! Error types for the data-access layer.
//!
//! This module defines all error types used throughout the crate, following a
//! hierarchy that separates tenant resolution errors, provider call errors,
//! field encryption errors, batch errors, cache errors, dead-letter queue
//! errors and backend errors.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::tenant::TenantId;

/// The primary error type for all data-access operations.
///
/// This enum encompasses all possible errors that can occur in the core,
/// organized by category.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Tenant resolution errors
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// Outbound provider call errors
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Field encryption errors
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Batch mutation errors
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// Shared cache errors
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Dead-letter queue errors
    #[error(transparent)]
    DeadLetter(#[from] DlqError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors raised while resolving a tenant to a database handle.
///
/// These are always fatal to the calling operation.
#[derive(Error, Debug)]
pub enum TenantError {
    /// No active tenant record exists for the identifier.
    #[error("tenant not found: {tenant_id}")]
    NotFound { tenant_id: TenantId },

    /// The tenant exists but is not active.
    #[error("tenant suspended: {tenant_id}")]
    Suspended { tenant_id: TenantId },

    /// The tenant identifier is malformed.
    #[error("invalid tenant '{tenant_id}': {reason}")]
    InvalidTenant { tenant_id: TenantId, reason: String },
}

/// Errors returned by outbound provider calls (SMS, payment, webhooks).
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// A failure that is worth retrying (timeouts, resets, 5xx, 429).
    #[error("transient failure from {provider}: {message}")]
    Transient {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    /// A failure that will not succeed on retry (most 4xx).
    #[error("permanent failure from {provider}: {message}")]
    Permanent {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    /// The circuit breaker guarding the provider is open.
    #[error("circuit breaker open for {provider}")]
    CircuitOpen { provider: String },
}

impl ProviderError {
    /// Builds an error from an HTTP status code.
    ///
    /// 5xx and 429 are transient; every other status is permanent.
    pub fn from_http_status(
        provider: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        let provider = provider.into();
        let message = message.into();
        if status >= 500 || status == 429 {
            ProviderError::Transient {
                provider,
                message,
                status: Some(status),
            }
        } else {
            ProviderError::Permanent {
                provider,
                message,
                status: Some(status),
            }
        }
    }

    /// Builds a transient error for a network timeout.
    pub fn timeout(provider: impl Into<String>) -> Self {
        ProviderError::Transient {
            provider: provider.into(),
            message: "request timed out".to_string(),
            status: None,
        }
    }

    /// Builds a transient error for a reset connection.
    pub fn connection_reset(provider: impl Into<String>) -> Self {
        ProviderError::Transient {
            provider: provider.into(),
            message: "connection reset".to_string(),
            status: None,
        }
    }

    /// Returns the HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Transient { status, .. } | ProviderError::Permanent { status, .. } => {
                *status
            }
            ProviderError::CircuitOpen { .. } => None,
        }
    }
}

/// Errors related to field encryption.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The encryption key is missing or malformed.
    #[error("invalid encryption key: {reason}")]
    InvalidKey { reason: String },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    Encryption { message: String },

    /// Decryption failed (bad shape, wrong key or tampered data).
    #[error("decryption failed: {message}")]
    Decryption { message: String },
}

/// Errors related to chunked batch mutations.
#[derive(Error, Debug)]
pub enum BatchError {
    /// A single chunk failed to apply.
    #[error("batch chunk {chunk_index} failed: {message}")]
    Chunk { chunk_index: usize, message: String },

    /// The batch configuration is unusable.
    #[error("invalid batch configuration: {message}")]
    InvalidConfig { message: String },
}

/// Errors raised by the shared cache service.
///
/// These never escape a cache-aside read; they are recovered locally.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache backend is unreachable or failed.
    #[error("cache backend error: {message}")]
    Backend { message: String },

    /// A cached value could not be (de)serialized.
    #[error("cache serialization error: {message}")]
    Serialization { message: String },

    /// A cached value could not be (de)compressed.
    #[error("cache compression error: {message}")]
    Compression { message: String },
}

/// Errors related to the dead-letter queue.
#[derive(Error, Debug)]
pub enum DlqError {
    /// The entry does not exist in the tenant's queue.
    #[error("dead-letter entry not found: {id}")]
    EntryNotFound { id: String },

    /// The requested status transition is not allowed.
    #[error("invalid dead-letter transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Schema migration error.
    #[error("schema migration failed: {message}")]
    MigrationError { message: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// A transaction ran past its timeout and was rolled back.
    #[error("transaction exceeded timeout of {timeout_ms}ms and was rolled back")]
    TransactionTimeout { timeout_ms: u64 },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for data-access operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for field encryption operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Result type alias for cache client operations.
pub type CacheResult<T> = Result<T, CacheError>;

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Internal {
            backend_name: "unknown".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_error_display() {
        let err = StorageError::Tenant(TenantError::NotFound {
            tenant_id: TenantId::new("grace-chapel"),
        });
        assert_eq!(err.to_string(), "tenant not found: grace-chapel");

        let err = TenantError::Suspended {
            tenant_id: TenantId::new("grace-chapel"),
        };
        assert!(err.to_string().contains("suspended"));
    }

    #[test]
    fn test_provider_error_from_http_status() {
        assert!(matches!(
            ProviderError::from_http_status("twilio", 503, "unavailable"),
            ProviderError::Transient { status: Some(503), .. }
        ));
        assert!(matches!(
            ProviderError::from_http_status("twilio", 429, "slow down"),
            ProviderError::Transient { status: Some(429), .. }
        ));
        assert!(matches!(
            ProviderError::from_http_status("twilio", 400, "bad number"),
            ProviderError::Permanent { status: Some(400), .. }
        ));
        assert!(matches!(
            ProviderError::from_http_status("stripe", 404, "no such customer"),
            ProviderError::Permanent { .. }
        ));
    }

    #[test]
    fn test_provider_error_status() {
        assert_eq!(ProviderError::timeout("twilio").status(), None);
        assert_eq!(
            ProviderError::from_http_status("twilio", 502, "bad gateway").status(),
            Some(502)
        );
        let open = ProviderError::CircuitOpen {
            provider: "twilio".to_string(),
        };
        assert_eq!(open.status(), None);
        assert_eq!(open.to_string(), "circuit breaker open for twilio");
    }

    #[test]
    fn test_batch_error_display() {
        let err = BatchError::Chunk {
            chunk_index: 3,
            message: "constraint violation".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "batch chunk 3 failed: constraint violation"
        );
    }

    #[test]
    fn test_storage_error_from_category_errors() {
        let err: StorageError = DlqError::EntryNotFound {
            id: "abc".to_string(),
        }
        .into();
        assert!(matches!(err, StorageError::DeadLetter(_)));

        let err: StorageError = CryptoError::Decryption {
            message: "bad tag".to_string(),
        }
        .into();
        assert!(matches!(err, StorageError::Crypto(_)));

        let err: StorageError = CacheError::Backend {
            message: "down".to_string(),
        }
        .into();
        assert!(matches!(err, StorageError::Cache(_)));
    }

    #[test]
    fn test_dlq_transition_display() {
        let err = DlqError::InvalidTransition {
            id: "e1".to_string(),
            from: "RESOLVED".to_string(),
            to: "PENDING".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid dead-letter transition for e1: RESOLVED -> PENDING"
        );
    }
}
