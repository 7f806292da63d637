//! SQLite backend implementation.

use std::fmt::Debug;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};

use crate::core::{Backend, BackendKind, IsolationLevel, TransactionOptions};
use crate::error::{BackendError, StorageError, StorageResult};

use super::schema;

/// SQLite backend for one tenant database.
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

impl SqliteBackendConfig {
    /// Sets the maximum pool size.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the busy timeout.
    pub fn with_busy_timeout_ms(mut self, timeout: u32) -> Self {
        self.busy_timeout_ms = timeout;
        self
    }
}

/// Builds a connection pool for a database path.
///
/// Every `:memory:` connection is a separate database, so in-memory pools
/// hold exactly one connection that is never recycled.
pub(crate) fn build_pool<P: AsRef<Path>>(
    path: P,
    config: &SqliteBackendConfig,
) -> StorageResult<(Pool<SqliteConnectionManager>, bool)> {
    let is_memory = path.as_ref().to_string_lossy() == ":memory:";

    let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
    let foreign_keys = config.enable_foreign_keys;
    let manager = SqliteConnectionManager::file(path.as_ref()).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        if foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        }
        Ok(())
    });

    let mut builder = Pool::builder().connection_timeout(Duration::from_millis(
        config.connection_timeout_ms,
    ));
    builder = if is_memory {
        builder
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        builder
            .max_size(config.max_connections.max(1))
            .min_idle(Some(config.min_connections))
    };

    let pool = builder.build(manager).map_err(|e| {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: "sqlite".to_string(),
            message: e.to_string(),
        })
    })?;

    if config.enable_wal && !is_memory {
        let conn = pool.get()?;
        // journal_mode returns the resulting mode as a row
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(|e| {
                StorageError::Backend(BackendError::Internal {
                    backend_name: "sqlite".to_string(),
                    message: format!("Failed to enable WAL mode: {}", e),
                    source: None,
                })
            })?;
    }

    Ok((pool, is_memory))
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default())
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a backend with custom configuration.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
    ) -> StorageResult<Self> {
        let (pool, is_memory) = build_pool(path, &config)?;
        Ok(Self {
            pool,
            config,
            is_memory,
        })
    }

    /// Initialize the tenant schema.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_tenant_schema(&conn)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Runs `f` inside one transaction.
    ///
    /// `max_wait_ms` bounds the wait for a pooled connection. A transaction
    /// whose work outlasts `timeout_ms` is rolled back instead of committed.
    /// Read committed maps to `BEGIN IMMEDIATE`; the stricter levels take the
    /// database lock up front with `BEGIN EXCLUSIVE`.
    pub(crate) fn with_transaction<T>(
        &self,
        options: &TransactionOptions,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = if options.max_wait_ms == 0 {
            self.get_connection()?
        } else {
            self.pool
                .get_timeout(Duration::from_millis(options.max_wait_ms))
                .map_err(|_| {
                    StorageError::Backend(BackendError::PoolExhausted {
                        backend_name: "sqlite".to_string(),
                    })
                })?
        };

        let behavior = match options.isolation_level {
            IsolationLevel::ReadCommitted => TransactionBehavior::Immediate,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable => {
                TransactionBehavior::Exclusive
            }
        };

        let started = Instant::now();
        let tx = conn.transaction_with_behavior(behavior).map_err(|e| {
            StorageError::Backend(BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: format!("Failed to begin transaction: {}", e),
                source: None,
            })
        })?;

        // Dropping `tx` without commit rolls back
        let value = f(&tx)?;

        if options.timeout_ms > 0 && started.elapsed() > Duration::from_millis(options.timeout_ms) {
            return Err(StorageError::Backend(BackendError::TransactionTimeout {
                timeout_ms: options.timeout_ms,
            }));
        }

        tx.commit().map_err(|e| {
            StorageError::Backend(BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: format!("Failed to commit transaction: {}", e),
                source: None,
            })
        })?;
        Ok(value)
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let conn = self
            .get_connection()
            .map_err(|_| BackendError::Unavailable {
                backend_name: "sqlite".to_string(),
                message: "Failed to get connection".to_string(),
            })?;
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|e| BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: format!("Health check failed: {}", e),
                source: None,
            })?;
        Ok(())
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.init_schema().map_err(|e| BackendError::MigrationError {
            message: format!("Failed to initialize schema: {}", e),
        })
    }
}
