//! SQLite schema definitions and migrations.
//!
//! Two schemas live here: the registry schema (one database per deployment)
//! and the tenant schema (one database per tenant). Both are versioned
//! through a single-row `schema_version` table.

use rusqlite::Connection;

use crate::error::{BackendError, StorageError, StorageResult};

/// Current tenant schema version.
pub const TENANT_SCHEMA_VERSION: i32 = 2;

/// Current registry schema version.
pub const REGISTRY_SCHEMA_VERSION: i32 = 1;

fn migration_error(what: &str, e: rusqlite::Error) -> StorageError {
    StorageError::Backend(BackendError::MigrationError {
        message: format!("Failed to {}: {}", what, e),
    })
}

/// Initialize the tenant database schema.
pub fn initialize_tenant_schema(conn: &Connection) -> StorageResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_tenant_schema_v1(conn)?;
        set_schema_version(conn, 1)?;
        migrate_tenant_schema(conn, 1)?;
    } else if current_version < TENANT_SCHEMA_VERSION {
        migrate_tenant_schema(conn, current_version)?;
    }

    Ok(())
}

/// Initialize the registry database schema.
pub fn initialize_registry_schema(conn: &Connection) -> StorageResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                database_identifier TEXT NOT NULL UNIQUE,
                connection_secret TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tenants_status ON tenants(status);",
        )
        .map_err(|e| migration_error("create tenants table", e))?;
        set_schema_version(conn, REGISTRY_SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> StorageResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| migration_error("create schema_version table", e))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> StorageResult<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| migration_error("clear schema_version", e))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| migration_error("set schema_version", e))?;
    Ok(())
}

/// Create the initial tenant schema (version 1).
fn create_tenant_schema_v1(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        );
        CREATE INDEX IF NOT EXISTS idx_records_created ON records(collection, created_at);",
    )
    .map_err(|e| migration_error("create records table", e))
}

/// Run migrations from `from_version` to the current version.
fn migrate_tenant_schema(conn: &Connection, from_version: i32) -> StorageResult<()> {
    let mut version = from_version;

    while version < TENANT_SCHEMA_VERSION {
        match version {
            1 => migrate_v1_to_v2(conn)?,
            _ => {
                return Err(StorageError::Backend(BackendError::MigrationError {
                    message: format!("No migration path from schema version {}", version),
                }));
            }
        }
        version += 1;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

/// Version 2 adds the dead-letter queue.
fn migrate_v1_to_v2(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS dead_letter_queue (
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            external_id TEXT,
            original_payload TEXT NOT NULL,
            error_message TEXT NOT NULL,
            error_stack TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            retry_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'PENDING',
            first_attempt_at TEXT NOT NULL,
            last_attempt_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dlq_status ON dead_letter_queue(status, last_attempt_at);
        CREATE INDEX IF NOT EXISTS idx_dlq_category ON dead_letter_queue(category);
        CREATE INDEX IF NOT EXISTS idx_dlq_external_id ON dead_letter_queue(external_id);",
    )
    .map_err(|e| migration_error("create dead_letter_queue table", e))
}
