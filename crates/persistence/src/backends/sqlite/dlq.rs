//! DeadLetterStore implementation for SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::core::{DeadLetterStore, TransactionOptions};
use crate::error::{DlqError, StorageError, StorageResult};
use crate::types::{
    DlqCategory, DlqEntry, DlqFilter, DlqStats, DlqStatus, NewDlqEntry, Page, PageRequest,
    Pagination,
};

use super::{format_timestamp, internal_error, parse_timestamp, serialization_error, SqliteBackend};

const DLQ_COLUMNS: &str = "id, category, external_id, original_payload, error_message, \
     error_stack, metadata, retry_count, status, first_attempt_at, last_attempt_at";

struct RawEntry {
    id: String,
    category: String,
    external_id: Option<String>,
    original_payload: String,
    error_message: String,
    error_stack: Option<String>,
    metadata: String,
    retry_count: i64,
    status: String,
    first_attempt_at: String,
    last_attempt_at: String,
}

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        id: row.get(0)?,
        category: row.get(1)?,
        external_id: row.get(2)?,
        original_payload: row.get(3)?,
        error_message: row.get(4)?,
        error_stack: row.get(5)?,
        metadata: row.get(6)?,
        retry_count: row.get(7)?,
        status: row.get(8)?,
        first_attempt_at: row.get(9)?,
        last_attempt_at: row.get(10)?,
    })
}

fn into_entry(raw: RawEntry) -> StorageResult<DlqEntry> {
    let category: DlqCategory = raw.category.parse().map_err(serialization_error)?;
    let status: DlqStatus = raw.status.parse().map_err(serialization_error)?;
    let original_payload: Value = serde_json::from_str(&raw.original_payload)
        .map_err(|e| serialization_error(format!("Failed to parse payload: {}", e)))?;
    let metadata: Value = serde_json::from_str(&raw.metadata)
        .map_err(|e| serialization_error(format!("Failed to parse metadata: {}", e)))?;

    Ok(DlqEntry {
        id: raw.id,
        category,
        external_id: raw.external_id,
        original_payload,
        error_message: raw.error_message,
        error_stack: raw.error_stack,
        metadata,
        retry_count: u32::try_from(raw.retry_count).unwrap_or(u32::MAX),
        status,
        first_attempt_at: parse_timestamp(&raw.first_attempt_at)?,
        last_attempt_at: parse_timestamp(&raw.last_attempt_at)?,
    })
}

fn load(conn: &Connection, id: &str) -> StorageResult<Option<DlqEntry>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM dead_letter_queue WHERE id = ?1", DLQ_COLUMNS),
            [id],
            read_raw,
        )
        .optional()
        .map_err(|e| internal_error(format!("Failed to read dead-letter entry: {}", e)))?;
    raw.map(into_entry).transpose()
}

fn load_existing(conn: &Connection, id: &str) -> StorageResult<DlqEntry> {
    load(conn, id)?.ok_or_else(|| {
        StorageError::DeadLetter(DlqError::EntryNotFound { id: id.to_string() })
    })
}

/// Merges `extra` into `base`. Object keys overwrite; a non-object value is
/// stored under `"details"`.
fn merge_metadata(base: &mut Value, extra: Value) {
    if !base.is_object() {
        *base = Value::Object(Default::default());
    }
    if let Some(target) = base.as_object_mut() {
        match extra {
            Value::Object(map) => target.extend(map),
            Value::Null => {}
            other => {
                target.insert("details".to_string(), other);
            }
        }
    }
}

fn to_json(value: &Value) -> StorageResult<String> {
    serde_json::to_string(value)
        .map_err(|e| serialization_error(format!("Failed to serialize JSON: {}", e)))
}

fn where_clause(filter: &DlqFilter) -> (String, Vec<SqlValue>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(category) = filter.category {
        values.push(SqlValue::Text(category.as_str().to_string()));
        conditions.push(format!("category = ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(SqlValue::Text(status.as_str().to_string()));
        conditions.push(format!("status = ?{}", values.len()));
    }
    if let Some(external_id) = &filter.external_id {
        values.push(SqlValue::Text(external_id.clone()));
        conditions.push(format!("external_id = ?{}", values.len()));
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), values)
    }
}

#[async_trait]
impl DeadLetterStore for SqliteBackend {
    async fn insert_entry(&self, entry: NewDlqEntry) -> StorageResult<DlqEntry> {
        let now = Utc::now();
        let stored = DlqEntry {
            id: uuid::Uuid::new_v4().to_string(),
            category: entry.category,
            external_id: entry.external_id,
            original_payload: entry.original_payload,
            error_message: entry.error_message,
            error_stack: entry.error_stack,
            metadata: if entry.metadata.is_null() {
                Value::Object(Default::default())
            } else {
                entry.metadata
            },
            retry_count: entry.retry_count,
            status: DlqStatus::Pending,
            first_attempt_at: entry.first_attempt_at.unwrap_or(now),
            last_attempt_at: now,
        };

        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO dead_letter_queue (id, category, external_id, original_payload,
                 error_message, error_stack, metadata, retry_count, status,
                 first_attempt_at, last_attempt_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                stored.id,
                stored.category.as_str(),
                stored.external_id,
                to_json(&stored.original_payload)?,
                stored.error_message,
                stored.error_stack,
                to_json(&stored.metadata)?,
                i64::from(stored.retry_count),
                stored.status.as_str(),
                format_timestamp(&stored.first_attempt_at),
                format_timestamp(&stored.last_attempt_at),
            ],
        )
        .map_err(|e| internal_error(format!("Failed to insert dead-letter entry: {}", e)))?;

        Ok(stored)
    }

    async fn get_entry(&self, id: &str) -> StorageResult<Option<DlqEntry>> {
        let conn = self.get_connection()?;
        load(&conn, id)
    }

    async fn list_entries(
        &self,
        filter: &DlqFilter,
        page: PageRequest,
    ) -> StorageResult<Page<DlqEntry>> {
        let page = PageRequest::new(page.page, page.page_size);
        let conn = self.get_connection()?;
        let (clause, mut values) = where_clause(filter);

        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM dead_letter_queue {}", clause),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .map_err(|e| internal_error(format!("Failed to count dead-letter entries: {}", e)))?;

        let sql = format!(
            "SELECT {} FROM dead_letter_queue {} ORDER BY last_attempt_at DESC, id LIMIT ?{} OFFSET ?{}",
            DLQ_COLUMNS,
            clause,
            values.len() + 1,
            values.len() + 2
        );
        values.push(SqlValue::Integer(page.limit() as i64));
        values.push(SqlValue::Integer(page.offset() as i64));

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| internal_error(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params_from_iter(values), read_raw)
            .map_err(|e| internal_error(format!("Failed to list dead-letter entries: {}", e)))?;

        let mut items = Vec::new();
        for raw in rows {
            let raw = raw.map_err(|e| internal_error(format!("Failed to read row: {}", e)))?;
            items.push(into_entry(raw)?);
        }

        Ok(Page {
            items,
            pagination: Pagination::new(page, total.max(0) as u64),
        })
    }

    async fn transition_entry(
        &self,
        id: &str,
        to: DlqStatus,
        metadata: Option<Value>,
    ) -> StorageResult<DlqEntry> {
        self.with_transaction(&TransactionOptions::default(), |tx| {
            let mut entry = load_existing(tx, id)?;
            if !entry.status.can_transition_to(to) {
                return Err(StorageError::DeadLetter(DlqError::InvalidTransition {
                    id: id.to_string(),
                    from: entry.status.as_str().to_string(),
                    to: to.as_str().to_string(),
                }));
            }

            if let Some(extra) = metadata {
                merge_metadata(&mut entry.metadata, extra);
            }
            entry.status = to;
            // A terminal transition counts as the final attempt; purge ages from it
            entry.last_attempt_at = Utc::now();

            tx.execute(
                "UPDATE dead_letter_queue SET status = ?2, metadata = ?3, last_attempt_at = ?4
                 WHERE id = ?1",
                params![
                    entry.id,
                    entry.status.as_str(),
                    to_json(&entry.metadata)?,
                    format_timestamp(&entry.last_attempt_at),
                ],
            )
            .map_err(|e| internal_error(format!("Failed to update dead-letter entry: {}", e)))?;
            Ok(entry)
        })
    }

    async fn increment_entry_retry(
        &self,
        id: &str,
        error_message: Option<&str>,
    ) -> StorageResult<DlqEntry> {
        self.with_transaction(&TransactionOptions::default(), |tx| {
            let mut entry = load_existing(tx, id)?;
            if entry.status != DlqStatus::Pending {
                return Err(StorageError::DeadLetter(DlqError::InvalidTransition {
                    id: id.to_string(),
                    from: entry.status.as_str().to_string(),
                    to: DlqStatus::Pending.as_str().to_string(),
                }));
            }

            entry.retry_count = entry.retry_count.saturating_add(1);
            entry.last_attempt_at = Utc::now();
            if let Some(message) = error_message {
                entry.error_message = message.to_string();
            }

            tx.execute(
                "UPDATE dead_letter_queue
                 SET retry_count = ?2, last_attempt_at = ?3, error_message = ?4
                 WHERE id = ?1",
                params![
                    entry.id,
                    i64::from(entry.retry_count),
                    format_timestamp(&entry.last_attempt_at),
                    entry.error_message,
                ],
            )
            .map_err(|e| internal_error(format!("Failed to update dead-letter entry: {}", e)))?;
            Ok(entry)
        })
    }

    async fn purge_resolved_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        let removed = conn
            .execute(
                "DELETE FROM dead_letter_queue WHERE status = ?1 AND last_attempt_at < ?2",
                params![DlqStatus::Resolved.as_str(), format_timestamp(&cutoff)],
            )
            .map_err(|e| internal_error(format!("Failed to purge dead-letter entries: {}", e)))?;
        Ok(removed as u64)
    }

    async fn entry_stats(&self) -> StorageResult<DlqStats> {
        let conn = self.get_connection()?;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM dead_letter_queue GROUP BY status")
            .map_err(|e| internal_error(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| internal_error(format!("Failed to count dead-letter entries: {}", e)))?;

        let mut stats = DlqStats::default();
        for row in rows {
            let (status, count) =
                row.map_err(|e| internal_error(format!("Failed to read row: {}", e)))?;
            let count = count.max(0) as u64;
            match status.parse::<DlqStatus>() {
                Ok(DlqStatus::Pending) => stats.pending = count,
                Ok(DlqStatus::Resolved) => stats.resolved = count,
                Ok(DlqStatus::DeadLetter) => stats.dead_letter = count,
                Err(_) => {
                    tracing::warn!(status = %status, "ignoring unknown dead-letter status");
                }
            }
        }
        Ok(stats)
    }
}
