//! RecordStore implementation for SQLite.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde_json::Value;

use crate::core::{RecordStore, TransactionOptions};
use crate::error::StorageResult;
use crate::types::{Record, RecordKey, RecordQuery, RecordWrite};

use super::{format_timestamp, internal_error, parse_timestamp, serialization_error, SqliteBackend};

const RECORD_COLUMNS: &str = "collection, id, data, created_at, updated_at";

type RawRecord = (String, String, String, String, String);

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn into_record(raw: RawRecord) -> StorageResult<Record> {
    let (collection, id, data, created_at, updated_at) = raw;
    let data: Value = serde_json::from_str(&data)
        .map_err(|e| serialization_error(format!("Failed to parse record data: {}", e)))?;
    Ok(Record {
        collection,
        id,
        data,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn encode(record: &RecordWrite) -> StorageResult<String> {
    serde_json::to_string(&record.data)
        .map_err(|e| serialization_error(format!("Failed to serialize record: {}", e)))
}

/// Maps a JSON scalar onto the value `json_extract` yields for it.
fn json_param(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Builds the WHERE clause and its parameters for a query.
fn where_clause(query: &RecordQuery) -> (String, Vec<SqlValue>) {
    let mut sql = "WHERE collection = ?1".to_string();
    let mut params = vec![SqlValue::Text(query.collection.clone())];

    if let Some((field, value)) = &query.field_equals {
        params.push(SqlValue::Text(format!("$.\"{}\"", field.replace('"', ""))));
        if value.is_null() {
            sql.push_str(" AND json_extract(data, ?2) IS NULL");
        } else {
            sql.push_str(" AND json_extract(data, ?2) = ?3");
            params.push(json_param(value));
        }
    }

    (sql, params)
}

#[async_trait]
impl RecordStore for SqliteBackend {
    async fn create_many(
        &self,
        records: &[RecordWrite],
        options: &TransactionOptions,
    ) -> StorageResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let now = format_timestamp(&Utc::now());

        self.with_transaction(options, |tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO records (collection, id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
            )?;
            let mut inserted = 0u64;
            for record in records {
                let data = encode(record)?;
                inserted += stmt
                    .execute(params![record.collection, record.id, data, now])
                    .map_err(|e| {
                        internal_error(format!(
                            "Failed to insert record {}/{}: {}",
                            record.collection, record.id, e
                        ))
                    })? as u64;
            }
            Ok(inserted)
        })
    }

    async fn update_many(
        &self,
        records: &[RecordWrite],
        options: &TransactionOptions,
    ) -> StorageResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let now = format_timestamp(&Utc::now());

        self.with_transaction(options, |tx| {
            let mut stmt = tx.prepare_cached(
                "UPDATE records SET data = ?3, updated_at = ?4
                 WHERE collection = ?1 AND id = ?2",
            )?;
            let mut updated = 0u64;
            for record in records {
                let data = encode(record)?;
                updated += stmt
                    .execute(params![record.collection, record.id, data, now])
                    .map_err(|e| internal_error(format!("Failed to update record: {}", e)))?
                    as u64;
            }
            Ok(updated)
        })
    }

    async fn upsert_many(
        &self,
        records: &[RecordWrite],
        options: &TransactionOptions,
    ) -> StorageResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let now = format_timestamp(&Utc::now());

        self.with_transaction(options, |tx| {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO records (collection, id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(collection, id)
                 DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            )?;
            let mut written = 0u64;
            for record in records {
                let data = encode(record)?;
                written += stmt
                    .execute(params![record.collection, record.id, data, now])
                    .map_err(|e| internal_error(format!("Failed to upsert record: {}", e)))?
                    as u64;
            }
            Ok(written)
        })
    }

    async fn delete_many(
        &self,
        keys: &[RecordKey],
        options: &TransactionOptions,
    ) -> StorageResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        self.with_transaction(options, |tx| {
            let mut stmt =
                tx.prepare_cached("DELETE FROM records WHERE collection = ?1 AND id = ?2")?;
            let mut deleted = 0u64;
            for key in keys {
                deleted += stmt
                    .execute(params![key.collection, key.id])
                    .map_err(|e| internal_error(format!("Failed to delete record: {}", e)))?
                    as u64;
            }
            Ok(deleted)
        })
    }

    async fn find(&self, key: &RecordKey) -> StorageResult<Option<Record>> {
        let conn = self.get_connection()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM records WHERE collection = ?1 AND id = ?2",
                    RECORD_COLUMNS
                ),
                params![key.collection, key.id],
                read_raw,
            )
            .optional()
            .map_err(|e| internal_error(format!("Failed to read record: {}", e)))?;

        raw.map(into_record).transpose()
    }

    async fn find_many(&self, query: &RecordQuery) -> StorageResult<Vec<Record>> {
        let conn = self.get_connection()?;
        let (clause, mut values) = where_clause(query);

        let limit = query
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {} FROM records {} ORDER BY created_at, id LIMIT ?{} OFFSET ?{}",
            RECORD_COLUMNS,
            clause,
            values.len() + 1,
            values.len() + 2
        );
        values.push(SqlValue::Integer(limit));
        values.push(SqlValue::Integer(offset));

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| internal_error(format!("Failed to prepare query: {}", e)))?;
        let rows = stmt
            .query_map(params_from_iter(values), read_raw)
            .map_err(|e| internal_error(format!("Failed to query records: {}", e)))?;

        let mut records = Vec::new();
        for raw in rows {
            let raw = raw.map_err(|e| internal_error(format!("Failed to read row: {}", e)))?;
            records.push(into_record(raw)?);
        }
        Ok(records)
    }

    async fn count(&self, query: &RecordQuery) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        let (clause, values) = where_clause(query);

        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM records {}", clause),
                params_from_iter(values),
                |row| row.get(0),
            )
            .map_err(|e| internal_error(format!("Failed to count records: {}", e)))?;
        Ok(count.max(0) as u64)
    }
}
