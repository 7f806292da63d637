//! Generic tenant records targeted by batch and routed operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies one record inside a tenant store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Logical collection (`members`, `messages`, `groups`, ...).
    pub collection: String,
    /// Record identifier, unique within the collection.
    pub id: String,
}

impl RecordKey {
    /// Creates a record key.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

/// A record to be written (created, updated or upserted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordWrite {
    /// Logical collection.
    pub collection: String,
    /// Record identifier.
    pub id: String,
    /// JSON document body.
    pub data: Value,
}

impl RecordWrite {
    /// Creates a write with an explicit identifier.
    pub fn new(collection: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            data,
        }
    }

    /// Creates a write with a freshly generated identifier.
    pub fn generated(collection: impl Into<String>, data: Value) -> Self {
        Self::new(collection, uuid::Uuid::new_v4().to_string(), data)
    }

    /// Returns the key of this write.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.collection, &self.id)
    }
}

/// A record as stored in a tenant database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Logical collection.
    pub collection: String,
    /// Record identifier.
    pub id: String,
    /// JSON document body.
    pub data: Value,
    /// When the record was first written.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Returns the key of this record.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.collection, &self.id)
    }
}

/// A simple listing query over one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Collection to list.
    pub collection: String,
    /// Optional equality filter on a top-level JSON field.
    pub field_equals: Option<(String, Value)>,
    /// Maximum number of rows.
    pub limit: Option<u64>,
    /// Rows to skip.
    pub offset: u64,
}

impl RecordQuery {
    /// Lists a whole collection.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// Adds an equality filter on a top-level JSON field.
    pub fn where_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.field_equals = Some((field.into(), value));
        self
    }

    /// Limits the number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RecordWrite::generated("members", json!({}));
        let b = RecordWrite::generated("members", json!({}));
        assert_ne!(a.id, b.id);
        assert_eq!(a.key().collection, "members");
    }

    #[test]
    fn test_query_builder() {
        let q = RecordQuery::collection("members")
            .where_eq("group", json!("choir"))
            .limit(10)
            .offset(20);
        assert_eq!(q.collection, "members");
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.offset, 20);
        assert_eq!(q.field_equals, Some(("group".to_string(), json!("choir"))));
    }
}
