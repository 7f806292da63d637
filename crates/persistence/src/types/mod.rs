//! Core types for the data-access layer.
//!
//! This module provides the plain data types shared by the stores and services:
//!
//! - [`Record`], [`RecordWrite`], [`RecordKey`], [`RecordQuery`] - Generic tenant records
//! - [`DlqEntry`], [`NewDlqEntry`], [`DlqFilter`] - Dead-letter queue entries
//! - [`PageRequest`], [`Pagination`], [`Page`] - Page-based listing
//!
//! # Examples
//!
//! ```
//! use chorus_persistence::types::{DlqCategory, DlqFilter, DlqStatus, NewDlqEntry};
//! use serde_json::json;
//!
//! let entry = NewDlqEntry::new(
//!     DlqCategory::SmsSend,
//!     json!({"to": "+15550100", "body": "Service moved to 11am"}),
//!     "provider returned 503",
//! )
//! .with_external_id("SM123");
//!
//! let filter = DlqFilter::pending().with_category(DlqCategory::SmsSend);
//! assert_eq!(filter.status, Some(DlqStatus::Pending));
//! ```

mod dlq;
mod pagination;
mod record;

pub use dlq::{DlqCategory, DlqEntry, DlqFilter, DlqStats, DlqStatus, NewDlqEntry};
pub use pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageRequest, Pagination};
pub use record::{Record, RecordKey, RecordQuery, RecordWrite};
