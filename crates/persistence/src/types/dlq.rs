//! Dead-letter queue entry types.
//!
//! An entry is the failure record of last resort for an outbound operation
//! that exhausted its retry budget. Entries move through a one-way state
//! machine:
//!
//! ```text
//! PENDING --(replay succeeds)--> RESOLVED
//! PENDING --(operator)---------> DEAD_LETTER
//! PENDING --(replay fails)-----> PENDING (retry_count + 1)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of the failed operation.
///
/// Callers must classify a failure into one of these before persisting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqCategory {
    /// Outbound SMS delivery.
    SmsSend,
    /// Inbound provider webhook processing.
    WebhookInbound,
    /// Subscription state synchronisation.
    SubscriptionUpdate,
    /// Payment processing.
    PaymentProcess,
}

impl DlqCategory {
    /// All categories, in declaration order.
    pub const ALL: [DlqCategory; 4] = [
        DlqCategory::SmsSend,
        DlqCategory::WebhookInbound,
        DlqCategory::SubscriptionUpdate,
        DlqCategory::PaymentProcess,
    ];

    /// Returns the stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            DlqCategory::SmsSend => "SMS_SEND",
            DlqCategory::WebhookInbound => "WEBHOOK_INBOUND",
            DlqCategory::SubscriptionUpdate => "SUBSCRIPTION_UPDATE",
            DlqCategory::PaymentProcess => "PAYMENT_PROCESS",
        }
    }
}

impl fmt::Display for DlqCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DlqCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DlqCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown dead-letter category: {}", s))
    }
}

/// Status of a dead-letter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqStatus {
    /// Awaiting replay or operator judgment.
    #[default]
    Pending,
    /// A replay succeeded.
    Resolved,
    /// An operator gave up on the entry.
    DeadLetter,
}

impl DlqStatus {
    /// All statuses, in declaration order.
    pub const ALL: [DlqStatus; 3] = [DlqStatus::Pending, DlqStatus::Resolved, DlqStatus::DeadLetter];

    /// Returns the stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            DlqStatus::Pending => "PENDING",
            DlqStatus::Resolved => "RESOLVED",
            DlqStatus::DeadLetter => "DEAD_LETTER",
        }
    }

    /// Returns `true` if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DlqStatus::Pending)
    }

    /// Returns `true` if an entry in this status may move to `next`.
    ///
    /// Only `PENDING` entries move, and never back to `PENDING`.
    pub fn can_transition_to(&self, next: DlqStatus) -> bool {
        matches!(
            (self, next),
            (DlqStatus::Pending, DlqStatus::Resolved) | (DlqStatus::Pending, DlqStatus::DeadLetter)
        )
    }
}

impl fmt::Display for DlqStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DlqStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DlqStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown dead-letter status: {}", s))
    }
}

/// A persisted dead-letter entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    /// Entry identifier.
    pub id: String,
    /// Operation category.
    pub category: DlqCategory,
    /// Provider-side identifier (message SID, payment intent, ...).
    pub external_id: Option<String>,
    /// The payload of the failed operation, sufficient to replay it.
    pub original_payload: Value,
    /// Message of the last error.
    pub error_message: String,
    /// Detailed error chain of the last error.
    pub error_stack: Option<String>,
    /// Free-form metadata (resolution notes, operator reason, ...).
    pub metadata: Value,
    /// Number of replay attempts made after the entry was created.
    pub retry_count: u32,
    /// Current status.
    pub status: DlqStatus,
    /// When the operation first failed.
    pub first_attempt_at: DateTime<Utc>,
    /// When the operation was last attempted.
    pub last_attempt_at: DateTime<Utc>,
}

/// The caller-provided part of a new dead-letter entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDlqEntry {
    /// Operation category.
    pub category: DlqCategory,
    /// Provider-side identifier.
    pub external_id: Option<String>,
    /// The payload of the failed operation.
    pub original_payload: Value,
    /// Message of the last error.
    pub error_message: String,
    /// Detailed error chain of the last error.
    pub error_stack: Option<String>,
    /// Free-form metadata.
    pub metadata: Value,
    /// Number of attempts already made before the entry was created.
    pub retry_count: u32,
    /// When the operation first failed (defaults to now).
    pub first_attempt_at: Option<DateTime<Utc>>,
}

impl NewDlqEntry {
    /// Creates a new entry for a failed operation.
    pub fn new(category: DlqCategory, original_payload: Value, error_message: impl Into<String>) -> Self {
        Self {
            category,
            external_id: None,
            original_payload,
            error_message: error_message.into(),
            error_stack: None,
            metadata: Value::Object(Default::default()),
            retry_count: 0,
            first_attempt_at: None,
        }
    }

    /// Builds an entry from an error, capturing its source chain as the stack.
    pub fn from_error(
        category: DlqCategory,
        original_payload: Value,
        error: &(dyn std::error::Error + 'static),
    ) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        let mut entry = Self::new(category, original_payload, error.to_string());
        if !chain.is_empty() {
            entry.error_stack = Some(chain.join("\ncaused by: "));
        }
        entry
    }

    /// Sets the provider-side identifier.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Sets the metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the error stack.
    pub fn with_error_stack(mut self, stack: impl Into<String>) -> Self {
        self.error_stack = Some(stack.into());
        self
    }

    /// Sets the number of attempts already made.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets when the operation first failed.
    pub fn with_first_attempt_at(mut self, at: DateTime<Utc>) -> Self {
        self.first_attempt_at = Some(at);
        self
    }
}

/// Filter for listing dead-letter entries. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlqFilter {
    /// Restrict to one category.
    pub category: Option<DlqCategory>,
    /// Restrict to one status.
    pub status: Option<DlqStatus>,
    /// Restrict to one provider-side identifier.
    pub external_id: Option<String>,
}

impl DlqFilter {
    /// Matches all entries.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to pending entries.
    pub fn pending() -> Self {
        Self::default().with_status(DlqStatus::Pending)
    }

    /// Restricts to one category.
    pub fn with_category(mut self, category: DlqCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Restricts to one status.
    pub fn with_status(mut self, status: DlqStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to one provider-side identifier.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

/// Entry counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DlqStats {
    /// Number of pending entries.
    pub pending: u64,
    /// Number of resolved entries.
    pub resolved: u64,
    /// Number of dead-lettered entries.
    pub dead_letter: u64,
}

impl DlqStats {
    /// Total number of entries.
    pub fn total(&self) -> u64 {
        self.pending + self.resolved + self.dead_letter
    }
}
