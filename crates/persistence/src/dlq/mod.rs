//! Dead-letter queue service.
//!
//! [`DeadLetterQueue`] is the per-tenant record of outbound operations that
//! failed beyond automatic recovery. It resolves the tenant on every call and
//! writes through the tenant's own store, so queues of different tenants never
//! contend with each other.
//!
//! Only `RESOLVED` entries are ever purged. `PENDING` and `DEAD_LETTER`
//! entries are kept for audit.

mod queue;

pub use queue::{DeadLetterQueue, ReplayOutcome};
