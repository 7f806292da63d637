//! Batch outcome reporting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A chunk that failed while errors were being ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    /// Zero-based position of the chunk in the batch.
    pub chunk_index: usize,
    /// Error message.
    pub error: String,
}

/// Summary of one batch call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOperationResult {
    /// Items in chunks that committed.
    pub successful: usize,
    /// Items in chunks that failed.
    pub failed: usize,
    /// Items submitted.
    pub total: usize,
    /// Rows the store reported as changed.
    pub affected: u64,
    /// Failed chunks, in chunk order.
    pub errors: Vec<ChunkFailure>,
    /// Wall-clock time for the whole call.
    pub total_duration: Duration,
    /// Mean time per chunk.
    pub average_duration_per_chunk: Duration,
}

impl BatchOperationResult {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Fraction of items that landed, 1.0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.successful as f64 / self.total as f64
        }
    }

    /// Returns `true` if every chunk committed.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.successful == self.total
    }

    pub(crate) fn finish(&mut self, elapsed: Duration, chunks: usize) {
        self.total_duration = elapsed;
        self.average_duration_per_chunk = match u32::try_from(chunks) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => elapsed / n,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut result = BatchOperationResult::new(4);
        result.successful = 3;
        result.failed = 1;
        assert!((result.success_rate() - 0.75).abs() < f64::EPSILON);
        assert!(!result.is_complete());

        assert_eq!(BatchOperationResult::new(0).success_rate(), 1.0);
    }

    #[test]
    fn test_average_duration() {
        let mut result = BatchOperationResult::new(10);
        result.finish(Duration::from_millis(300), 3);
        assert_eq!(result.average_duration_per_chunk, Duration::from_millis(100));

        result.finish(Duration::from_millis(300), 0);
        assert_eq!(result.average_duration_per_chunk, Duration::ZERO);
    }
}
