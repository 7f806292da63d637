//! Time-windowed cache counters.
//!
//! Counts are kept in a ring of fixed-length windows. Memory stays constant
//! no matter how many keys or how long the process runs; counts older than
//! the ring fall off.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u64,
    misses: u64,
    errors: u64,
}

impl Window {
    fn new(started: Instant) -> Self {
        Self {
            started,
            hits: 0,
            misses: 0,
            errors: 0,
        }
    }
}

/// Totals over the retained windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetricsSnapshot {
    /// Reads served from the cache.
    pub hits: u64,
    /// Reads that went to the fetcher.
    pub misses: u64,
    /// Cache backend failures that were recovered from.
    pub errors: u64,
}

impl CacheMetricsSnapshot {
    /// Hits over hits plus misses, 0.0 with no traffic.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Counter {
    Hit,
    Miss,
    Error,
}

/// Bounded hit/miss/error counters.
#[derive(Debug)]
pub struct CacheMetrics {
    window: Duration,
    capacity: usize,
    windows: Mutex<VecDeque<Window>>,
}

impl CacheMetrics {
    /// Creates counters keeping `capacity` windows of `window` each.
    pub fn new(window: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: window.max(Duration::from_millis(1)),
            capacity,
            windows: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Counts a cache hit.
    pub fn record_hit(&self) {
        self.record(Counter::Hit);
    }

    /// Counts a cache miss.
    pub fn record_miss(&self) {
        self.record(Counter::Miss);
    }

    /// Counts a recovered backend error.
    pub fn record_error(&self) {
        self.record(Counter::Error);
    }

    /// Sums the windows still inside the retention horizon.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        self.expire(&mut windows, now);
        windows
            .iter()
            .fold(CacheMetricsSnapshot::default(), |mut acc, w| {
                acc.hits += w.hits;
                acc.misses += w.misses;
                acc.errors += w.errors;
                acc
            })
    }

    /// Number of windows currently held.
    pub fn window_count(&self) -> usize {
        self.windows.lock().len()
    }

    /// Drops every count.
    pub fn reset(&self) {
        self.windows.lock().clear();
    }

    fn record(&self, counter: Counter) {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        self.expire(&mut windows, now);

        let open = windows
            .back()
            .is_some_and(|w| now.duration_since(w.started) < self.window);
        if !open {
            if windows.len() == self.capacity {
                windows.pop_front();
            }
            windows.push_back(Window::new(now));
        }

        if let Some(w) = windows.back_mut() {
            match counter {
                Counter::Hit => w.hits += 1,
                Counter::Miss => w.misses += 1,
                Counter::Error => w.errors += 1,
            }
        }
    }

    fn expire(&self, windows: &mut VecDeque<Window>, now: Instant) {
        let horizon = self.window * u32::try_from(self.capacity).unwrap_or(u32::MAX);
        while let Some(front) = windows.front() {
            if now.duration_since(front.started) >= horizon {
                windows.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_counts_within_window() {
        let metrics = CacheMetrics::new(Duration::from_secs(60), 3);
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();

        let snap = metrics.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert!((snap.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.window_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ring_is_bounded() {
        let metrics = CacheMetrics::new(Duration::from_secs(1), 3);
        for _ in 0..10 {
            metrics.record_miss();
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert!(metrics.window_count() <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_windows_expire() {
        let metrics = CacheMetrics::new(Duration::from_secs(10), 2);
        metrics.record_hit();
        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(metrics.snapshot(), CacheMetricsSnapshot::default());
    }

    #[test]
    fn test_empty_hit_rate() {
        assert_eq!(CacheMetricsSnapshot::default().hit_rate(), 0.0);
    }
}
