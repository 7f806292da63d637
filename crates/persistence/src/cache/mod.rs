//! Cache-aside over a shared cache service.
//!
//! - [`CacheClient`] - the get/set/delete/publish/subscribe protocol
//! - [`InMemoryCacheClient`] - in-process implementation with TTLs and a broadcast bus
//! - [`CacheAside`] - best-effort read-through with trigger and broadcast invalidation
//! - [`CacheKey`] - `cache:<namespace>:<id>[:<suffix>]` and `trigger:<channel>` keys
//! - [`CacheMetrics`] - bounded, time-windowed hit/miss counters
//!
//! Cache errors are never surfaced from [`CacheAside::with_cache`]. They are
//! logged and counted, and the fetcher answers instead.

mod aside;
mod client;
mod key;
mod metrics;

pub use aside::{CacheAside, CacheConfig, CacheOptions, MAX_TTL_SECS};
pub use client::{CacheClient, CacheEntry, InMemoryCacheClient};
pub use key::CacheKey;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
