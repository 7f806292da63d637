//! Cache-aside reads and invalidation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};

use super::client::{CacheClient, CacheEntry};
use super::key::CacheKey;
use super::metrics::{CacheMetrics, CacheMetricsSnapshot};

/// zstd level used for cached values.
const COMPRESSION_LEVEL: i32 = 3;

/// Longest TTL written to the cache service.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Cache-aside configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for entries written without an explicit one.
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: u64,

    /// Serialized values larger than this are compressed.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold_bytes: usize,

    /// Length of one metrics window.
    #[serde(default = "default_metrics_window")]
    pub metrics_window_secs: u64,

    /// Number of metrics windows retained.
    #[serde(default = "default_metrics_windows")]
    pub metrics_windows: usize,

    /// Pub/sub channel carrying invalidations between instances.
    #[serde(default = "default_invalidation_channel")]
    pub invalidation_channel: String,
}

fn default_ttl() -> u64 {
    300
}

fn default_compression_threshold() -> usize {
    1024
}

fn default_metrics_window() -> u64 {
    60
}

fn default_metrics_windows() -> usize {
    60
}

fn default_invalidation_channel() -> String {
    "cache:invalidate".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl(),
            compression_threshold_bytes: default_compression_threshold(),
            metrics_window_secs: default_metrics_window(),
            metrics_windows: default_metrics_windows(),
            invalidation_channel: default_invalidation_channel(),
        }
    }
}

impl CacheConfig {
    /// Sets the default TTL.
    pub fn with_default_ttl_secs(mut self, secs: u64) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    /// Sets the compression threshold.
    pub fn with_compression_threshold_bytes(mut self, bytes: usize) -> Self {
        self.compression_threshold_bytes = bytes;
        self
    }

    /// Sets the invalidation channel.
    pub fn with_invalidation_channel(mut self, channel: impl Into<String>) -> Self {
        self.invalidation_channel = channel.into();
        self
    }
}

/// Per-read options for [`CacheAside::with_cache`].
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Overrides the configured TTL.
    pub ttl: Option<Duration>,
    /// Stores the value uncompressed even above the threshold.
    pub no_compress: bool,
    /// Channels whose trigger should invalidate this key.
    pub invalidate_on: Vec<String>,
}

impl CacheOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Disables compression.
    pub fn no_compress(mut self) -> Self {
        self.no_compress = true;
        self
    }

    /// Registers the key under an invalidation channel.
    pub fn invalidate_on(mut self, channel: impl Into<String>) -> Self {
        self.invalidate_on.push(channel.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct InvalidationMessage {
    keys: Vec<String>,
}

/// Best-effort cache in front of a fetcher.
///
/// The cache never turns a successful read into a failure: any error from the
/// cache service is logged, counted, and answered by calling the fetcher.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use chorus_persistence::cache::{CacheAside, CacheConfig, CacheKey, CacheOptions, InMemoryCacheClient};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = CacheAside::new(Arc::new(InMemoryCacheClient::new()), CacheConfig::default());
/// let key = CacheKey::new("groups", "grace-chapel").to_string();
///
/// let groups: Vec<String> = cache
///     .with_cache(&key, &CacheOptions::new().invalidate_on("groups"), || async {
///         Ok::<_, std::io::Error>(vec!["choir".to_string(), "youth".to_string()])
///     })
///     .await
///     .unwrap();
/// assert_eq!(groups.len(), 2);
///
/// cache.invalidate_trigger("groups").await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct CacheAside {
    client: Arc<dyn CacheClient>,
    config: CacheConfig,
    metrics: CacheMetrics,
}

impl CacheAside {
    /// Creates a cache over a client.
    pub fn new(client: Arc<dyn CacheClient>, config: CacheConfig) -> Self {
        let metrics = CacheMetrics::new(
            Duration::from_secs(config.metrics_window_secs),
            config.metrics_windows,
        );
        Self {
            client,
            config,
            metrics,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the client.
    pub fn client(&self) -> &Arc<dyn CacheClient> {
        &self.client
    }

    /// Returns hit/miss/error totals over the retained windows.
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns the cached value for `key`, or fetches and caches it.
    ///
    /// Errors from `fetcher` are returned unchanged and nothing is cached.
    pub async fn with_cache<T, E, F, Fut>(
        &self,
        key: &str,
        options: &CacheOptions,
        fetcher: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.client.get(key).await {
            Ok(Some(entry)) => match decode::<T>(&entry) {
                Ok(value) => {
                    self.metrics.record_hit();
                    debug!(key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    self.metrics.record_error();
                    warn!(key, error = %e, "Discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                self.metrics.record_error();
                warn!(key, error = %e, "Cache read failed, falling back to fetcher");
            }
        }

        self.metrics.record_miss();
        debug!(key, "Cache miss");
        let value = fetcher().await?;

        if let Err(e) = self.store(key, &value, options).await {
            self.metrics.record_error();
            warn!(key, error = %e, "Cache write failed");
        }
        Ok(value)
    }

    /// Deletes keys. Returns how many existed.
    pub async fn invalidate(&self, keys: &[String]) -> CacheResult<u64> {
        self.client.delete(keys).await
    }

    /// Records `key` as dependent on each channel's trigger.
    ///
    /// Dependents that have already expired are dropped from the list, and
    /// the trigger lives as long as its longest-lived dependent.
    pub async fn invalidate_on(&self, key: &str, channels: &[String]) -> CacheResult<()> {
        let key_ttl = match self.client.get(key).await? {
            Some(entry) => entry.ttl_secs,
            None => Some(self.config.default_ttl_secs),
        };

        for channel in channels {
            let trigger = CacheKey::trigger(channel);
            let mut live = vec![key.to_string()];
            let mut ttl_secs = key_ttl;
            for dependent in self.trigger_keys(&trigger).await? {
                if dependent == key {
                    continue;
                }
                if let Some(entry) = self.client.get(&dependent).await? {
                    ttl_secs = longest_ttl(ttl_secs, entry.ttl_secs);
                    live.push(dependent);
                }
            }

            let value = serde_json::to_vec(&live).map_err(serialization_error)?;
            self.client
                .set(CacheEntry {
                    key: trigger,
                    value,
                    ttl_secs,
                    compressed: false,
                })
                .await?;
        }
        Ok(())
    }

    /// Deletes every key registered under `channel`, and the trigger itself.
    pub async fn invalidate_trigger(&self, channel: &str) -> CacheResult<u64> {
        let trigger = CacheKey::trigger(channel);
        let mut keys = self.trigger_keys(&trigger).await?;
        let dependents = keys.len();
        keys.push(trigger);
        self.client.delete(&keys).await?;
        debug!(channel, dependents, "Trigger invalidated");
        Ok(dependents as u64)
    }

    /// Deletes `key` and its dependents. Best effort: a failed delete is
    /// returned but earlier deletes are not undone.
    pub async fn cascade_invalidate(&self, key: &str, dependents: &[String]) -> CacheResult<u64> {
        let mut keys = Vec::with_capacity(dependents.len() + 1);
        keys.push(key.to_string());
        keys.extend(dependents.iter().cloned());
        self.client.delete(&keys).await
    }

    /// Deletes keys and tells other instances to drop them too.
    pub async fn broadcast_invalidate(&self, keys: &[String]) -> CacheResult<()> {
        self.client.delete(keys).await?;
        let message = serde_json::to_string(&InvalidationMessage {
            keys: keys.to_vec(),
        })
        .map_err(serialization_error)?;
        self.client
            .publish(&self.config.invalidation_channel, &message)
            .await
    }

    /// Listens for broadcast invalidations.
    ///
    /// Each message's keys are deleted through this instance's client and then
    /// passed to `on_invalidate`, so in-process layers can drop them as well.
    /// The listener runs until the channel closes or the handle is aborted.
    pub async fn subscribe_cache_invalidation<F>(&self, on_invalidate: F) -> CacheResult<JoinHandle<()>>
    where
        F: Fn(Vec<String>) + Send + 'static,
    {
        let mut receiver = self
            .client
            .subscribe(&self.config.invalidation_channel)
            .await?;
        let client = Arc::clone(&self.client);
        let channel = self.config.invalidation_channel.clone();

        Ok(tokio::spawn(async move {
            loop {
                let message = match receiver.recv().await {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(channel = %channel, skipped, "Invalidation listener lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let keys = match serde_json::from_str::<InvalidationMessage>(&message) {
                    Ok(m) => m.keys,
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Ignoring malformed invalidation");
                        continue;
                    }
                };

                if let Err(e) = client.delete(&keys).await {
                    warn!(channel = %channel, error = %e, "Invalidation delete failed");
                }
                on_invalidate(keys);
            }
        }))
    }

    async fn store<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: &CacheOptions,
    ) -> CacheResult<()> {
        let serialized = serde_json::to_vec(value).map_err(serialization_error)?;
        let compress =
            !options.no_compress && serialized.len() > self.config.compression_threshold_bytes;
        let value = if compress {
            zstd::encode_all(serialized.as_slice(), COMPRESSION_LEVEL).map_err(|e| {
                CacheError::Compression {
                    message: e.to_string(),
                }
            })?
        } else {
            serialized
        };
        let ttl_secs = options
            .ttl
            .map(|ttl| ttl.as_secs())
            .unwrap_or(self.config.default_ttl_secs)
            .min(MAX_TTL_SECS);

        self.client
            .set(CacheEntry {
                key: key.to_string(),
                value,
                ttl_secs: Some(ttl_secs),
                compressed: compress,
            })
            .await?;

        if !options.invalidate_on.is_empty() {
            self.invalidate_on(key, &options.invalidate_on).await?;
        }
        Ok(())
    }

    async fn trigger_keys(&self, trigger: &str) -> CacheResult<Vec<String>> {
        match self.client.get(trigger).await? {
            Some(entry) => serde_json::from_slice(&entry.value).map_err(serialization_error),
            None => Ok(Vec::new()),
        }
    }
}

fn decode<T: DeserializeOwned>(entry: &CacheEntry) -> CacheResult<T> {
    if entry.compressed {
        let raw = zstd::decode_all(entry.value.as_slice()).map_err(|e| CacheError::Compression {
            message: e.to_string(),
        })?;
        serde_json::from_slice(&raw).map_err(serialization_error)
    } else {
        serde_json::from_slice(&entry.value).map_err(serialization_error)
    }
}

fn serialization_error(e: serde_json::Error) -> CacheError {
    CacheError::Serialization {
        message: e.to_string(),
    }
}

/// The longer of two TTLs, where `None` means no expiry.
fn longest_ttl(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}
