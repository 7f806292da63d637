//! Shared cache service protocol.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::CacheResult;

/// Capacity of each in-memory pub/sub channel.
const CHANNEL_CAPACITY: usize = 256;

/// A value as held by the cache service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Full cache key.
    pub key: String,
    /// Serialized value, zstd-compressed if `compressed` is set.
    pub value: Vec<u8>,
    /// Time to live. `None` keeps the entry until deleted.
    pub ttl_secs: Option<u64>,
    /// Whether `value` is compressed.
    pub compressed: bool,
}

/// Minimal key-value and pub/sub protocol of the shared cache.
#[async_trait]
pub trait CacheClient: Send + Sync + Debug {
    /// Reads a live entry.
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Writes an entry, replacing any previous value.
    async fn set(&self, entry: CacheEntry) -> CacheResult<()>;

    /// Deletes keys. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// Publishes a message on a channel.
    async fn publish(&self, channel: &str, message: &str) -> CacheResult<()>;

    /// Subscribes to a channel.
    async fn subscribe(&self, channel: &str) -> CacheResult<broadcast::Receiver<String>>;
}

#[derive(Debug)]
struct Stored {
    entry: CacheEntry,
    expires_at: Option<Instant>,
}

impl Stored {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Debug, Default)]
struct Shared {
    entries: RwLock<HashMap<String, Stored>>,
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

/// In-process cache client.
///
/// Clones share the same entries and channels, so two clones stand in for
/// two application instances talking to one cache service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheClient {
    shared: Arc<Shared>,
}

impl InMemoryCacheClient {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.shared
            .entries
            .read()
            .values()
            .filter(|s| s.is_live(now))
            .count()
    }

    /// Returns `true` if no live entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired entries.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.shared.entries.write();
        let before = entries.len();
        entries.retain(|_, s| s.is_live(now));
        before - entries.len()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        if let Some(sender) = self.shared.channels.read().get(channel) {
            return sender.clone();
        }
        self.shared
            .channels
            .write()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl CacheClient for InMemoryCacheClient {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let now = Instant::now();
        let entries = self.shared.entries.read();
        Ok(entries
            .get(key)
            .filter(|s| s.is_live(now))
            .map(|s| s.entry.clone()))
    }

    async fn set(&self, entry: CacheEntry) -> CacheResult<()> {
        // A TTL past the clock's range never expires
        let expires_at = entry
            .ttl_secs
            .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs)));
        self.shared
            .entries
            .write()
            .insert(entry.key.clone(), Stored { entry, expires_at });
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let now = Instant::now();
        let mut entries = self.shared.entries.write();
        let mut removed = 0;
        for key in keys {
            if let Some(stored) = entries.remove(key) {
                if stored.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn publish(&self, channel: &str, message: &str) -> CacheResult<()> {
        // Sending with no subscribers is not an error for a pub/sub bus
        let _ = self.sender(channel).send(message.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> CacheResult<broadcast::Receiver<String>> {
        Ok(self.sender(channel).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, ttl_secs: Option<u64>) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            value: b"{}".to_vec(),
            ttl_secs,
            compressed: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let client = InMemoryCacheClient::new();
        client.set(entry("cache:a:1", Some(5))).await.unwrap();
        client.set(entry("cache:a:2", None)).await.unwrap();
        assert!(client.get("cache:a:1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(client.get("cache:a:1").await.unwrap().is_none());
        assert!(client.get("cache:a:2").await.unwrap().is_some());
        assert_eq!(client.len(), 1);
        assert_eq!(client.purge_expired(), 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_expire() {
        let client = InMemoryCacheClient::new();
        client.set(entry("cache:a:1", Some(u64::MAX))).await.unwrap();
        assert!(client.get("cache:a:1").await.unwrap().is_some());
        assert_eq!(client.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_delete_counts_existing() {
        let client = InMemoryCacheClient::new();
        client.set(entry("cache:a:1", None)).await.unwrap();
        let removed = client
            .delete(&["cache:a:1".to_string(), "cache:a:missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_pubsub() {
        let a = InMemoryCacheClient::new();
        let b = a.clone();
        let mut rx = b.subscribe("cache:invalidate").await.unwrap();

        a.publish("cache:invalidate", "hello").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");

        // No subscribers on this channel
        a.publish("elsewhere", "dropped").await.unwrap();
    }
}
