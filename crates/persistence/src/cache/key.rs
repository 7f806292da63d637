//! Cache key conventions.
//!
//! Values live under `cache:<namespace>:<id>[:<suffix>]`. Dependency
//! bookkeeping for an invalidation channel lives under `trigger:<channel>`.

use std::fmt;

const CACHE_PREFIX: &str = "cache";
const TRIGGER_PREFIX: &str = "trigger";

/// A structured cache key.
///
/// ```
/// use chorus_persistence::cache::CacheKey;
///
/// let key = CacheKey::new("subscribers", "grace-chapel").with_suffix("active");
/// assert_eq!(key.to_string(), "cache:subscribers:grace-chapel:active");
/// assert_eq!(CacheKey::trigger("subscribers"), "trigger:subscribers");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    id: String,
    suffix: Option<String>,
}

impl CacheKey {
    /// Creates `cache:<namespace>:<id>`.
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
            suffix: None,
        }
    }

    /// Appends `:<suffix>`.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// The namespace segment.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The id segment.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The bookkeeping key for an invalidation channel.
    pub fn trigger(channel: &str) -> String {
        format!("{}:{}", TRIGGER_PREFIX, channel)
    }

    /// Parses a key in the `cache:` namespace.
    ///
    /// Everything after the id is the suffix, colons included.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.splitn(4, ':');
        if parts.next()? != CACHE_PREFIX {
            return None;
        }
        let namespace = parts.next().filter(|s| !s.is_empty())?;
        let id = parts.next().filter(|s| !s.is_empty())?;
        Some(Self {
            namespace: namespace.to_string(),
            id: id.to_string(),
            suffix: parts.next().map(str::to_string),
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", CACHE_PREFIX, self.namespace, self.id)?;
        if let Some(suffix) = &self.suffix {
            write!(f, ":{}", suffix)?;
        }
        Ok(())
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}
