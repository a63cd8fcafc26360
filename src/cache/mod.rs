//! Key-value cache collaborator.
//!
//! The caching layer never keeps etag state itself: it asks a [`Cache`] whether
//! an etag was served before and tells it when a new one is. Any backend
//! (in-process, Redis, memcached) can sit behind the trait; [`MemoryCache`] is
//! the single-node default used when the application supplies none.
//!
//! Keys are namespaced by a segment so one backend can be shared by unrelated
//! users. Values are [`serde_json::Value`]s, so applications can keep their own
//! entries next to the etag ledger.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::middleware::BoxFuture;

pub mod memory;

pub use memory::{DEFAULT_MAX_ENTRIES, MemoryCache};

/// Errors reported by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// A cache key: an id inside a segment (namespace).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub id: String,
    pub segment: String,
}

impl CacheKey {
    pub fn new(id: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            segment: segment.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.id)
    }
}

/// A value read back from the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedItem {
    /// The stored value.
    pub item: Value,
    /// When the entry was written, in milliseconds since the Unix epoch.
    pub stored: u64,
    /// The time-to-live the entry was written with, in milliseconds.
    pub ttl: u64,
}

impl CachedItem {
    /// Whether the stored value counts as set: anything except `null`,
    /// `false`, zero and the empty string.
    pub fn is_truthy(&self) -> bool {
        match &self.item {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

/// An asynchronous get/set key-value store.
///
/// Every call completes with exactly one success or one error. Implementations
/// own their concurrency discipline: the same instance is shared by every
/// in-flight request.
pub trait Cache: Send + Sync {
    /// Looks up `key`. Expired and missing entries are both `Ok(None)`.
    fn get<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, CacheResult<Option<CachedItem>>>;

    /// Stores `value` under `key` for `ttl`.
    fn set<'a>(&'a self, key: CacheKey, value: Value, ttl: Duration)
    -> BoxFuture<'a, CacheResult<()>>;

    /// Removes `key` if present.
    fn delete<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, CacheResult<()>>;

    /// Whether a live entry exists for `key`.
    fn has<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, CacheResult<bool>> {
        Box::pin(async move { Ok(self.get(key).await?.is_some()) })
    }
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
