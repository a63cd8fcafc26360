//! Configuration for the caching layer.

use std::{fmt, sync::Arc};

use serde::Deserialize;

use crate::cache::Cache;

/// Segment etags are recorded under when none is configured.
pub const DEFAULT_CACHE_SEGMENT: &str = "fastify-caching";

/// Well-known `Cache-Control` privacy directives.
///
/// Any other string is accepted as a privacy value and emitted verbatim.
pub mod privacy {
    pub const NO_CACHE: &str = "no-cache";
    pub const PUBLIC: &str = "public";
    pub const PRIVATE: &str = "private";
}

/// Options recognised by [`Caching`](super::Caching).
///
/// Deserializes from camelCase keys, so configuration written for other
/// deployments of the same policy can be loaded as-is:
///
/// ```
/// use rttp_caching::caching::CachingOptions;
///
/// let options: CachingOptions = serde_json::from_str(
///     r#"{ "privacy": "public", "expiresIn": 300, "serverExpiresIn": 600 }"#,
/// ).unwrap();
/// assert_eq!(options.expires_in, Some(300));
/// assert_eq!(options.cache_segment, "fastify-caching");
/// ```
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CachingOptions {
    /// `max-age` in seconds.
    pub expires_in: Option<u64>,
    /// `s-maxage` in seconds; only emitted for `public` responses.
    pub server_expires_in: Option<u64>,
    /// Privacy directive that starts the `Cache-Control` value. Without one,
    /// no `Cache-Control` header is set at all.
    pub privacy: Option<String>,
    /// Namespace for etag keys inside the cache.
    pub cache_segment: String,
    /// Backend for the etag ledger; an in-process cache when `None`.
    #[serde(skip)]
    pub cache: Option<Arc<dyn Cache>>,
}

impl CachingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    #[must_use]
    pub fn server_expires_in(mut self, seconds: u64) -> Self {
        self.server_expires_in = Some(seconds);
        self
    }

    #[must_use]
    pub fn privacy(mut self, privacy: impl Into<String>) -> Self {
        self.privacy = Some(privacy.into());
        self
    }

    #[must_use]
    pub fn cache_segment(mut self, segment: impl Into<String>) -> Self {
        self.cache_segment = segment.into();
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl Default for CachingOptions {
    fn default() -> Self {
        Self {
            expires_in: None,
            server_expires_in: None,
            privacy: None,
            cache_segment: DEFAULT_CACHE_SEGMENT.to_owned(),
            cache: None,
        }
    }
}

impl fmt::Debug for CachingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingOptions")
            .field("expires_in", &self.expires_in)
            .field("server_expires_in", &self.server_expires_in)
            .field("privacy", &self.privacy)
            .field("cache_segment", &self.cache_segment)
            .field("cache", &self.cache.as_ref().map(|_| "<custom>"))
            .finish()
    }
}
