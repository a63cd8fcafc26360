//! HTTP response caching: `Cache-Control`, `Expires`, and ETag conditional GET.
//!
//! [`Caching`] is built once from [`CachingOptions`] and installed into a
//! [`Pipeline`]:
//!
//! - the `Cache-Control` value is computed up front and added to every
//!   response that lacks one ([`CacheControlMiddleware`]);
//! - requests presenting an `If-None-Match` etag the cache still remembers are
//!   answered `304 Not Modified` before the handler runs, and etags assigned
//!   with [`CachingReply::etag`] are remembered on the way out
//!   ([`ConditionalGetMiddleware`]).
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use rttp_caching::{Pipeline, Request, Response, StatusCode};
//! use rttp_caching::caching::{Caching, CachingOptions, CachingReply, privacy};
//! use rttp_caching::http::Method;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let caching = Caching::new(CachingOptions::new().privacy(privacy::PRIVATE).expires_in(300));
//! let app = caching.install(Pipeline::new(|_ctx| async {
//!     Response::new(StatusCode::Ok).etag("v1", Duration::from_secs(60)).body("hello")
//! }));
//!
//! let first = app.handle(Request::new(Method::Get, "/")).await;
//! assert_eq!(first.headers().get("cache-control"), Some("private, max-age=300"));
//!
//! let again = app
//!     .handle(Request::new(Method::Get, "/").with_header("If-None-Match", "v1"))
//!     .await;
//! assert_eq!(again.status(), StatusCode::NotModified);
//! # }
//! ```

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::{
    Response, StatusCode,
    cache::{Cache, CacheError, CacheKey, MemoryCache},
    middleware::Pipeline,
};

pub mod cache_control;
pub mod conditional;
pub mod options;
pub mod reply;

pub use cache_control::{CacheControlMiddleware, cache_control_value};
pub use conditional::{ConditionalGetMiddleware, EtagLedger};
pub use options::{CachingOptions, DEFAULT_CACHE_SEGMENT, privacy};
pub use reply::{
    CachingReply, DEFAULT_ETAG_LIFETIME, EtagLifetime, Expires, INVALID_DATE, http_date, random_etag,
};

/// A cache operation failed while evaluating or recording an etag.
///
/// Never recovered locally: the affected request is answered with a `500`
/// through [`into_response`](Self::into_response).
#[derive(Debug, Error)]
pub enum CachingError {
    #[error("failed to look up etag {key}: {source}")]
    Lookup { key: CacheKey, source: CacheError },

    #[error("failed to record etag {key}: {source}")]
    Store { key: CacheKey, source: CacheError },
}

impl CachingError {
    /// Renders the error as a JSON `500 Internal Server Error` response.
    pub fn into_response(self) -> Response {
        let status = StatusCode::InternalServerError;
        let body = json!({
            "statusCode": status.as_u16(),
            "error": status.canonical_reason(),
            "message": self.to_string(),
        });
        Response::json(status, &body)
            .unwrap_or_else(|_| Response::new(status).body(status.canonical_reason()))
    }
}

impl From<CachingError> for Response {
    fn from(err: CachingError) -> Self {
        err.into_response()
    }
}

/// The caching layer, built once and installed into a pipeline.
///
/// [`install`](Self::install) consumes the value, so each `Caching` can be
/// registered exactly once.
pub struct Caching {
    cache_control: Option<Arc<str>>,
    ledger: EtagLedger,
}

impl Caching {
    /// Computes the `Cache-Control` value and sets up the etag ledger,
    /// falling back to a [`MemoryCache`] when `options` carries no cache.
    pub fn new(options: CachingOptions) -> Self {
        let cache_control = cache_control_value(&options).map(Arc::from);
        let cache: Arc<dyn Cache> = match options.cache {
            Some(cache) => cache,
            None => Arc::new(MemoryCache::new()),
        };

        tracing::debug!(
            cache_control = ?cache_control,
            segment = %options.cache_segment,
            "caching configured"
        );

        Self {
            cache_control,
            ledger: EtagLedger::new(cache, options.cache_segment),
        }
    }

    /// The `Cache-Control` value added to responses, if any.
    pub fn cache_control(&self) -> Option<&str> {
        self.cache_control.as_deref()
    }

    pub fn ledger(&self) -> &EtagLedger {
        &self.ledger
    }

    /// The cache backing the etag ledger, for application use.
    pub fn cache(&self) -> &Arc<dyn Cache> {
        self.ledger.cache()
    }

    pub fn segment(&self) -> &str {
        self.ledger.segment()
    }

    /// Appends the caching middleware to `pipeline`: `Cache-Control` first,
    /// so it also decorates `304` short-circuits, then conditional GET.
    pub fn install(self, pipeline: Pipeline) -> Pipeline {
        let pipeline = match self.cache_control {
            Some(value) => pipeline.with(CacheControlMiddleware::new(value)),
            None => pipeline,
        };
        pipeline.with(ConditionalGetMiddleware::new(self.ledger))
    }
}

impl Default for Caching {
    fn default() -> Self {
        Self::new(CachingOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{Request, http::Method};

    fn app(caching: Caching) -> Pipeline {
        caching.install(Pipeline::new(|_ctx| async {
            Response::new(StatusCode::Ok)
                .etag("123456", Duration::from_millis(300))
                .body("hello")
        }))
    }

    #[test]
    fn default_has_no_cache_control() {
        let caching = Caching::default();
        assert_eq!(caching.cache_control(), None);
        assert_eq!(caching.segment(), DEFAULT_CACHE_SEGMENT);
    }

    #[tokio::test]
    async fn injected_cache_is_used() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let caching = Caching::new(
            CachingOptions::new()
                .cache(Arc::clone(&cache))
                .cache_segment("articles"),
        );
        assert!(Arc::ptr_eq(caching.cache(), &cache));

        let app = app(caching);
        app.handle(Request::new(Method::Get, "/")).await;
        let key = CacheKey::new("123456", "articles");
        assert!(cache.has(&key).await.unwrap());
    }

    #[tokio::test]
    async fn install_without_privacy_adds_one_layer() {
        let app = app(Caching::default());
        assert_eq!(app.len(), 1);
        let res = app.handle(Request::new(Method::Get, "/")).await;
        assert!(!res.headers().contains("cache-control"));
        assert_eq!(res.headers().get("etag"), Some("123456"));
    }

    #[tokio::test]
    async fn not_modified_still_carries_cache_control() {
        let caching = Caching::new(CachingOptions::new().privacy(privacy::NO_CACHE));
        let app = app(caching);
        assert_eq!(app.len(), 2);

        app.handle(Request::new(Method::Get, "/")).await;
        let res = app
            .handle(Request::new(Method::Get, "/").with_header("If-None-Match", "123456"))
            .await;
        assert_eq!(res.status(), StatusCode::NotModified);
        assert_eq!(res.headers().get("cache-control"), Some("no-cache"));
    }

    #[test]
    fn error_response_is_json_500() {
        let err = CachingError::Lookup {
            key: CacheKey::new("abc", "seg"),
            source: CacheError::Unavailable("down".into()),
        };
        let res: Response = err.into();
        assert_eq!(res.status(), StatusCode::InternalServerError);
        let body: serde_json::Value = serde_json::from_slice(res.body_ref()).unwrap();
        assert_eq!(body["statusCode"], 500);
        assert_eq!(
            body["message"],
            "failed to look up etag seg:abc: cache backend unavailable: down"
        );
    }
}
