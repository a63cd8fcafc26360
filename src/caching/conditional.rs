//! Conditional GET backed by the etag ledger.
//!
//! Inbound, a request carrying `If-None-Match` is answered with
//! `304 Not Modified` when the cache says that etag was served and is still
//! live; the application handler never runs. Outbound, a response that was
//! given an etag through [`CachingReply::etag`](super::CachingReply::etag) has
//! it recorded for the requested lifetime.
//!
//! `If-None-Match` is compared as one opaque string: no list splitting and no
//! weak (`W/`) comparison. Repeated header lines are joined with `", "` first.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use super::{CachingError, reply::EtagLifetime};
use crate::{
    Response, StatusCode,
    cache::{Cache, CacheKey},
    context::Context,
    http::header,
    middleware::{BoxFuture, Middleware, Next},
};

/// The shared cache seen through one segment, used as a record of served etags.
///
/// Also inserted into every request [`Context`] by
/// [`ConditionalGetMiddleware`], so handlers can reach the cache.
#[derive(Clone)]
pub struct EtagLedger {
    cache: Arc<dyn Cache>,
    segment: Arc<str>,
}

impl EtagLedger {
    pub fn new(cache: Arc<dyn Cache>, segment: impl Into<Arc<str>>) -> Self {
        Self {
            cache,
            segment: segment.into(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn key(&self, etag: &str) -> CacheKey {
        CacheKey::new(etag, &*self.segment)
    }

    /// Whether `etag` was recorded and has not expired. Issues exactly one
    /// cache lookup.
    pub async fn is_fresh(&self, etag: &str) -> Result<bool, CachingError> {
        let key = self.key(etag);
        match self.cache.get(&key).await {
            Ok(cached) => Ok(cached.is_some_and(|item| item.is_truthy())),
            Err(source) => Err(CachingError::Lookup { key, source }),
        }
    }

    /// Records the etag of `response`, consuming its [`EtagLifetime`].
    ///
    /// Returns `Ok(false)` without touching the cache when the response has no
    /// etag, no lifetime, or a zero lifetime.
    pub async fn remember(&self, response: &mut Response) -> Result<bool, CachingError> {
        let lifetime = response.extensions_mut().remove::<EtagLifetime>();
        let etag = response
            .headers()
            .get(header::ETAG)
            .filter(|etag| !etag.is_empty());

        let (Some(etag), Some(EtagLifetime(ttl))) = (etag, lifetime) else {
            return Ok(false);
        };
        if ttl.is_zero() {
            return Ok(false);
        }

        let key = self.key(etag);
        match self.cache.set(key.clone(), Value::Bool(true), ttl).await {
            Ok(()) => {
                debug!(key = %key, ttl = ?ttl, "etag recorded");
                Ok(true)
            }
            Err(source) => Err(CachingError::Store { key, source }),
        }
    }
}

/// Answers repeat requests for a known etag with `304 Not Modified` and
/// records etags assigned by the application.
///
/// A cache failure on either side turns into a `500` for that request only.
#[derive(Clone)]
pub struct ConditionalGetMiddleware {
    ledger: EtagLedger,
}

impl ConditionalGetMiddleware {
    pub fn new(ledger: EtagLedger) -> Self {
        Self { ledger }
    }
}

// Repeated `If-None-Match` lines are joined with ", " into one opaque key.
fn if_none_match(ctx: &Context) -> Option<String> {
    let lines: Vec<&str> = ctx
        .request()
        .headers()
        .get_all(header::IF_NONE_MATCH)
        .collect();
    let joined = lines.join(", ");
    (!joined.is_empty()).then_some(joined)
}

impl Middleware for ConditionalGetMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxFuture<'static, Response> {
        let ledger = self.ledger.clone();
        Box::pin(async move {
            if let Some(etag) = if_none_match(&ctx) {
                match ledger.is_fresh(&etag).await {
                    Ok(true) => {
                        debug!(etag = %etag, segment = %ledger.segment(), "etag hit, not modified");
                        return Response::new(StatusCode::NotModified);
                    }
                    Ok(false) => {
                        debug!(etag = %etag, segment = %ledger.segment(), "etag miss");
                    }
                    Err(err) => {
                        error!(error = %err, "conditional GET lookup failed");
                        return err.into_response();
                    }
                }
            }

            ctx.extensions_mut().insert(ledger.clone());
            let mut response = next.run(ctx).await;

            if let Err(err) = ledger.remember(&mut response).await {
                error!(error = %err, "failed to record etag");
                return err.into_response();
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::{
        Pipeline, Request,
        cache::{CacheError, CacheResult, CachedItem, MemoryCache},
        caching::CachingReply,
        http::Method,
    };

    /// Counts calls and optionally fails them.
    #[derive(Default)]
    struct ScriptedCache {
        inner: MemoryCache,
        fail_get: bool,
        fail_set: bool,
        gets: AtomicUsize,
        sets: AtomicUsize,
    }

    impl Cache for ScriptedCache {
        fn get<'a>(
            &'a self,
            key: &'a CacheKey,
        ) -> BoxFuture<'a, CacheResult<Option<CachedItem>>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail_get {
                return Box::pin(async {
                    Err(CacheError::Unavailable("cache.get always errors".into()))
                });
            }
            self.inner.get(key)
        }

        fn set<'a>(
            &'a self,
            key: CacheKey,
            value: Value,
            ttl: Duration,
        ) -> BoxFuture<'a, CacheResult<()>> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            if self.fail_set {
                return Box::pin(async {
                    Err(CacheError::Unavailable("cache.set always errors".into()))
                });
            }
            self.inner.set(key, value, ttl)
        }

        fn delete<'a>(&'a self, key: &'a CacheKey) -> BoxFuture<'a, CacheResult<()>> {
            self.inner.delete(key)
        }
    }

    fn pipeline(cache: Arc<ScriptedCache>, hits: Arc<AtomicUsize>) -> Pipeline {
        let ledger = EtagLedger::new(cache, "test");
        Pipeline::new(move |_ctx| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Response::new(StatusCode::Ok)
                    .etag("123456", Duration::from_millis(1000))
                    .body("fresh")
            }
        })
        .with(ConditionalGetMiddleware::new(ledger))
    }

    fn get(if_none_match: Option<&str>) -> Request {
        let request = Request::new(Method::Get, "/");
        match if_none_match {
            Some(etag) => request.with_header("If-None-Match", etag),
            None => request,
        }
    }

    #[tokio::test]
    async fn no_header_never_consults_cache() {
        let cache = Arc::new(ScriptedCache::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let app = pipeline(Arc::clone(&cache), Arc::clone(&hits));

        let res = app.handle(get(None)).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(cache.gets.load(Ordering::SeqCst), 0);
        assert_eq!(cache.sets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stored_etag_short_circuits_with_304() {
        let cache = Arc::new(ScriptedCache::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let app = pipeline(Arc::clone(&cache), Arc::clone(&hits));

        app.handle(get(None)).await;
        for _ in 0..2 {
            let res = app.handle(get(Some("123456"))).await;
            assert_eq!(res.status(), StatusCode::NotModified);
            assert!(res.body_ref().is_empty());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(cache.gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_etag_reaches_handler() {
        let cache = Arc::new(ScriptedCache::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let app = pipeline(Arc::clone(&cache), Arc::clone(&hits));

        let res = app.handle(get(Some("other"))).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), b"fresh");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_header_lines_form_one_key() {
        let cache = Arc::new(ScriptedCache::default());
        cache
            .set(CacheKey::new("a, b", "test"), Value::Bool(true), Duration::from_secs(1))
            .await
            .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let app = pipeline(Arc::clone(&cache), Arc::clone(&hits));

        let request = get(Some("a")).with_header("If-None-Match", "b");
        let res = app.handle(request).await;
        assert_eq!(res.status(), StatusCode::NotModified);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let res = app.handle(get(Some("a"))).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_header_is_ignored() {
        let cache = Arc::new(ScriptedCache::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let app = pipeline(Arc::clone(&cache), Arc::clone(&hits));

        let res = app.handle(get(Some(""))).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(cache.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falsy_cached_item_is_a_miss() {
        let cache = Arc::new(ScriptedCache::default());
        cache
            .set(CacheKey::new("123456", "test"), Value::Bool(false), Duration::from_secs(1))
            .await
            .unwrap();
        let ledger = EtagLedger::new(cache, "test");
        assert!(!ledger.is_fresh("123456").await.unwrap());
    }

    #[tokio::test]
    async fn failing_get_yields_500_only_with_header() {
        let cache = Arc::new(ScriptedCache {
            fail_get: true,
            ..Default::default()
        });
        let hits = Arc::new(AtomicUsize::new(0));
        let app = pipeline(Arc::clone(&cache), Arc::clone(&hits));

        let res = app.handle(get(Some("123456"))).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let res = app.handle(get(None)).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn failing_set_yields_500() {
        let cache = Arc::new(ScriptedCache {
            fail_set: true,
            ..Default::default()
        });
        let hits = Arc::new(AtomicUsize::new(0));
        let app = pipeline(Arc::clone(&cache), Arc::clone(&hits));

        let res = app.handle(get(None)).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remember_skips_without_etag_or_lifetime() {
        let cache = Arc::new(ScriptedCache::default());
        let ledger = EtagLedger::new(Arc::clone(&cache) as Arc<dyn Cache>, "test");

        let mut plain = Response::new(StatusCode::Ok);
        assert!(!ledger.remember(&mut plain).await.unwrap());

        // header set directly, no lifetime attached
        let mut bare = Response::new(StatusCode::Ok).header("ETag", "raw");
        assert!(!ledger.remember(&mut bare).await.unwrap());

        let mut zero = Response::new(StatusCode::Ok).etag("zero", Duration::ZERO);
        assert!(!ledger.remember(&mut zero).await.unwrap());

        assert_eq!(cache.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remember_consumes_lifetime() {
        let cache = Arc::new(ScriptedCache::default());
        let ledger = EtagLedger::new(Arc::clone(&cache) as Arc<dyn Cache>, "test");

        let mut res = Response::new(StatusCode::Ok).etag("once", None);
        assert!(ledger.remember(&mut res).await.unwrap());
        assert!(res.extensions().get::<EtagLifetime>().is_none());
        assert!(!ledger.remember(&mut res).await.unwrap());

        let stored = cache.get(&ledger.key("once")).await.unwrap().unwrap();
        assert_eq!(stored.item, Value::Bool(true));
        assert_eq!(stored.ttl, 3_600_000);
    }

    #[tokio::test(start_paused = true)]
    async fn etag_expires_after_its_lifetime() {
        let cache = Arc::new(ScriptedCache::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let app = pipeline(Arc::clone(&cache), Arc::clone(&hits));

        app.handle(get(None)).await;
        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(
            app.handle(get(Some("123456"))).await.status(),
            StatusCode::NotModified
        );

        tokio::time::advance(Duration::from_millis(1)).await;
        let res = app.handle(get(Some("123456"))).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref(), b"fresh");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handlers_can_reach_the_ledger() {
        let ledger = EtagLedger::new(Arc::new(MemoryCache::new()), "app");
        let app = Pipeline::new(|ctx: Context| async move {
            let segment = ctx
                .extensions()
                .get::<EtagLedger>()
                .map(|ledger| ledger.segment().to_owned())
                .unwrap_or_default();
            Response::new(StatusCode::Ok).body(segment)
        })
        .with(ConditionalGetMiddleware::new(ledger));

        let res = app.handle(get(None)).await;
        assert_eq!(res.body_ref(), b"app");
    }
}
