//! `Cache-Control` header construction.

use std::sync::Arc;

use super::options::{CachingOptions, privacy};
use crate::{
    Response,
    context::Context,
    http::header,
    middleware::{BoxFuture, Middleware, Next},
};

/// Builds the `Cache-Control` value for `options`, or `None` when no privacy
/// directive is configured.
///
/// The privacy token starts the value verbatim. `max-age` follows unless the
/// privacy is `no-cache`; `s-maxage` follows only for `public`. Both
/// comparisons ignore ASCII case. Every other token, `no-store` included, is
/// opaque and still gets `max-age`. An empty privacy string and zero ages
/// count as unset.
///
/// # Examples
///
/// ```
/// use rttp_caching::caching::{CachingOptions, cache_control_value, privacy};
///
/// let options = CachingOptions::new()
///     .privacy(privacy::PUBLIC)
///     .expires_in(300)
///     .server_expires_in(12345);
/// assert_eq!(
///     cache_control_value(&options).as_deref(),
///     Some("public, max-age=300, s-maxage=12345"),
/// );
/// ```
pub fn cache_control_value(options: &CachingOptions) -> Option<String> {
    let directive = options.privacy.as_deref().filter(|p| !p.is_empty())?;
    let mut value = directive.to_owned();

    if !directive.eq_ignore_ascii_case(privacy::NO_CACHE) {
        if let Some(max_age) = options.expires_in.filter(|&secs| secs > 0) {
            value.push_str(&format!(", max-age={max_age}"));
        }
    }

    if directive.eq_ignore_ascii_case(privacy::PUBLIC) {
        if let Some(s_maxage) = options.server_expires_in.filter(|&secs| secs > 0) {
            value.push_str(&format!(", s-maxage={s_maxage}"));
        }
    }

    Some(value)
}

/// Sets a fixed `Cache-Control` value on every response that does not carry
/// one already. Values set by the application are left alone.
#[derive(Debug, Clone)]
pub struct CacheControlMiddleware {
    value: Arc<str>,
}

impl CacheControlMiddleware {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Middleware for CacheControlMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<'static, Response> {
        let value = Arc::clone(&self.value);
        Box::pin(async move {
            let mut response = next.run(ctx).await;
            if !response.headers().contains(header::CACHE_CONTROL) {
                response.set_header(header::CACHE_CONTROL, &*value);
            }
            response
        })
    }
}
