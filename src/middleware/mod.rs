//! Middleware pipeline: composable before/after request handler logic.
//!
//! A [`Pipeline`] is an ordered stack of middleware in front of one terminal
//! application handler. Each middleware wraps the next layer: code that runs
//! before [`Next::run`] acts as an inbound hook (it may short-circuit with its
//! own [`Response`]), code that runs after it acts as an outbound hook over the
//! response the inner layers produced.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`Handler`] / [`IntoHandler`]: the terminal application handler.
//! - [`Pipeline`]: middleware stack plus handler, driven once per request.
//! - [`LoggerMiddleware`]: built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, context::Context};

/// Boxed, `Send` future used at every dynamic-dispatch seam in the crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased, reference-counted middleware function.
///
/// Construct one with [`from_middleware`] or by wrapping a closure directly:
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rttp_caching::{Response, context::Context};
/// use rttp_caching::middleware::{BoxFuture, MiddlewareHandler, Next};
///
/// let handler: MiddlewareHandler =
///     Arc::new(|ctx: Context, next: Next| -> BoxFuture<'static, Response> {
///         Box::pin(async move { next.run(ctx).await })
///     });
/// ```
pub type MiddlewareHandler =
    Arc<dyn Fn(Context, Next) -> BoxFuture<'static, Response> + Send + Sync + 'static>;

/// Type-erased async application handler at the end of the pipeline.
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<'static, Response> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> BoxFuture<'static, Response>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, Response> {
        Box::pin((self)(ctx))
    }
}

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so a middleware can forward a
/// request at most once. Once every middleware has run, the terminal
/// [`Handler`] produces the response.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    handler: Handler,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

impl Next {
    fn new(middlewares: Arc<[MiddlewareHandler]>, handler: Handler) -> Self {
        Self {
            middlewares,
            handler,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain, or the terminal handler when
    /// the chain is exhausted, and returns its response.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(middleware) => {
                self.index += 1;
                middleware(ctx, self).await
            }
            None => (self.handler)(ctx).await,
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: call `next.run(ctx).await` without modification.
/// - **Short-circuit**: return a [`Response`] directly without calling `next`.
/// - **Decorate**: call `next.run(ctx).await`, inspect the response, and return
///   a modified copy.
///
/// Implementations **must** be `Send + Sync` because middleware is shared across
/// Tokio tasks.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next middleware.
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<'static, Response>;
}

/// An ordered middleware stack in front of one application handler.
///
/// Middleware registered first runs outermost: it sees the request first and
/// the response last.
///
/// # Examples
///
/// ```rust
/// use rttp_caching::{Pipeline, Request, Response, StatusCode};
/// use rttp_caching::http::Method;
/// use rttp_caching::middleware::LoggerMiddleware;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pipeline = Pipeline::new(|_ctx| async { Response::new(StatusCode::Ok).body("hi") })
///     .with(LoggerMiddleware);
///
/// let response = pipeline.handle(Request::new(Method::Get, "/")).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    handler: Handler,
}

impl Pipeline {
    /// Creates a pipeline with no middleware in front of `handler`.
    pub fn new(handler: impl IntoHandler) -> Self {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        Self {
            middlewares: Arc::from(Vec::new()),
            handler,
        }
    }

    /// Appends a type-erased middleware. It runs inside every layer added before it.
    #[must_use]
    pub fn layer(self, middleware: MiddlewareHandler) -> Self {
        let mut middlewares = self.middlewares.to_vec();
        middlewares.push(middleware);
        Self {
            middlewares: middlewares.into(),
            handler: self.handler,
        }
    }

    /// Appends a [`Middleware`] implementation.
    #[must_use]
    pub fn with<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.layer(from_middleware(Arc::new(middleware)))
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Drives one request through the middleware stack and handler.
    pub async fn handle(&self, request: Request) -> Response {
        Next::new(Arc::clone(&self.middlewares), Arc::clone(&self.handler))
            .run(Context::new(request))
            .await
    }
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Emits one `tracing::info!` record after the downstream layers complete and
/// never short-circuits.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<'static, Response> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            tracing::info!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request completed"
            );

            response
        })
    }
}
