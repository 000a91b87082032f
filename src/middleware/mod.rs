//! Middleware pipeline: composable before/after request handler logic.
//!
//! Every request entering the edge layer runs through a [`Pipeline`]: an
//! ordered stack of [`Middleware`] terminated by an endpoint that talks to
//! the origin. Each middleware wraps the next layer, so it can inspect the
//! request, short-circuit (rate limiting, cache hits, CORS preflight) or
//! decorate the downstream response.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining middleware chain; call [`Next::run`] to
//!   advance to the next layer.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`Pipeline`]: the assembled stack plus endpoint.
//! - [`LoggerMiddleware`]: request/response logger.
//! - [`CacheMiddleware`]: serves `GET`s from a [`ResponseCache`](crate::cache::ResponseCache).

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Request, Response, StatusCode, context::Context};

pub mod cache;

pub use cache::CacheMiddleware;

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed on each call to [`run`](Self::run), so it cannot be called
/// more than once per middleware invocation.
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// The [`Arc`] wrapper makes handlers cheap to clone so that [`Next`] can
/// advance through the chain without copying closures.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    /// Creates a new `Next` positioned at the start of the given middleware stack.
    pub fn new(middlewares: Vec<MiddlewareHandler>) -> Self {
        Self {
            middlewares,
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// If the chain is exhausted without producing a response, a
    /// `500 Internal Server Error` is returned as a safe fallback.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline")
        }
    }
}

/// The core trait for all edge middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: call `next.run(ctx).await` without modification.
/// - **Short-circuit**: return a [`Response`] directly without calling `next`.
/// - **Decorate**: call `next.run(ctx).await`, inspect the response, and return
///   a modified copy.
///
/// Implementations are shared across Tokio tasks and must not hold a lock
/// across an `.await` point.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Middleware stack terminated by an endpoint.
///
/// Layers run in the order they were added: the first layer sees the
/// request first and the response last.
///
/// # Examples
///
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use edgekit::{Method, Request, Response, StatusCode};
/// use edgekit::context::Context;
/// use edgekit::middleware::{LoggerMiddleware, Pipeline};
///
/// let pipeline = Pipeline::new(|_ctx: Context| async {
///     Response::new(StatusCode::Ok).body("from origin")
/// })
/// .layer(LoggerMiddleware);
///
/// let resp = pipeline.handle(Request::new(Method::Get, "/")).await;
/// assert_eq!(resp.status(), StatusCode::Ok);
/// # }
/// ```
pub struct Pipeline {
    layers: Vec<MiddlewareHandler>,
    endpoint: MiddlewareHandler,
}

impl Pipeline {
    /// Creates a pipeline with no layers around `endpoint`.
    pub fn new<H, F>(endpoint: H) -> Self
    where
        H: Fn(Context) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let endpoint: MiddlewareHandler = Arc::new(
            move |ctx: Context, _next: Next| -> Pin<Box<dyn Future<Output = Response> + Send>> {
                Box::pin(endpoint(ctx))
            },
        );
        Self {
            layers: Vec::new(),
            endpoint,
        }
    }

    /// Appends a middleware inside the ones already added.
    #[must_use]
    pub fn layer<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.layer_shared(Arc::new(middleware))
    }

    /// Appends a middleware that is also held elsewhere.
    #[must_use]
    pub fn layer_shared<M>(mut self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        self.layers.push(from_middleware(middleware));
        self
    }

    /// Number of middleware layers, excluding the endpoint.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Runs `request` through every layer and the endpoint.
    pub async fn handle(&self, request: Request) -> Response {
        let mut chain = Vec::with_capacity(self.layers.len() + 1);
        chain.extend(self.layers.iter().cloned());
        chain.push(Arc::clone(&self.endpoint));
        Next::new(chain).run(Context::new(request)).await
    }
}

/// Logs each request's method, path, status, cache outcome and duration.
///
/// Emits a single `tracing::info!` line after the downstream handler completes.
/// Never short-circuits.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            let duration = start.elapsed();
            let status = response.status().as_u16();
            let cache = response.headers().get("x-cache").unwrap_or("-");

            tracing::info!(%method, %path, status, cache, ?duration, "request served");

            response
        })
    }
}
