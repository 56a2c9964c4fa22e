//! The composable request handler.
//!
//! A [`RequestHandler`] is the unit the pipeline composes: an asynchronous
//! function over a mutable [`HttpContext`]. Middleware wraps one handler in
//! another; the host invokes the outermost one per request.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::HttpContext;

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The result of invoking a request handler.
pub type HandlerResult = anyhow::Result<()>;

type HandlerFn = dyn for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, HandlerResult> + Send + Sync;

/// A cloneable asynchronous request handler.
///
/// # Example
///
/// ```rust
/// use portico_core::{HttpContext, RequestHandler};
///
/// let hello = RequestHandler::new(|ctx: &mut HttpContext| {
///     Box::pin(async move {
///         ctx.response_mut().write_str("Hello World");
///         Ok(())
///     })
/// });
/// # let _ = hello;
/// ```
#[derive(Clone)]
pub struct RequestHandler {
    inner: Arc<HandlerFn>,
}

impl RequestHandler {
    /// Wraps a function as a request handler.
    pub fn new<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(handler),
        }
    }

    /// Invokes the handler for one request.
    pub fn invoke<'a>(&self, ctx: &'a mut HttpContext) -> BoxFuture<'a, HandlerResult> {
        (self.inner)(ctx)
    }

    /// A terminal handler that answers `404 Not Found`.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(|ctx| {
            Box::pin(async move {
                ctx.response_mut().set_status(StatusCode::NOT_FOUND);
                Ok(())
            })
        })
    }
}

impl fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandler").finish_non_exhaustive()
    }
}
