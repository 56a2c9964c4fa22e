//! Core middleware trait.
//!
//! Most middleware is registered as a closure through
//! [`ApplicationBuilder::use_fn`](crate::ApplicationBuilder::use_fn). The
//! [`Middleware`] trait is for middleware that carries its own state and
//! wants a name in logs.
//!
//! # Example
//!
//! ```
//! use portico_core::{BoxFuture, HandlerResult, HttpContext, RequestHandler};
//! use portico_pipeline::Middleware;
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut HttpContext,
//!         next: RequestHandler,
//!     ) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             let start = std::time::Instant::now();
//!             let result = next.invoke(ctx).await;
//!             println!("Request took {:?}", start.elapsed());
//!             result
//!         })
//!     }
//! }
//! ```

use portico_core::{BoxFuture, HandlerResult, HttpContext, RequestHandler};

/// A named middleware component.
///
/// # Invariants
///
/// - Middleware calls `next.invoke()` at most once
/// - Middleware does not swallow errors it does not handle
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this middleware, used in logs.
    fn name(&self) -> &'static str;

    /// Processes one request.
    ///
    /// `next` is the rest of the pipeline. Not invoking it short-circuits
    /// the request.
    fn process<'a>(
        &'a self,
        ctx: &'a mut HttpContext,
        next: RequestHandler,
    ) -> BoxFuture<'a, HandlerResult>;
}
