//! # Portico Pipeline
//!
//! Middleware chain composition for Portico.
//!
//! An [`ApplicationBuilder`] collects middleware factories in registration
//! order and compiles them into one [`RequestHandler`](portico_core::RequestHandler).
//! The first factory registered runs outermost:
//!
//! ```text
//! Request → F1 → F2 → F3 → terminal (404)
//!                              ↓
//! Response ← F1 ← F2 ← F3 ←────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use portico_core::ServiceCollection;
//! use portico_pipeline::ApplicationBuilder;
//!
//! let mut app = ApplicationBuilder::new(ServiceCollection::new().build_provider());
//!
//! app.use_fn(|ctx, next| {
//!     Box::pin(async move {
//!         tracing::info!(path = ctx.path(), "before");
//!         next.invoke(ctx).await
//!     })
//! });
//! app.run(|ctx| {
//!     Box::pin(async move {
//!         ctx.response_mut().write_str("Hello World");
//!         Ok(())
//!     })
//! });
//!
//! let handler = app.build();
//! # let _ = handler;
//! ```

#![doc(html_root_url = "https://docs.rs/portico-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod builder;
mod map;
pub mod middleware;
mod request_services;

pub use builder::{ApplicationBuilder, MiddlewareFactory};
pub use map::MapMiddleware;
pub use middleware::Middleware;
pub use request_services::RequestServicesMiddleware;
