//! # Portico Core
//!
//! Core types shared by every Portico crate.
//!
//! - [`di`] - Service registration, resolution and scoping
//! - [`HttpContext`] - Per-request context passed through the pipeline
//! - [`RequestHandler`] - The composable asynchronous handler
//! - [`CancellationToken`] - One-shot cancellation with ordered callbacks
//! - [`ServerFeatures`] - Listening addresses published by the server

#![doc(html_root_url = "https://docs.rs/portico-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cancel;
mod context;
pub mod di;
mod features;
mod handler;

pub use cancel::{panic_message, CancellationToken};
pub use context::{HttpContext, HttpResponse, RequestServicesFeature, TraceIdentifier};
pub use di::{InjectionError, ServiceCollection, ServiceLifetime, ServiceProvider, ServiceScope};
pub use features::ServerFeatures;
pub use handler::{BoxFuture, HandlerResult, RequestHandler};
