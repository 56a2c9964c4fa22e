//! # Portico
//!
//! Application hosting for Rust web services.
//!
//! Portico builds a service container, binds a startup, composes a
//! middleware pipeline, binds a pluggable server and drives the host
//! lifecycle through start and graceful shutdown.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portico::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = WebHostBuilder::new()
//!         .use_server(HyperServerFactory)
//!         .use_urls(["http://127.0.0.1:5000"])
//!         .configure(|app| {
//!             app.use_fn(|ctx, next| {
//!                 Box::pin(async move {
//!                     tracing::info!(path = ctx.path(), "incoming");
//!                     next.invoke(ctx).await
//!                 })
//!             });
//!             app.run(|ctx| {
//!                 Box::pin(async move {
//!                     ctx.response_mut().write_str("Hello World");
//!                     Ok(())
//!                 })
//!             });
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! WebHostBuilder ─build─▶ HostingEngine
//!                           │ build_services: defaults → ConfigureServices
//!                           │ build_pipeline: StartupFilters ∘ Configure → RequestHandler
//!                           │ start:          ServerFactory → Server::start(HostingApplication)
//!                           ▼
//!                 Started ─stop─▶ Stopping ─▶ Stopped ─▶ Disposed
//! ```

#![doc(html_root_url = "https://docs.rs/portico/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Service registration, request context and handler types.
pub use portico_core as core;

/// Middleware chain composition.
pub use portico_pipeline as pipeline;

/// Startup binding, host engine and servers.
pub use portico_hosting as hosting;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use portico::prelude::*;
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(std::sync::Arc::new(String::from("greeting")));
/// assert_eq!(services.len(), 1);
/// ```
pub mod prelude {
    pub use portico_core::{
        BoxFuture, CancellationToken, HandlerResult, HttpContext, HttpResponse, InjectionError,
        RequestHandler, ServerFeatures, ServiceCollection, ServiceLifetime, ServiceProvider,
        ServiceScope,
    };

    pub use portico_pipeline::ApplicationBuilder;

    pub use portico_hosting::{
        ApplicationLifetime, ConfigureDelegate, EngineState, HostingApplication, HostingConfig,
        HostingEngine, HostingEnvironment, HostingError, HostingResult, HyperServerFactory,
        MethodArgs, Server, ServerFactory, Startup, StartupFilter, StartupMethod,
        StartupParameter, StartupType, WebHostBuilder,
    };
}
