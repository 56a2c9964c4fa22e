//! # Portico Hosting
//!
//! The application host for Portico.
//!
//! - [`WebHostBuilder`] collects configuration, a startup and a server
//! - startup binding resolves `Configure`/`ConfigureServices` by convention
//! - [`StartupFilter`]s wrap `Configure` to add middleware around the app
//! - [`HostingEngine`] drives build, start and graceful stop
//! - [`ApplicationLifetime`] signals started, stopping and stopped
//! - [`HyperServer`] serves HTTP/1.1 over TCP
//!
//! ## Example
//!
//! ```rust,no_run
//! use portico_hosting::{HyperServerFactory, WebHostBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = WebHostBuilder::new()
//!         .use_server(HyperServerFactory)
//!         .use_urls(["http://127.0.0.1:5000"])
//!         .configure(|app| {
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

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod application;
mod builder;
pub mod config;
pub mod diagnostics;
mod engine;
mod environment;
mod error;
pub mod error_page;
mod filter;
mod hyper_server;
mod lifetime;
pub mod logging;
mod server;
pub mod shutdown;
pub mod startup;

pub use application::HostingApplication;
pub use builder::WebHostBuilder;
pub use config::{HostingConfig, HostingConfigBuilder};
pub use diagnostics::{DiagnosticListener, NullDiagnostics, TracingDiagnostics};
pub use engine::{EngineState, HostingEngine};
pub use environment::{environments, HostingEnvironment};
pub use error::{HostingError, HostingResult};
pub use filter::{compose_startup_filters, RequestServicesStartupFilter, StartupFilter};
pub use hyper_server::{HyperServer, HyperServerFactory};
pub use lifetime::{ApplicationLifetime, LifetimeState};
pub use server::{Server, ServerFactory};
pub use startup::{
    ConfigureDelegate, ConfigureServicesDelegate, MethodArgs, ParameterKind, Startup,
    StartupDescriptor, StartupLoader, StartupMethod, StartupParameter, StartupType,
};
