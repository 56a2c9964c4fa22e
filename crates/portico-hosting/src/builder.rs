//! The web host builder.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use portico_core::ServiceCollection;
use portico_pipeline::ApplicationBuilder;

use crate::config::{keys, HostingConfig};
use crate::diagnostics::{DiagnosticListener, TracingDiagnostics};
use crate::engine::{EngineOptions, HostingEngine, ServiceConfiguration, StartupSource};
use crate::error::HostingResult;
use crate::server::ServerFactory;
use crate::startup::{Startup, StartupDescriptor, StartupType};

/// Configures and builds a [`HostingEngine`].
///
/// Settings are applied in call order on top of the base configuration, so
/// a later setting for the same key wins.
///
/// # Example
///
/// ```rust
/// use portico_hosting::{HyperServerFactory, WebHostBuilder};
///
/// let engine = WebHostBuilder::new()
///     .use_server(HyperServerFactory)
///     .use_urls(["http://127.0.0.1:0"])
///     .configure(|app| {
///         app.run(|ctx| {
///             Box::pin(async move {
///                 ctx.response_mut().write_str("Hello World");
///                 Ok(())
///             })
///         });
///         Ok(())
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(engine.config().urls(), ["http://127.0.0.1:0"]);
/// ```
pub struct WebHostBuilder {
    config: HostingConfig,
    settings: Vec<(String, String)>,
    shutdown_timeout: Option<Duration>,
    startup: Option<StartupSource>,
    service_configurations: Vec<ServiceConfiguration>,
    server_factory: Option<Arc<dyn ServerFactory>>,
    diagnostics: Arc<dyn DiagnosticListener>,
}

impl WebHostBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HostingConfig::default(),
            settings: Vec::new(),
            shutdown_timeout: None,
            startup: None,
            service_configurations: Vec::new(),
            server_factory: None,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    /// Replaces the base configuration.
    #[must_use]
    pub fn use_config(mut self, config: HostingConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a key/value setting (see [`keys`]).
    #[must_use]
    pub fn use_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.push((key.into(), value.into()));
        self
    }

    /// Sets the environment name.
    #[must_use]
    pub fn use_environment(self, environment: impl Into<String>) -> Self {
        self.use_setting(keys::ENVIRONMENT, environment)
    }

    /// Sets the listening URLs.
    #[must_use]
    pub fn use_urls<I, S>(self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = urls
            .into_iter()
            .map(|url| url.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(";");
        self.use_setting(keys::URLS, joined)
    }

    /// Turns startup failures into an error page instead of a build error.
    #[must_use]
    pub fn capture_startup_errors(self, capture: bool) -> Self {
        self.use_setting(keys::CAPTURE_STARTUP_ERRORS, capture.to_string())
    }

    /// Shows the full error chain on error pages.
    #[must_use]
    pub fn detailed_errors(self, detailed: bool) -> Self {
        self.use_setting(keys::DETAILED_ERRORS, detailed.to_string())
    }

    /// Sets how long `stop` waits for the server.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Sets the server factory.
    #[must_use]
    pub fn use_server<F>(mut self, factory: F) -> Self
    where
        F: ServerFactory + 'static,
    {
        self.server_factory = Some(Arc::new(factory));
        self
    }

    /// Uses a [`Startup`] implementation.
    #[must_use]
    pub fn use_startup<S: Startup>(mut self, startup: S) -> Self {
        self.startup = Some(StartupSource::Descriptor(StartupDescriptor::from_startup(
            startup,
        )));
        self
    }

    /// Uses a convention-based startup type.
    #[must_use]
    pub fn use_startup_type(mut self, startup: StartupType) -> Self {
        self.startup = Some(StartupSource::Type(startup));
        self
    }

    /// Uses a prepared startup descriptor.
    #[must_use]
    pub fn use_startup_descriptor(mut self, descriptor: StartupDescriptor) -> Self {
        self.startup = Some(StartupSource::Descriptor(descriptor));
        self
    }

    /// Uses `configure` as the whole startup.
    #[must_use]
    pub fn configure<F>(self, configure: F) -> Self
    where
        F: Fn(&mut ApplicationBuilder) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.use_startup_descriptor(StartupDescriptor::from_configure(configure))
    }

    /// Registers services before the startup's own `ConfigureServices`.
    ///
    /// These services are also visible to the startup activator.
    #[must_use]
    pub fn configure_services<F>(mut self, configure: F) -> Self
    where
        F: Fn(&mut ServiceCollection) + Send + Sync + 'static,
    {
        self.service_configurations.push(Arc::new(configure));
        self
    }

    /// Sets the diagnostic listener. Defaults to [`TracingDiagnostics`].
    #[must_use]
    pub fn use_diagnostics<D>(mut self, diagnostics: D) -> Self
    where
        D: DiagnosticListener + 'static,
    {
        self.diagnostics = Arc::new(diagnostics);
        self
    }

    /// Builds services and the pipeline.
    ///
    /// # Errors
    ///
    /// Returns invalid settings, missing or broken startup conventions, and
    /// (without startup error capture) startup failures.
    pub fn build(self) -> HostingResult<HostingEngine> {
        let mut config = self.config;
        for (key, value) in &self.settings {
            config.apply_setting(key, value)?;
        }
        if let Some(timeout) = self.shutdown_timeout {
            config.set_shutdown_timeout(timeout);
        }

        let mut engine = HostingEngine::new(EngineOptions {
            config,
            startup: self.startup,
            service_configurations: self.service_configurations,
            server_factory: self.server_factory,
            diagnostics: self.diagnostics,
        });
        engine.build_services()?;
        engine.build_pipeline()?;
        Ok(engine)
    }
}

impl Default for WebHostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WebHostBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebHostBuilder")
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("has_startup", &self.startup.is_some())
            .field("has_server", &self.server_factory.is_some())
            .finish_non_exhaustive()
    }
}
