//! The host engine.
//!
//! The engine moves through a fixed sequence of states:
//!
//! ```text
//! Unbuilt → ServicesBuilt → PipelineBuilt → Started → Stopping → Stopped → Disposed
//! ```
//!
//! Building services registers the hosting defaults, runs the builder's
//! service configurations, resolves the startup and runs its
//! `ConfigureServices`. Building the pipeline composes the startup filters
//! around `Configure` and builds the middleware chain. Starting creates the
//! server and hands it the [`HostingApplication`]; stopping signals the
//! application, stops the server within the shutdown timeout and releases
//! the service providers.
//!
//! With startup error capture enabled, a failing `ConfigureServices` or
//! `Configure` does not fail the build. The engine instead serves an error
//! page for every request. Convention errors (a missing `Configure`, an
//! ambiguous or malformed method) are never captured.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use portico_core::{RequestHandler, ServerFeatures, ServiceCollection, ServiceProvider};
use portico_pipeline::ApplicationBuilder;

use crate::application::HostingApplication;
use crate::config::HostingConfig;
use crate::diagnostics::DiagnosticListener;
use crate::environment::HostingEnvironment;
use crate::error::{is_convention_failure, HostingError, HostingResult};
use crate::error_page::startup_error_page;
use crate::filter::{compose_startup_filters, RequestServicesStartupFilter, StartupFilter};
use crate::lifetime::ApplicationLifetime;
use crate::server::{Server, ServerFactory};
use crate::shutdown::wait_for_os_signal;
use crate::startup::{StartupDescriptor, StartupLoader, StartupType};

/// Lifecycle state of a [`HostingEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing built yet.
    Unbuilt,
    /// Application services are built.
    ServicesBuilt,
    /// The request pipeline is built.
    PipelineBuilt,
    /// The server is running.
    Started,
    /// Shutdown is in progress.
    Stopping,
    /// The server has stopped and services are released.
    Stopped,
    /// The engine is disposed.
    Disposed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbuilt => "unbuilt",
            Self::ServicesBuilt => "services built",
            Self::PipelineBuilt => "pipeline built",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

pub(crate) type ServiceConfiguration = Arc<dyn Fn(&mut ServiceCollection) + Send + Sync>;

#[derive(Clone)]
pub(crate) enum StartupSource {
    Type(StartupType),
    Descriptor(StartupDescriptor),
}

impl StartupSource {
    fn name(&self) -> &str {
        match self {
            Self::Type(startup) => startup.type_name(),
            Self::Descriptor(descriptor) => descriptor.type_name(),
        }
    }
}

pub(crate) struct EngineOptions {
    pub(crate) config: HostingConfig,
    pub(crate) startup: Option<StartupSource>,
    pub(crate) service_configurations: Vec<ServiceConfiguration>,
    pub(crate) server_factory: Option<Arc<dyn ServerFactory>>,
    pub(crate) diagnostics: Arc<dyn DiagnosticListener>,
}

/// A built web host.
///
/// Created by [`WebHostBuilder::build`](crate::WebHostBuilder::build).
pub struct HostingEngine {
    config: HostingConfig,
    environment: HostingEnvironment,
    lifetime: ApplicationLifetime,
    diagnostics: Arc<dyn DiagnosticListener>,
    server_features: ServerFeatures,
    server_factory: Option<Arc<dyn ServerFactory>>,
    service_configurations: Vec<ServiceConfiguration>,
    startup: Option<StartupSource>,
    descriptor: Option<StartupDescriptor>,
    hosting_services: Option<ServiceProvider>,
    application_services: Option<ServiceProvider>,
    startup_error: Option<anyhow::Error>,
    application: Option<HostingApplication>,
    state: Mutex<EngineState>,
    server: Mutex<Option<Arc<dyn Server>>>,
    transition: tokio::sync::Mutex<()>,
}

impl HostingEngine {
    pub(crate) fn new(options: EngineOptions) -> Self {
        let default_name = options
            .startup
            .as_ref()
            .map_or("portico", StartupSource::name)
            .to_string();
        let environment = HostingEnvironment::from_config(&options.config, &default_name);
        let server_features = ServerFeatures::with_addresses(options.config.urls().iter().cloned());

        Self {
            config: options.config,
            environment,
            lifetime: ApplicationLifetime::new(),
            diagnostics: options.diagnostics,
            server_features,
            server_factory: options.server_factory,
            service_configurations: options.service_configurations,
            startup: options.startup,
            descriptor: None,
            hosting_services: None,
            application_services: None,
            startup_error: None,
            application: None,
            state: Mutex::new(EngineState::Unbuilt),
            server: Mutex::new(None),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    /// Builds the application services.
    ///
    /// # Errors
    ///
    /// Fails if services were already built, no startup is configured, the
    /// startup conventions are broken, or (without capture) the startup's
    /// `ConfigureServices` fails.
    pub fn build_services(&mut self) -> HostingResult<()> {
        if self.state() != EngineState::Unbuilt {
            return Err(HostingError::AlreadyBuilt);
        }
        let startup = self.startup.clone().ok_or(HostingError::MissingStartup)?;

        let mut services = self.default_services();
        for configure in &self.service_configurations {
            configure(&mut services);
        }
        let hosting_services = services.build_provider();
        self.hosting_services = Some(hosting_services.clone());

        let descriptor = match startup {
            StartupSource::Descriptor(descriptor) => Some(descriptor),
            StartupSource::Type(startup_type) => {
                match StartupLoader::load(
                    &startup_type,
                    self.environment.environment_name(),
                    &hosting_services,
                ) {
                    Ok(descriptor) => Some(descriptor),
                    Err(e) if e.is_convention_error() || !self.config.capture_startup_errors() => {
                        return Err(e);
                    }
                    Err(e) => {
                        self.capture(anyhow::Error::new(e));
                        None
                    }
                }
            }
        };

        let application_services = match &descriptor {
            None => hosting_services,
            Some(descriptor) => match descriptor.configure_services(&mut services) {
                Ok(Some(replacement)) => replacement,
                Ok(None) => services.build_provider(),
                Err(e) if is_convention_failure(&e) || !self.config.capture_startup_errors() => {
                    return Err(HostingError::from_startup(e));
                }
                Err(e) => {
                    self.capture(e);
                    services.build_provider()
                }
            },
        };

        tracing::debug!(
            startup = descriptor.as_ref().map_or("", StartupDescriptor::type_name),
            registrations = services.len(),
            "Application services built"
        );
        self.descriptor = descriptor;
        self.application_services = Some(application_services);
        self.set_state(EngineState::ServicesBuilt);
        Ok(())
    }

    /// Builds the request pipeline.
    ///
    /// # Errors
    ///
    /// Fails outside [`EngineState::ServicesBuilt`], or (without capture)
    /// when `Configure` or a startup filter fails.
    pub fn build_pipeline(&mut self) -> HostingResult<()> {
        let state = self.state();
        if state != EngineState::ServicesBuilt {
            return Err(HostingError::InvalidState {
                operation: "build the pipeline",
                state,
            });
        }

        let detailed = self.config.detailed_errors();
        let captured = self
            .startup_error
            .as_ref()
            .map(|error| startup_error_page(error, detailed));
        let pipeline = match captured {
            Some(page) => page,
            None => match self.configure_pipeline() {
                Ok(pipeline) => pipeline,
                Err(e) if is_convention_failure(&e) || !self.config.capture_startup_errors() => {
                    return Err(HostingError::from_startup(e));
                }
                Err(e) => {
                    let page = startup_error_page(&e, detailed);
                    self.capture(e);
                    page
                }
            },
        };

        self.application = Some(HostingApplication::new(
            pipeline,
            Arc::clone(&self.diagnostics),
        ));
        self.set_state(EngineState::PipelineBuilt);
        Ok(())
    }

    /// Starts the server.
    ///
    /// Fires `application_started` once the server reports it is listening.
    ///
    /// # Errors
    ///
    /// Fails outside [`EngineState::PipelineBuilt`], without a server
    /// factory, or when the server cannot start.
    pub async fn start(&self) -> HostingResult<()> {
        let _transition = self.transition.lock().await;

        let state = self.state();
        if state != EngineState::PipelineBuilt {
            return Err(HostingError::InvalidState {
                operation: "start",
                state,
            });
        }
        let factory = self
            .server_factory
            .as_ref()
            .ok_or(HostingError::MissingServer)?;
        let application = self
            .application
            .clone()
            .ok_or(HostingError::InvalidState {
                operation: "start",
                state,
            })?;

        let server = factory
            .create(&self.config, self.server_features.clone())
            .map_err(HostingError::ListenerStart)?;
        server
            .start(application)
            .await
            .map_err(HostingError::ListenerStart)?;

        *self.server.lock() = Some(server);
        self.set_state(EngineState::Started);
        self.lifetime.notify_started();

        tracing::info!(
            environment = %self.environment.environment_name(),
            application = %self.environment.application_name(),
            addresses = ?self.server_features.addresses(),
            "Application started"
        );
        if self.startup_error.is_some() {
            tracing::warn!("Application started with a startup error, every request answers 500");
        }
        Ok(())
    }

    /// Stops the server and releases services.
    ///
    /// Idempotent: only the first call does any work, and concurrent
    /// callers wait for it to finish. A host that never started still
    /// signals stopping and stopped and releases its services; there is
    /// just no server to stop.
    ///
    /// # Errors
    ///
    /// Currently always succeeds; server stop failures and timeouts are
    /// logged.
    pub async fn stop(&self) -> HostingResult<()> {
        let _transition = self.transition.lock().await;
        if matches!(
            self.state(),
            EngineState::Stopping | EngineState::Stopped | EngineState::Disposed
        ) {
            return Ok(());
        }

        self.set_state(EngineState::Stopping);
        tracing::info!("Application is shutting down");
        self.lifetime.stop_application();

        let server = self.server.lock().take();
        if let Some(server) = server {
            let timeout = self.config.shutdown_timeout();
            match tokio::time::timeout(timeout, server.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %format!("{e:#}"), "Server failed to stop cleanly");
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "Server did not stop within the shutdown timeout"
                    );
                }
            }
        }

        self.release_services();
        self.set_state(EngineState::Stopped);
        self.lifetime.notify_stopped();
        tracing::info!("Application stopped");
        Ok(())
    }

    /// Stops the host if needed and releases everything it holds.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`stop`](Self::stop).
    pub async fn dispose(&self) -> HostingResult<()> {
        self.stop().await?;
        let _transition = self.transition.lock().await;
        self.release_services();
        self.set_state(EngineState::Disposed);
        Ok(())
    }

    /// Starts the host and runs until shutdown is requested.
    ///
    /// Shutdown is requested by SIGTERM, SIGINT or
    /// [`ApplicationLifetime::stop_application`].
    ///
    /// # Errors
    ///
    /// Propagates failures from [`start`](Self::start).
    pub async fn run(&self) -> HostingResult<()> {
        self.run_until(wait_for_os_signal()).await
    }

    /// Starts the host and runs until `shutdown` completes or
    /// [`ApplicationLifetime::stop_application`] is called.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`start`](Self::start).
    pub async fn run_until<F>(&self, shutdown: F) -> HostingResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.start().await?;
        tokio::select! {
            () = self.lifetime.application_stopping().cancelled() => {}
            () = shutdown => {}
        }
        self.stop().await
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Returns the host configuration.
    #[must_use]
    pub fn config(&self) -> &HostingConfig {
        &self.config
    }

    /// Returns the hosting environment.
    #[must_use]
    pub fn environment(&self) -> &HostingEnvironment {
        &self.environment
    }

    /// Returns the application lifetime.
    #[must_use]
    pub fn lifetime(&self) -> &ApplicationLifetime {
        &self.lifetime
    }

    /// Returns the features shared with the server.
    #[must_use]
    pub fn server_features(&self) -> &ServerFeatures {
        &self.server_features
    }

    /// Returns the application services once built.
    #[must_use]
    pub fn application_services(&self) -> Option<&ServiceProvider> {
        self.application_services.as_ref()
    }

    /// Returns the hosting services once built.
    #[must_use]
    pub fn hosting_services(&self) -> Option<&ServiceProvider> {
        self.hosting_services.as_ref()
    }

    /// Returns the hosting application once the pipeline is built.
    #[must_use]
    pub fn application(&self) -> Option<&HostingApplication> {
        self.application.as_ref()
    }

    /// Returns the captured startup error, if any.
    #[must_use]
    pub fn startup_error(&self) -> Option<&anyhow::Error> {
        self.startup_error.as_ref()
    }

    fn default_services(&self) -> ServiceCollection {
        let mut services = ServiceCollection::new();
        services
            .add_singleton(Arc::new(self.config.clone()))
            .add_singleton(Arc::new(self.environment.clone()))
            .add_singleton(Arc::new(self.lifetime.clone()))
            .add_singleton(Arc::new(self.server_features.clone()))
            .add_singleton::<dyn DiagnosticListener>(Arc::clone(&self.diagnostics))
            .add_singleton::<dyn StartupFilter>(Arc::new(RequestServicesStartupFilter));
        services
    }

    fn configure_pipeline(&self) -> anyhow::Result<RequestHandler> {
        let descriptor = self
            .descriptor
            .as_ref()
            .ok_or(HostingError::MissingStartup)?;
        let services = self
            .application_services
            .clone()
            .ok_or(HostingError::InvalidState {
                operation: "build the pipeline",
                state: self.state(),
            })?;

        let filters = services.resolve_all::<dyn StartupFilter>()?;
        let configure = compose_startup_filters(&filters, descriptor.configure_delegate());

        let mut app =
            ApplicationBuilder::new(services).with_server_features(self.server_features.clone());
        configure(&mut app)?;
        tracing::debug!(
            filters = filters.len(),
            middleware = app.len(),
            "Request pipeline configured"
        );
        Ok(app.build())
    }

    fn capture(&mut self, error: anyhow::Error) {
        tracing::error!(
            error = %format!("{error:#}"),
            "Application startup failed, serving the startup error page"
        );
        self.startup_error = Some(error);
    }

    fn release_services(&self) {
        if let Some(services) = &self.application_services {
            services.dispose();
        }
        if let Some(services) = &self.hosting_services {
            services.dispose();
        }
    }

    fn set_state(&self, state: EngineState) {
        let mut current = self.state.lock();
        tracing::trace!(from = %*current, to = %state, "Host state changed");
        *current = state;
    }
}

impl fmt::Debug for HostingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostingEngine")
            .field("state", &self.state())
            .field("environment", &self.environment.environment_name())
            .field("startup_error", &self.startup_error.is_some())
            .finish_non_exhaustive()
    }
}
