//! Startup binding.
//!
//! A startup contributes two steps to the host: `ConfigureServices`, which
//! registers application services, and `Configure`, which registers
//! middleware. There are three ways to provide them:
//!
//! - implement the [`Startup`] trait,
//! - pass closures (see [`StartupDescriptor::from_configure`]),
//! - describe a [`StartupType`] whose methods are selected by naming
//!   convention for the current environment.
//!
//! Convention lookup tries the environment-qualified name first and the bare
//! name second, ignoring ASCII case:
//!
//! | Step | First | Second | Required |
//! |------|-------|--------|----------|
//! | Configure | `Configure{Env}` | `Configure` | yes |
//! | ConfigureServices | `Configure{Env}Services` | `ConfigureServices` | no |
//!
//! # Example
//!
//! ```rust
//! use portico_core::ServiceCollection;
//! use portico_hosting::startup::{StartupLoader, StartupMethod, StartupParameter, StartupType};
//!
//! let startup = StartupType::new("Startup")
//!     .method(
//!         StartupMethod::static_method("ConfigureDevelopment", |args| {
//!             args.app()?.run(|ctx| {
//!                 Box::pin(async move {
//!                     ctx.response_mut().write_str("development");
//!                     Ok(())
//!                 })
//!             });
//!             Ok(())
//!         })
//!         .with_parameter(StartupParameter::application_builder("app")),
//!     )
//!     .method(StartupMethod::static_method("Configure", |_| Ok(())));
//!
//! let hosting = ServiceCollection::new().build_provider();
//! let descriptor = StartupLoader::load(&startup, "Development", &hosting).unwrap();
//! assert_eq!(descriptor.type_name(), "Startup");
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use portico_core::{InjectionError, ServiceCollection, ServiceProvider};
use portico_pipeline::ApplicationBuilder;

use crate::error::{HostingError, HostingResult};

/// Name template for the `Configure` convention. `{0}` is the environment.
pub const CONFIGURE_TEMPLATE: &str = "Configure{0}";

/// Name template for the `ConfigureServices` convention.
pub const CONFIGURE_SERVICES_TEMPLATE: &str = "Configure{0}Services";

/// Registers middleware on an application builder.
pub type ConfigureDelegate =
    Arc<dyn Fn(&mut ApplicationBuilder) -> anyhow::Result<()> + Send + Sync>;

/// Registers services, optionally returning a replacement provider.
pub type ConfigureServicesDelegate =
    Arc<dyn Fn(&mut ServiceCollection) -> anyhow::Result<Option<ServiceProvider>> + Send + Sync>;

type Resolved = Box<dyn Any + Send>;
type Resolver = Arc<dyn Fn(&ServiceProvider) -> Result<Resolved, InjectionError> + Send + Sync>;
type Instance = Arc<dyn Any + Send + Sync>;
type Activator = Arc<dyn Fn(&ServiceProvider) -> anyhow::Result<Instance> + Send + Sync>;
type StaticBody = Arc<dyn Fn(&mut MethodArgs<'_>) -> anyhow::Result<()> + Send + Sync>;
type InstanceBody =
    Arc<dyn Fn(&(dyn Any + Send + Sync), &mut MethodArgs<'_>) -> anyhow::Result<()> + Send + Sync>;

/// The simple startup path: two plain methods.
///
/// ```rust
/// use portico_core::ServiceCollection;
/// use portico_hosting::Startup;
/// use portico_pipeline::ApplicationBuilder;
/// use std::sync::Arc;
///
/// struct Greeting(&'static str);
///
/// struct App;
///
/// impl Startup for App {
///     fn configure_services(&self, services: &mut ServiceCollection) -> anyhow::Result<()> {
///         services.add_singleton(Arc::new(Greeting("Hello World")));
///         Ok(())
///     }
///
///     fn configure(&self, app: &mut ApplicationBuilder) -> anyhow::Result<()> {
///         let greeting = app.application_services().resolve_required::<Greeting>()?;
///         app.run(move |ctx| {
///             let greeting = Arc::clone(&greeting);
///             Box::pin(async move {
///                 ctx.response_mut().write_str(greeting.0);
///                 Ok(())
///             })
///         });
///         Ok(())
///     }
/// }
/// ```
pub trait Startup: Send + Sync + 'static {
    /// Registers application services.
    fn configure_services(&self, services: &mut ServiceCollection) -> anyhow::Result<()> {
        let _ = services;
        Ok(())
    }

    /// Registers middleware.
    fn configure(&self, app: &mut ApplicationBuilder) -> anyhow::Result<()>;
}

/// What a startup method parameter is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// The application builder passed to `Configure`.
    ApplicationBuilder,
    /// The service collection passed to `ConfigureServices`.
    ServiceCollection,
    /// A service resolved from a provider.
    Service,
}

#[derive(Clone)]
enum ParameterSource {
    ApplicationBuilder,
    ServiceCollection,
    Service(Resolver),
}

/// A declared startup method parameter.
#[derive(Clone)]
pub struct StartupParameter {
    name: String,
    type_name: &'static str,
    source: ParameterSource,
}

impl StartupParameter {
    /// A parameter bound to the application builder.
    pub fn application_builder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: std::any::type_name::<ApplicationBuilder>(),
            source: ParameterSource::ApplicationBuilder,
        }
    }

    /// A parameter bound to the service collection.
    pub fn service_collection(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: std::any::type_name::<ServiceCollection>(),
            source: ParameterSource::ServiceCollection,
        }
    }

    /// A parameter resolved as `Arc<T>` from services.
    ///
    /// On `Configure` this resolves from the application services. On
    /// `ConfigureServices` it resolves from a throwaway provider built from
    /// the registrations made so far, so a singleton factory resolved here
    /// runs again when the application provider is built.
    pub fn service<T: ?Sized + Send + Sync + 'static>(name: impl Into<String>) -> Self {
        let resolver: Resolver = Arc::new(|services: &ServiceProvider| {
            services
                .resolve_required::<T>()
                .map(|service| Box::new(service) as Resolved)
        });
        Self {
            name: name.into(),
            type_name: std::any::type_name::<T>(),
            source: ParameterSource::Service(resolver),
        }
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter's type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns what the parameter is bound to.
    #[must_use]
    pub fn kind(&self) -> ParameterKind {
        match self.source {
            ParameterSource::ApplicationBuilder => ParameterKind::ApplicationBuilder,
            ParameterSource::ServiceCollection => ParameterKind::ServiceCollection,
            ParameterSource::Service(_) => ParameterKind::Service,
        }
    }
}

impl fmt::Debug for StartupParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupParameter")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("kind", &self.kind())
            .finish()
    }
}

enum CallSite<'a> {
    Builder(&'a mut ApplicationBuilder),
    Services(&'a mut ServiceCollection),
}

/// Arguments bound for one startup method invocation.
pub struct MethodArgs<'a> {
    call_site: CallSite<'a>,
    resolved: HashMap<String, Resolved>,
    replacement: Option<ServiceProvider>,
    method: String,
}

impl MethodArgs<'_> {
    /// Returns the application builder when invoked as `Configure`.
    pub fn app(&mut self) -> anyhow::Result<&mut ApplicationBuilder> {
        match &mut self.call_site {
            CallSite::Builder(app) => Ok(&mut **app),
            CallSite::Services(_) => {
                anyhow::bail!("'{}' is not given an application builder", self.method)
            }
        }
    }

    /// Returns the service collection when invoked as `ConfigureServices`.
    pub fn services(&mut self) -> anyhow::Result<&mut ServiceCollection> {
        match &mut self.call_site {
            CallSite::Services(services) => Ok(&mut **services),
            CallSite::Builder(_) => {
                anyhow::bail!("'{}' is not given a service collection", self.method)
            }
        }
    }

    /// Returns the service bound to the parameter `name`.
    pub fn service<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> anyhow::Result<Arc<T>> {
        let value = self.resolved.get(name).ok_or_else(|| {
            anyhow::anyhow!("'{}' declares no service parameter named '{name}'", self.method)
        })?;
        value.downcast_ref::<Arc<T>>().cloned().ok_or_else(|| {
            anyhow::anyhow!(
                "parameter '{name}' of '{}' is not a {}",
                self.method,
                std::any::type_name::<T>()
            )
        })
    }

    /// Replaces the provider built from the service collection.
    ///
    /// Only meaningful from `ConfigureServices`.
    pub fn replace_service_provider(&mut self, provider: ServiceProvider) {
        self.replacement = Some(provider);
    }

    /// Returns the name of the method being invoked.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

#[derive(Clone)]
enum MethodBody {
    Static(StaticBody),
    Instance(InstanceBody),
}

/// A named startup method with declared parameters.
#[derive(Clone)]
pub struct StartupMethod {
    name: String,
    parameters: Vec<StartupParameter>,
    body: MethodBody,
}

impl StartupMethod {
    /// Declares a method that needs no startup instance.
    pub fn static_method<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut MethodArgs<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            body: MethodBody::Static(Arc::new(body)),
        }
    }

    /// Declares a method invoked on the startup instance of type `S`.
    ///
    /// The owning [`StartupType`] needs an activator producing an `S`.
    pub fn instance_method<S, F>(name: impl Into<String>, body: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&S, &mut MethodArgs<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            body: MethodBody::Instance(instance_body(move |instance, args| {
                let instance = instance.downcast_ref::<S>().ok_or_else(|| {
                    anyhow::anyhow!(
                        "startup instance is not a {}",
                        std::any::type_name::<S>()
                    )
                })?;
                body(instance, args)
            })),
        }
    }

    /// Appends a declared parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: StartupParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the method needs no startup instance.
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self.body, MethodBody::Static(_))
    }

    /// Returns the declared parameters.
    #[must_use]
    pub fn parameters(&self) -> &[StartupParameter] {
        &self.parameters
    }

    fn has_parameter(&self, kind: ParameterKind) -> bool {
        self.parameters.iter().any(|p| p.kind() == kind)
    }
}

impl fmt::Debug for StartupMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupMethod")
            .field("name", &self.name)
            .field("static", &self.is_static())
            .field("parameters", &self.parameters)
            .finish()
    }
}

fn instance_body<F>(body: F) -> InstanceBody
where
    F: Fn(&(dyn Any + Send + Sync), &mut MethodArgs<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(body)
}

/// A startup type described by its methods.
#[derive(Clone)]
pub struct StartupType {
    type_name: String,
    methods: Vec<StartupMethod>,
    activator: Option<Activator>,
}

impl StartupType {
    /// Creates an empty startup type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            methods: Vec::new(),
            activator: None,
        }
    }

    /// Adds a method.
    #[must_use]
    pub fn method(mut self, method: StartupMethod) -> Self {
        self.methods.push(method);
        self
    }

    /// Sets the function that constructs the startup instance.
    ///
    /// It receives the hosting services and runs at most once per load.
    #[must_use]
    pub fn activator<S, F>(mut self, activator: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> anyhow::Result<S> + Send + Sync + 'static,
    {
        let activator: Activator = Arc::new(move |services: &ServiceProvider| {
            activator(services).map(|instance| Arc::new(instance) as Instance)
        });
        self.activator = Some(activator);
        self
    }

    /// Returns the type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the declared methods.
    #[must_use]
    pub fn methods(&self) -> &[StartupMethod] {
        &self.methods
    }

    /// Finds the method for `template` in `environment`.
    ///
    /// The environment-qualified name wins over the bare name. More than one
    /// method with the chosen name is an error.
    pub fn find_method(
        &self,
        template: &str,
        environment: &str,
    ) -> HostingResult<Option<&StartupMethod>> {
        let qualified = template.replace("{0}", environment);
        if let Some(method) = self.single_method(&qualified)? {
            return Ok(Some(method));
        }

        let fallback = template.replace("{0}", "");
        if fallback.eq_ignore_ascii_case(&qualified) {
            return Ok(None);
        }
        self.single_method(&fallback)
    }

    fn single_method(&self, name: &str) -> HostingResult<Option<&StartupMethod>> {
        let mut candidates = self
            .methods
            .iter()
            .filter(|method| method.name.eq_ignore_ascii_case(name));
        let first = candidates.next();
        if first.is_some() && candidates.next().is_some() {
            return Err(HostingError::AmbiguousConvention {
                method: name.to_string(),
                type_name: self.type_name.clone(),
            });
        }
        Ok(first)
    }
}

impl fmt::Debug for StartupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupType")
            .field("type_name", &self.type_name)
            .field("methods", &self.methods)
            .field("activator", &self.activator.is_some())
            .finish()
    }
}

/// The resolved pair of startup callables.
#[derive(Clone)]
pub struct StartupDescriptor {
    type_name: String,
    configure_services: ConfigureServicesDelegate,
    configure: ConfigureDelegate,
}

impl StartupDescriptor {
    /// Creates a descriptor from explicit delegates.
    pub fn new(
        type_name: impl Into<String>,
        configure_services: ConfigureServicesDelegate,
        configure: ConfigureDelegate,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            configure_services,
            configure,
        }
    }

    /// Wraps a [`Startup`] implementation.
    pub fn from_startup<S: Startup>(startup: S) -> Self {
        let startup = Arc::new(startup);
        let services_startup = Arc::clone(&startup);
        Self {
            type_name: std::any::type_name::<S>().to_string(),
            configure_services: Arc::new(move |services: &mut ServiceCollection| {
                services_startup.configure_services(services).map(|()| None)
            }),
            configure: Arc::new(move |app: &mut ApplicationBuilder| startup.configure(app)),
        }
    }

    /// Creates a delegate startup from a `Configure` closure.
    pub fn from_configure<F>(configure: F) -> Self
    where
        F: Fn(&mut ApplicationBuilder) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            type_name: "ConfigureDelegate".to_string(),
            configure_services: Arc::new(|_: &mut ServiceCollection| Ok(None)),
            configure: Arc::new(configure),
        }
    }

    /// Returns the name of the startup this descriptor came from.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Runs `ConfigureServices`.
    pub fn configure_services(
        &self,
        services: &mut ServiceCollection,
    ) -> anyhow::Result<Option<ServiceProvider>> {
        (self.configure_services)(services)
    }

    /// Runs `Configure`.
    pub fn configure(&self, app: &mut ApplicationBuilder) -> anyhow::Result<()> {
        (self.configure)(app)
    }

    /// Returns the `Configure` delegate, for wrapping by startup filters.
    #[must_use]
    pub fn configure_delegate(&self) -> ConfigureDelegate {
        Arc::clone(&self.configure)
    }
}

impl fmt::Debug for StartupDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupDescriptor")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Resolves a [`StartupType`] into a [`StartupDescriptor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StartupLoader;

impl StartupLoader {
    /// Resolves the conventions of `startup_type` for `environment`.
    ///
    /// If either resolved method is an instance method, the activator runs
    /// once with `hosting_services` and the instance is shared by both.
    pub fn load(
        startup_type: &StartupType,
        environment: &str,
        hosting_services: &ServiceProvider,
    ) -> HostingResult<StartupDescriptor> {
        let type_name = startup_type.type_name().to_string();

        let configure = startup_type
            .find_method(CONFIGURE_TEMPLATE, environment)?
            .ok_or_else(|| HostingError::ConventionNotFound {
                qualified: CONFIGURE_TEMPLATE.replace("{0}", environment),
                fallback: CONFIGURE_TEMPLATE.replace("{0}", ""),
                type_name: type_name.clone(),
            })?
            .clone();
        if configure.has_parameter(ParameterKind::ServiceCollection) {
            return Err(HostingError::InvalidStartupSignature {
                method: configure.name.clone(),
                type_name,
                reason: "Configure cannot take a ServiceCollection parameter".to_string(),
            });
        }

        let configure_services = startup_type
            .find_method(CONFIGURE_SERVICES_TEMPLATE, environment)?
            .cloned();
        if let Some(method) = &configure_services {
            if method.has_parameter(ParameterKind::ApplicationBuilder) {
                return Err(HostingError::InvalidStartupSignature {
                    method: method.name.clone(),
                    type_name,
                    reason: "ConfigureServices cannot take an ApplicationBuilder parameter"
                        .to_string(),
                });
            }
        }

        let needs_instance = !configure.is_static()
            || configure_services
                .as_ref()
                .is_some_and(|method| !method.is_static());
        let instance = if needs_instance {
            let activator = startup_type
                .activator
                .as_ref()
                .ok_or_else(|| HostingError::MissingActivator {
                    type_name: type_name.clone(),
                })?;
            Some(activator(hosting_services).map_err(HostingError::Startup)?)
        } else {
            None
        };

        tracing::debug!(
            startup = %type_name,
            environment,
            configure = %configure.name,
            configure_services = ?configure_services.as_ref().map(StartupMethod::name),
            "Startup conventions resolved"
        );

        let configure_delegate: ConfigureDelegate = {
            let type_name = type_name.clone();
            let instance = instance.clone();
            Arc::new(move |app: &mut ApplicationBuilder| {
                let services = app.application_services().clone();
                invoke(
                    &configure,
                    &type_name,
                    instance.as_deref(),
                    CallSite::Builder(app),
                    &services,
                )
                .map(|_| ())
            })
        };

        let configure_services_delegate: ConfigureServicesDelegate = match configure_services {
            Some(method) => {
                let type_name = type_name.clone();
                Arc::new(move |services: &mut ServiceCollection| {
                    // Service parameters resolve against what is registered so far.
                    let snapshot = services.build_provider();
                    let result = invoke(
                        &method,
                        &type_name,
                        instance.as_deref(),
                        CallSite::Services(services),
                        &snapshot,
                    );
                    snapshot.dispose();
                    result
                })
            }
            None => Arc::new(|_: &mut ServiceCollection| Ok(None)),
        };

        Ok(StartupDescriptor::new(
            type_name,
            configure_services_delegate,
            configure_delegate,
        ))
    }
}

fn invoke(
    method: &StartupMethod,
    type_name: &str,
    instance: Option<&(dyn Any + Send + Sync)>,
    call_site: CallSite<'_>,
    services: &ServiceProvider,
) -> anyhow::Result<Option<ServiceProvider>> {
    let mut resolved = HashMap::new();
    for parameter in &method.parameters {
        if let ParameterSource::Service(resolve) = &parameter.source {
            let value = resolve(services).map_err(|source| HostingError::DependencyResolution {
                parameter: parameter.name.clone(),
                parameter_type: parameter.type_name.to_string(),
                method: method.name.clone(),
                type_name: type_name.to_string(),
                source,
            })?;
            resolved.insert(parameter.name.clone(), value);
        }
    }

    let mut args = MethodArgs {
        call_site,
        resolved,
        replacement: None,
        method: method.name.clone(),
    };

    match &method.body {
        MethodBody::Static(body) => body(&mut args)?,
        MethodBody::Instance(body) => {
            let instance = instance.ok_or_else(|| HostingError::MissingActivator {
                type_name: type_name.to_string(),
            })?;
            body(instance, &mut args)?;
        }
    }

    Ok(args.replacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hosting() -> ServiceProvider {
        ServiceCollection::new().build_provider()
    }

    fn recording(name: &str, log: &Arc<parking_lot::Mutex<Vec<String>>>) -> StartupMethod {
        let log = Arc::clone(log);
        let label = name.to_string();
        StartupMethod::static_method(name, move |_| {
            log.lock().push(label.clone());
            Ok(())
        })
    }

    fn run_configure(descriptor: &StartupDescriptor) {
        let mut app = ApplicationBuilder::new(hosting());
        descriptor.configure(&mut app).unwrap();
    }

    #[test]
    fn test_environment_method_takes_precedence() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let startup = StartupType::new("Startup")
            .method(recording("ConfigureFoo", &log))
            .method(recording("Configure", &log));

        let foo = StartupLoader::load(&startup, "Foo", &hosting()).unwrap();
        run_configure(&foo);
        let other = StartupLoader::load(&startup, "Bar", &hosting()).unwrap();
        run_configure(&other);

        assert_eq!(*log.lock(), vec!["ConfigureFoo", "Configure"]);
    }

    #[test]
    fn test_lookup_ignores_case() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let startup = StartupType::new("Startup").method(recording("configuredevelopment", &log));

        let descriptor = StartupLoader::load(&startup, "Development", &hosting()).unwrap();
        run_configure(&descriptor);
        assert_eq!(*log.lock(), vec!["configuredevelopment"]);
    }

    #[test]
    fn test_missing_configure() {
        let startup = StartupType::new("Startup")
            .method(StartupMethod::static_method("ConfigureServices", |_| Ok(())));

        let err = StartupLoader::load(&startup, "Staging", &hosting()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "A method named 'ConfigureStaging' or 'Configure' in the type 'Startup' could not be found."
        );
    }

    #[test]
    fn test_ambiguous_configure() {
        let startup = StartupType::new("Startup")
            .method(StartupMethod::static_method("Configure", |_| Ok(())))
            .method(StartupMethod::static_method("Configure", |_| Ok(())));

        let err = StartupLoader::load(&startup, "Production", &hosting()).unwrap_err();
        assert!(matches!(err, HostingError::AmbiguousConvention { ref method, .. } if method == "Configure"));
    }

    #[test]
    fn test_ambiguous_qualified_does_not_fall_back() {
        let startup = StartupType::new("Startup")
            .method(StartupMethod::static_method("ConfigureFoo", |_| Ok(())))
            .method(StartupMethod::static_method("configurefoo", |_| Ok(())))
            .method(StartupMethod::static_method("Configure", |_| Ok(())));

        let err = StartupLoader::load(&startup, "Foo", &hosting()).unwrap_err();
        assert!(err.is_convention_error());
    }

    #[test]
    fn test_configure_services_rejects_builder_parameter() {
        let startup = StartupType::new("Startup")
            .method(StartupMethod::static_method("Configure", |_| Ok(())))
            .method(
                StartupMethod::static_method("ConfigureServices", |_| Ok(()))
                    .with_parameter(StartupParameter::application_builder("app")),
            );

        let err = StartupLoader::load(&startup, "Production", &hosting()).unwrap_err();
        assert!(matches!(err, HostingError::InvalidStartupSignature { .. }));
    }

    #[test]
    fn test_instance_methods_require_activator() {
        struct App;
        let startup = StartupType::new("App")
            .method(StartupMethod::instance_method::<App, _>("Configure", |_, _| Ok(())));

        let err = StartupLoader::load(&startup, "Production", &hosting()).unwrap_err();
        assert!(matches!(err, HostingError::MissingActivator { .. }));
    }

    #[test]
    fn test_activator_runs_once_and_instance_is_shared() {
        struct App {
            id: usize,
            seen: Arc<parking_lot::Mutex<Vec<usize>>>,
        }

        let activations = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let counter = Arc::clone(&activations);
        let shared = Arc::clone(&seen);
        let startup = StartupType::new("App")
            .activator(move |_| {
                let id = counter.fetch_add(1, Ordering::SeqCst);
                Ok(App {
                    id,
                    seen: Arc::clone(&shared),
                })
            })
            .method(StartupMethod::instance_method::<App, _>(
                "ConfigureServices",
                |app, _| {
                    app.seen.lock().push(app.id);
                    Ok(())
                },
            ))
            .method(StartupMethod::instance_method::<App, _>("Configure", |app, _| {
                app.seen.lock().push(app.id);
                Ok(())
            }));

        let descriptor = StartupLoader::load(&startup, "Production", &hosting()).unwrap();
        let mut services = ServiceCollection::new();
        descriptor.configure_services(&mut services).unwrap();
        run_configure(&descriptor);

        assert_eq!(activations.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![0, 0]);
    }

    #[test]
    fn test_static_methods_skip_activator() {
        let activations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&activations);
        let startup = StartupType::new("Startup")
            .activator(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .method(StartupMethod::static_method("Configure", |_| Ok(())));

        StartupLoader::load(&startup, "Production", &hosting()).unwrap();
        assert_eq!(activations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_configure_resolves_service_parameters() {
        struct Greeting(&'static str);

        let startup = StartupType::new("Startup").method(
            StartupMethod::static_method("Configure", |args| {
                let greeting = args.service::<Greeting>("greeting")?;
                args.app()?.set_property("greeting", greeting.0.to_string());
                Ok(())
            })
            .with_parameter(StartupParameter::application_builder("app"))
            .with_parameter(StartupParameter::service::<Greeting>("greeting")),
        );

        let mut services = ServiceCollection::new();
        services.add_singleton(Arc::new(Greeting("hi")));
        let mut app = ApplicationBuilder::new(services.build_provider());

        let descriptor = StartupLoader::load(&startup, "Production", &hosting()).unwrap();
        descriptor.configure(&mut app).unwrap();
        assert_eq!(*app.property::<String>("greeting").unwrap(), "hi");
    }

    #[test]
    fn test_unresolvable_parameter_reports_details() {
        struct Database;

        let startup = StartupType::new("Startup").method(
            StartupMethod::static_method("Configure", |_| Ok(()))
                .with_parameter(StartupParameter::service::<Database>("db")),
        );

        let descriptor = StartupLoader::load(&startup, "Production", &hosting()).unwrap();
        let mut app = ApplicationBuilder::new(hosting());
        let err = HostingError::from_startup(descriptor.configure(&mut app).unwrap_err());

        match err {
            HostingError::DependencyResolution {
                parameter,
                parameter_type,
                method,
                type_name,
                ..
            } => {
                assert_eq!(parameter, "db");
                assert!(parameter_type.ends_with("Database"));
                assert_eq!(method, "Configure");
                assert_eq!(type_name, "Startup");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_configure_services_sees_registered_services_and_can_replace_provider() {
        struct Marker;
        struct Replacement;

        let startup = StartupType::new("Startup")
            .method(StartupMethod::static_method("Configure", |_| Ok(())))
            .method(
                StartupMethod::static_method("ConfigureTestingServices", |args| {
                    let _marker = args.service::<Marker>("marker")?;
                    let mut custom = ServiceCollection::new();
                    custom.add_singleton(Arc::new(Replacement));
                    args.services()?.add_singleton(Arc::new(42_u32));
                    args.replace_service_provider(custom.build_provider());
                    Ok(())
                })
                .with_parameter(StartupParameter::service_collection("services"))
                .with_parameter(StartupParameter::service::<Marker>("marker")),
            );

        let mut services = ServiceCollection::new();
        services.add_singleton(Arc::new(Marker));

        let descriptor = StartupLoader::load(&startup, "Testing", &hosting()).unwrap();
        let replaced = descriptor.configure_services(&mut services).unwrap().unwrap();

        assert!(replaced.contains::<Replacement>());
        assert!(services.contains::<u32>());
    }

    #[test]
    fn test_configure_services_resolution_uses_a_separate_provider() {
        struct Clock;

        let created = Arc::new(AtomicUsize::new(0));
        let startup = StartupType::new("Startup")
            .method(StartupMethod::static_method("Configure", |_| Ok(())))
            .method(
                StartupMethod::static_method("ConfigureServices", |args| {
                    let _clock = args.service::<Clock>("clock")?;
                    Ok(())
                })
                .with_parameter(StartupParameter::service::<Clock>("clock")),
            );

        let mut services = ServiceCollection::new();
        services.add_singleton_factory({
            let created = Arc::clone(&created);
            move |_| {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Clock))
            }
        });

        let descriptor = StartupLoader::load(&startup, "Production", &hosting()).unwrap();
        assert!(descriptor.configure_services(&mut services).unwrap().is_none());
        assert_eq!(created.load(Ordering::SeqCst), 1);

        let application = services.build_provider();
        application.resolve_required::<Clock>().unwrap();
        application.resolve_required::<Clock>().unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_startup_trait() {
        struct App;

        impl Startup for App {
            fn configure_services(&self, services: &mut ServiceCollection) -> anyhow::Result<()> {
                services.add_singleton(Arc::new(String::from("registered")));
                Ok(())
            }

            fn configure(&self, app: &mut ApplicationBuilder) -> anyhow::Result<()> {
                app.set_property("configured", true);
                Ok(())
            }
        }

        let descriptor = StartupDescriptor::from_startup(App);
        let mut services = ServiceCollection::new();
        assert!(descriptor.configure_services(&mut services).unwrap().is_none());
        assert!(services.contains::<String>());

        let mut app = ApplicationBuilder::new(hosting());
        descriptor.configure(&mut app).unwrap();
        assert!(app.has_property("configured"));
        assert!(descriptor.type_name().ends_with("App"));
    }
}
