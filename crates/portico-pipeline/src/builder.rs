//! The application builder: an ordered list of middleware factories.
//!
//! Factories registered first run outermost. [`ApplicationBuilder::build`]
//! folds the list right-to-left over a terminal `404 Not Found` handler, so
//! for factories `F1, F2, F3` a request runs
//!
//! ```text
//! F1 pre → F2 pre → F3 pre → terminal → F3 post → F2 post → F1 post
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use portico_core::{
    BoxFuture, HandlerResult, HttpContext, RequestHandler, ServerFeatures, ServiceProvider,
};

use crate::map::MapMiddleware;
use crate::middleware::Middleware;

/// A function that wraps the next handler in the chain.
pub type MiddlewareFactory = Arc<dyn Fn(RequestHandler) -> RequestHandler + Send + Sync>;

/// Builds the composed request handler.
///
/// # Example
///
/// ```
/// use portico_core::ServiceCollection;
/// use portico_pipeline::ApplicationBuilder;
///
/// let services = ServiceCollection::new().build_provider();
/// let mut app = ApplicationBuilder::new(services);
///
/// app.run(|ctx| {
///     Box::pin(async move {
///         ctx.response_mut().write_str("Hello World");
///         Ok(())
///     })
/// });
///
/// let handler = app.build();
/// # let _ = handler;
/// ```
#[derive(Clone)]
pub struct ApplicationBuilder {
    application_services: ServiceProvider,
    server_features: ServerFeatures,
    properties: HashMap<String, Arc<dyn Any + Send + Sync>>,
    components: Vec<MiddlewareFactory>,
}

impl ApplicationBuilder {
    /// Creates an empty builder over the application services.
    #[must_use]
    pub fn new(application_services: ServiceProvider) -> Self {
        Self {
            application_services,
            server_features: ServerFeatures::new(),
            properties: HashMap::new(),
            components: Vec::new(),
        }
    }

    /// Sets the server features visible to middleware.
    #[must_use]
    pub fn with_server_features(mut self, server_features: ServerFeatures) -> Self {
        self.server_features = server_features;
        self
    }

    /// Returns the application services.
    #[must_use]
    pub fn application_services(&self) -> &ServiceProvider {
        &self.application_services
    }

    /// Replaces the application services.
    pub fn set_application_services(&mut self, services: ServiceProvider) {
        self.application_services = services;
    }

    /// Returns the server features.
    #[must_use]
    pub fn server_features(&self) -> &ServerFeatures {
        &self.server_features
    }

    /// Appends a middleware factory.
    pub fn use_middleware<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn(RequestHandler) -> RequestHandler + Send + Sync + 'static,
    {
        self.components.push(Arc::new(factory));
        self
    }

    /// Appends a shared middleware factory.
    pub fn use_factory(&mut self, factory: MiddlewareFactory) -> &mut Self {
        self.components.push(factory);
        self
    }

    /// Appends a [`Middleware`] component.
    pub fn use_component<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        let middleware = Arc::new(middleware);
        tracing::trace!(middleware = middleware.name(), "Middleware registered");
        self.use_middleware(move |next| {
            let middleware = Arc::clone(&middleware);
            RequestHandler::new(move |ctx| {
                let middleware = Arc::clone(&middleware);
                let next = next.clone();
                Box::pin(async move { middleware.process(ctx, next).await })
            })
        })
    }

    /// Appends inline middleware that receives the next handler explicitly.
    ///
    /// # Example
    ///
    /// ```
    /// use portico_core::ServiceCollection;
    /// use portico_pipeline::ApplicationBuilder;
    ///
    /// let mut app = ApplicationBuilder::new(ServiceCollection::new().build_provider());
    /// app.use_fn(|ctx, next| {
    ///     Box::pin(async move {
    ///         ctx.response_mut()
    ///             .insert_header(http::header::SERVER, http::HeaderValue::from_static("portico"));
    ///         next.invoke(ctx).await
    ///     })
    /// });
    /// ```
    pub fn use_fn<F>(&mut self, middleware: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext, RequestHandler) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        let middleware = Arc::new(middleware);
        self.use_middleware(move |next| {
            let middleware = Arc::clone(&middleware);
            RequestHandler::new(move |ctx| middleware(ctx, next.clone()))
        })
    }

    /// Appends a terminal handler. Anything registered after it never runs.
    pub fn run<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut HttpContext) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        let terminal = RequestHandler::new(handler);
        self.use_middleware(move |_next| terminal.clone())
    }

    /// Branches the pipeline on a path prefix.
    ///
    /// Requests whose path starts with `path_match` (case-insensitive, on a
    /// segment boundary) are sent to the branch configured by `configure`.
    /// Inside the branch the matched prefix is moved from the path to the
    /// path base. Other requests continue down this pipeline.
    pub fn map<F>(&mut self, path_match: &str, configure: F) -> &mut Self
    where
        F: FnOnce(&mut ApplicationBuilder),
    {
        let mut branch_builder = self.new_branch();
        configure(&mut branch_builder);
        self.use_component(MapMiddleware::new(path_match, branch_builder.build()))
    }

    /// Creates a branch builder.
    ///
    /// The branch shares the application services and server features,
    /// receives a copy of the properties and starts with no middleware.
    #[must_use]
    pub fn new_branch(&self) -> Self {
        Self {
            application_services: self.application_services.clone(),
            server_features: self.server_features.clone(),
            properties: self.properties.clone(),
            components: Vec::new(),
        }
    }

    /// Stores a property.
    pub fn set_property<T>(&mut self, key: impl Into<String>, value: T) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        self.properties.insert(key.into(), Arc::new(value));
        self
    }

    /// Returns a property if it exists and has type `T`.
    #[must_use]
    pub fn property<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.properties
            .get(key)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Returns `true` if a property with `key` exists.
    #[must_use]
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Returns the number of registered middleware factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` if no middleware is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Compiles the registered factories into one handler.
    ///
    /// Consuming the builder freezes the chain. Each factory is invoked once,
    /// last-registered first; a factory that panics propagates the panic
    /// to the caller.
    #[must_use]
    pub fn build(self) -> RequestHandler {
        let count = self.components.len();
        let mut app = RequestHandler::not_found();
        for component in self.components.iter().rev() {
            app = component(app);
        }
        tracing::debug!(middleware = count, "Request pipeline built");
        app
    }
}

impl fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("middleware", &self.components.len())
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
