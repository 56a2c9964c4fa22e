//! Startup filters.
//!
//! A startup filter wraps the `Configure` delegate so it can register
//! middleware before and after the application's own. Filters are resolved
//! from the application services in registration order and composed so the
//! first registered filter is outermost.

use std::sync::Arc;

use portico_pipeline::{ApplicationBuilder, RequestServicesMiddleware};

use crate::startup::ConfigureDelegate;

/// Wraps the `Configure` delegate.
pub trait StartupFilter: Send + Sync {
    /// Returns a delegate that calls `next` at some point.
    fn configure(&self, next: ConfigureDelegate) -> ConfigureDelegate;
}

impl<F> StartupFilter for F
where
    F: Fn(ConfigureDelegate) -> ConfigureDelegate + Send + Sync,
{
    fn configure(&self, next: ConfigureDelegate) -> ConfigureDelegate {
        self(next)
    }
}

/// Composes `filters` around `configure`.
///
/// `filters[0]` ends up outermost: its code before `next` runs first and
/// its code after `next` runs last.
pub fn compose_startup_filters(
    filters: &[Arc<dyn StartupFilter>],
    configure: ConfigureDelegate,
) -> ConfigureDelegate {
    filters
        .iter()
        .rev()
        .fold(configure, |next, filter| filter.configure(next))
}

/// Installs the per-request service scope ahead of everything else.
///
/// Registered by the host before any user service configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestServicesStartupFilter;

impl StartupFilter for RequestServicesStartupFilter {
    fn configure(&self, next: ConfigureDelegate) -> ConfigureDelegate {
        Arc::new(move |app: &mut ApplicationBuilder| {
            let services = app.application_services().clone();
            app.use_component(RequestServicesMiddleware::new(services));
            next(app)
        })
    }
}
