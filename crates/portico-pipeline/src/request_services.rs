//! Per-request service scoping.

use portico_core::{
    BoxFuture, HandlerResult, HttpContext, RequestHandler, RequestServicesFeature, ServiceProvider,
};

use crate::middleware::Middleware;

/// Installs a lazily created service scope for each request.
///
/// If a scope is already installed (an outer pipeline set one up) the
/// request passes straight through. Otherwise a fresh
/// [`RequestServicesFeature`] is installed for the rest of the pipeline and
/// the previous state is restored afterwards, which disposes the scope. If
/// the pipeline panics or the request future is dropped, the scope is
/// disposed together with the context.
#[derive(Debug, Clone)]
pub struct RequestServicesMiddleware {
    services: ServiceProvider,
}

impl RequestServicesMiddleware {
    /// Creates the middleware over the application services.
    #[must_use]
    pub fn new(services: ServiceProvider) -> Self {
        Self { services }
    }
}

impl Middleware for RequestServicesMiddleware {
    fn name(&self) -> &'static str {
        "request_services"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut HttpContext,
        next: RequestHandler,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if ctx.has_request_services() {
                return next.invoke(ctx).await;
            }

            let previous = ctx.replace_request_services(Some(RequestServicesFeature::new(
                self.services.clone(),
            )));
            let result = next.invoke(ctx).await;
            let scoped = ctx.replace_request_services(previous);
            drop(scoped);
            result
        })
    }
}
