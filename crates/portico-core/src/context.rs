//! Per-request HTTP context.
//!
//! The [`HttpContext`] carries one request through the composed pipeline:
//! the incoming request, the response being written, a trace identifier,
//! a cooperative abort token and the request-scoped services.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::Full;
use uuid::Uuid;

use crate::di::{ServiceProvider, ServiceScope};
use crate::CancellationToken;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps identifiers sortable in logs.
///
/// # Example
///
/// ```
/// use portico_core::TraceIdentifier;
///
/// let id = TraceIdentifier::new();
/// println!("Trace identifier: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceIdentifier(Uuid);

impl TraceIdentifier {
    /// Creates a new identifier using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TraceIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TraceIdentifier {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Lazily created request service scope.
///
/// The scope is created from the application provider the first time
/// [`services`](Self::services) is called and disposed when the feature is
/// dropped. Requests that never touch their services never create a scope.
pub struct RequestServicesFeature {
    application_services: ServiceProvider,
    scope: OnceLock<ServiceScope>,
}

impl RequestServicesFeature {
    /// Creates a feature whose scope will hang off `application_services`.
    #[must_use]
    pub fn new(application_services: ServiceProvider) -> Self {
        Self {
            application_services,
            scope: OnceLock::new(),
        }
    }

    /// Returns the request-scoped provider, creating the scope on first use.
    pub fn services(&self) -> &ServiceProvider {
        self.scope
            .get_or_init(|| self.application_services.create_scope())
            .services()
    }

    /// Returns `true` if the scope has been created.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.scope.get().is_some()
    }
}

impl fmt::Debug for RequestServicesFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestServicesFeature")
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// The response being produced for a request.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    has_started: bool,
}

impl HttpResponse {
    fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            has_started: false,
        }
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Returns the response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the response headers for modification.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets a header, replacing any existing value.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Appends bytes to the body and marks the response as started.
    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        self.has_started = true;
        self.body.extend_from_slice(data.as_ref());
    }

    /// Appends a string to the body.
    pub fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Returns the body written so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns `true` once any body bytes have been written.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.has_started
    }

    /// Resets status, headers and body.
    ///
    /// Used by error boundaries that replace a partially built response.
    pub fn clear(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
        self.has_started = false;
    }

    /// Converts into an `http` response with a buffered body.
    #[must_use]
    pub fn into_http(self) -> Response<Full<Bytes>> {
        let body = self.body.freeze();
        let mut response = Response::new(Full::new(body.clone()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if !response.headers().contains_key(CONTENT_LENGTH) {
            response
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        response
    }
}

/// Per-request context passed explicitly through the pipeline.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use portico_core::HttpContext;
///
/// let request = http::Request::builder()
///     .uri("/users/42")
///     .body(Bytes::new())
///     .unwrap();
///
/// let mut ctx = HttpContext::new(request);
/// assert_eq!(ctx.path(), "/users/42");
///
/// ctx.response_mut().write_str("ok");
/// assert!(ctx.response().has_started());
/// ```
pub struct HttpContext {
    request: Request<Bytes>,
    path: String,
    path_base: String,
    response: HttpResponse,
    trace_identifier: TraceIdentifier,
    request_aborted: CancellationToken,
    request_services: Option<RequestServicesFeature>,
    items: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    started_at: Instant,
}

impl HttpContext {
    /// Creates a context for `request` with a fresh trace identifier.
    #[must_use]
    pub fn new(request: Request<Bytes>) -> Self {
        Self::with_trace_identifier(request, TraceIdentifier::new())
    }

    /// Creates a context with a caller-supplied trace identifier.
    #[must_use]
    pub fn with_trace_identifier(request: Request<Bytes>, trace_identifier: TraceIdentifier) -> Self {
        let path = request.uri().path().to_string();
        Self {
            request,
            path,
            path_base: String::new(),
            response: HttpResponse::new(),
            trace_identifier,
            request_aborted: CancellationToken::new(),
            request_services: None,
            items: HashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Returns the incoming request.
    #[must_use]
    pub fn request(&self) -> &Request<Bytes> {
        &self.request
    }

    /// Returns the incoming request for modification.
    pub fn request_mut(&mut self) -> &mut Request<Bytes> {
        &mut self.request
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Returns the request path relative to [`path_base`](Self::path_base).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replaces the request path.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Returns the portion of the path consumed by branch dispatch.
    #[must_use]
    pub fn path_base(&self) -> &str {
        &self.path_base
    }

    /// Replaces the path base.
    pub fn set_path_base(&mut self, path_base: impl Into<String>) {
        self.path_base = path_base.into();
    }

    /// Returns the response being built.
    #[must_use]
    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    /// Returns the response being built for modification.
    pub fn response_mut(&mut self) -> &mut HttpResponse {
        &mut self.response
    }

    /// Returns the trace identifier.
    #[must_use]
    pub fn trace_identifier(&self) -> TraceIdentifier {
        self.trace_identifier
    }

    /// Returns the token cancelled when the request is aborted.
    ///
    /// Cancellation is cooperative: handlers are expected to observe it.
    #[must_use]
    pub fn request_aborted(&self) -> &CancellationToken {
        &self.request_aborted
    }

    /// Signals that the request has been aborted.
    pub fn abort(&self) {
        self.request_aborted.cancel();
    }

    /// Returns the request-scoped services, creating the scope on first use.
    ///
    /// Returns `None` when no request-services feature is installed.
    pub fn request_services(&self) -> Option<&ServiceProvider> {
        self.request_services
            .as_ref()
            .map(RequestServicesFeature::services)
    }

    /// Returns `true` when a request-services feature is installed.
    #[must_use]
    pub fn has_request_services(&self) -> bool {
        self.request_services.is_some()
    }

    /// Installs a request-services feature and returns the previous one.
    ///
    /// Passing `None` removes the current feature. Dropping the returned
    /// feature disposes its scope.
    pub fn replace_request_services(
        &mut self,
        feature: Option<RequestServicesFeature>,
    ) -> Option<RequestServicesFeature> {
        std::mem::replace(&mut self.request_services, feature)
    }

    /// Stores a typed item for the lifetime of the request.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.items
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok().map(|b| *b))
    }

    /// Returns a typed item.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.items
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns a typed item for modification.
    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.items
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Removes a typed item.
    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.items
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok().map(|b| *b))
    }

    /// Returns the time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Consumes the context and returns the response.
    ///
    /// Any request scope still installed is disposed here.
    #[must_use]
    pub fn into_response(self) -> HttpResponse {
        self.response
    }
}

impl fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpContext")
            .field("method", self.request.method())
            .field("path", &self.path)
            .field("path_base", &self.path_base)
            .field("trace_identifier", &self.trace_identifier)
            .field("status", &self.response.status)
            .finish_non_exhaustive()
    }
}
