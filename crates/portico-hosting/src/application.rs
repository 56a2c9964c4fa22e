//! The hosting application: the bridge between a server and the pipeline.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use portico_core::{panic_message, CancellationToken, HandlerResult, HttpContext, RequestHandler};
use serde_json::json;
use tracing::Instrument;

use crate::diagnostics::{events, DiagnosticListener, NullDiagnostics};

/// Runs requests through the built pipeline.
///
/// Servers receive one of these when started. Each request gets a fresh
/// [`HttpContext`], is logged, and is reported to the diagnostic listener.
#[derive(Clone)]
pub struct HostingApplication {
    pipeline: RequestHandler,
    diagnostics: Arc<dyn DiagnosticListener>,
}

impl HostingApplication {
    /// Creates an application over `pipeline`.
    pub fn new(pipeline: RequestHandler, diagnostics: Arc<dyn DiagnosticListener>) -> Self {
        Self {
            pipeline,
            diagnostics,
        }
    }

    /// Creates an application with diagnostics disabled.
    #[must_use]
    pub fn without_diagnostics(pipeline: RequestHandler) -> Self {
        Self::new(pipeline, Arc::new(NullDiagnostics))
    }

    /// Creates the context for an incoming request.
    #[must_use]
    pub fn create_context(&self, request: Request<Bytes>) -> HttpContext {
        HttpContext::new(request)
    }

    /// Runs the pipeline for `ctx`.
    ///
    /// The pipeline's error, if any, is logged and returned.
    pub async fn process_request(&self, ctx: &mut HttpContext) -> HandlerResult {
        let span = tracing::debug_span!(
            "request",
            trace_id = %ctx.trace_identifier(),
            method = %ctx.method(),
            path = %ctx.path(),
        );

        async {
            tracing::debug!("Request starting");
            if self.diagnostics.is_enabled(events::BEGIN_REQUEST) {
                self.diagnostics.write(
                    events::BEGIN_REQUEST,
                    &json!({
                        "trace_id": ctx.trace_identifier().to_string(),
                        "method": ctx.method().as_str(),
                        "path": ctx.path(),
                    }),
                );
            }

            let result = self.pipeline.invoke(ctx).await;

            if let Err(error) = &result {
                tracing::error!(error = %format!("{error:#}"), "Request failed");
                if self.diagnostics.is_enabled(events::UNHANDLED_EXCEPTION) {
                    self.diagnostics.write(
                        events::UNHANDLED_EXCEPTION,
                        &json!({
                            "trace_id": ctx.trace_identifier().to_string(),
                            "error": format!("{error:#}"),
                        }),
                    );
                }
            }

            let status = ctx.response().status().as_u16();
            let elapsed_ms = ctx.elapsed().as_secs_f64() * 1000.0;
            tracing::debug!(status, elapsed_ms, "Request finished");
            if self.diagnostics.is_enabled(events::END_REQUEST) {
                self.diagnostics.write(
                    events::END_REQUEST,
                    &json!({
                        "trace_id": ctx.trace_identifier().to_string(),
                        "status": status,
                        "elapsed_ms": elapsed_ms,
                    }),
                );
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Handles one request end to end.
    ///
    /// A failing or panicking pipeline yields `500 Internal Server Error`
    /// unless the response body has already been started. Dropping the
    /// returned future cancels the context's `request_aborted` token.
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Full<Bytes>> {
        let mut ctx = self.create_context(request);
        let guard = AbortOnDrop(Some(ctx.request_aborted().clone()));

        let outcome = AssertUnwindSafe(self.process_request(&mut ctx))
            .catch_unwind()
            .await;
        guard.disarm();

        let failed = match outcome {
            Ok(result) => result.is_err(),
            Err(panic) => {
                tracing::error!(
                    trace_id = %ctx.trace_identifier(),
                    panic = %panic_message(panic.as_ref()),
                    "Request handler panicked"
                );
                true
            }
        };

        if failed {
            if ctx.response().has_started() {
                tracing::warn!(
                    trace_id = %ctx.trace_identifier(),
                    "Response already started, sending partial response"
                );
            } else {
                let response = ctx.response_mut();
                response.clear();
                response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }

        ctx.into_response().into_http()
    }
}

impl fmt::Debug for HostingApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostingApplication").finish_non_exhaustive()
    }
}

struct AbortOnDrop(Option<CancellationToken>);

impl AbortOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.0.take() {
            token.cancel();
        }
    }
}
