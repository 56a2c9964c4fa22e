//! Request diagnostics.
//!
//! The host publishes named events around each request. A listener is asked
//! whether an event is enabled before its payload is built, so a disabled
//! listener costs one call per event.

use serde_json::Value;

/// Well-known event names.
pub mod events {
    /// Published before the pipeline runs.
    pub const BEGIN_REQUEST: &str = "portico.hosting.begin_request";
    /// Published after the pipeline completes.
    pub const END_REQUEST: &str = "portico.hosting.end_request";
    /// Published when the pipeline fails.
    pub const UNHANDLED_EXCEPTION: &str = "portico.hosting.unhandled_exception";
}

/// Receives hosting diagnostic events.
pub trait DiagnosticListener: Send + Sync {
    /// Returns `true` if `name` should be written.
    fn is_enabled(&self, name: &str) -> bool;

    /// Writes an event.
    fn write(&self, name: &str, payload: &Value);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDiagnostics;

impl DiagnosticListener for NullDiagnostics {
    fn is_enabled(&self, _name: &str) -> bool {
        false
    }

    fn write(&self, _name: &str, _payload: &Value) {}
}

/// Forwards events to `tracing` at TRACE level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticListener for TracingDiagnostics {
    fn is_enabled(&self, _name: &str) -> bool {
        tracing::enabled!(tracing::Level::TRACE)
    }

    fn write(&self, name: &str, payload: &Value) {
        tracing::trace!(event = name, payload = %payload, "Hosting diagnostic");
    }
}
