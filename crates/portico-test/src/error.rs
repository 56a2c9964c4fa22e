//! Test error types.

use portico_hosting::HostingError;
use thiserror::Error;

/// Errors raised by the test server and client.
#[derive(Debug, Error)]
pub enum TestError {
    /// The request could not be built.
    #[error("request build error: {0}")]
    RequestBuild(String),

    /// A header name or value is invalid.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The response body could not be read.
    #[error("body read error: {0}")]
    BodyRead(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The test server has not been started, or was stopped.
    #[error("the test server is not running")]
    NotStarted,

    /// The host failed to build, start or stop.
    #[error(transparent)]
    Host(#[from] HostingError),
}
