//! Logging setup.
//!
//! The host logs through `tracing`. This module installs a
//! `tracing-subscriber` stack for applications that do not bring their own:
//! human-readable output in development, JSON in production.
//!
//! # Example
//!
//! ```rust,no_run
//! use portico_hosting::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development()).unwrap();
//! tracing::info!(environment = "Development", "Host starting");
//! ```

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::environment::HostingEnvironment;
use crate::error::{HostingError, HostingResult};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether to install a subscriber at all.
    pub enabled: bool,
    /// Filter directives, e.g. `info` or `portico_hosting=debug,hyper=warn`.
    pub level: String,
    /// JSON output instead of the pretty format.
    pub json_format: bool,
    /// Log span creation and close, which shows request timings.
    pub span_events: bool,
    /// Include file and line.
    pub file_line_info: bool,
    /// Include the module path.
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Debug level, pretty output, span timings.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            include_target: true,
        }
    }

    /// Info level, JSON output.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            include_target: true,
        }
    }

    /// Picks the preset matching `environment`.
    #[must_use]
    pub fn for_environment(environment: &HostingEnvironment) -> Self {
        if environment.is_development() {
            Self::development()
        } else {
            Self::production()
        }
    }

    /// Overrides the filter directives.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`HostingError::LoggingInit`] for invalid filter directives or
/// when a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> HostingResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let result = if config.json_format {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter);
        tracing_subscriber::registry().with(layer).try_init()
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter);
        tracing_subscriber::registry().with(layer).try_init()
    };

    result.map_err(|e| HostingError::LoggingInit(e.to_string()))
}

/// Parses filter directives.
///
/// # Errors
///
/// Returns [`HostingError::LoggingInit`] if `directives` is invalid.
pub fn create_env_filter(directives: &str) -> HostingResult<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| HostingError::LoggingInit(format!("invalid log filter '{directives}': {e}")))
}
