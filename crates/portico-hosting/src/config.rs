//! Host configuration.
//!
//! [`HostingConfig`] holds the opaque string settings that steer the host:
//! environment name, content root, listening URLs, startup error capture and
//! the shutdown timeout. It can be built in code, read from key/value
//! settings, from `PORTICO_*` environment variables or from TOML.
//!
//! # Example
//!
//! ```rust
//! use portico_hosting::HostingConfig;
//! use std::time::Duration;
//!
//! let config = HostingConfig::builder()
//!     .environment("Development")
//!     .urls(["http://127.0.0.1:8080"])
//!     .shutdown_timeout(Duration::from_secs(10))
//!     .build();
//!
//! assert_eq!(config.environment(), "Development");
//! assert_eq!(config.urls(), ["http://127.0.0.1:8080"]);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::environment::environments;
use crate::error::{HostingError, HostingResult};

/// Default listening URL.
pub const DEFAULT_URL: &str = "http://localhost:5000";

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Prefix for environment variable settings.
pub const ENV_PREFIX: &str = "PORTICO_";

/// Setting keys understood by [`HostingConfig::apply_setting`].
pub mod keys {
    /// Environment name.
    pub const ENVIRONMENT: &str = "environment";
    /// Application name.
    pub const APPLICATION_NAME: &str = "applicationName";
    /// Content root path.
    pub const CONTENT_ROOT: &str = "contentRoot";
    /// Web root path, relative to the content root.
    pub const WEB_ROOT: &str = "webroot";
    /// Listening URLs separated by `;`.
    pub const URLS: &str = "urls";
    /// Whether startup errors are captured.
    pub const CAPTURE_STARTUP_ERRORS: &str = "captureStartupErrors";
    /// Whether error pages show the full error chain.
    pub const DETAILED_ERRORS: &str = "detailedErrors";
    /// Shutdown timeout in seconds.
    pub const SHUTDOWN_TIMEOUT_SECONDS: &str = "shutdownTimeoutSeconds";
}

/// Host configuration.
///
/// Use [`HostingConfig::builder()`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingConfig {
    environment: String,
    application_name: Option<String>,
    content_root: PathBuf,
    web_root: Option<PathBuf>,
    urls: Vec<String>,
    capture_startup_errors: bool,
    detailed_errors: bool,
    shutdown_timeout: Duration,
}

impl HostingConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> HostingConfigBuilder {
        HostingConfigBuilder::default()
    }

    /// Reads configuration from key/value settings.
    ///
    /// Keys match case-insensitively. Unknown keys are ignored.
    ///
    /// # Example
    ///
    /// ```rust
    /// use portico_hosting::HostingConfig;
    ///
    /// let config = HostingConfig::from_settings([
    ///     ("environment", "Staging"),
    ///     ("urls", "http://a:1;http://b:2"),
    ///     ("captureStartupErrors", "true"),
    /// ])
    /// .unwrap();
    ///
    /// assert_eq!(config.environment(), "Staging");
    /// assert_eq!(config.urls().len(), 2);
    /// assert!(config.capture_startup_errors());
    /// ```
    pub fn from_settings<I, K, V>(settings: I) -> HostingResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in settings {
            config.apply_setting(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// Reads configuration from `PORTICO_*` environment variables.
    ///
    /// `PORTICO_ENVIRONMENT`, `PORTICO_URLS`, `PORTICO_CAPTURESTARTUPERRORS`
    /// and so on map onto the keys in [`keys`].
    pub fn from_env() -> HostingResult<Self> {
        Self::from_settings(std::env::vars().filter_map(|(name, value)| {
            name.strip_prefix(ENV_PREFIX)
                .map(|key| (key.to_string(), value))
        }))
    }

    /// Parses configuration from a TOML document.
    ///
    /// ```rust
    /// use portico_hosting::HostingConfig;
    ///
    /// let config = HostingConfig::from_toml_str(r#"
    ///     environment = "Development"
    ///     urls = ["http://127.0.0.1:0"]
    ///     shutdown_timeout_seconds = 2
    /// "#).unwrap();
    ///
    /// assert!(config.detailed_errors());
    /// ```
    pub fn from_toml_str(content: &str) -> HostingResult<Self> {
        let file: HostingConfigFile = toml::from_str(content)?;
        let mut builder = Self::builder();
        if let Some(environment) = file.environment {
            builder = builder.environment(environment);
        }
        if let Some(name) = file.application_name {
            builder = builder.application_name(name);
        }
        if let Some(root) = file.content_root {
            builder = builder.content_root(root);
        }
        if let Some(root) = file.web_root {
            builder = builder.web_root(root);
        }
        if let Some(urls) = file.urls {
            builder = builder.urls(urls);
        }
        if let Some(capture) = file.capture_startup_errors {
            builder = builder.capture_startup_errors(capture);
        }
        if let Some(detailed) = file.detailed_errors {
            builder = builder.detailed_errors(detailed);
        }
        if let Some(seconds) = file.shutdown_timeout_seconds {
            builder = builder.shutdown_timeout(Duration::from_secs(seconds));
        }
        Ok(builder.build())
    }

    /// Applies one key/value setting.
    pub fn apply_setting(&mut self, key: &str, value: &str) -> HostingResult<()> {
        let matches = |candidate: &str| key.eq_ignore_ascii_case(candidate);

        if matches(keys::ENVIRONMENT) {
            self.environment = value.to_string();
        } else if matches(keys::APPLICATION_NAME) {
            self.application_name = Some(value.to_string());
        } else if matches(keys::CONTENT_ROOT) {
            self.content_root = PathBuf::from(value);
        } else if matches(keys::WEB_ROOT) {
            self.web_root = Some(PathBuf::from(value));
        } else if matches(keys::URLS) {
            self.urls = split_urls(value);
        } else if matches(keys::CAPTURE_STARTUP_ERRORS) {
            self.capture_startup_errors = parse_bool(keys::CAPTURE_STARTUP_ERRORS, value)?;
        } else if matches(keys::DETAILED_ERRORS) {
            self.detailed_errors = parse_bool(keys::DETAILED_ERRORS, value)?;
        } else if matches(keys::SHUTDOWN_TIMEOUT_SECONDS) {
            let seconds = value.trim().parse::<u64>().map_err(|e| {
                HostingError::invalid_config(keys::SHUTDOWN_TIMEOUT_SECONDS, e.to_string())
            })?;
            self.shutdown_timeout = Duration::from_secs(seconds);
        } else {
            tracing::trace!(key, "Ignoring unknown hosting setting");
        }
        Ok(())
    }

    /// Returns the environment name.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Returns the configured application name, if any.
    #[must_use]
    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    /// Returns the content root.
    #[must_use]
    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Returns the configured web root, if any.
    #[must_use]
    pub fn web_root(&self) -> Option<&Path> {
        self.web_root.as_deref()
    }

    /// Returns the listening URLs.
    #[must_use]
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Returns whether startup errors are turned into an error page.
    #[must_use]
    pub fn capture_startup_errors(&self) -> bool {
        self.capture_startup_errors
    }

    /// Returns whether error pages show the full error chain.
    ///
    /// Always `true` in the `Development` environment.
    #[must_use]
    pub fn detailed_errors(&self) -> bool {
        self.detailed_errors
            || self
                .environment
                .eq_ignore_ascii_case(environments::DEVELOPMENT)
    }

    /// Returns how long the host waits for the server to stop.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub(crate) fn set_shutdown_timeout(&mut self, timeout: Duration) {
        self.shutdown_timeout = timeout;
    }
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`HostingConfig`].
#[derive(Debug, Clone)]
pub struct HostingConfigBuilder {
    environment: String,
    application_name: Option<String>,
    content_root: PathBuf,
    web_root: Option<PathBuf>,
    urls: Vec<String>,
    capture_startup_errors: bool,
    detailed_errors: bool,
    shutdown_timeout: Duration,
}

impl HostingConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            environment: environments::PRODUCTION.to_string(),
            application_name: None,
            content_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            web_root: None,
            urls: vec![DEFAULT_URL.to_string()],
            capture_startup_errors: false,
            detailed_errors: false,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }

    /// Sets the environment name.
    #[must_use]
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Sets the application name.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the content root.
    #[must_use]
    pub fn content_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.content_root = root.into();
        self
    }

    /// Sets the web root.
    #[must_use]
    pub fn web_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.web_root = Some(root.into());
        self
    }

    /// Replaces the listening URLs.
    #[must_use]
    pub fn urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables startup error capture.
    #[must_use]
    pub fn capture_startup_errors(mut self, capture: bool) -> Self {
        self.capture_startup_errors = capture;
        self
    }

    /// Enables or disables detailed error pages.
    #[must_use]
    pub fn detailed_errors(mut self, detailed: bool) -> Self {
        self.detailed_errors = detailed;
        self
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Builds the [`HostingConfig`].
    #[must_use]
    pub fn build(self) -> HostingConfig {
        HostingConfig {
            environment: self.environment,
            application_name: self.application_name,
            content_root: self.content_root,
            web_root: self.web_root,
            urls: self.urls,
            capture_startup_errors: self.capture_startup_errors,
            detailed_errors: self.detailed_errors,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

impl Default for HostingConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostingConfigFile {
    environment: Option<String>,
    application_name: Option<String>,
    content_root: Option<PathBuf>,
    web_root: Option<PathBuf>,
    urls: Option<Vec<String>>,
    capture_startup_errors: Option<bool>,
    detailed_errors: Option<bool>,
    shutdown_timeout_seconds: Option<u64>,
}

fn split_urls(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_bool(key: &str, value: &str) -> HostingResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(HostingError::invalid_config(
            key,
            format!("expected true or false, got '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostingConfig::default();
        assert_eq!(config.environment(), "Production");
        assert_eq!(config.urls(), [DEFAULT_URL]);
        assert!(!config.capture_startup_errors());
        assert!(!config.detailed_errors());
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert!(config.application_name().is_none());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = HostingConfig::builder()
            .environment("Staging")
            .application_name("orders")
            .content_root("/srv/orders")
            .web_root("public")
            .capture_startup_errors(true)
            .detailed_errors(true)
            .build();

        assert_eq!(config.environment(), "Staging");
        assert_eq!(config.application_name(), Some("orders"));
        assert_eq!(config.content_root(), Path::new("/srv/orders"));
        assert_eq!(config.web_root(), Some(Path::new("public")));
        assert!(config.capture_startup_errors());
        assert!(config.detailed_errors());
    }

    #[test]
    fn test_development_implies_detailed_errors() {
        let config = HostingConfig::builder().environment("development").build();
        assert!(config.detailed_errors());
    }

    #[test]
    fn test_settings_case_insensitive() {
        let config = HostingConfig::from_settings([
            ("ENVIRONMENT", "Development"),
            ("URLS", " http://a:1 ; ;http://b:2 "),
            ("SHUTDOWNTIMEOUTSECONDS", "12"),
            ("DetailedErrors", "1"),
            ("somethingElse", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.environment(), "Development");
        assert_eq!(config.urls(), ["http://a:1", "http://b:2"]);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(12));
        assert!(config.detailed_errors());
    }

    #[test]
    fn test_invalid_bool_setting() {
        let err = HostingConfig::from_settings([("captureStartupErrors", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("captureStartupErrors"));
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn test_invalid_timeout_setting() {
        let err = HostingConfig::from_settings([("shutdownTimeoutSeconds", "soon")]).unwrap_err();
        assert!(matches!(err, HostingError::InvalidConfig { .. }));
    }

    #[test]
    fn test_toml_config() {
        let config = HostingConfig::from_toml_str(
            r#"
            environment = "Staging"
            application_name = "billing"
            urls = ["http://0.0.0.0:8080", "http://0.0.0.0:8081"]
            capture_startup_errors = true
            shutdown_timeout_seconds = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.environment(), "Staging");
        assert_eq!(config.application_name(), Some("billing"));
        assert_eq!(config.urls().len(), 2);
        assert!(config.capture_startup_errors());
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_toml_unknown_field_rejected() {
        let result = HostingConfig::from_toml_str("unknown_key = 1");
        assert!(matches!(result, Err(HostingError::Toml(_))));
    }
}
