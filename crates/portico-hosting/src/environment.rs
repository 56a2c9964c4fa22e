//! The hosting environment.

use std::path::{Path, PathBuf};

use crate::config::HostingConfig;

/// Well-known environment names.
pub mod environments {
    /// Local development.
    pub const DEVELOPMENT: &str = "Development";
    /// Pre-production.
    pub const STAGING: &str = "Staging";
    /// Production, the default.
    pub const PRODUCTION: &str = "Production";
}

/// Information about the environment the application runs in.
///
/// Registered as a singleton in the application services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingEnvironment {
    environment_name: String,
    application_name: String,
    content_root_path: PathBuf,
    web_root_path: Option<PathBuf>,
}

impl HostingEnvironment {
    /// Derives the environment from configuration.
    ///
    /// `default_application_name` is used when the configuration names no
    /// application. A relative web root is resolved against the content
    /// root; without one, `wwwroot` under the content root is used if it
    /// exists.
    #[must_use]
    pub fn from_config(config: &HostingConfig, default_application_name: &str) -> Self {
        let content_root_path = config.content_root().to_path_buf();
        let web_root_path = match config.web_root() {
            Some(root) => Some(content_root_path.join(root)),
            None => {
                let default = content_root_path.join("wwwroot");
                default.is_dir().then_some(default)
            }
        };

        Self {
            environment_name: config.environment().to_string(),
            application_name: config
                .application_name()
                .unwrap_or(default_application_name)
                .to_string(),
            content_root_path,
            web_root_path,
        }
    }

    /// Returns the environment name.
    #[must_use]
    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    /// Returns the application name.
    #[must_use]
    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Returns the content root.
    #[must_use]
    pub fn content_root_path(&self) -> &Path {
        &self.content_root_path
    }

    /// Returns the web root, if one is available.
    #[must_use]
    pub fn web_root_path(&self) -> Option<&Path> {
        self.web_root_path.as_deref()
    }

    /// Compares the environment name, ignoring ASCII case.
    #[must_use]
    pub fn is_environment(&self, name: &str) -> bool {
        self.environment_name.eq_ignore_ascii_case(name)
    }

    /// Returns `true` in the `Development` environment.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.is_environment(environments::DEVELOPMENT)
    }

    /// Returns `true` in the `Staging` environment.
    #[must_use]
    pub fn is_staging(&self) -> bool {
        self.is_environment(environments::STAGING)
    }

    /// Returns `true` in the `Production` environment.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.is_environment(environments::PRODUCTION)
    }
}
