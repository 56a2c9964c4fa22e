//! Hosting error types.

use portico_core::InjectionError;
use thiserror::Error;

use crate::engine::EngineState;

/// Result type for hosting operations.
pub type HostingResult<T> = Result<T, HostingError>;

/// Errors raised while building, starting or stopping a host.
#[derive(Debug, Error)]
pub enum HostingError {
    /// Neither the environment-qualified nor the bare method exists.
    #[error("A method named '{qualified}' or '{fallback}' in the type '{type_name}' could not be found.")]
    ConventionNotFound {
        /// The environment-qualified name that was looked up first.
        qualified: String,
        /// The bare name that was looked up second.
        fallback: String,
        /// The startup type.
        type_name: String,
    },

    /// More than one method matches a convention name.
    #[error("Having multiple overloads of method '{method}' in the type '{type_name}' is not supported.")]
    AmbiguousConvention {
        /// The ambiguous method name.
        method: String,
        /// The startup type.
        type_name: String,
    },

    /// A convention method has a parameter it cannot accept.
    #[error("The method '{method}' in the type '{type_name}' has an invalid signature: {reason}")]
    InvalidStartupSignature {
        /// The offending method.
        method: String,
        /// The startup type.
        type_name: String,
        /// What is wrong with the signature.
        reason: String,
    },

    /// Instance startup methods exist but no activator was registered.
    #[error("The type '{type_name}' declares instance startup methods but has no activator.")]
    MissingActivator {
        /// The startup type.
        type_name: String,
    },

    /// A startup method parameter could not be resolved from services.
    #[error(
        "Unable to resolve service for parameter '{parameter}' of type '{parameter_type}' \
         in method '{method}' of the type '{type_name}'."
    )]
    DependencyResolution {
        /// The parameter name.
        parameter: String,
        /// The parameter's service type.
        parameter_type: String,
        /// The declaring method.
        method: String,
        /// The declaring startup type.
        type_name: String,
        /// The resolution failure.
        #[source]
        source: InjectionError,
    },

    /// No startup was configured on the host builder.
    #[error("No startup configured. Call use_startup, use_startup_type or configure on the host builder.")]
    MissingStartup,

    /// Services were already built for this host.
    #[error("The host services have already been built.")]
    AlreadyBuilt,

    /// An operation was attempted in the wrong state.
    #[error("Cannot {operation} while the host is {state}.")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state the host was in.
        state: EngineState,
    },

    /// No server factory was registered.
    #[error("No server is configured. Call UseServer (WebHostBuilder::use_server) to register a server.")]
    MissingServer,

    /// The server failed to start listening.
    #[error("The server failed to start: {0:#}")]
    ListenerStart(#[source] anyhow::Error),

    /// User startup code failed.
    #[error("Application startup failed: {0:#}")]
    Startup(#[source] anyhow::Error),

    /// A service could not be resolved.
    #[error(transparent)]
    Injection(#[from] InjectionError),

    /// A configuration value is invalid.
    #[error("invalid configuration value for {key}: {reason}")]
    InvalidConfig {
        /// The configuration key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Logging could not be initialized.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

impl HostingError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for misconfigured startup conventions.
    ///
    /// These are never deferred to the startup error page.
    #[must_use]
    pub fn is_convention_error(&self) -> bool {
        matches!(
            self,
            Self::ConventionNotFound { .. }
                | Self::AmbiguousConvention { .. }
                | Self::InvalidStartupSignature { .. }
                | Self::MissingActivator { .. }
        )
    }

    /// Converts a startup failure into a hosting error.
    ///
    /// Hosting errors raised inside startup code are returned unchanged,
    /// anything else becomes [`HostingError::Startup`].
    pub fn from_startup(error: anyhow::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(hosting) => hosting,
            Err(other) => Self::Startup(other),
        }
    }
}

/// Returns `true` if `error` carries a convention error.
pub(crate) fn is_convention_failure(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<HostingError>()
        .is_some_and(HostingError::is_convention_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convention_not_found_message() {
        let err = HostingError::ConventionNotFound {
            qualified: "ConfigureStaging".to_string(),
            fallback: "Configure".to_string(),
            type_name: "Startup".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "A method named 'ConfigureStaging' or 'Configure' in the type 'Startup' could not be found."
        );
        assert!(err.is_convention_error());
    }

    #[test]
    fn test_missing_server_names_use_server() {
        assert!(HostingError::MissingServer.to_string().contains("UseServer"));
    }

    #[test]
    fn test_from_startup_unwraps_hosting_errors() {
        let err = HostingError::from_startup(anyhow::Error::new(HostingError::MissingActivator {
            type_name: "Startup".to_string(),
        }));
        assert!(matches!(err, HostingError::MissingActivator { .. }));

        let err = HostingError::from_startup(anyhow::anyhow!("database unreachable"));
        assert!(matches!(err, HostingError::Startup(_)));
        assert!(err.to_string().contains("database unreachable"));
    }

    #[test]
    fn test_dependency_resolution_is_not_convention_error() {
        let err = HostingError::DependencyResolution {
            parameter: "db".to_string(),
            parameter_type: "Database".to_string(),
            method: "Configure".to_string(),
            type_name: "Startup".to_string(),
            source: InjectionError::not_registered::<String>(),
        };
        assert!(!err.is_convention_error());
        assert!(err.to_string().contains("'db'"));
        assert!(err.to_string().contains("'Configure'"));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = HostingError::InvalidState {
            operation: "start",
            state: EngineState::Unbuilt,
        };
        assert_eq!(err.to_string(), "Cannot start while the host is unbuilt.");
    }
}
