//! The server capability.
//!
//! A server accepts requests from somewhere (a socket, memory) and hands
//! each one to the [`HostingApplication`] it was started with. The host
//! creates its server through a [`ServerFactory`] registered with
//! `WebHostBuilder::use_server`.

use std::sync::Arc;

use portico_core::{BoxFuture, ServerFeatures};

use crate::application::HostingApplication;
use crate::config::HostingConfig;

/// Something that can serve a [`HostingApplication`].
pub trait Server: Send + Sync {
    /// Starts serving.
    ///
    /// Resolves once the server is ready to accept requests.
    fn start(&self, application: HostingApplication) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Stops serving.
    ///
    /// Resolves once in-flight requests have completed.
    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Creates the server for a host.
pub trait ServerFactory: Send + Sync {
    /// Creates a server for `config`.
    ///
    /// `features` is shared with the application builder; a server
    /// publishes its listening addresses there.
    fn create(
        &self,
        config: &HostingConfig,
        features: ServerFeatures,
    ) -> anyhow::Result<Arc<dyn Server>>;
}

impl<F> ServerFactory for F
where
    F: Fn(&HostingConfig, ServerFeatures) -> anyhow::Result<Arc<dyn Server>> + Send + Sync,
{
    fn create(
        &self,
        config: &HostingConfig,
        features: ServerFeatures,
    ) -> anyhow::Result<Arc<dyn Server>> {
        self(config, features)
    }
}
