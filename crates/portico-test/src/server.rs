//! In-memory server.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use parking_lot::Mutex;
use portico_core::{BoxFuture, ServerFeatures};
use portico_hosting::shutdown::ConnectionTracker;
use portico_hosting::{HostingApplication, HostingConfig, Server, ServerFactory};

use crate::error::TestError;

/// The address a [`TestServer`] publishes to server features.
pub const TEST_SERVER_ADDRESS: &str = "http://localhost";

/// A server that dispatches requests in memory.
///
/// The same value is both the [`ServerFactory`] handed to the host and
/// the [`Server`] it creates, so a test keeps a clone to send requests.
#[derive(Clone, Default)]
pub struct TestServer {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    application: Mutex<Option<HostingApplication>>,
    requests: ConnectionTracker,
}

impl TestServer {
    /// Creates a stopped server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` between start and stop.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.application.lock().is_some()
    }

    /// Returns the number of requests being processed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.requests.active_connections()
    }

    /// Sends a request through the hosted application.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::NotStarted`] when the server is not running.
    pub async fn dispatch(&self, request: Request<Bytes>) -> Result<Response<Full<Bytes>>, TestError> {
        let application = self
            .inner
            .application
            .lock()
            .clone()
            .ok_or(TestError::NotStarted)?;
        let _request = self.inner.requests.acquire();
        Ok(application.handle(request).await)
    }
}

impl Server for TestServer {
    fn start(&self, application: HostingApplication) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let mut slot = self.inner.application.lock();
            if slot.is_some() {
                anyhow::bail!("test server is already running");
            }
            *slot = Some(application);
            drop(slot);
            tracing::debug!("Test server started");
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let previous = self.inner.application.lock().take();
            if previous.is_some() {
                self.inner.requests.wait_for_drain().await;
                tracing::debug!("Test server stopped");
            }
            Ok(())
        })
    }
}

impl ServerFactory for TestServer {
    fn create(
        &self,
        _config: &HostingConfig,
        features: ServerFeatures,
    ) -> anyhow::Result<Arc<dyn Server>> {
        features.set_addresses(vec![TEST_SERVER_ADDRESS.to_string()]);
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Debug for TestServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestServer")
            .field("running", &self.is_running())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
