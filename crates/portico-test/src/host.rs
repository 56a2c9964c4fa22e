//! A started host backed by a [`TestServer`].

use portico_hosting::{HostingEngine, WebHostBuilder};

use crate::client::TestClient;
use crate::error::TestError;
use crate::server::TestServer;

/// A host running on an in-memory server.
#[derive(Debug)]
pub struct TestHost {
    engine: HostingEngine,
    server: TestServer,
}

impl TestHost {
    /// Builds and starts `builder` on a fresh [`TestServer`].
    ///
    /// Any server configured on the builder is replaced.
    ///
    /// # Errors
    ///
    /// Fails if the host cannot be built or started.
    pub async fn start(builder: WebHostBuilder) -> Result<Self, TestError> {
        let server = TestServer::new();
        let engine = builder.use_server(server.clone()).build()?;
        engine.start().await?;
        Ok(Self { engine, server })
    }

    /// Returns a client for this host.
    #[must_use]
    pub fn client(&self) -> TestClient {
        TestClient::new(self.server.clone())
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &HostingEngine {
        &self.engine
    }

    /// Returns the server.
    #[must_use]
    pub fn server(&self) -> &TestServer {
        &self.server
    }

    /// Stops the host.
    ///
    /// # Errors
    ///
    /// Propagates engine stop failures.
    pub async fn stop(&self) -> Result<(), TestError> {
        self.engine.stop().await?;
        Ok(())
    }
}
