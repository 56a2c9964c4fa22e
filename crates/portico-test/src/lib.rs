//! # Portico Test
//!
//! In-memory hosting for tests. Requests go through the full hosting
//! pipeline (startup filters, middleware, error handling) without binding
//! a port.
//!
//! ## Example
//!
//! ```ignore
//! use portico_hosting::WebHostBuilder;
//! use portico_test::TestHost;
//!
//! #[tokio::test]
//! async fn test_hello() {
//!     let host = TestHost::start(WebHostBuilder::new().configure(|app| {
//!         app.run(|ctx| Box::pin(async move {
//!             ctx.response_mut().write_str("Hello World");
//!             Ok(())
//!         }));
//!         Ok(())
//!     }))
//!     .await
//!     .unwrap();
//!
//!     host.client()
//!         .get("/")
//!         .send()
//!         .await
//!         .unwrap()
//!         .assert_body_eq("Hello World");
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod diagnostics;
mod error;
mod host;
mod request;
mod response;
mod server;

pub use client::{TestClient, TestClientRequest};
pub use diagnostics::RecordingDiagnostics;
pub use error::TestError;
pub use host::TestHost;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;
pub use server::{TestServer, TEST_SERVER_ADDRESS};
