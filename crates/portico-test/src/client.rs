//! Test client.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

use crate::error::TestError;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;
use crate::server::TestServer;

/// Sends requests to a [`TestServer`].
///
/// # Example
///
/// ```ignore
/// let client = TestClient::new(server);
/// let response = client.get("/").send().await?;
/// response.assert_status(StatusCode::OK).assert_body_eq("Hello World");
/// ```
#[derive(Debug, Clone)]
pub struct TestClient {
    server: TestServer,
    default_headers: HeaderMap,
}

impl TestClient {
    /// Creates a client for `server`.
    #[must_use]
    pub fn new(server: TestServer) -> Self {
        Self {
            server,
            default_headers: HeaderMap::new(),
        }
    }

    /// Adds a header sent with every request.
    ///
    /// # Errors
    ///
    /// Fails if the name or value is not a valid header.
    pub fn with_default_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, TestError> {
        let name = name.as_ref();
        let header = HeaderName::try_from(name)
            .map_err(|e| TestError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| TestError::InvalidHeader(format!("{name}: {e}")))?;
        self.default_headers.insert(header, value);
        Ok(self)
    }

    /// Returns the server this client talks to.
    #[must_use]
    pub fn server(&self) -> &TestServer {
        &self.server
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        TestClientRequest {
            client: self,
            builder: TestRequestBuilder::new(method, uri),
        }
    }

    /// Sends a prepared request.
    ///
    /// Default headers fill in anything the request does not set.
    ///
    /// # Errors
    ///
    /// Fails if the server is not running or the body cannot be read.
    pub async fn send(&self, mut request: TestRequest) -> Result<TestResponse, TestError> {
        for (name, value) in &self.default_headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }
        let response = self.server.dispatch(request.into_http_request()).await?;
        TestResponse::from_http(response).await
    }
}

/// A request being built by a [`TestClient`].
#[must_use]
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl TestClientRequest<'_> {
    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets the `Content-Type` header.
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.builder = self.builder.content_type(content_type);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Serializes `value` as the JSON body.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sends the request.
    ///
    /// # Errors
    ///
    /// Fails if the request is invalid or the server is not running.
    pub async fn send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.send(request).await
    }
}
