//! An HTTP/1.1 server on hyper.
//!
//! One accept loop runs per listen URL. Each accepted connection is served
//! on its own task and counted by a [`ConnectionTracker`]; stopping the
//! server ends the accept loops, asks open connections to finish their
//! current request, and waits for them to close.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context as _;
use bytes::Bytes;
use futures_util::future::{self, Either};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use portico_core::{BoxFuture, CancellationToken, ServerFeatures};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::application::HostingApplication;
use crate::config::HostingConfig;
use crate::server::{Server, ServerFactory};
use crate::shutdown::ConnectionTracker;

/// Creates a [`HyperServer`] listening on the configured URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperServerFactory;

impl ServerFactory for HyperServerFactory {
    fn create(
        &self,
        config: &HostingConfig,
        features: ServerFeatures,
    ) -> anyhow::Result<Arc<dyn Server>> {
        Ok(Arc::new(HyperServer::new(config.urls().to_vec(), features)))
    }
}

struct Running {
    shutdown: CancellationToken,
    accept_loops: Vec<JoinHandle<()>>,
}

/// Serves a [`HostingApplication`] over TCP.
///
/// URLs take the form `http://host:port`. A host of `*` or `+` listens on
/// every interface and port `0` picks a free port; the addresses actually
/// bound are published to the shared [`ServerFeatures`].
pub struct HyperServer {
    urls: Vec<String>,
    features: ServerFeatures,
    tracker: ConnectionTracker,
    running: Mutex<Option<Running>>,
}

impl HyperServer {
    /// Creates a stopped server.
    #[must_use]
    pub fn new(urls: Vec<String>, features: ServerFeatures) -> Self {
        Self {
            urls,
            features,
            tracker: ConnectionTracker::new(),
            running: Mutex::new(None),
        }
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.tracker.active_connections()
    }

    async fn start_listeners(&self, application: HostingApplication) -> anyhow::Result<()> {
        if self.running.lock().is_some() {
            anyhow::bail!("the server is already running");
        }

        let mut listeners = Vec::with_capacity(self.urls.len());
        for url in &self.urls {
            let (host, port) = parse_listen_url(url)?;
            let listener = TcpListener::bind((host.as_str(), port))
                .await
                .with_context(|| format!("failed to bind to {url}"))?;
            listeners.push(listener);
        }

        let mut addresses = Vec::with_capacity(listeners.len());
        for listener in &listeners {
            let local = listener
                .local_addr()
                .context("failed to read the bound address")?;
            addresses.push(format!("http://{local}"));
        }
        self.features.set_addresses(addresses.clone());

        let shutdown = CancellationToken::new();
        let accept_loops = listeners
            .into_iter()
            .map(|listener| {
                tokio::spawn(accept_loop(
                    listener,
                    application.clone(),
                    shutdown.clone(),
                    self.tracker.clone(),
                ))
            })
            .collect();
        *self.running.lock() = Some(Running {
            shutdown,
            accept_loops,
        });

        for address in &addresses {
            tracing::info!(%address, "Now listening");
        }
        Ok(())
    }

    async fn stop_listeners(&self) -> anyhow::Result<()> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Ok(());
        };

        running.shutdown.cancel();
        for task in running.accept_loops {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Accept loop ended abnormally");
            }
        }

        tracing::info!(
            active = self.tracker.active_connections(),
            "Waiting for connections to close"
        );
        self.tracker.wait_for_drain().await;
        tracing::info!("Server stopped");
        Ok(())
    }
}

impl Server for HyperServer {
    fn start(&self, application: HostingApplication) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.start_listeners(application))
    }

    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.stop_listeners())
    }
}

impl std::fmt::Debug for HyperServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperServer")
            .field("urls", &self.urls)
            .field("running", &self.running.lock().is_some())
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    application: HostingApplication,
    shutdown: CancellationToken,
    tracker: ConnectionTracker,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, remote_addr)) => {
                    let token = tracker.acquire();
                    let application = application.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, application, shutdown).await {
                            tracing::debug!(%remote_addr, error = %e, "Connection error");
                        }
                        drop(token);
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            },
            () = shutdown.cancelled() => break,
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    application: HostingApplication,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    let service = service_fn(move |request: Request<Incoming>| {
        let application = application.clone();
        async move { Ok::<_, Infallible>(dispatch(&application, request).await) }
    });

    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    let connection = std::pin::pin!(connection);
    let cancelled = std::pin::pin!(shutdown.cancelled());

    match future::select(connection, cancelled).await {
        Either::Left((result, _)) => result,
        Either::Right(((), mut connection)) => {
            // Finish the in-flight request, then close.
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    }
}

async fn dispatch(
    application: &HostingApplication,
    request: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    match body.collect().await {
        Ok(collected) => {
            application
                .handle(Request::from_parts(parts, collected.to_bytes()))
                .await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            let mut response = Response::new(Full::new(Bytes::from_static(b"Bad Request")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            response
        }
    }
}

/// Splits an `http://host:port` listen URL into a bindable host and port.
fn parse_listen_url(url: &str) -> anyhow::Result<(String, u16)> {
    const SCHEME: &str = "http://";

    let rest = url
        .get(..SCHEME.len())
        .filter(|scheme| scheme.eq_ignore_ascii_case(SCHEME))
        .map(|_| &url[SCHEME.len()..])
        .ok_or_else(|| {
            anyhow::anyhow!("unsupported listen URL '{url}': only http:// is supported")
        })?;

    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = if authority.ends_with(']') {
        (authority, 80)
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .with_context(|| format!("invalid port in listen URL '{url}'"))?;
                (host, port)
            }
            None => (authority, 80),
        }
    };

    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = match host {
        "" => anyhow::bail!("listen URL '{url}' has no host"),
        "*" | "+" => "0.0.0.0",
        other => other,
    };
    Ok((host.to_string(), port))
}
