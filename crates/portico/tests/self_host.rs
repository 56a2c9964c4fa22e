//! The hyper self-host server end to end over TCP.

use std::time::Duration;

use portico::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn send(address: &str, request: &str) -> String {
    let address = address.trim_start_matches("http://");
    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

fn echo_host() -> WebHostBuilder {
    WebHostBuilder::new()
        .use_server(HyperServerFactory)
        .use_urls(["http://127.0.0.1:0"])
        .shutdown_timeout(Duration::from_secs(2))
        .configure(|app| {
            app.use_fn(|ctx, next| {
                Box::pin(async move {
                    ctx.response_mut().insert_header(
                        http::header::SERVER,
                        http::HeaderValue::from_static("portico"),
                    );
                    next.invoke(ctx).await
                })
            });
            app.run(|ctx| {
                Box::pin(async move {
                    let body = String::from_utf8_lossy(ctx.request().body()).into_owned();
                    let reply = format!("{} {} {body}", ctx.method(), ctx.path());
                    ctx.response_mut().write_str(&reply);
                    Ok(())
                })
            });
            Ok(())
        })
}

#[tokio::test]
async fn serves_requests_over_tcp() {
    let engine = echo_host().build().unwrap();
    engine.start().await.unwrap();

    let addresses = engine.server_features().addresses();
    assert_eq!(addresses.len(), 1);
    let address = &addresses[0];
    assert!(address.starts_with("http://127.0.0.1:"));
    assert!(!address.ends_with(":0"));

    let response = send(
        address,
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.to_ascii_lowercase().contains("server: portico"));
    assert!(response.ends_with("POST /echo hello"), "{response}");

    engine.stop().await.unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(TcpStream::connect(address.trim_start_matches("http://"))
        .await
        .is_err());
}

#[tokio::test]
async fn occupied_port_fails_to_start() {
    let occupied = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let engine = echo_host()
        .use_urls([format!("http://127.0.0.1:{port}")])
        .build()
        .unwrap();

    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, HostingError::ListenerStart(_)));
    assert_eq!(engine.state(), EngineState::PipelineBuilt);
}
