//! End-to-end hosting scenarios on the in-memory test server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::StatusCode;
use parking_lot::Mutex;
use portico::hosting::LifetimeState;
use portico::prelude::*;
use portico_test::{RecordingDiagnostics, TestHost, TestServer};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn hello_world() -> WebHostBuilder {
    WebHostBuilder::new().configure(|app| {
        app.run(|ctx| {
            Box::pin(async move {
                ctx.response_mut().write_str("Hello World");
                Ok(())
            })
        });
        Ok(())
    })
}

#[tokio::test]
async fn echo_app_answers_hello_world() {
    let host = TestHost::start(hello_world()).await.unwrap();

    let response = host.client().get("/").send().await.unwrap();
    response
        .assert_status(StatusCode::OK)
        .assert_body_eq("Hello World")
        .assert_header("content-length", "11");

    host.stop().await.unwrap();
}

#[tokio::test]
async fn empty_pipeline_answers_not_found() {
    let host = TestHost::start(WebHostBuilder::new().configure(|_| Ok(())))
        .await
        .unwrap();

    host.client()
        .get("/anything")
        .send()
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND);
}

struct RequestMarker(usize);

fn marking_filter(tag: &'static str, log: &Log) -> Arc<dyn StartupFilter> {
    let log = Arc::clone(log);
    Arc::new(move |next: ConfigureDelegate| -> ConfigureDelegate {
        let log = Arc::clone(&log);
        Arc::new(move |app: &mut ApplicationBuilder| {
            let log = Arc::clone(&log);
            app.use_fn(move |ctx, next| {
                let log = Arc::clone(&log);
                Box::pin(async move {
                    let marker = ctx
                        .request_services()
                        .map(|services| services.resolve_required::<RequestMarker>())
                        .transpose()?
                        .map_or(0, |marker| marker.0);
                    log.lock().push(format!("{tag}:{marker}"));
                    next.invoke(ctx).await
                })
            });
            next(app)
        })
    })
}

#[tokio::test]
async fn startup_filters_wrap_configure_in_registration_order() {
    let log = log();
    let created = Arc::new(AtomicUsize::new(0));

    let builder = WebHostBuilder::new()
        .configure_services({
            let log = Arc::clone(&log);
            let created = Arc::clone(&created);
            move |services| {
                let created = Arc::clone(&created);
                services
                    .add_scoped(move |_| {
                        Ok(Arc::new(RequestMarker(
                            created.fetch_add(1, Ordering::SeqCst) + 1,
                        )))
                    })
                    .add_singleton(marking_filter("A", &log))
                    .add_singleton(marking_filter("B", &log));
            }
        })
        .configure({
            let log = Arc::clone(&log);
            move |app| {
                let log = Arc::clone(&log);
                app.run(move |ctx| {
                    let log = Arc::clone(&log);
                    Box::pin(async move {
                        log.lock().push("app".to_string());
                        ctx.response_mut().write_str("done");
                        Ok(())
                    })
                });
                Ok(())
            }
        });

    let host = TestHost::start(builder).await.unwrap();
    let client = host.client();

    client.get("/").send().await.unwrap().assert_body_eq("done");
    client.get("/").send().await.unwrap().assert_body_eq("done");

    assert_eq!(
        *log.lock(),
        vec!["A:1", "B:1", "app", "A:2", "B:2", "app"],
        "first filter outermost, one scope per request"
    );
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn lifecycle_signals_fire_in_order() {
    let log = log();
    let host = TestHost::start(hello_world()).await.unwrap();
    let lifetime = host.engine().lifetime().clone();
    assert_eq!(lifetime.state(), LifetimeState::Started);

    lifetime.application_started().register({
        let log = Arc::clone(&log);
        move || log.lock().push("started".to_string())
    });
    lifetime.application_stopping().register({
        let log = Arc::clone(&log);
        let server = host.server().clone();
        move || log.lock().push(format!("stopping:running={}", server.is_running()))
    });
    lifetime.application_stopped().register({
        let log = Arc::clone(&log);
        let server = host.server().clone();
        move || log.lock().push(format!("stopped:running={}", server.is_running()))
    });

    host.stop().await.unwrap();

    assert_eq!(
        *log.lock(),
        vec!["started", "stopping:running=true", "stopped:running=false"]
    );
    assert_eq!(lifetime.state(), LifetimeState::Stopped);
    assert_eq!(host.engine().state(), EngineState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_shutdown_runs_callbacks_once() {
    let server = TestServer::new();
    let engine = Arc::new(hello_world().use_server(server.clone()).build().unwrap());
    let lifetime = engine.lifetime().clone();

    let stopping = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));
    lifetime.application_stopping().register({
        let stopping = Arc::clone(&stopping);
        move || {
            stopping.fetch_add(1, Ordering::SeqCst);
        }
    });
    lifetime.application_stopped().register({
        let stopped = Arc::clone(&stopped);
        move || {
            stopped.fetch_add(1, Ordering::SeqCst);
        }
    });

    let running = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run_until(std::future::pending()).await }
    });
    while !lifetime.application_started().is_cancelled() {
        tokio::task::yield_now().await;
    }

    let callers: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let lifetime = lifetime.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    lifetime.stop_application();
                } else {
                    engine.stop().await.unwrap();
                }
            })
        })
        .collect();
    for caller in callers {
        caller.await.unwrap();
    }
    running.await.unwrap().unwrap();

    assert_eq!(stopping.load(Ordering::SeqCst), 1);
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(!server.is_running());
}

#[tokio::test]
async fn environment_specific_configure_takes_precedence() {
    fn answering(name: &'static str) -> StartupMethod {
        StartupMethod::static_method(name, move |args| {
            args.app()?.run(move |ctx| {
                Box::pin(async move {
                    ctx.response_mut().write_str(name);
                    Ok(())
                })
            });
            Ok(())
        })
        .with_parameter(StartupParameter::application_builder("app"))
    }

    let startup = || {
        StartupType::new("Startup")
            .method(answering("ConfigureFoo"))
            .method(answering("Configure"))
    };

    let foo = TestHost::start(
        WebHostBuilder::new()
            .use_environment("Foo")
            .use_startup_type(startup()),
    )
    .await
    .unwrap();
    foo.client()
        .get("/")
        .send()
        .await
        .unwrap()
        .assert_body_eq("ConfigureFoo");

    let bar = TestHost::start(
        WebHostBuilder::new()
            .use_environment("Bar")
            .use_startup_type(startup()),
    )
    .await
    .unwrap();
    bar.client()
        .get("/")
        .send()
        .await
        .unwrap()
        .assert_body_eq("Configure");
}

#[tokio::test]
async fn missing_configure_is_a_convention_error() {
    let startup = StartupType::new("Startup")
        .method(StartupMethod::static_method("ConfigureServices", |_| Ok(())));

    let err = WebHostBuilder::new()
        .capture_startup_errors(true)
        .use_environment("Staging")
        .use_startup_type(startup)
        .build()
        .unwrap_err();

    assert!(err.is_convention_error());
    assert_eq!(
        err.to_string(),
        "A method named 'ConfigureStaging' or 'Configure' in the type 'Startup' could not be found."
    );
}

#[tokio::test]
async fn start_without_server_fails() {
    let engine = hello_world().build().unwrap();

    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, HostingError::MissingServer));
    assert!(err.to_string().contains("UseServer"));
    assert_eq!(engine.state(), EngineState::PipelineBuilt);
    assert_eq!(engine.lifetime().state(), LifetimeState::Created);
}

#[tokio::test]
async fn captured_startup_error_answers_every_request() {
    let builder = WebHostBuilder::new()
        .capture_startup_errors(true)
        .configure(|_| Err(anyhow::anyhow!("database unreachable")));

    let host = TestHost::start(builder).await.unwrap();
    assert!(host.engine().startup_error().is_some());

    let client = host.client();
    for path in ["/", "/orders", "/health"] {
        client
            .get(path)
            .send()
            .await
            .unwrap()
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR)
            .assert_body_contains("database unreachable");
    }
}

#[tokio::test]
async fn captured_dependency_failure_answers_every_request() {
    struct Database;

    let startup = StartupType::new("Startup").method(
        StartupMethod::static_method("Configure", |_| Ok(()))
            .with_parameter(StartupParameter::service::<Database>("db")),
    );
    let builder = WebHostBuilder::new()
        .capture_startup_errors(true)
        .use_startup_type(startup);

    let host = TestHost::start(builder).await.unwrap();
    assert!(host.engine().startup_error().is_some());

    let client = host.client();
    for path in ["/", "/orders"] {
        client
            .get(path)
            .send()
            .await
            .unwrap()
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR)
            .assert_body_contains("Unable to resolve service for parameter &#39;db&#39;");
    }
}

#[tokio::test]
async fn startup_error_without_capture_fails_the_build() {
    let err = WebHostBuilder::new()
        .configure(|_| Err(anyhow::anyhow!("database unreachable")))
        .build()
        .unwrap_err();

    assert!(format!("{err:#}").contains("database unreachable"));
}

#[tokio::test]
async fn failing_request_becomes_internal_server_error() {
    let diagnostics = RecordingDiagnostics::new();
    let builder = WebHostBuilder::new()
        .use_diagnostics(diagnostics.clone())
        .configure(|app| {
            app.run(|_ctx| Box::pin(async move { Err::<(), _>(anyhow::anyhow!("handler failed")) }));
            Ok(())
        });

    let host = TestHost::start(builder).await.unwrap();
    let response = host.client().get("/").send().await.unwrap();
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body().is_empty());

    assert_eq!(
        diagnostics.names(),
        vec![
            "portico.hosting.begin_request",
            "portico.hosting.unhandled_exception",
            "portico.hosting.end_request",
        ]
    );
}

#[tokio::test]
async fn map_branches_on_path_prefix() {
    let builder = WebHostBuilder::new().configure(|app| {
        app.map("/api", |branch| {
            branch.run(|ctx| {
                Box::pin(async move {
                    let seen = format!("{}|{}", ctx.path_base(), ctx.path());
                    ctx.response_mut().write_str(&seen);
                    Ok(())
                })
            });
        });
        app.run(|ctx| {
            Box::pin(async move {
                ctx.response_mut().write_str("root");
                Ok(())
            })
        });
        Ok(())
    });

    let host = TestHost::start(builder).await.unwrap();
    let client = host.client();

    client
        .get("/api/orders")
        .send()
        .await
        .unwrap()
        .assert_body_eq("/api|/orders");
    client.get("/apis").send().await.unwrap().assert_body_eq("root");
}
