//! End-to-end runs of the worker pool against a local HTTP server.

use std::time::Duration;

use anyhow::Result;
use bang_runner::config::{Config, ConfigSecret, ErrorPolicy};
use bang_runner::error::RunError;
use bang_runner::executor::HttpExecutor;
use bang_runner::pool::{Termination, WorkerPool};
use bang_runner::report::Summary;
use bang_runner::request::RequestTemplate;
use bang_test::server::{TestServer, unreachable_url};
use secrecy::SecretBox;

fn executor(config: &Config) -> Result<HttpExecutor> {
    let template = RequestTemplate::from_config(config)?;
    Ok(HttpExecutor::new(template, config.timeout)?)
}

fn config(url: String) -> Config {
    Config {
        url: Some(url),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_count_run() -> Result<()> {
    bang_test::tracing::init();
    let server = TestServer::new().await;
    let executor = executor(&config(server.url("/")))?;

    let report = WorkerPool::new(executor, 3, Termination::Count(4))
        .run()
        .await?;

    assert_eq!(server.hits(), 12);
    assert_eq!(report.snapshot.count(), 12);
    assert_eq!(report.failures, 0);

    let summary = Summary::from(&report).to_string();
    assert!(summary.starts_with("Successful calls  \t\t        12\n"));

    Ok(())
}

#[tokio::test]
async fn test_count_run_with_slow_server() -> Result<()> {
    let server = TestServer::with_delay(Duration::from_millis(20)).await;
    let executor = executor(&config(server.url("/")))?;

    let report = WorkerPool::new(executor, 2, Termination::Count(3))
        .run()
        .await?;

    assert_eq!(server.hits(), 6);
    assert!(report.snapshot.min() >= Duration::from_millis(20));
    // Each worker sends its requests sequentially.
    assert!(report.elapsed >= Duration::from_millis(60));

    Ok(())
}

#[tokio::test]
async fn test_duration_run() -> Result<()> {
    let server = TestServer::new().await;
    let executor = executor(&config(server.url("/")))?;

    let termination = Termination::Duration(Duration::from_millis(50));
    let report = WorkerPool::new(executor, 5, termination).run().await?;

    assert!(report.elapsed >= Duration::from_millis(50));
    assert!(report.snapshot.count() > 0);
    assert!(server.hits() as u64 >= report.snapshot.count());

    Ok(())
}

#[tokio::test]
async fn test_fail_fast() -> Result<()> {
    let executor = executor(&config(unreachable_url()))?;

    let result = WorkerPool::new(executor, 2, Termination::Count(5)).run().await;
    assert!(matches!(result, Err(RunError::Transport(_))));

    Ok(())
}

#[tokio::test]
async fn test_keep_going() -> Result<()> {
    let executor = executor(&config(unreachable_url()))?;

    let report = WorkerPool::new(executor, 2, Termination::Count(5))
        .on_error(ErrorPolicy::Continue)
        .run()
        .await?;

    assert_eq!(report.snapshot.count(), 0);
    assert_eq!(report.failures, 10);
    assert!(Summary::from(&report).to_string().contains("Failed calls"));

    Ok(())
}

#[tokio::test]
async fn test_request_template() -> Result<()> {
    let server = TestServer::new().await;
    let executor = executor(&Config {
        method: "PUT".into(),
        content_type: "application/json".into(),
        body: "[1, 2, 3]".into(),
        auth: Some(SecretBox::new(Box::new(ConfigSecret::from("user:secret")))),
        ..config(server.url("/upload"))
    })?;

    WorkerPool::new(executor, 1, Termination::Count(2))
        .run()
        .await?;

    let request = server.last_request().expect("no request received");
    assert_eq!(request.method, "PUT");
    assert_eq!(request.headers["content-type"], "application/json");
    // base64("user:secret")
    assert_eq!(request.headers["authorization"], "Basic dXNlcjpzZWNyZXQ=");
    assert_eq!(request.body, "[1, 2, 3]");

    Ok(())
}
