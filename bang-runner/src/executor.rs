//! Sends single requests and measures their latency.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;

use crate::error::{ConfigError, TransportError};
use crate::request::RequestTemplate;

/// Performs one request and reports how long it took.
///
/// The pool calls [`execute`](Self::execute) concurrently from many workers, so implementations
/// must be shareable across tasks.
pub trait Executor: Send + Sync + 'static {
    /// Sends one request and returns the time until the response was fully received.
    ///
    /// Any HTTP status counts as success. Only failures to deliver the request or read the
    /// response are errors.
    fn execute(&self) -> impl Future<Output = Result<Duration, TransportError>> + Send;
}

/// Replays a [`RequestTemplate`] over a pooled HTTP client.
#[derive(Debug)]
pub struct HttpExecutor {
    client: Client,
    template: Arc<RequestTemplate>,
}

impl HttpExecutor {
    /// Creates an executor with its own connection pool.
    ///
    /// Without a `timeout`, requests may take arbitrarily long.
    pub fn new(template: RequestTemplate, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        let mut builder = Client::builder().user_agent(concat!("bang/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ConfigError::Client)?;

        Ok(Self {
            client,
            template: Arc::new(template),
        })
    }

    /// The request sent by this executor.
    pub fn template(&self) -> &RequestTemplate {
        &self.template
    }
}

impl Executor for HttpExecutor {
    async fn execute(&self) -> Result<Duration, TransportError> {
        let start = Instant::now();
        let response = self.template.build(&self.client).send().await?;
        let status = response.status();
        // The body must be drained for the connection to be reused.
        let body = response.bytes().await?;
        let latency = start.elapsed();

        tracing::trace!(%status, bytes = body.len(), ?latency, "request completed");
        Ok(latency)
    }
}

#[cfg(test)]
mod tests {
    use bang_test::server::{TestServer, unreachable_url};
    use reqwest::Method;
    use url::Url;

    use super::*;

    #[tokio::test]
    async fn measures_a_request() {
        let server = TestServer::with_delay(Duration::from_millis(20)).await;
        let url = Url::parse(&server.url("/")).unwrap();
        let executor = HttpExecutor::new(RequestTemplate::new(Method::GET, url), None).unwrap();

        let latency = executor.execute().await.unwrap();
        assert!(latency >= Duration::from_millis(20));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn connection_failure_is_an_error() {
        let url = Url::parse(&unreachable_url()).unwrap();
        let executor = HttpExecutor::new(RequestTemplate::new(Method::GET, url), None).unwrap();

        assert!(executor.execute().await.is_err());
    }

    #[tokio::test]
    async fn timeout_is_an_error() {
        let server = TestServer::with_delay(Duration::from_secs(5)).await;
        let url = Url::parse(&server.url("/")).unwrap();
        let template = RequestTemplate::new(Method::GET, url);
        let executor = HttpExecutor::new(template, Some(Duration::from_millis(50))).unwrap();

        let error = executor.execute().await.unwrap_err();
        assert!(error.0.is_timeout());
    }
}
