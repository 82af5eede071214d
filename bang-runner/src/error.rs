//! Error types for configuring and running load.

use thiserror::Error;

/// Errors detected while validating the configuration, before any request is sent.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No target URL was configured.
    #[error("please specify a url to send requests to")]
    MissingUrl,

    /// The target URL could not be parsed.
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        /// The URL as configured.
        url: String,
        /// The reason parsing failed.
        source: url::ParseError,
    },

    /// The target URL does not use HTTP.
    #[error("unsupported url scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),

    /// The configured concurrency is zero.
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    /// The runtime was configured without worker threads.
    #[error("the runtime needs at least 1 worker thread")]
    ZeroWorkerThreads,

    /// The configured method is not a valid HTTP method token.
    #[error("invalid http method {0:?}")]
    InvalidMethod(String),

    /// The configured content type is not a valid header value.
    #[error("invalid content type {0:?}")]
    InvalidContentType(String),

    /// The configured credentials are not of the form `user:password`.
    #[error("credentials must be given as user:password")]
    InvalidCredentials,

    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// A request failed before a complete response was received.
///
/// HTTP error statuses are not transport errors; any response that arrives in full counts as a
/// successful request.
#[derive(Debug, Error)]
#[error("request failed: {0}")]
pub struct TransportError(#[from] pub reqwest::Error);

/// Errors that end a run without a result.
#[derive(Debug, Error)]
pub enum RunError {
    /// A request failed and the run was configured to fail fast.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// The run was dropped before it signalled completion.
    #[error("run ended without signalling completion")]
    Abandoned,
}
