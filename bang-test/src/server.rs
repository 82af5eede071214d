//! Exposes an in-process test server for use in integration tests.
//!
//! ```
//! use bang_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/");
//!    // run load against the URL...
//!    assert_eq!(server.hits(), 0);
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method};

/// A request as seen by the [`TestServer`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    /// The HTTP method.
    pub method: Method,
    /// All request headers.
    pub headers: HeaderMap,
    /// The full request body.
    pub body: Bytes,
}

#[derive(Debug, Default)]
struct Shared {
    delay: Duration,
    hits: AtomicUsize,
    last: Mutex<Option<RecordedRequest>>,
}

/// An in-process HTTP server for use in integration tests.
///
/// The server answers every method and path with `200 OK` and a short body, counting the requests
/// it has answered. It listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    shared: Arc<Shared>,
}

impl TestServer {
    /// Starts a server that responds immediately.
    pub async fn new() -> Self {
        Self::with_delay(Duration::ZERO).await
    }

    /// Starts a server that waits for `delay` before responding to each request.
    pub async fn with_delay(delay: Duration) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let shared = Arc::new(Shared {
            delay,
            ..Default::default()
        });
        let app = Router::new()
            .fallback(respond)
            .with_state(Arc::clone(&shared));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            shared,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// The number of requests answered so far.
    pub fn hits(&self) -> usize {
        self.shared.hits.load(Ordering::SeqCst)
    }

    /// The most recently answered request.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.shared.last.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(
    State(shared): State<Arc<Shared>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    if !shared.delay.is_zero() {
        tokio::time::sleep(shared.delay).await;
    }

    *shared.last.lock().unwrap() = Some(RecordedRequest {
        method,
        headers,
        body,
    });
    shared.hits.fetch_add(1, Ordering::SeqCst);

    "hello"
}

/// Returns a URL on localhost that refuses connections.
///
/// The port was free a moment ago and is not listened on, so connecting to it fails immediately.
pub fn unreachable_url() -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/")
}
