//! Small HTTP target for end-to-end tests of the `http` iteration action.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const PATH_HELLO: &str = "/hello";
pub const PATH_ECHO: &str = "/echo";
pub const PATH_STATUS: &str = "/status/{code}";

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    saw_post_body: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Requests to the echo route whose body was `ping`.
    pub fn saw_post_body(&self) -> u64 {
        self.saw_post_body.load(Ordering::Relaxed)
    }
}

async fn handle_hello(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    "Hello World!"
}

async fn handle_echo(State(stats): State<TestServerStats>, body: Bytes) -> Bytes {
    stats.inc_requests_total();
    if body.as_ref() == b"ping" {
        stats.saw_post_body.fetch_add(1, Ordering::Relaxed);
    }
    body
}

async fn handle_status(State(stats): State<TestServerStats>, Path(code): Path<u16>) -> StatusCode {
    stats.inc_requests_total();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_HELLO, get(handle_hello))
        .route(PATH_ECHO, post(handle_echo))
        .route(PATH_STATUS, get(handle_status))
        .with_state(stats)
}

/// Server bound to an ephemeral localhost port, stopped on [`TestServer::shutdown`] or drop.
pub struct TestServer {
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
