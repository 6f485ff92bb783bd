//! In-process speed test server for integration tests.
//!
//! Serves the ping, download and upload endpoints with configurable
//! failures and pacing.

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{stream, StreamExt};
use serde_json::json;
use speedprobe::settings::Settings;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct ServerBehavior {
    pub download_size: usize,
    /// Held before the download response headers go out.
    pub download_delay: Duration,
    pub download_chunk: usize,
    pub download_chunk_delay: Duration,
    pub download_status: StatusCode,
    pub upload_status: StatusCode,
    /// Held after the upload body is read, before acknowledging.
    pub upload_delay: Duration,
    pub ping_delay: Duration,
    /// The first this-many ping requests answer 503.
    pub failing_pings: usize,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            download_size: 10 * 1024 * 1024,
            download_delay: Duration::ZERO,
            download_chunk: 64 * 1024,
            download_chunk_delay: Duration::ZERO,
            download_status: StatusCode::OK,
            upload_status: StatusCode::OK,
            upload_delay: Duration::ZERO,
            ping_delay: Duration::ZERO,
            failing_pings: 0,
        }
    }
}

struct Shared {
    behavior: ServerBehavior,
    pings: AtomicUsize,
    uploaded_bytes: AtomicUsize,
}

pub struct TestServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl TestServer {
    pub async fn start(behavior: ServerBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shared = Arc::new(Shared {
            behavior,
            pings: AtomicUsize::new(0),
            uploaded_bytes: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/ping", get(ping))
            .route("/api/download", get(download))
            .route("/api/upload", post(upload))
            .layer(DefaultBodyLimit::disable())
            .with_state(shared.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, shared }
    }

    /// Settings pointing at this server, with a short ping interval.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::with_server(&format!("http://{}/", self.addr)).unwrap();
        settings.ping_interval = Duration::from_millis(5);
        settings
    }

    pub fn ping_requests(&self) -> usize {
        self.shared.pings.load(Ordering::SeqCst)
    }

    pub fn uploaded_bytes(&self) -> usize {
        self.shared.uploaded_bytes.load(Ordering::SeqCst)
    }
}

async fn ping(State(shared): State<Arc<Shared>>) -> StatusCode {
    let n = shared.pings.fetch_add(1, Ordering::SeqCst);

    if !shared.behavior.ping_delay.is_zero() {
        tokio::time::sleep(shared.behavior.ping_delay).await;
    }

    if n < shared.behavior.failing_pings {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn download(State(shared): State<Arc<Shared>>) -> Response {
    let behavior = &shared.behavior;
    if !behavior.download_delay.is_zero() {
        tokio::time::sleep(behavior.download_delay).await;
    }
    if !behavior.download_status.is_success() {
        return behavior.download_status.into_response();
    }

    let payload: Vec<u8> = (0..behavior.download_size).map(|i| (i % 256) as u8).collect();
    let chunks: Vec<Bytes> = payload
        .chunks(behavior.download_chunk)
        .map(Bytes::copy_from_slice)
        .collect();

    let delay = behavior.download_chunk_delay;
    let body = stream::iter(chunks).then(move |chunk| async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok::<_, Infallible>(chunk)
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, behavior.download_size)
        .header(
            header::CACHE_CONTROL,
            "no-store, no-cache, must-revalidate, proxy-revalidate",
        )
        .header(header::CONTENT_ENCODING, "identity")
        .body(Body::from_stream(body))
        .unwrap()
}

async fn upload(State(shared): State<Arc<Shared>>, body: Bytes) -> Response {
    let status = shared.behavior.upload_status;
    if !status.is_success() {
        return (status, Json(json!({ "error": "Failed to process upload" }))).into_response();
    }

    shared.uploaded_bytes.store(body.len(), Ordering::SeqCst);
    if !shared.behavior.upload_delay.is_zero() {
        tokio::time::sleep(shared.behavior.upload_delay).await;
    }
    Json(json!({ "success": true, "bytesReceived": body.len() })).into_response()
}
