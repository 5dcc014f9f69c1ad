//! Shared test helpers: in-memory task store, stub provider server
#![allow(dead_code)]

use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tunesmith_common::config::GatewayConfig;

/// Create an in-memory database with the gateway schema applied.
///
/// Single connection: each pooled connection to `:memory:` would otherwise
/// open its own empty database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory database");

    tunesmith_common::db::create_music_tasks_table(&pool)
        .await
        .expect("Failed to initialize schema");

    pool
}

/// Gateway config pointing at a stub provider, with fast polling
pub fn test_config(provider_base_url: &str) -> GatewayConfig {
    GatewayConfig {
        api_key: "test-key".to_string(),
        provider_base_url: provider_base_url.to_string(),
        callback_url: Some("http://127.0.0.1:1/callback".to_string()),
        listen_addr: "127.0.0.1:0".to_string(),
        db_path: ":memory:".into(),
        audio_dir: std::env::temp_dir().join("tunesmith-test-audio"),
        poll_interval_secs: 1,
        poll_max_attempts: 3,
        force_vocals: false,
        request_timeout_secs: 5,
        download_timeout_secs: 5,
    }
}

/// Serve a router on an ephemeral port, returning its base URL
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server died");
    });
    format!("http://{}", addr)
}

/// Canned response a stub endpoint returns
#[derive(Debug, Clone)]
pub enum StubResponse {
    Json(Value),
    Error(u16, String),
}

/// Scriptable stand-in for the generation provider.
///
/// Records submit bodies and counts polls so tests can assert on what the
/// gateway actually sent; responses are swappable mid-test.
#[derive(Clone)]
pub struct StubProvider {
    pub submits: Arc<Mutex<Vec<Value>>>,
    pub poll_count: Arc<AtomicU32>,
    pub submit_response: Arc<Mutex<StubResponse>>,
    pub poll_response: Arc<Mutex<StubResponse>>,
}

impl StubProvider {
    /// Stub that accepts submissions as `provider_task_id` and reports the
    /// task pending on every poll
    pub fn new(provider_task_id: &str) -> Self {
        Self {
            submits: Arc::new(Mutex::new(Vec::new())),
            poll_count: Arc::new(AtomicU32::new(0)),
            submit_response: Arc::new(Mutex::new(StubResponse::Json(json!({
                "code": 200,
                "data": { "taskId": provider_task_id }
            })))),
            poll_response: Arc::new(Mutex::new(StubResponse::Json(json!({
                "code": 200,
                "data": { "status": "PENDING" }
            })))),
        }
    }

    pub fn set_submit_response(&self, response: StubResponse) {
        *self.submit_response.lock().unwrap() = response;
    }

    pub fn set_poll_response(&self, response: StubResponse) {
        *self.poll_response.lock().unwrap() = response;
    }

    /// Spawn the stub's HTTP server, returning its base URL
    pub async fn serve(&self) -> String {
        let app = Router::new()
            .route("/api/v1/generate/music", post(stub_submit))
            .route("/api/v1/generate/record-info", get(stub_record_info))
            .with_state(self.clone());
        spawn_server(app).await
    }
}

async fn stub_submit(
    State(stub): State<StubProvider>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    stub.submits.lock().unwrap().push(body);
    render(stub.submit_response.lock().unwrap().clone())
}

async fn stub_record_info(State(stub): State<StubProvider>) -> axum::response::Response {
    stub.poll_count
        .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    render(stub.poll_response.lock().unwrap().clone())
}

fn render(response: StubResponse) -> axum::response::Response {
    use axum::response::IntoResponse;
    match response {
        StubResponse::Json(value) => Json(value).into_response(),
        StubResponse::Error(status, body) => (
            axum::http::StatusCode::from_u16(status).expect("valid status"),
            body,
        )
            .into_response(),
    }
}

/// Wait until `predicate` returns true, panicking after `max_ms`
pub async fn wait_for<F, Fut>(max_ms: u64, mut predicate: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(max_ms);
    loop {
        if predicate().await {
            return;
        }
        if std::time::Instant::now() > deadline {
            panic!("Condition not met within {}ms", max_ms);
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
