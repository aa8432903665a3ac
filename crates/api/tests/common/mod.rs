//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use batchgen_api::config::ServerConfig;
use batchgen_api::router::build_app_router;
use batchgen_api::state::AppState;
use batchgen_comfyui::{BackendClient, BackendError, OutputRef};
use batchgen_events::NotificationHub;
use batchgen_pipeline::{
    ArtifactStore, DispatchConfig, Dispatcher, QwenWorkflowBuilder, TaskRegistry,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

/// Backend that finishes every job on the first poll with one image.
pub struct FakeBackend {
    reachable: AtomicBool,
    pub submit_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            submit_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn submit(&self, _graph: &Value) -> Result<String, BackendError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("prompt-{n}"))
    }

    async fn poll(&self, _handle: &str) -> Result<Option<Value>, BackendError> {
        Ok(Some(json!({
            "outputs": {
                "60": { "images": [
                    { "filename": "ComfyUI_00001_.png", "subfolder": "", "type": "output" }
                ] }
            }
        })))
    }

    async fn fetch(&self, output: &OutputRef) -> Result<Vec<u8>, BackendError> {
        Ok(format!("bytes of {}", output.filename).into_bytes())
    }

    async fn upload_asset(&self, _bytes: Vec<u8>, name: &str) -> Result<String, BackendError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(name.to_string())
    }

    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Test application
// ---------------------------------------------------------------------------

pub fn test_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: format!("sqlite://{}", dir.path().join("tasks.db").display()),
        comfyui_url: "http://127.0.0.1:1".to_string(),
        comfyui_timeout_secs: 5,
        output_dir: dir.path().join("generated_images"),
        staging_dir: dir.path().join("uploaded_images"),
        task_history_limit: 100,
        subscriber_buffer: 64,
        dispatch: DispatchConfig {
            poll_interval: Duration::from_millis(5),
            max_poll_attempts: 20,
            max_concurrent_tasks: 4,
        },
    }
}

pub struct TestApp {
    pub dir: TempDir,
    pub app: Router,
    pub state: AppState,
    pub backend: Arc<FakeBackend>,
}

/// Build the full router over a temporary database and directories.
pub async fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);

    let pool = batchgen_db::create_pool(&config.database_url).await.unwrap();
    batchgen_db::run_migrations(&pool).await.unwrap();

    let store = Arc::new(ArtifactStore::new(&config.output_dir, &config.staging_dir));
    store.ensure_dirs().await.unwrap();

    let hub = Arc::new(NotificationHub::new(config.subscriber_buffer));
    let registry = Arc::new(TaskRegistry::new(pool.clone(), Arc::clone(&hub)));
    let backend = Arc::new(FakeBackend::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        backend.clone(),
        Arc::new(QwenWorkflowBuilder),
        Arc::clone(&store),
        config.dispatch.clone(),
    ));

    let state = AppState {
        pool,
        registry,
        dispatcher,
        hub,
        backend: backend.clone(),
        store,
    };
    let app = build_app_router(state.clone(), &config);

    TestApp {
        dir,
        app,
        state,
        backend,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> axum::response::Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> axum::response::Response {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// Multipart body with one `file` part.
pub fn multipart_request(uri: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "batchgen-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Poll `GET /api/v1/tasks/{id}` until the task is terminal.
pub async fn wait_terminal(app: &Router, task_id: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let response = get(app, &format!("/api/v1/tasks/{task_id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let task = body_json(response).await["data"].clone();
        if task["status"] == "completed" || task["status"] == "failed" {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {task_id} did not finish: {task}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
