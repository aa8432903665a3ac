//! Shared helpers for pipeline integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batchgen_comfyui::{BackendClient, BackendError, OutputRef};
use batchgen_core::task::{Task, TaskStatus};
use batchgen_core::types::TaskId;
use batchgen_db::DbPool;
use batchgen_events::NotificationHub;
use batchgen_pipeline::{
    ArtifactStore, DispatchConfig, Dispatcher, QwenWorkflowBuilder, TaskRegistry,
};
use serde_json::{json, Value};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

/// Scriptable in-process backend with call counters.
pub struct FakeBackend {
    /// Poll attempt (1-based, per job) on which the result becomes ready;
    /// `None` means never.
    ready_on_poll: Option<u32>,
    result: Value,
    reject_submit: bool,
    panic_on_submit: bool,
    unavailable_on_poll: bool,
    missing_files: HashSet<String>,
    polls_by_handle: Mutex<HashMap<String, u32>>,
    /// Jobs submitted and not yet reported ready.
    live: AtomicUsize,
    pub peak_live: AtomicUsize,

    pub submit_calls: AtomicUsize,
    pub poll_calls: AtomicU32,
    pub fetch_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub submitted: Mutex<Vec<Value>>,
}

impl FakeBackend {
    /// Each job is ready on its second poll with two images under node "60".
    pub fn new() -> Self {
        Self {
            ready_on_poll: Some(2),
            result: outputs_under("60", &["ComfyUI_00001_.png", "ComfyUI_00002_.png"]),
            reject_submit: false,
            panic_on_submit: false,
            unavailable_on_poll: false,
            missing_files: HashSet::new(),
            polls_by_handle: Mutex::new(HashMap::new()),
            live: AtomicUsize::new(0),
            peak_live: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicU32::new(0),
            fetch_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn never_ready(mut self) -> Self {
        self.ready_on_poll = None;
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    pub fn rejecting_submit(mut self) -> Self {
        self.reject_submit = true;
        self
    }

    pub fn panicking_submit(mut self) -> Self {
        self.panic_on_submit = true;
        self
    }

    pub fn unavailable_poll(mut self) -> Self {
        self.unavailable_on_poll = true;
        self
    }

    pub fn peak(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }

    pub fn missing(mut self, filename: &str) -> Self {
        self.missing_files.insert(filename.to_string());
        self
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }
}

/// A history result with `files` under `outputs[node].images`.
pub fn outputs_under(node: &str, files: &[&str]) -> Value {
    let images: Vec<Value> = files
        .iter()
        .map(|f| json!({"filename": f, "subfolder": "", "type": "output"}))
        .collect();
    json!({ "outputs": { node: { "images": images } } })
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn submit(&self, graph: &Value) -> Result<String, BackendError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.submitted.lock().unwrap().push(graph.clone());
        if self.panic_on_submit {
            panic!("boom in submit");
        }
        if self.reject_submit {
            return Err(BackendError::Rejected {
                status: 400,
                body: "invalid prompt".into(),
            });
        }
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_live.fetch_max(live, Ordering::SeqCst);
        Ok(format!("prompt-{n}"))
    }

    async fn poll(&self, handle: &str) -> Result<Option<Value>, BackendError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable_on_poll {
            return Err(BackendError::Unavailable("connection refused".into()));
        }
        let n = {
            let mut polls = self.polls_by_handle.lock().unwrap();
            let count = polls.entry(handle.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        match self.ready_on_poll {
            Some(ready) if n == ready => {
                self.live.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(self.result.clone()))
            }
            Some(ready) if n > ready => Ok(Some(self.result.clone())),
            _ => Ok(None),
        }
    }

    async fn fetch(&self, output: &OutputRef) -> Result<Vec<u8>, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.missing_files.contains(&output.filename) {
            return Err(BackendError::ArtifactMissing(output.filename.clone()));
        }
        Ok(format!("bytes of {}", output.filename).into_bytes())
    }

    async fn upload_asset(&self, _bytes: Vec<u8>, name: &str) -> Result<String, BackendError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("backend_{name}"))
    }

    async fn is_reachable(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn fast_config() -> DispatchConfig {
    DispatchConfig {
        poll_interval: Duration::from_millis(5),
        max_poll_attempts: 20,
        max_concurrent_tasks: 4,
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub pool: DbPool,
    pub hub: Arc<NotificationHub>,
    pub registry: Arc<TaskRegistry>,
    pub store: Arc<ArtifactStore>,
    pub backend: Arc<FakeBackend>,
    pub dispatcher: Dispatcher,
}

pub fn db_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("tasks.db").display())
}

pub async fn open_pool(dir: &TempDir) -> DbPool {
    let pool = batchgen_db::create_pool(&db_url(dir)).await.unwrap();
    batchgen_db::run_migrations(&pool).await.unwrap();
    pool
}

pub async fn harness(backend: FakeBackend, config: DispatchConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir).await;
    let hub = Arc::new(NotificationHub::default());
    let registry = Arc::new(TaskRegistry::new(pool.clone(), Arc::clone(&hub)));
    let store = Arc::new(ArtifactStore::new(
        dir.path().join("generated_images"),
        dir.path().join("uploaded_images"),
    ));
    store.ensure_dirs().await.unwrap();
    let backend = Arc::new(backend);

    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        backend.clone(),
        Arc::new(QwenWorkflowBuilder),
        Arc::clone(&store),
        config,
    );

    Harness {
        dir,
        pool,
        hub,
        registry,
        store,
        backend,
        dispatcher,
    }
}

/// Poll the registry until the task is terminal.
pub async fn wait_terminal(registry: &TaskRegistry, id: TaskId) -> Task {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = registry.get(id).await.expect("task should exist");
        if task.is_terminal() {
            return task;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} did not finish, last state: {task:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll the registry until the task has left `Pending`.
pub async fn wait_admitted(registry: &TaskRegistry, id: TaskId) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = registry.get(id).await.expect("task should exist");
        if task.status != TaskStatus::Pending {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} was never admitted"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
