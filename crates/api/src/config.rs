use std::path::PathBuf;
use std::time::Duration;

use batchgen_pipeline::dispatcher::{
    DispatchConfig, DEFAULT_MAX_CONCURRENT_TASKS, DEFAULT_MAX_POLL_ATTEMPTS,
};

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8001`).
    pub port: u16,
    /// Allowed CORS origins; a single `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Grace period for in-flight dispatcher units at shutdown.
    pub shutdown_timeout_secs: u64,
    /// Task store location (default: `sqlite://tasks.db`).
    pub database_url: String,
    /// ComfyUI base URL.
    pub comfyui_url: String,
    /// Per-call timeout for ComfyUI HTTP requests.
    pub comfyui_timeout_secs: u64,
    /// Root for saved artifacts, served at `/images`.
    pub output_dir: PathBuf,
    /// Root for staged input uploads.
    pub staging_dir: PathBuf,
    /// How many stored tasks to load at startup.
    pub task_history_limit: i64,
    /// Per-subscriber push queue depth.
    pub subscriber_buffer: usize,
    pub dispatch: DispatchConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                  |
    /// |-------------------------|--------------------------|
    /// | `HOST`                  | `0.0.0.0`                |
    /// | `PORT`                  | `8001`                   |
    /// | `CORS_ORIGINS`          | `*`                      |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                     |
    /// | `DATABASE_URL`          | `sqlite://tasks.db`      |
    /// | `COMFYUI_URL`           | `http://127.0.0.1:8188`  |
    /// | `COMFYUI_TIMEOUT_SECS`  | `60`                     |
    /// | `OUTPUT_DIR`            | `./generated_images`     |
    /// | `STAGING_DIR`           | `./uploaded_images`      |
    /// | `POLL_INTERVAL_MS`      | `2000`                   |
    /// | `MAX_POLL_ATTEMPTS`     | `150`                    |
    /// | `MAX_CONCURRENT_TASKS`  | `4`                      |
    /// | `TASK_HISTORY_LIMIT`    | `100`                    |
    /// | `SUBSCRIBER_BUFFER`     | `64`                     |
    pub fn from_env() -> Self {
        let host = env_or("HOST", "0.0.0.0");

        let port: u16 = env_or("PORT", "8001")
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "*")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", "30")
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = env_or("SHUTDOWN_TIMEOUT_SECS", "30")
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let comfyui_timeout_secs: u64 = env_or("COMFYUI_TIMEOUT_SECS", "60")
            .parse()
            .expect("COMFYUI_TIMEOUT_SECS must be a valid u64");

        let poll_interval_ms: u64 = env_or("POLL_INTERVAL_MS", "2000")
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");

        let max_poll_attempts: u32 = env_or("MAX_POLL_ATTEMPTS", &DEFAULT_MAX_POLL_ATTEMPTS.to_string())
            .parse()
            .expect("MAX_POLL_ATTEMPTS must be a valid u32");

        let max_concurrent_tasks: usize =
            env_or("MAX_CONCURRENT_TASKS", &DEFAULT_MAX_CONCURRENT_TASKS.to_string())
                .parse()
                .expect("MAX_CONCURRENT_TASKS must be a valid usize");

        let task_history_limit: i64 = env_or("TASK_HISTORY_LIMIT", "100")
            .parse()
            .expect("TASK_HISTORY_LIMIT must be a valid i64");

        let subscriber_buffer: usize = env_or("SUBSCRIBER_BUFFER", "64")
            .parse()
            .expect("SUBSCRIBER_BUFFER must be a valid usize");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url: env_or("DATABASE_URL", "sqlite://tasks.db"),
            comfyui_url: env_or("COMFYUI_URL", "http://127.0.0.1:8188"),
            comfyui_timeout_secs,
            output_dir: PathBuf::from(env_or("OUTPUT_DIR", "./generated_images")),
            staging_dir: PathBuf::from(env_or("STAGING_DIR", "./uploaded_images")),
            task_history_limit,
            subscriber_buffer,
            dispatch: DispatchConfig {
                poll_interval: Duration::from_millis(poll_interval_ms),
                max_poll_attempts,
                max_concurrent_tasks,
            },
        }
    }

    /// Whether any origin is allowed.
    pub fn cors_allows_any(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
