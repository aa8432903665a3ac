use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use batchgen_comfyui::{BackendClient, ComfyUIApi};
use batchgen_events::NotificationHub;
use batchgen_pipeline::{ArtifactStore, Dispatcher, QwenWorkflowBuilder, TaskRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use batchgen_api::config::ServerConfig;
use batchgen_api::router::build_app_router;
use batchgen_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "batchgen_api=debug,batchgen_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        comfyui_url = %config.comfyui_url,
        max_concurrent_tasks = config.dispatch.max_concurrent_tasks,
        "Loaded server configuration"
    );

    // --- Database ---
    let pool = batchgen_db::create_pool(&config.database_url)
        .await
        .context("Failed to open task database")?;
    tracing::info!(database_url = %config.database_url, "Database connection pool created");

    batchgen_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    batchgen_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Storage ---
    let store = Arc::new(ArtifactStore::new(&config.output_dir, &config.staging_dir));
    store
        .ensure_dirs()
        .await
        .context("Failed to create storage directories")?;

    // --- Task registry ---
    let hub = Arc::new(NotificationHub::new(config.subscriber_buffer));
    let registry = Arc::new(TaskRegistry::new(pool.clone(), Arc::clone(&hub)));
    let loaded = registry
        .warm_load(config.task_history_limit)
        .await
        .context("Failed to load task history")?;
    tracing::info!(count = loaded, "Task history loaded");

    // --- Backend ---
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.comfyui_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let backend: Arc<dyn BackendClient> =
        Arc::new(ComfyUIApi::with_client(http, config.comfyui_url.clone()));

    // --- Dispatcher ---
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        Arc::clone(&backend),
        Arc::new(QwenWorkflowBuilder),
        Arc::clone(&store),
        config.dispatch.clone(),
    ));

    // --- App state & router ---
    let state = AppState {
        pool: pool.clone(),
        registry,
        dispatcher: Arc::clone(&dispatcher),
        hub: Arc::clone(&hub),
        backend,
        store,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST:PORT combination")?;
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining dispatcher");

    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if dispatcher.shutdown(grace).await {
        tracing::info!("All dispatcher units finished");
    } else {
        tracing::warn!(
            remaining = dispatcher.in_flight(),
            "Shutdown grace period elapsed with units still running"
        );
    }

    hub.close_all().await;
    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
