//! Integration tests for the task store.
//!
//! Each test gets its own SQLite file inside a temp directory so reopen
//! and migration scenarios run against real files.

use batchgen_core::task::{Task, TaskPatch, TaskStatus};
use batchgen_db::repositories::TaskRepo;
use batchgen_db::{create_pool, run_migrations, DbPool};
use chrono::{Duration, Utc};
use tempfile::TempDir;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn db_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("tasks.db").display())
}

async fn fresh_pool(dir: &TempDir) -> DbPool {
    let pool = create_pool(&db_url(dir)).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

fn new_task(prompt: &str) -> Task {
    Task::new_pending(
        Uuid::new_v4(),
        serde_json::json!({ "prompt": prompt }),
        Some("b1".to_string()),
        Utc::now(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_bootstrap_and_health_check() {
    let dir = TempDir::new().unwrap();
    let pool = fresh_pool(&dir).await;
    batchgen_db::health_check(&pool).await.unwrap();
    assert_eq!(TaskRepo::count(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_insert_and_find() {
    let dir = TempDir::new().unwrap();
    let pool = fresh_pool(&dir).await;
    let task = new_task("a cat");

    TaskRepo::insert(&pool, &task).await.unwrap();

    let found = TaskRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(found.id, task.id);
    assert_eq!(found.status, TaskStatus::Pending);
    assert_eq!(found.message, task.message);
    assert_eq!(found.request_snapshot["prompt"], "a cat");
    assert_eq!(found.batch_label.as_deref(), Some("b1"));
    assert!(found.artifacts.is_empty());
    assert!(found.completed_at.is_none());
}

#[tokio::test]
async fn test_find_missing_returns_none() {
    let dir = TempDir::new().unwrap();
    let pool = fresh_pool(&dir).await;
    assert!(TaskRepo::find_by_id(&pool, Uuid::new_v4())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_update_writes_only_patched_columns() {
    let dir = TempDir::new().unwrap();
    let pool = fresh_pool(&dir).await;
    let mut task = new_task("x");
    TaskRepo::insert(&pool, &task).await.unwrap();

    let applied = task
        .apply(TaskPatch::running(35.0, "Waiting"), Utc::now())
        .unwrap();
    assert!(TaskRepo::update(&pool, task.id, &applied).await.unwrap());

    let found = TaskRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(found.status, TaskStatus::Running);
    assert_eq!(found.progress, 35.0);
    assert_eq!(found.message, "Waiting");
    assert_eq!(found.batch_label.as_deref(), Some("b1"));

    let applied = task
        .apply(
            TaskPatch::completed(vec!["/images/a.png".into(), "/images/b.png".into()]),
            Utc::now(),
        )
        .unwrap();
    TaskRepo::update(&pool, task.id, &applied).await.unwrap();

    let found = TaskRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(found.status, TaskStatus::Completed);
    assert_eq!(found.artifacts, vec!["/images/a.png", "/images/b.png"]);
    assert_eq!(found.primary_artifact.as_deref(), Some("/images/a.png"));
    assert!(found.completed_at.is_some());
    assert!(found.error.is_none());
}

#[tokio::test]
async fn test_update_unknown_id_affects_nothing() {
    let dir = TempDir::new().unwrap();
    let pool = fresh_pool(&dir).await;
    let updated = TaskRepo::update(&pool, Uuid::new_v4(), &TaskPatch::failed("boom"))
        .await
        .unwrap();
    assert!(!updated);
}

#[tokio::test]
async fn test_load_recent_is_newest_first_and_limited() {
    let dir = TempDir::new().unwrap();
    let pool = fresh_pool(&dir).await;
    let base = Utc::now();

    let mut ids = Vec::new();
    for i in 0..5 {
        let mut task = new_task(&format!("p{i}"));
        task.created_at = base + Duration::seconds(i);
        TaskRepo::insert(&pool, &task).await.unwrap();
        ids.push(task.id);
    }

    let recent = TaskRepo::load_recent(&pool, 3).await.unwrap();
    let got: Vec<Uuid> = recent.iter().map(|t| t.id).collect();
    assert_eq!(got, vec![ids[4], ids[3], ids[2]]);
    assert_eq!(TaskRepo::count(&pool).await.unwrap(), 5);
}

#[tokio::test]
async fn test_tasks_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let mut task = new_task("persist me");
    {
        let pool = fresh_pool(&dir).await;
        TaskRepo::insert(&pool, &task).await.unwrap();
        let applied = task.apply(TaskPatch::failed("timeout"), Utc::now()).unwrap();
        TaskRepo::update(&pool, task.id, &applied).await.unwrap();
        pool.close().await;
    }

    let pool = fresh_pool(&dir).await;
    let found = TaskRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(found.status, TaskStatus::Failed);
    assert_eq!(found.error.as_deref(), Some("timeout"));
}

/// A database created before the `artifacts` column existed still loads
/// after the additive migration runs.
#[tokio::test]
async fn test_additive_migration_keeps_old_rows_readable() {
    let dir = TempDir::new().unwrap();
    let pool = create_pool(&db_url(&dir)).await.unwrap();

    sqlx::raw_sql(include_str!("../migrations/20250301000000_create_tasks.sql"))
        .execute(&pool)
        .await
        .unwrap();

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO tasks (id, status, progress, message, created_at, completed_at, \
         primary_artifact, error, request_snapshot, batch_label) \
         VALUES (?1, 'completed', 100.0, 'done', ?2, ?2, '/images/old.png', NULL, '{}', NULL)",
    )
    .bind(id.to_string())
    .bind(Utc::now())
    .execute(&pool)
    .await
    .unwrap();

    // The first migration's statements are idempotent, so the migrator can
    // take over a database that was created by hand.
    run_migrations(&pool).await.unwrap();

    let found = TaskRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(found.status, TaskStatus::Completed);
    assert_eq!(found.primary_artifact.as_deref(), Some("/images/old.png"));
    assert!(found.artifacts.is_empty());
}

#[tokio::test]
async fn test_undecodable_rows_are_skipped() {
    let dir = TempDir::new().unwrap();
    let pool = fresh_pool(&dir).await;
    TaskRepo::insert(&pool, &new_task("ok")).await.unwrap();

    sqlx::query(
        "INSERT INTO tasks (id, status, progress, message, created_at, request_snapshot) \
         VALUES ('not-a-uuid', 'pending', 0.0, 'x', ?1, '{}')",
    )
    .bind(Utc::now())
    .execute(&pool)
    .await
    .unwrap();

    let recent = TaskRepo::load_recent(&pool, 10).await.unwrap();
    assert_eq!(recent.len(), 1);
}
