//! Integration tests for the on-disk credential database.
//!
//! Run with: cargo test --package pigate-storage --test integration_database

use chrono::{NaiveDate, NaiveTime, Utc};
use pigate_core::{AccessTime, Code, Credential, GateLog, GateStatus};
use pigate_storage::{
    AccessEvaluator, AnyCredentialStore, CredentialStore, Database, DatabaseConfig,
    SqliteCredentialStore,
};
use std::sync::Arc;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> DatabaseConfig {
    let path = dir.path().join("nested").join("gate.db");
    DatabaseConfig::new(path.to_string_lossy().to_string()).max_connections(2)
}

#[tokio::test]
async fn test_in_memory_database() {
    let db = Database::in_memory().await.unwrap();
    db.health_check().await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn test_file_database_creates_parent_directory() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let db = Database::new(config.clone()).await.unwrap();
    db.health_check().await.unwrap();
    db.close().await;

    assert!(std::path::Path::new(&config.database_path).exists());
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    {
        let db = Database::new(config.clone()).await.unwrap();
        let store = SqliteCredentialStore::new(&db);
        store
            .put_credential(&Credential::new(Code::new("12345").unwrap(), "Alice", 1))
            .await
            .unwrap();
        store
            .put_gate_log(&GateLog::new("12345", Utc::now(), GateStatus::Granted))
            .await
            .unwrap();
        db.close().await;
    }

    let db = Database::new(config).await.unwrap();
    let store = SqliteCredentialStore::new(&db);

    let credential = store.get_credential("12345").await.unwrap().unwrap();
    assert_eq!(credential.username, "Alice");
    assert_eq!(store.get_gate_logs().await.unwrap().len(), 1);
    db.close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();

    db.migrate().await.unwrap();
    db.migrate().await.unwrap();

    let result: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('credentials', 'access_times', 'gate_request_log')",
    )
    .fetch_one(db.pool())
    .await
    .unwrap();

    assert_eq!(result.0, 3);
    db.close().await;
}

#[tokio::test]
async fn test_concurrent_reads() {
    let db = Database::in_memory().await.unwrap();
    let store = Arc::new(SqliteCredentialStore::new(&db));
    store
        .put_credential(&Credential::new(Code::new("1").unwrap(), "", 1))
        .await
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get_credential("1").await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert!(result.unwrap().unwrap().is_some());
    }
}

#[tokio::test]
async fn test_evaluator_over_sqlite_dispatch() {
    let db = Database::in_memory().await.unwrap();
    let store = AnyCredentialStore::Sqlite(SqliteCredentialStore::new(&db));

    store
        .put_credential(&Credential::new(Code::new("12345").unwrap(), "Alice", 1))
        .await
        .unwrap();
    store
        .put_access_time(&AccessTime::new(
            1,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        ))
        .await
        .unwrap();

    let evaluator = AccessEvaluator::new(Arc::new(store));
    let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

    for (hour, expected) in [(10, true), (7, false), (20, false)] {
        let now = day.and_hms_opt(hour, 0, 0).unwrap();
        assert_eq!(
            evaluator.validate_credential("12345", now).await.is_granted(),
            expected,
            "hour {hour}"
        );
    }
}
