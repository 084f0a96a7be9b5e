//! Controller-level tests over mock pins and the in-memory broker.
//!
//! Run with: cargo test --package pigate-controller --test end_to_end

use chrono::{NaiveDate, NaiveTime};
use pigate_controller::config::{StorageBackend, SyncSourceKind};
use pigate_controller::{Controller, ControllerConfig, RouteOutcome};
use pigate_core::{AccessTime, Code, Credential, GateStatus, OpenMode};
use pigate_gate::GateState;
use pigate_hardware::Level;
use pigate_network::{MemoryBroker, PublishOptions};
use pigate_storage::{CredentialStore, DenyReason};
use pigate_sync::{DirectoryObjectStore, ObjectUploader};
use std::future::Future;
use std::time::Duration;
use tempfile::TempDir;

fn mock_config(location_id: &str) -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.location_id = location_id.to_string();
    config.mock_hardware = true;
    config.storage.backend = StorageBackend::Memory;
    config.sync.source = SyncSourceKind::Disabled;
    config
}

fn hms(h: u32, m: u32, s: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, s).unwrap()
}

async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check().await
}

async fn seed(controller: &Controller, code: &str, start: NaiveTime, end: NaiveTime) {
    let store = controller.store();
    store
        .put_credential(&Credential::new(Code::new(code).unwrap(), "Alice", 1))
        .await
        .unwrap();
    store
        .put_access_time(&AccessTime::new(1, start, end))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_office_hours_code() {
    let broker = MemoryBroker::new();
    let controller = Controller::start(mock_config("site-a"), &broker).await.unwrap();
    seed(&controller, "12345", hms(9, 0, 0), hms(17, 0, 0)).await;
    let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

    let mut outcomes = Vec::new();
    for hour in [10, 7, 20] {
        let now = day.and_hms_opt(hour, 0, 0).unwrap();
        outcomes.push(controller.router().handle_code_at("12345", now).await);
    }

    assert_eq!(
        outcomes,
        vec![
            RouteOutcome::Granted(OpenMode::RegularOpen),
            RouteOutcome::Denied(DenyReason::OutsideWindow),
            RouteOutcome::Denied(DenyReason::OutsideWindow),
        ]
    );
    let statuses: Vec<GateStatus> = controller
        .store()
        .get_gate_logs()
        .await
        .unwrap()
        .into_iter()
        .map(|log| log.status)
        .collect();
    assert_eq!(
        statuses,
        vec![GateStatus::Granted, GateStatus::Denied, GateStatus::Denied]
    );

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_keypad_code_opens_gate_and_publishes_status() {
    let broker = MemoryBroker::new();
    let controller = Controller::start(mock_config("site-b"), &broker).await.unwrap();
    seed(&controller, "12345", hms(0, 0, 0), hms(23, 59, 59)).await;
    let mock = controller.mock_hardware().unwrap().clone();

    mock.keypad.send_keys("12345").await.unwrap();

    assert!(
        eventually(Duration::from_secs(5), || async {
            controller.gate().state().await == GateState::Open
        })
        .await
    );
    assert_eq!(mock.relay.level(), Level::High);
    assert_eq!(mock.led.as_ref().map(|led| led.level()), Some(Level::High));
    assert!(
        eventually(Duration::from_secs(5), || async {
            broker.retained("site-b/pigate/status").as_deref() == Some("opened")
        })
        .await
    );

    controller.shutdown().await.unwrap();
    assert_eq!(mock.relay.level(), Level::Low);
    assert_eq!(broker.retained("site-b/pigate/status").as_deref(), Some("closed"));
}

#[tokio::test]
async fn test_unknown_keypad_code_keeps_gate_closed() {
    let broker = MemoryBroker::new();
    let controller = Controller::start(mock_config("site-c"), &broker).await.unwrap();
    let mock = controller.mock_hardware().unwrap().clone();

    mock.keypad.send_keys("54321").await.unwrap();

    assert!(
        eventually(Duration::from_secs(5), || async {
            controller
                .store()
                .get_gate_logs()
                .await
                .map(|logs| logs.len() == 1)
                .unwrap_or(false)
        })
        .await
    );
    assert_eq!(controller.gate().state().await, GateState::Closed);
    assert_eq!(mock.relay.level(), Level::Low);

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_remote_commands_drive_gate() {
    let broker = MemoryBroker::new();
    let controller = Controller::start(mock_config("site-d"), &broker).await.unwrap();
    let command_topic = "site-d/pigate/command";

    broker.inject(command_topic, "hold_open", PublishOptions::default());
    assert!(
        eventually(Duration::from_secs(5), || async {
            controller.gate().state().await == GateState::LockedOpen
        })
        .await
    );

    broker.inject(command_topic, "self_destruct", PublishOptions::default());
    broker.inject(command_topic, "close", PublishOptions::default());
    assert!(
        eventually(Duration::from_secs(5), || async {
            controller.gate().state().await == GateState::Closed
        })
        .await
    );
    assert!(
        eventually(Duration::from_secs(5), || async {
            broker.retained("site-d/pigate/status").as_deref() == Some("closed")
        })
        .await
    );

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_update_notice_pulls_new_snapshot() {
    let objects_dir = TempDir::new().unwrap();
    let objects = DirectoryObjectStore::new(objects_dir.path());
    let snapshot = |codes: &[&str]| {
        let credentials: Vec<Credential> = codes
            .iter()
            .map(|code| Credential::new(Code::new(code).unwrap(), "", 1))
            .collect();
        serde_json::to_vec(&credentials).unwrap()
    };
    objects
        .put_object("credentials.json", snapshot(&["1111"]))
        .await
        .unwrap();

    let mut config = mock_config("site-e");
    config.sync.source = SyncSourceKind::Snapshot;
    config.sync.snapshot_dir = objects_dir.path().to_path_buf();
    config.sync.cooldown_secs = 0;
    let broker = MemoryBroker::new();
    let controller = Controller::start(config, &broker).await.unwrap();

    let has_code = |code: &'static str| {
        let store = controller.store().clone();
        async move { matches!(store.get_credential(code).await, Ok(Some(_))) }
    };
    assert!(eventually(Duration::from_secs(5), || has_code("1111")).await);

    objects
        .put_object("credentials.json", snapshot(&["2222"]))
        .await
        .unwrap();
    broker.inject(
        "site-e/credentials/status",
        "update_available",
        PublishOptions::default(),
    );

    assert!(eventually(Duration::from_secs(5), || has_code("2222")).await);
    assert!(!has_code("1111").await);

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dropped_feed_is_published_and_synced() {
    let objects_dir = TempDir::new().unwrap();
    let drop_dir = TempDir::new().unwrap();

    let mut config = mock_config("site-f");
    config.sync.source = SyncSourceKind::Snapshot;
    config.sync.snapshot_dir = objects_dir.path().to_path_buf();
    config.sync.drop_dir = Some(drop_dir.path().to_path_buf());
    config.sync.cooldown_secs = 0;
    let broker = MemoryBroker::new();
    let controller = Controller::start(config, &broker).await.unwrap();

    // Let the watcher record its empty baseline.
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(
        drop_dir.path().join("residents.txt"),
        "Unit,Resident,DEVICE#,SL\n1A,Dana,24680,01\n2B,Eve,13579,00\n",
    )
    .unwrap();

    let store = controller.store().clone();
    assert!(
        eventually(Duration::from_secs(10), || {
            let store = store.clone();
            async move { matches!(store.get_credential("13579").await, Ok(Some(_))) }
        })
        .await
    );
    let eve = store.get_credential("13579").await.unwrap().unwrap();
    assert!(eve.locked_out);
    assert_eq!(
        broker.retained("site-f/credentials/status").as_deref(),
        Some("update_available")
    );

    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sqlite_backend_persists_across_restart() {
    let dir = TempDir::new().unwrap();
    let mut config = mock_config("site-g");
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.path = dir.path().join("gate.db").to_string_lossy().to_string();

    let broker = MemoryBroker::new();
    let controller = Controller::start(config.clone(), &broker).await.unwrap();
    seed(&controller, "12345", hms(9, 0, 0), hms(17, 0, 0)).await;
    controller.shutdown().await.unwrap();

    let controller = Controller::start(config, &broker).await.unwrap();
    let now = NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    assert!(matches!(
        controller.router().handle_code_at("12345", now).await,
        RouteOutcome::Granted(_)
    ));
    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_startup_fails_without_gpio() {
    let dir = TempDir::new().unwrap();
    let mut config = mock_config("site-h");
    config.mock_hardware = false;
    config.gate.gpio_root = dir.path().join("no-such-gpio");

    let result = Controller::start(config, &MemoryBroker::new()).await;

    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("relay pin 17"), "{message}");
}
