//! Reconciliation against the SQLite store and a JSON snapshot.
//!
//! Run with: cargo test --package pigate-sync --test reconcile

use pigate_core::{Code, Credential};
use pigate_storage::{
    CredentialStore, Database, MemoryCredentialStore, SqliteCredentialStore,
};
use pigate_sync::{
    DirectoryObjectStore, ObjectUploader, SnapshotSource, StaticSource, SyncConfig, SyncEngine,
    SyncTrigger,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn auto(code: &str) -> Credential {
    Credential::new(Code::new(code).unwrap(), format!("resident {code}"), 1)
}

fn manual(code: &str) -> Credential {
    auto(code).auto_update(false)
}

async fn snapshot(store: &impl CredentialStore) -> Vec<Credential> {
    store.get_all_credentials().await.unwrap()
}

#[tokio::test]
async fn test_snapshot_sync_into_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let objects = DirectoryObjectStore::new(dir.path());
    let upstream = vec![auto("A"), auto("B").locked_out(true)];
    objects
        .put_object("credentials.json", serde_json::to_vec(&upstream).unwrap())
        .await
        .unwrap();

    let db = Database::in_memory().await.unwrap();
    let store = Arc::new(SqliteCredentialStore::new(&db));
    store.put_credential(&auto("A")).await.unwrap();
    store.put_credential(&auto("C")).await.unwrap();
    store.put_credential(&manual("M")).await.unwrap();

    let engine = SyncEngine::new(
        Arc::clone(&store),
        SnapshotSource::new(objects),
        SyncConfig::default(),
    );
    let report = engine.sync(SyncTrigger::Notification).await.unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(report.upserted, 2);
    assert!(store.get_credential("C").await.unwrap().is_none());
    assert!(store.get_credential("B").await.unwrap().unwrap().locked_out);
    assert!(!store.get_credential("M").await.unwrap().unwrap().auto_update);

    let before = snapshot(store.as_ref()).await;
    let second = engine.sync(SyncTrigger::Interval).await.unwrap();
    assert_eq!(second.deleted, 0);
    assert_eq!(snapshot(store.as_ref()).await, before);
}

fn code_set() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[0-9]{1,3}", 0..12)
}

proptest! {
    #[test]
    fn prop_sync_converges(
        upstream in code_set(),
        local_auto in code_set(),
        local_manual in code_set(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = MemoryCredentialStore::new();
            for code in &local_manual {
                store.put_credential(&manual(code)).await.unwrap();
            }
            for code in local_auto.difference(&local_manual) {
                store.put_credential(&auto(code)).await.unwrap();
            }

            let source = StaticSource::new(upstream.iter().map(|c| auto(c)).collect());
            let engine = SyncEngine::new(Arc::new(store.clone()), source, SyncConfig::default());

            engine.sync(SyncTrigger::Manual).await.unwrap();
            let after_first = snapshot(&store).await;
            engine.sync(SyncTrigger::Manual).await.unwrap();
            let after_second = snapshot(&store).await;

            // A second pass over an unchanged upstream changes nothing.
            prop_assert_eq!(&after_first, &after_second);

            // Manual records are untouched.
            for code in &local_manual {
                let kept = store.get_credential(code).await.unwrap().unwrap();
                prop_assert!(!kept.auto_update);
            }

            // Feed-owned records are exactly the upstream codes not held manually.
            let owned: BTreeSet<String> = after_first
                .iter()
                .filter(|c| c.auto_update)
                .map(|c| c.code.as_str().to_string())
                .collect();
            let expected: BTreeSet<String> =
                upstream.difference(&local_manual).cloned().collect();
            prop_assert_eq!(owned, expected);
            Ok(())
        })?;
    }
}
