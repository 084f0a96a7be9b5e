//! Two messengers on one broker, with the controller side losing its link.
//!
//! Run with: cargo test --package pigate-network --test link_loss

use pigate_network::{GateCommand, MemoryBroker, MessageHandler, Messenger, Transport};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn recorder() -> (MessageHandler, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: MessageHandler = Arc::new(move |_topic: &str, payload: &str| {
        sink.lock().unwrap().push(payload.to_string());
    });
    (handler, seen)
}

async fn wait_for_len(seen: &Mutex<Vec<String>>, len: usize) -> bool {
    for _ in 0..100 {
        if seen.lock().unwrap().len() >= len {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_commands_survive_link_loss() {
    let broker = MemoryBroker::new();
    let gate_side = Arc::new(Messenger::new(broker.connect("gatecontroller-1"), "lobby"));
    let admin_side = Messenger::new(broker.connect("admin-1"), "lobby");
    let shutdown = CancellationToken::new();
    let watcher = Arc::clone(&gate_side).spawn_reconnect_watcher(shutdown.clone());

    let (handler, seen) = recorder();
    gate_side.subscribe_commands(handler).await.unwrap();

    admin_side.send_command(GateCommand::Open).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["open"]);

    gate_side.transport().disconnect("wifi dropped");
    admin_side.send_command(GateCommand::Close).await.unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);

    gate_side.transport().reconnect();
    assert!(wait_for_len(&seen, 2).await);
    assert_eq!(*seen.lock().unwrap(), vec!["open", "close"]);

    let client_id = gate_side.transport().client_id().to_string();
    assert_eq!(broker.subscription_count(&client_id), 1);
    assert_eq!(broker.subscribe_calls(&client_id), 2);

    shutdown.cancel();
    watcher.await.unwrap();
}

#[tokio::test]
async fn test_credential_notice_reaches_other_locations_only_by_topic() {
    let broker = MemoryBroker::new();
    let lobby = Messenger::new(broker.connect("gatecontroller-lobby"), "lobby");
    let garage = Messenger::new(broker.connect("gatecontroller-garage"), "garage");
    let uploader = Messenger::new(broker.connect("uploader"), "lobby");

    let (lobby_handler, lobby_seen) = recorder();
    let (garage_handler, garage_seen) = recorder();
    lobby.subscribe_credentials_status(lobby_handler).await.unwrap();
    garage.subscribe_credentials_status(garage_handler).await.unwrap();

    uploader.notify_new_credentials().await.unwrap();

    assert_eq!(*lobby_seen.lock().unwrap(), vec!["update_available"]);
    assert!(garage_seen.lock().unwrap().is_empty());
    assert_eq!(
        broker.retained("lobby/credentials/status").as_deref(),
        Some("update_available")
    );
}
