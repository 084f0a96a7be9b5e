//! Messaging layer for the PiGate edge controller.
//!
//! Gate commands, gate status and credential update notices travel over a
//! publish/subscribe broker, scoped per location:
//!
//! | Topic | Payloads |
//! |-------|----------|
//! | `{location}/pigate/command` | `open`, `close`, `hold_open` |
//! | `{location}/pigate/status` | `opened`, `closed` |
//! | `{location}/credentials/status` | `update_available` |
//!
//! Publishes are QoS 1 and retained. Delivery is at-least-once, so every
//! consumer must handle repeats idempotently.
//!
//! # Components
//!
//! - [`Transport`]: one client session with a broker.
//! - [`Messenger`]: topic vocabulary, subscription table, reconnect replay.
//! - [`MemoryBroker`]: in-process broker for tests and broker-less setups.
//!
//! # Example
//!
//! ```
//! use pigate_network::{MemoryBroker, Messenger, GateCommand};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> pigate_network::Result<()> {
//! let broker = MemoryBroker::new();
//! let gate = Messenger::new(broker.connect("gate"), "loc1");
//! gate.subscribe_commands(Arc::new(|_topic: &str, payload: &str| {
//!     let command: Option<GateCommand> = payload.parse().ok();
//!     println!("command: {command:?}");
//! }))
//! .await?;
//!
//! let console = Messenger::new(broker.connect("console"), "loc1");
//! console.send_command(GateCommand::Open).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod messenger;
pub mod topics;
pub mod transport;

pub use error::{MessagingError, Result};
pub use memory::{MemoryBroker, MemoryTransport, PublishedMessage};
pub use messenger::Messenger;
pub use topics::{CredentialNotice, GateCommand, Topics, topic_matches};
pub use transport::{
    ConnectionEvent, MessageHandler, PublishOptions, Transport, generate_client_id,
};
