//! The wire client contract.
//!
//! A [`Transport`] is one client session with a broker. It knows nothing
//! about locations or payload meaning; the [`Messenger`](crate::Messenger)
//! layers those on top and keeps the subscription table that survives
//! reconnects.

use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Callback invoked with `(topic, payload)` for each delivered message.
///
/// Handlers run on the delivering task and must not block.
pub type MessageHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Delivery options for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// QoS 1 when set, QoS 0 otherwise.
    pub at_least_once: bool,
    /// Broker keeps the last payload and hands it to new subscribers.
    pub retain: bool,
}

impl Default for PublishOptions {
    /// QoS 1, retained.
    fn default() -> Self {
        Self {
            at_least_once: true,
            retain: true,
        }
    }
}

impl PublishOptions {
    pub fn at_least_once(mut self, enabled: bool) -> Self {
        self.at_least_once = enabled;
        self
    }

    pub fn retain(mut self, enabled: bool) -> Self {
        self.retain = enabled;
        self
    }
}

/// Link state changes reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Link (re-)established. Broker-side subscriptions may be gone.
    Connected,
    /// Link dropped.
    Lost { reason: String },
}

/// One client session with a message broker.
pub trait Transport: Send + Sync {
    /// Register `handler` for `filter`. Subscribing a filter that is already
    /// subscribed replaces its handler.
    fn subscribe(
        &self,
        filter: &str,
        handler: MessageHandler,
    ) -> impl Future<Output = Result<()>> + Send;

    fn unsubscribe(&self, filter: &str) -> impl Future<Output = Result<()>> + Send;

    fn publish(
        &self,
        topic: &str,
        payload: &str,
        options: PublishOptions,
    ) -> impl Future<Output = Result<()>> + Send;

    fn is_connected(&self) -> bool;

    /// Receive link state changes from now on.
    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent>;

    fn client_id(&self) -> &str;
}

/// Client identifier unique to this process: `{prefix}-{uuid}`.
///
/// # Examples
///
/// ```
/// let id = pigate_network::generate_client_id("gatecontroller");
/// assert!(id.starts_with("gatecontroller-"));
/// ```
pub fn generate_client_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}
