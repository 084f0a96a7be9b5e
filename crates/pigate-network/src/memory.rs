//! In-process broker.
//!
//! [`MemoryBroker`] keeps retained messages and per-client subscriptions the
//! way an MQTT broker with clean sessions does: a client that drops its link
//! loses its subscriptions and must resubscribe after reconnecting. Handlers
//! are always invoked after the broker lock is released, so a handler may
//! publish.

use crate::error::{MessagingError, Result};
use crate::topics::topic_matches;
use crate::transport::{ConnectionEvent, MessageHandler, PublishOptions, Transport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

const CONNECTION_EVENT_CAPACITY: usize = 16;

/// A message as seen by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub client_id: String,
    pub topic: String,
    pub payload: String,
    pub options: PublishOptions,
}

struct ClientSession {
    connected: bool,
    subscriptions: HashMap<String, MessageHandler>,
    /// Transport-level subscribe calls, including replacements.
    subscribe_calls: usize,
    events: broadcast::Sender<ConnectionEvent>,
}

#[derive(Default)]
struct BrokerState {
    clients: HashMap<String, ClientSession>,
    retained: HashMap<String, String>,
    published: Vec<PublishedMessage>,
}

fn lock(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared in-memory broker. Clones refer to the same broker.
///
/// # Examples
///
/// ```
/// use pigate_network::{MemoryBroker, PublishOptions, Transport};
/// use std::sync::{Arc, Mutex};
///
/// # #[tokio::main]
/// # async fn main() -> pigate_network::Result<()> {
/// let broker = MemoryBroker::new();
/// let publisher = broker.connect("uploader");
/// publisher
///     .publish("loc1/credentials/status", "update_available", PublishOptions::default())
///     .await?;
///
/// // Retained payloads reach late subscribers.
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let subscriber = broker.connect("gate");
/// subscriber
///     .subscribe(
///         "loc1/credentials/status",
///         Arc::new(move |_topic: &str, payload: &str| sink.lock().unwrap().push(payload.to_string())),
///     )
///     .await?;
///
/// assert_eq!(*seen.lock().unwrap(), vec!["update_available".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MemoryBroker")
            .field("clients", &state.clients.len())
            .field("retained", &state.retained.len())
            .finish()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connected session for `client_id`.
    ///
    /// Connecting an id that already has a session takes that session over.
    pub fn connect(&self, client_id: impl Into<String>) -> MemoryTransport {
        let client_id = client_id.into();
        let mut state = lock(&self.state);

        let session = state
            .clients
            .entry(client_id.clone())
            .or_insert_with(|| ClientSession {
                connected: false,
                subscriptions: HashMap::new(),
                subscribe_calls: 0,
                events: broadcast::channel(CONNECTION_EVENT_CAPACITY).0,
            });
        session.connected = true;
        let _ = session.events.send(ConnectionEvent::Connected);
        drop(state);

        info!(client_id = %client_id, "Client connected to memory broker");
        MemoryTransport {
            broker: self.clone(),
            client_id,
        }
    }

    /// Last retained payload on `topic`.
    pub fn retained(&self, topic: &str) -> Option<String> {
        lock(&self.state).retained.get(topic).cloned()
    }

    /// Every publish accepted so far, oldest first.
    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.state).published.clone()
    }

    /// Number of filters `client_id` currently holds.
    pub fn subscription_count(&self, client_id: &str) -> usize {
        lock(&self.state)
            .clients
            .get(client_id)
            .map_or(0, |session| session.subscriptions.len())
    }

    /// Number of transport-level subscribe calls `client_id` has made.
    pub fn subscribe_calls(&self, client_id: &str) -> usize {
        lock(&self.state)
            .clients
            .get(client_id)
            .map_or(0, |session| session.subscribe_calls)
    }

    /// Deliver `payload` on `topic` as if published by an external client.
    pub fn inject(&self, topic: &str, payload: &str, options: PublishOptions) {
        self.route("external", topic, payload, options);
    }

    fn route(&self, from: &str, topic: &str, payload: &str, options: PublishOptions) {
        let handlers: Vec<MessageHandler> = {
            let mut state = lock(&self.state);
            state.published.push(PublishedMessage {
                client_id: from.to_string(),
                topic: topic.to_string(),
                payload: payload.to_string(),
                options,
            });
            if options.retain {
                state.retained.insert(topic.to_string(), payload.to_string());
            }

            state
                .clients
                .values()
                .filter(|session| session.connected)
                .flat_map(|session| session.subscriptions.iter())
                .filter(|(filter, _)| topic_matches(filter, topic))
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };

        trace!(topic, payload, receivers = handlers.len(), "Routing message");
        for handler in handlers {
            handler(topic, payload);
        }
    }
}

/// One client's session on a [`MemoryBroker`].
#[derive(Clone)]
pub struct MemoryTransport {
    broker: MemoryBroker,
    client_id: String,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl MemoryTransport {
    /// Drop the link. The broker forgets this client's subscriptions.
    pub fn disconnect(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = lock(&self.broker.state);
        if let Some(session) = state.clients.get_mut(&self.client_id) {
            session.connected = false;
            session.subscriptions.clear();
            let _ = session.events.send(ConnectionEvent::Lost {
                reason: reason.clone(),
            });
        }
        info!(client_id = %self.client_id, reason = %reason, "Client disconnected");
    }

    /// Restore the link with an empty subscription set.
    pub fn reconnect(&self) {
        let mut state = lock(&self.broker.state);
        if let Some(session) = state.clients.get_mut(&self.client_id) {
            session.connected = true;
            let _ = session.events.send(ConnectionEvent::Connected);
        }
        info!(client_id = %self.client_id, "Client reconnected");
    }

    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MessagingError::NotConnected)
        }
    }
}

impl Transport for MemoryTransport {
    async fn subscribe(&self, filter: &str, handler: MessageHandler) -> Result<()> {
        self.ensure_connected()?;

        let replay: Vec<(String, String)> = {
            let mut state = lock(&self.broker.state);
            let retained: Vec<(String, String)> = state
                .retained
                .iter()
                .filter(|(topic, _)| topic_matches(filter, topic))
                .map(|(topic, payload)| (topic.clone(), payload.clone()))
                .collect();

            let session = state
                .clients
                .get_mut(&self.client_id)
                .ok_or(MessagingError::NotConnected)?;
            session
                .subscriptions
                .insert(filter.to_string(), Arc::clone(&handler));
            session.subscribe_calls += 1;
            retained
        };

        debug!(client_id = %self.client_id, filter, retained = replay.len(), "Subscribed");
        for (topic, payload) in replay {
            handler(&topic, &payload);
        }
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.ensure_connected()?;
        let mut state = lock(&self.broker.state);
        if let Some(session) = state.clients.get_mut(&self.client_id) {
            session.subscriptions.remove(filter);
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str, options: PublishOptions) -> Result<()> {
        self.ensure_connected()?;
        self.broker.route(&self.client_id, topic, payload, options);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.broker.state)
            .clients
            .get(&self.client_id)
            .is_some_and(|session| session.connected)
    }

    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        let state = lock(&self.broker.state);
        match state.clients.get(&self.client_id) {
            Some(session) => session.events.subscribe(),
            // Sessions are never removed; an empty channel keeps the signature total.
            None => broadcast::channel(1).1,
        }
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}
