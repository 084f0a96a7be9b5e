//! Location-scoped messaging on top of a [`Transport`].
//!
//! The messenger owns the subscription table. The transport only ever sees
//! one dispatching handler per topic; the table decides which callback a
//! message reaches. That makes re-registration a table update, and a
//! reconnect a single replay of the table.

use crate::error::{MessagingError, Result};
use crate::topics::{CredentialNotice, GateCommand, Topics, topic_matches};
use crate::transport::{ConnectionEvent, MessageHandler, PublishOptions, Transport};
use pigate_core::constants::{DEFAULT_NETWORK_TIMEOUT_SECS, STATUS_CLOSED, STATUS_OPENED};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type HandlerTable = Arc<Mutex<BTreeMap<String, MessageHandler>>>;

fn lock(table: &Mutex<BTreeMap<String, MessageHandler>>) -> MutexGuard<'_, BTreeMap<String, MessageHandler>> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Pub/sub client for one location.
pub struct Messenger<T> {
    transport: T,
    topics: Topics,
    handlers: HandlerTable,
    timeout: Duration,
}

impl<T> std::fmt::Debug for Messenger<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("location_id", &self.topics.location_id)
            .field("subscriptions", &lock(&self.handlers).len())
            .finish()
    }
}

impl<T: Transport> Messenger<T> {
    pub fn new(transport: T, location_id: impl Into<String>) -> Self {
        Self {
            transport,
            topics: Topics::new(location_id),
            handlers: Arc::new(Mutex::new(BTreeMap::new())),
            timeout: Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS),
        }
    }

    /// Deadline applied to every transport call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Topics currently in the subscription table.
    pub fn subscribed_topics(&self) -> Vec<String> {
        lock(&self.handlers).keys().cloned().collect()
    }

    /// Route messages on `topic` to `handler`.
    ///
    /// A topic that is already registered only has its handler replaced; the
    /// transport is not asked to subscribe again. The entry stays in the
    /// table even if the transport call fails, so the next reconnect retries
    /// it.
    pub async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<()> {
        let is_new = lock(&self.handlers)
            .insert(topic.to_string(), handler)
            .is_none();

        if !is_new {
            debug!(topic, "Replaced handler");
            return Ok(());
        }

        let dispatcher = self.dispatcher();
        let result = self
            .bounded("subscribe", self.transport.subscribe(topic, dispatcher))
            .await;
        match &result {
            Ok(()) => info!(topic, "Subscribed"),
            Err(e) => error!(topic, error = %e, "Failed to subscribe"),
        }
        result
    }

    pub async fn publish(&self, topic: &str, payload: &str, options: PublishOptions) -> Result<()> {
        let result = self
            .bounded("publish", self.transport.publish(topic, payload, options))
            .await;
        if let Err(e) = &result {
            error!(topic, payload, error = %e, "Failed to publish");
        }
        result
    }

    /// Replay every table entry to the transport, once each.
    ///
    /// Returns the number of topics resubscribed. Failures are logged and
    /// do not stop the replay.
    pub async fn handle_reconnect(&self) -> usize {
        let topics = self.subscribed_topics();
        info!(count = topics.len(), "Resubscribing after reconnect");

        let mut restored = 0;
        for topic in topics {
            let dispatcher = self.dispatcher();
            match self
                .bounded("subscribe", self.transport.subscribe(&topic, dispatcher))
                .await
            {
                Ok(()) => {
                    debug!(topic = %topic, "Resubscribed");
                    restored += 1;
                }
                Err(e) => warn!(topic = %topic, error = %e, "Failed to resubscribe"),
            }
        }
        restored
    }

    /// Announce a new credential snapshot (uploader side).
    pub async fn notify_new_credentials(&self) -> Result<()> {
        self.publish(
            &self.topics.credentials,
            CredentialNotice::UpdateAvailable.as_payload(),
            PublishOptions::default(),
        )
        .await
    }

    /// Send a remote command to the gate of this location.
    pub async fn send_command(&self, command: GateCommand) -> Result<()> {
        self.publish(&self.topics.command, command.as_payload(), PublishOptions::default())
            .await
    }

    pub async fn notify_gate_opened(&self) -> Result<()> {
        self.publish(&self.topics.status, STATUS_OPENED, PublishOptions::default())
            .await
    }

    pub async fn notify_gate_closed(&self) -> Result<()> {
        self.publish(&self.topics.status, STATUS_CLOSED, PublishOptions::default())
            .await
    }

    pub async fn subscribe_commands(&self, handler: MessageHandler) -> Result<()> {
        let topic = self.topics.command.clone();
        self.subscribe(&topic, handler).await
    }

    pub async fn subscribe_gate_status(&self, handler: MessageHandler) -> Result<()> {
        let topic = self.topics.status.clone();
        self.subscribe(&topic, handler).await
    }

    pub async fn subscribe_credentials_status(&self, handler: MessageHandler) -> Result<()> {
        let topic = self.topics.credentials.clone();
        self.subscribe(&topic, handler).await
    }

    /// Handler handed to the transport: looks the callback up at delivery
    /// time and calls it without holding the table lock.
    fn dispatcher(&self) -> MessageHandler {
        let handlers = Arc::clone(&self.handlers);
        Arc::new(move |topic: &str, payload: &str| {
            let target = {
                let table = lock(&handlers);
                table
                    .get(topic)
                    .or_else(|| {
                        table
                            .iter()
                            .find(|(filter, _)| topic_matches(filter, topic))
                            .map(|(_, handler)| handler)
                    })
                    .cloned()
            };
            match target {
                Some(handler) => handler(topic, payload),
                None => debug!(topic, "No handler for delivered message"),
            }
        })
    }

    async fn bounded<F>(&self, operation: &'static str, call: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| MessagingError::Timeout {
                operation,
                timeout_ms: self.timeout.as_millis() as u64,
            })?
    }
}

impl<T: Transport + 'static> Messenger<T> {
    /// Resubscribe on every `Connected` event until `shutdown` fires.
    pub fn spawn_reconnect_watcher(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut events = self.transport.connection_events();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(ConnectionEvent::Connected) => {
                            self.handle_reconnect().await;
                        }
                        Ok(ConnectionEvent::Lost { reason }) => {
                            warn!(reason = %reason, "Broker connection lost, waiting for reconnect");
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed, "Missed connection events, resubscribing");
                            self.handle_reconnect().await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Reconnect watcher stopped");
        })
    }
}
