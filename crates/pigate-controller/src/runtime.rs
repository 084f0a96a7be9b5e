//! Startup, task wiring and shutdown of the controller.
//!
//! [`Controller::start`] brings the pieces up in dependency order: store,
//! pins, gate (forced closed), messaging, sync, router, keypad, watchers.
//! Any failure before the router runs is fatal. Every long-lived task shares
//! one [`CancellationToken`] and its handle is kept by name;
//! [`Controller::shutdown`] cancels, drains, and leaves the gate closed.

use crate::config::{ControllerConfig, KeypadInput, StorageBackend, SyncSourceKind};
use crate::router::{CommandRouter, ROUTER_QUEUE_CAPACITY, RouterEvent, forwarding_handler};
use anyhow::Context;
use pigate_gate::{GateActuator, GateEvent};
use pigate_hardware::cdev::CdevEdges;
use pigate_hardware::mock::{MockOutput, MockOutputHandle, MockPulseInput, MockPulseInputHandle};
use pigate_hardware::sysfs::{SysfsEdges, SysfsOutput};
use pigate_hardware::{AnyOutput, AnyPulseInput, EdgeThreadInput};
use pigate_keypad::{KeypadReader, spawn_pulse_sampler};
use pigate_network::{MemoryBroker, MemoryTransport, Messenger, generate_client_id};
use pigate_storage::{
    AccessEvaluator, AnyCredentialStore, Database, MemoryCredentialStore, SqliteCredentialStore,
};
use pigate_sync::{
    AnySource, DirectoryObjectStore, FeedSource, FeedWatcher, SnapshotSource, SyncEngine,
    SyncHandle, SyncScheduler, SyncTrigger, publish_feed,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for tasks before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const FEED_CHANGE_CAPACITY: usize = 8;

pub type ControllerRouter = CommandRouter<AnyCredentialStore, AnyOutput>;

/// Handles to the in-memory devices used with `mock_hardware`.
#[derive(Debug, Clone)]
pub struct MockHardware {
    pub keypad: MockPulseInputHandle,
    pub relay: MockOutputHandle,
    pub led: Option<MockOutputHandle>,
}

struct Pins {
    relay: AnyOutput,
    led: Option<AnyOutput>,
    keypad: AnyPulseInput,
    mock: Option<MockHardware>,
}

/// A running controller.
pub struct Controller {
    config: ControllerConfig,
    router: Arc<ControllerRouter>,
    store: Arc<AnyCredentialStore>,
    database: Option<Database>,
    messenger: Arc<Messenger<MemoryTransport>>,
    sync: Option<SyncHandle>,
    events: mpsc::Sender<RouterEvent>,
    mock: Option<MockHardware>,
    shutdown: CancellationToken,
    tasks: TaskSet,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("location_id", &self.config.location_id)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Bring the controller up on `broker`.
    ///
    /// # Errors
    ///
    /// Fails when the store cannot be opened, a pin cannot be claimed or
    /// driven low, or the keypad configuration is rejected.
    pub async fn start(config: ControllerConfig, broker: &MemoryBroker) -> anyhow::Result<Self> {
        info!(
            version = pigate_core::VERSION,
            location_id = %config.location_id,
            mock_hardware = config.mock_hardware,
            "Starting controller"
        );

        let shutdown = CancellationToken::new();
        let mut tasks = TaskSet::default();

        let (store, database) = open_store(&config).await?;
        let store = Arc::new(store);

        let pins = claim_pins(&config).await?;
        let gate = GateActuator::new(pins.relay, pins.led, config.gate_config());
        gate.close().await.context("Failed to drive gate outputs low")?;

        let client_id = generate_client_id(&config.messaging.client_id_prefix);
        let messenger = Arc::new(
            Messenger::new(broker.connect(client_id), config.location_id.clone())
                .with_timeout(config.messaging_timeout()),
        );
        tasks.adopt(
            "reconnect watcher",
            Arc::clone(&messenger).spawn_reconnect_watcher(shutdown.child_token()),
        );
        spawn_status_publisher(&mut tasks, &gate, Arc::clone(&messenger), shutdown.child_token());

        let sync = match build_source(&config) {
            Some(source) => {
                info!(source = ?config.sync.source, "Credential sync enabled");
                let engine = Arc::new(SyncEngine::new(
                    Arc::clone(&store),
                    source,
                    config.sync_config(),
                ));
                let (handle, task) = SyncScheduler::spawn(engine, shutdown.child_token());
                tasks.adopt("sync scheduler", task);
                Some(handle)
            }
            None => {
                info!("Credential sync disabled");
                None
            }
        };

        let evaluator =
            AccessEvaluator::new(Arc::clone(&store)).with_store_timeout(config.store_timeout());
        let mut router = CommandRouter::new(evaluator, gate)
            .record_denied(config.record_denied)
            .store_timeout(config.store_timeout());
        if let Some(handle) = &sync {
            router = router.sync_handle(handle.clone());
        }
        let router = Arc::new(router);

        let (events, event_rx) = mpsc::channel(ROUTER_QUEUE_CAPACITY);
        tasks.adopt(
            "command router",
            Arc::clone(&router).spawn(event_rx, shutdown.child_token()),
        );

        if let Err(e) = messenger
            .subscribe_commands(forwarding_handler(events.clone(), RouterEvent::RemoteCommand))
            .await
        {
            warn!(error = %e, "Command subscription failed, retrying on reconnect");
        }
        if let Err(e) = messenger
            .subscribe_credentials_status(forwarding_handler(
                events.clone(),
                RouterEvent::CredentialStatus,
            ))
            .await
        {
            warn!(error = %e, "Credentials status subscription failed, retrying on reconnect");
        }

        let (bits, mut codes, reader) =
            KeypadReader::start(&config.decoder_config(), shutdown.child_token())
                .context("Invalid keypad configuration")?;
        tasks.adopt("keypad reader", reader);
        tasks.adopt(
            "pulse sampler",
            spawn_pulse_sampler(pins.keypad, bits, shutdown.child_token()),
        );
        let code_events = events.clone();
        let token = shutdown.child_token();
        tasks.spawn("keypad forwarding", async move {
            loop {
                let code = tokio::select! {
                    _ = token.cancelled() => break,
                    code = codes.recv() => match code {
                        Some(code) => code,
                        None => break,
                    },
                };
                if code_events.send(RouterEvent::KeypadCode(code)).await.is_err() {
                    break;
                }
            }
            debug!("Keypad forwarding stopped");
        });

        if let (SyncSourceKind::Feed, Some(handle), Some(path)) =
            (config.sync.source, &sync, &config.sync.feed_path)
        {
            spawn_feed_trigger(&mut tasks, path.clone(), handle.clone(), shutdown.child_token());
        }
        if let Some(drop_dir) = &config.sync.drop_dir {
            spawn_feed_publisher(
                &mut tasks,
                &config,
                drop_dir.clone(),
                Arc::clone(&messenger),
                shutdown.child_token(),
            );
        }

        info!(tasks = tasks.len(), "Controller started");

        Ok(Self {
            config,
            router,
            store,
            database,
            messenger,
            sync,
            events,
            mock: pins.mock,
            shutdown,
            tasks,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<ControllerRouter> {
        &self.router
    }

    pub fn gate(&self) -> &GateActuator<AnyOutput> {
        self.router.gate()
    }

    pub fn store(&self) -> &Arc<AnyCredentialStore> {
        &self.store
    }

    pub fn messenger(&self) -> &Arc<Messenger<MemoryTransport>> {
        &self.messenger
    }

    /// `None` when sync is disabled.
    pub fn sync_handle(&self) -> Option<&SyncHandle> {
        self.sync.as_ref()
    }

    /// Queue an event for the router, as the keypad and messaging do.
    pub async fn submit(&self, event: RouterEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// `None` unless started with `mock_hardware`.
    pub fn mock_hardware(&self) -> Option<&MockHardware> {
        self.mock.as_ref()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel every task, wait for them, close the gate and the store.
    ///
    /// A gate left open is closed and `closed` is published.
    ///
    /// # Errors
    ///
    /// Returns an error if the gate outputs could not be driven low.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        info!("Shutting down controller");
        self.shutdown.cancel();

        self.tasks.drain(SHUTDOWN_GRACE).await;

        let was_open = self.router.gate().state().await.is_energized();
        let closed = self.router.gate().close().await;
        if was_open && let Err(e) = self.messenger.notify_gate_closed().await {
            warn!(error = %e, "Failed to publish final gate status");
        }
        if let Some(database) = &self.database {
            database.close().await;
        }
        closed.context("Failed to close gate on shutdown")?;

        info!("Controller stopped");
        Ok(())
    }
}

/// Long-lived controller tasks, by name.
#[derive(Debug, Default)]
struct TaskSet {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskSet {
    fn adopt(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.push((name, handle));
    }

    fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.adopt(name, tokio::spawn(task));
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every task until `grace` runs out, then abort the rest.
    ///
    /// Returns once every task has finished or unwound, so nothing still
    /// touches the store afterwards.
    async fn drain(&mut self, grace: Duration) {
        let deadline = Instant::now() + grace;
        for (name, mut handle) in self.tasks.drain(..) {
            let result = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(task = name, "Task still running after grace period, aborting");
                    handle.abort();
                    handle.await
                }
            };
            match result {
                Ok(()) => debug!(task = name, "Task stopped"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => error!(task = name, error = %e, "Task ended abnormally"),
            }
        }
    }
}

async fn open_store(
    config: &ControllerConfig,
) -> anyhow::Result<(AnyCredentialStore, Option<Database>)> {
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let database = Database::new(config.database_config())
                .await
                .with_context(|| format!("Failed to open database {}", config.storage.path))?;
            let store = AnyCredentialStore::Sqlite(SqliteCredentialStore::new(&database));
            Ok((store, Some(database)))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory credential store, nothing survives a restart");
            Ok((AnyCredentialStore::Memory(MemoryCredentialStore::new()), None))
        }
    }
}

async fn claim_pins(config: &ControllerConfig) -> anyhow::Result<Pins> {
    let gate = &config.gate;
    let keypad = &config.keypad;

    if config.mock_hardware {
        let (relay, relay_handle) = MockOutput::new(gate.relay_pin);
        let (led, led_handle) = match gate.led_pin {
            Some(pin) => {
                let (led, handle) = MockOutput::new(pin);
                (Some(AnyOutput::Mock(led)), Some(handle))
            }
            None => (None, None),
        };
        let (input, keypad_handle) = MockPulseInput::new();

        return Ok(Pins {
            relay: AnyOutput::Mock(relay),
            led,
            keypad: AnyPulseInput::Mock(input),
            mock: Some(MockHardware {
                keypad: keypad_handle,
                relay: relay_handle,
                led: led_handle,
            }),
        });
    }

    let root = &gate.gpio_root;
    let relay = SysfsOutput::claim(root, gate.relay_pin)
        .await
        .with_context(|| format!("Failed to claim relay pin {}", gate.relay_pin))?;
    let led = match gate.led_pin {
        Some(pin) => Some(AnyOutput::Sysfs(
            SysfsOutput::claim(root, pin)
                .await
                .with_context(|| format!("Failed to claim LED pin {pin}"))?,
        )),
        None => None,
    };
    let input = claim_keypad(config).await.with_context(|| {
        format!(
            "Failed to claim keypad pins D0={} D1={}",
            keypad.d0_pin, keypad.d1_pin
        )
    })?;

    Ok(Pins {
        relay: AnyOutput::Sysfs(relay),
        led,
        keypad: AnyPulseInput::Edge(input),
        mock: None,
    })
}

async fn claim_keypad(config: &ControllerConfig) -> pigate_hardware::Result<EdgeThreadInput> {
    let keypad = &config.keypad;
    match keypad.input {
        KeypadInput::Cdev => {
            let edges = CdevEdges::request(&keypad.gpio_chip, keypad.d0_pin, keypad.d1_pin)?;
            EdgeThreadInput::spawn(edges)
        }
        KeypadInput::Sysfs => {
            let edges = SysfsEdges::claim(
                &config.gate.gpio_root,
                keypad.d0_pin,
                keypad.d1_pin,
                config.keypad_poll_interval(),
            )
            .await?;
            EdgeThreadInput::spawn(edges)
        }
    }
}

fn build_source(config: &ControllerConfig) -> Option<AnySource> {
    let sync = &config.sync;
    match sync.source {
        SyncSourceKind::Snapshot => Some(AnySource::Snapshot(
            SnapshotSource::new(DirectoryObjectStore::new(&sync.snapshot_dir))
                .key(sync.snapshot_key.clone()),
        )),
        SyncSourceKind::Feed => sync.feed_path.as_ref().map(|path| {
            AnySource::Feed(FeedSource::new(path).access_group(sync.access_group))
        }),
        SyncSourceKind::Disabled => None,
    }
}

/// Republish gate open/close events on the status topic.
fn spawn_status_publisher(
    tasks: &mut TaskSet,
    gate: &GateActuator<AnyOutput>,
    messenger: Arc<Messenger<MemoryTransport>>,
    shutdown: CancellationToken,
) {
    let mut gate_events = gate.subscribe();
    tasks.spawn("status publisher", async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = gate_events.recv() => event,
            };
            let result = match event {
                Ok(GateEvent::Opened) => messenger.notify_gate_opened().await,
                Ok(GateEvent::Closed) => messenger.notify_gate_closed().await,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Gate status publisher lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if let Err(e) = result {
                warn!(error = %e, "Failed to publish gate status");
            }
        }
        debug!("Gate status publisher stopped");
    });
}

/// Request a sync pass whenever the watched feed file changes.
fn spawn_feed_trigger(
    tasks: &mut TaskSet,
    path: PathBuf,
    sync: SyncHandle,
    shutdown: CancellationToken,
) {
    let (tx, mut rx) = mpsc::channel(FEED_CHANGE_CAPACITY);
    tasks.adopt("feed watcher", FeedWatcher::new(path).spawn(tx, shutdown));
    tasks.spawn("feed trigger", async move {
        while let Some(path) = rx.recv().await {
            debug!(path = %path.display(), "Feed changed, requesting sync");
            sync.request(SyncTrigger::FileChange);
        }
    });
}

/// Publish every new feed file dropped into `drop_dir` as a snapshot and
/// announce it.
fn spawn_feed_publisher(
    tasks: &mut TaskSet,
    config: &ControllerConfig,
    drop_dir: PathBuf,
    messenger: Arc<Messenger<MemoryTransport>>,
    shutdown: CancellationToken,
) {
    let (tx, mut rx) = mpsc::channel(FEED_CHANGE_CAPACITY);
    tasks.adopt(
        "drop directory watcher",
        FeedWatcher::new(drop_dir).spawn(tx, shutdown),
    );

    let objects = DirectoryObjectStore::new(&config.sync.snapshot_dir);
    let key = config.sync.snapshot_key.clone();
    let access_group = config.sync.access_group;
    let timeout = config.messaging_timeout();
    tasks.spawn("feed publisher", async move {
        while let Some(path) = rx.recv().await {
            if let Err(e) =
                publish_feed(&path, access_group, &objects, &key, messenger.as_ref(), timeout).await
            {
                error!(path = %path.display(), error = %e, "Failed to publish feed");
            }
        }
    });
}
