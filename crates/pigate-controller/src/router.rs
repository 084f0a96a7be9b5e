//! Dispatch of keypad codes, remote commands and credential notices.
//!
//! Every input of the controller ends up here as a [`RouterEvent`]. Keypad
//! codes go through the [`AccessEvaluator`] before touching the gate; remote
//! commands drive the gate directly; an `update_available` notice asks the
//! sync scheduler for a pass.
//!
//! Messaging handlers run on the transport's delivery path, so they only
//! forward into a bounded queue ([`forwarding_handler`]) and the router task
//! does the actual work.

use chrono::{Local, NaiveDateTime, Utc};
use pigate_core::{GateLog, GateStatus, OpenMode};
use pigate_gate::GateActuator;
use pigate_hardware::DigitalOutput;
use pigate_network::{CredentialNotice, GateCommand, MessageHandler};
use pigate_storage::{AccessEvaluator, CredentialStore, Decision, DenyReason, with_timeout};
use pigate_sync::{SyncHandle, SyncTrigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Capacity of the queue between input sources and the router task.
pub const ROUTER_QUEUE_CAPACITY: usize = 64;

/// One input for the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// A code decoded from the keypad.
    KeypadCode(String),
    /// Payload received on the command topic.
    RemoteCommand(String),
    /// Payload received on the credentials status topic.
    CredentialStatus(String),
}

/// What the router did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Granted(OpenMode),
    Denied(DenyReason),
    Command(GateCommand),
    SyncRequested,
    Ignored,
}

pub struct CommandRouter<S, O> {
    evaluator: AccessEvaluator<S>,
    gate: GateActuator<O>,
    sync: Option<SyncHandle>,
    record_denied: bool,
    store_timeout: Duration,
}

impl<S, O> std::fmt::Debug for CommandRouter<S, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("sync", &self.sync.is_some())
            .field("record_denied", &self.record_denied)
            .finish_non_exhaustive()
    }
}

impl<S, O> CommandRouter<S, O>
where
    S: CredentialStore + 'static,
    O: DigitalOutput + Send + 'static,
{
    pub fn new(evaluator: AccessEvaluator<S>, gate: GateActuator<O>) -> Self {
        Self {
            evaluator,
            gate,
            sync: None,
            record_denied: true,
            store_timeout: Duration::from_secs(pigate_core::constants::DEFAULT_STORE_TIMEOUT_SECS),
        }
    }

    /// Where `update_available` notices are forwarded.
    pub fn sync_handle(mut self, handle: SyncHandle) -> Self {
        self.sync = Some(handle);
        self
    }

    /// Write DENIED audit entries (default true).
    pub fn record_denied(mut self, record: bool) -> Self {
        self.record_denied = record;
        self
    }

    /// Deadline for audit log writes.
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn gate(&self) -> &GateActuator<O> {
        &self.gate
    }

    pub async fn handle(&self, event: RouterEvent) -> RouteOutcome {
        match event {
            RouterEvent::KeypadCode(code) => self.handle_code(&code).await,
            RouterEvent::RemoteCommand(payload) => self.handle_command(&payload).await,
            RouterEvent::CredentialStatus(payload) => self.handle_credential_status(&payload),
        }
    }

    /// Evaluate `code` against the local clock.
    pub async fn handle_code(&self, code: &str) -> RouteOutcome {
        self.handle_code_at(code, Local::now().naive_local()).await
    }

    /// Evaluate `code` as if presented at `now`, actuate and audit.
    pub async fn handle_code_at(&self, code: &str, now: NaiveDateTime) -> RouteOutcome {
        match self.evaluator.validate_credential(code, now).await {
            Decision::Granted { open_mode } => {
                let actuated = match open_mode {
                    OpenMode::RegularOpen => self.gate.open().await,
                    OpenMode::LockOpen => self.gate.lock_open().await,
                };
                let status = match actuated {
                    Ok(()) => {
                        info!(code, %open_mode, "Access granted");
                        GateStatus::Granted
                    }
                    Err(e) => {
                        error!(code, %open_mode, error = %e, "Access granted but gate did not follow");
                        GateStatus::Error
                    }
                };
                self.audit(code, status).await;
                RouteOutcome::Granted(open_mode)
            }
            Decision::Denied(DenyReason::StoreError) => {
                self.audit(code, GateStatus::Error).await;
                RouteOutcome::Denied(DenyReason::StoreError)
            }
            Decision::Denied(reason) => {
                info!(code, %reason, "Access denied");
                if self.record_denied {
                    self.audit(code, GateStatus::Denied).await;
                }
                RouteOutcome::Denied(reason)
            }
        }
    }

    /// Apply a command topic payload. Unknown payloads are ignored.
    pub async fn handle_command(&self, payload: &str) -> RouteOutcome {
        let command = match payload.parse::<GateCommand>() {
            Ok(command) => command,
            Err(e) => {
                warn!(payload, error = %e, "Ignoring remote command");
                return RouteOutcome::Ignored;
            }
        };

        info!(%command, "Remote command received");
        let result = match command {
            GateCommand::Open => self.gate.open().await,
            GateCommand::Close => self.gate.close().await,
            GateCommand::HoldOpen => self.gate.lock_open().await,
        };
        if let Err(e) = result {
            error!(%command, error = %e, "Remote command failed to drive the gate");
        }
        RouteOutcome::Command(command)
    }

    /// Request a sync pass on `update_available`; anything else is ignored.
    pub fn handle_credential_status(&self, payload: &str) -> RouteOutcome {
        match payload.parse::<CredentialNotice>() {
            Ok(CredentialNotice::UpdateAvailable) => match &self.sync {
                Some(handle) => {
                    debug!("Credential update announced");
                    handle.request(SyncTrigger::Notification);
                    RouteOutcome::SyncRequested
                }
                None => {
                    debug!("Credential update announced but sync is disabled");
                    RouteOutcome::Ignored
                }
            },
            Err(_) => {
                debug!(payload, "Ignoring credentials status payload");
                RouteOutcome::Ignored
            }
        }
    }

    async fn audit(&self, code: &str, status: GateStatus) {
        let entry = GateLog::new(code, Utc::now(), status);
        let store = self.evaluator.store();
        if let Err(e) = with_timeout("put gate log", self.store_timeout, store.put_gate_log(&entry)).await
        {
            warn!(code, %status, error = %e, "Failed to write gate log");
        }
    }

    /// Route every event from `events` until `shutdown` or until all
    /// senders are gone.
    pub fn spawn(
        self: Arc<Self>,
        mut events: mpsc::Receiver<RouterEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Command router started");
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let outcome = self.handle(event).await;
                debug!(?outcome, "Event routed");
            }
            info!("Command router stopped");
        })
    }
}

/// Messaging handler that queues each payload for the router.
///
/// A full queue drops the payload with a warning; the handler never blocks
/// the transport.
pub fn forwarding_handler(
    events: mpsc::Sender<RouterEvent>,
    wrap: fn(String) -> RouterEvent,
) -> MessageHandler {
    Arc::new(move |topic: &str, payload: &str| {
        match events.try_send(wrap(payload.to_string())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!(topic, "Router queue full, message dropped"),
            Err(TrySendError::Closed(_)) => debug!(topic, "Router stopped, message dropped"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use pigate_core::{AccessTime, Code, Credential};
    use pigate_gate::{GateConfig, GateState};
    use pigate_hardware::Level;
    use pigate_hardware::mock::{MockOutput, MockOutputHandle};
    use pigate_storage::MemoryCredentialStore;
    use rstest::rstest;

    struct Fixture {
        router: CommandRouter<MemoryCredentialStore, MockOutput>,
        store: Arc<MemoryCredentialStore>,
        relay: MockOutputHandle,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .put_credential(&Credential::new(Code::new("12345").unwrap(), "Alice", 1))
            .await
            .unwrap();
        store
            .put_credential(
                &Credential::new(Code::new("777").unwrap(), "Caretaker", 1)
                    .open_mode(OpenMode::LockOpen),
            )
            .await
            .unwrap();
        store
            .put_credential(&Credential::new(Code::new("666").unwrap(), "Mallory", 1).locked_out(true))
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

        let (relay, relay_handle) = MockOutput::new(17);
        let gate = GateActuator::new(relay, None, GateConfig::default());
        let router = CommandRouter::new(AccessEvaluator::new(Arc::clone(&store)), gate);

        Fixture {
            router,
            store,
            relay: relay_handle,
        }
    }

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    async fn statuses(store: &MemoryCredentialStore) -> Vec<GateStatus> {
        store
            .get_gate_logs()
            .await
            .unwrap()
            .into_iter()
            .map(|log| log.status)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_granted_code_opens_gate() {
        let f = fixture().await;

        let outcome = f.router.handle_code_at("12345", at(10)).await;

        assert_eq!(outcome, RouteOutcome::Granted(OpenMode::RegularOpen));
        assert_eq!(f.router.gate().state().await, GateState::Open);
        assert_eq!(f.relay.level(), Level::High);
        assert_eq!(statuses(&f.store).await, vec![GateStatus::Granted]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_open_credential_holds_gate() {
        let f = fixture().await;

        let outcome = f.router.handle_code_at("777", at(12)).await;

        assert_eq!(outcome, RouteOutcome::Granted(OpenMode::LockOpen));
        assert_eq!(f.router.gate().state().await, GateState::LockedOpen);
    }

    #[rstest]
    #[case("12345", 7, DenyReason::OutsideWindow)]
    #[case("12345", 20, DenyReason::OutsideWindow)]
    #[case("99999", 10, DenyReason::UnknownCode)]
    #[case("666", 10, DenyReason::LockedOut)]
    #[tokio::test(start_paused = true)]
    async fn test_denied_codes_leave_gate_closed(
        #[case] code: &str,
        #[case] hour: u32,
        #[case] reason: DenyReason,
    ) {
        let f = fixture().await;

        let outcome = f.router.handle_code_at(code, at(hour)).await;

        assert_eq!(outcome, RouteOutcome::Denied(reason));
        assert_eq!(f.router.gate().state().await, GateState::Closed);
        assert!(f.relay.history().is_empty());
        assert_eq!(statuses(&f.store).await, vec![GateStatus::Denied]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_not_recorded_when_disabled() {
        let f = fixture().await;
        let router = f.router.record_denied(false);

        router.handle_code_at("99999", at(10)).await;

        assert!(statuses(&f.store).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_is_audited_as_error() {
        let f = fixture().await;
        let (relay, _relay) = MockOutput::new(17);
        let router = CommandRouter::new(
            AccessEvaluator::new(Arc::clone(&f.store)).with_store_timeout(Duration::from_secs(1)),
            GateActuator::new(relay, None, GateConfig::default()),
        )
        .store_timeout(Duration::from_secs(30));
        f.store.set_latency(Some(Duration::from_secs(5)));

        let outcome = router.handle_code_at("12345", at(10)).await;

        assert_eq!(outcome, RouteOutcome::Denied(DenyReason::StoreError));
        assert_eq!(router.gate().state().await, GateState::Closed);
        assert_eq!(statuses(&f.store).await, vec![GateStatus::Error]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_failure_is_audited_as_error() {
        let f = fixture().await;
        f.relay.set_failing(true);

        let outcome = f.router.handle_code_at("12345", at(10)).await;

        assert_eq!(outcome, RouteOutcome::Granted(OpenMode::RegularOpen));
        assert_eq!(statuses(&f.store).await, vec![GateStatus::Error]);
    }

    #[rstest]
    #[case("open", GateState::Open)]
    #[case("hold_open", GateState::LockedOpen)]
    #[case(" close\n", GateState::Closed)]
    #[tokio::test(start_paused = true)]
    async fn test_remote_commands(#[case] payload: &str, #[case] expected: GateState) {
        let f = fixture().await;

        let outcome = f.router.handle(RouterEvent::RemoteCommand(payload.to_string())).await;

        assert!(matches!(outcome, RouteOutcome::Command(_)));
        assert_eq!(f.router.gate().state().await, expected);
        assert!(statuses(&f.store).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_remote_command_ignored() {
        let f = fixture().await;

        let outcome = f.router.handle_command("explode").await;

        assert_eq!(outcome, RouteOutcome::Ignored);
        assert_eq!(f.router.gate().state().await, GateState::Closed);
    }

    #[tokio::test]
    async fn test_update_notice_requests_sync() {
        let f = fixture().await;
        let (handle, mut requests) = SyncHandle::channel();
        let router = f.router.sync_handle(handle);

        assert_eq!(
            router.handle_credential_status("update_available"),
            RouteOutcome::SyncRequested
        );
        assert_eq!(router.handle_credential_status("noise"), RouteOutcome::Ignored);

        assert_eq!(requests.try_recv().ok(), Some(SyncTrigger::Notification));
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_notice_without_sync_ignored() {
        let f = fixture().await;
        assert_eq!(
            f.router.handle_credential_status("update_available"),
            RouteOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_forwarding_handler_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let handler = forwarding_handler(tx, RouterEvent::RemoteCommand);

        handler("loc/pigate/command", "open");
        handler("loc/pigate/command", "close");

        assert_eq!(rx.recv().await, Some(RouterEvent::RemoteCommand("open".to_string())));
        assert!(rx.try_recv().is_err());
    }
}
