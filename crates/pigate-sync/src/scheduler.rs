//! Sync trigger loop.
//!
//! One task owns all sync passes of a controller: the startup pass, the
//! periodic pass, and passes requested through a [`SyncHandle`] by the
//! message router or a file watcher. Requests go through the engine's
//! cooldown; the startup and periodic passes do not. A request that lands
//! inside the cooldown, or while a pass runs, is kept and run once when the
//! cooldown ends; further requests before then collapse into that pass.

use crate::engine::{SyncEngine, SyncTrigger, TriggerOutcome};
use crate::source::CredentialSource;
use pigate_storage::CredentialStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const TRIGGER_QUEUE_CAPACITY: usize = 8;

/// Requests sync passes from the scheduler task.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncTrigger>,
}

impl SyncHandle {
    /// Queue a pass. Never blocks; returns false when the request was
    /// dropped because the queue is full (passes are already pending) or the
    /// scheduler has stopped.
    pub fn request(&self, trigger: SyncTrigger) -> bool {
        match self.tx.try_send(trigger) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(%trigger, "Sync requests already pending, request dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(%trigger, "Sync scheduler stopped, request dropped");
                false
            }
        }
    }

    /// A handle and the receiver its requests arrive on.
    pub fn channel() -> (Self, mpsc::Receiver<SyncTrigger>) {
        let (tx, rx) = mpsc::channel(TRIGGER_QUEUE_CAPACITY);
        (Self { tx }, rx)
    }
}

/// Spawns the scheduler task.
#[derive(Debug)]
pub struct SyncScheduler;

impl SyncScheduler {
    /// Start the loop: one startup pass, then a pass every
    /// `config.interval` plus one per handle request, until `shutdown`.
    ///
    /// A failed startup pass is logged and the loop carries on.
    pub fn spawn<S, C>(
        engine: Arc<SyncEngine<S, C>>,
        shutdown: CancellationToken,
    ) -> (SyncHandle, JoinHandle<()>)
    where
        S: CredentialStore + 'static,
        C: CredentialSource + 'static,
    {
        let (handle, rx) = SyncHandle::channel();
        let task = tokio::spawn(run(engine, rx, shutdown));
        (handle, task)
    }
}

async fn run<S, C>(
    engine: Arc<SyncEngine<S, C>>,
    mut requests: mpsc::Receiver<SyncTrigger>,
    shutdown: CancellationToken,
) where
    S: CredentialStore + 'static,
    C: CredentialSource + 'static,
{
    let period = engine.config().interval;

    tokio::select! {
        _ = shutdown.cancelled() => return,
        result = engine.sync(SyncTrigger::Startup) => {
            if result.is_err() {
                warn!("Startup sync failed, will retry on the next trigger");
            }
        }
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = period.as_secs(), "Sync scheduler running");

    let mut deferred: Option<SyncTrigger> = None;

    // Errors of every pass are logged by the engine.
    loop {
        let retry_at = engine.cooldown_ends().unwrap_or_else(Instant::now);

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                deferred = None;
                let _ = engine.sync(SyncTrigger::Interval).await;
            }
            () = tokio::time::sleep_until(retry_at), if deferred.is_some() => {
                if let Some(trigger) = deferred.take() {
                    debug!(%trigger, "Running deferred sync request");
                    let _ = engine.sync(trigger).await;
                }
            }
            request = requests.recv() => match request {
                Some(trigger) => match engine.trigger(trigger).await {
                    TriggerOutcome::Ran(_) => deferred = None,
                    TriggerOutcome::Debounced | TriggerOutcome::Coalesced => {
                        debug!(%trigger, "Sync request deferred to the end of the cooldown");
                        deferred = Some(trigger);
                    }
                },
                None => break,
            },
        }
    }

    info!("Sync scheduler stopped");
}
