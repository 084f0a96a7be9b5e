//! The gate actuator.
//!
//! All state (current state, outputs, armed timer, history) sits behind one
//! `tokio::sync::Mutex` shared with the auto-return task. Each armed timer
//! carries the generation it was armed under; it closes the gate only if the
//! gate is still `Open` and no other timer has been armed or cancelled since.

use crate::error::{GateError, Result};
use crate::state::{GateEvent, GateState, GateTransition, TransitionCause};
use pigate_core::constants::{DEFAULT_GATE_OPEN_SECS, MAX_GATE_HISTORY};
use pigate_hardware::{DigitalOutput, Level};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Gate actuator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// How long a regular open keeps the relay energized.
    pub open_duration: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            open_duration: Duration::from_secs(DEFAULT_GATE_OPEN_SECS),
        }
    }
}

impl GateConfig {
    pub fn new(open_duration: Duration) -> Self {
        Self { open_duration }
    }

    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }
}

#[derive(Debug)]
struct GateCore<O> {
    state: GateState,
    relay: O,
    led: Option<O>,
    generation: u64,
    deadline: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    history: VecDeque<GateTransition>,
}

impl<O> GateCore<O> {
    /// Invalidate any armed timer.
    fn disarm(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.deadline = None;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn record(&mut self, from: GateState, to: GateState, cause: TransitionCause) {
        if self.history.len() >= MAX_GATE_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(GateTransition {
            from,
            to,
            cause,
            at: Instant::now(),
        });
    }
}

#[derive(Debug)]
struct Inner<O> {
    core: Mutex<GateCore<O>>,
    events: broadcast::Sender<GateEvent>,
    config: GateConfig,
}

/// Single-gate actuator with timed auto-return.
///
/// Cheap to clone; clones drive the same gate.
///
/// # Examples
///
/// ```
/// use pigate_gate::{GateActuator, GateConfig, GateState};
/// use pigate_hardware::mock::MockOutput;
/// use pigate_hardware::Level;
///
/// #[tokio::main]
/// async fn main() -> pigate_gate::Result<()> {
///     let (relay, relay_pin) = MockOutput::new(17);
///     let gate = GateActuator::new(relay, None, GateConfig::default());
///
///     gate.open().await?;
///     assert_eq!(gate.state().await, GateState::Open);
///     assert_eq!(relay_pin.level(), Level::High);
///
///     gate.close().await?;
///     assert_eq!(relay_pin.level(), Level::Low);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct GateActuator<O> {
    inner: Arc<Inner<O>>,
}

impl<O> Clone for GateActuator<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: DigitalOutput + 'static> GateActuator<O> {
    /// Create an actuator in the `Closed` state.
    ///
    /// Outputs are not written until the first transition; call
    /// [`close`](Self::close) at startup to force them low.
    pub fn new(relay: O, led: Option<O>, config: GateConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let core = GateCore {
            state: GateState::Closed,
            relay,
            led,
            generation: 0,
            deadline: None,
            timer: None,
            history: VecDeque::with_capacity(MAX_GATE_HISTORY),
        };

        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(core),
                events,
                config,
            }),
        }
    }

    /// Timed open. No-op when already open or locked open; an armed timer
    /// is not restarted.
    ///
    /// # Errors
    ///
    /// Returns a `GateError` if an output write failed. The gate is `Open`
    /// and the timer armed regardless.
    pub async fn open(&self) -> Result<()> {
        let mut core = self.inner.core.lock().await;

        if core.state != GateState::Closed {
            debug!(state = %core.state, "Open ignored");
            return Ok(());
        }

        let result = self
            .transition(&mut core, GateState::Open, TransitionCause::Open)
            .await;

        core.disarm();
        let generation = core.generation;
        let deadline = Instant::now() + self.inner.config.open_duration;
        core.deadline = Some(deadline);
        core.timer = Some(spawn_auto_return(
            Arc::downgrade(&self.inner),
            generation,
            deadline,
        ));

        result
    }

    /// Open until explicitly closed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a `GateError` if an output write failed; the state is
    /// `LockedOpen` regardless.
    pub async fn lock_open(&self) -> Result<()> {
        let mut core = self.inner.core.lock().await;

        if core.state == GateState::LockedOpen {
            debug!("Gate already locked open");
            return Ok(());
        }

        core.disarm();
        self.transition(&mut core, GateState::LockedOpen, TransitionCause::LockOpen)
            .await
    }

    /// Close from any state, cancelling any armed timer.
    ///
    /// Outputs are driven low even when the gate is already closed.
    ///
    /// # Errors
    ///
    /// Returns a `GateError` if an output write failed; the state is
    /// `Closed` regardless.
    pub async fn close(&self) -> Result<()> {
        let mut core = self.inner.core.lock().await;
        core.disarm();
        self.transition(&mut core, GateState::Closed, TransitionCause::Close)
            .await
    }

    pub async fn state(&self) -> GateState {
        self.inner.core.lock().await.state
    }

    /// When the armed auto-return fires, if a timer is armed.
    pub async fn deadline(&self) -> Option<Instant> {
        self.inner.core.lock().await.deadline
    }

    /// Recent transitions, oldest first.
    pub async fn history(&self) -> Vec<GateTransition> {
        self.inner.core.lock().await.history.iter().copied().collect()
    }

    /// Receive `Opened`/`Closed` events.
    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    /// Apply `to`: update state, record, drive outputs, announce.
    async fn transition(
        &self,
        core: &mut GateCore<O>,
        to: GateState,
        cause: TransitionCause,
    ) -> Result<()> {
        let from = core.state;
        core.state = to;
        if from != to {
            core.record(from, to, cause);
            info!(from = %from, to = %to, ?cause, "Gate state changed");
        }

        let level = Level::from_energized(to.is_energized());
        let relay_result = core.relay.set_level(level).await.map_err(GateError::Relay);
        let led_result = match core.led.as_mut() {
            Some(led) => led.set_level(level).await.map_err(GateError::Led),
            None => Ok(()),
        };

        if let Some(event) = GateEvent::between(from, to) {
            // No subscribers is fine.
            let _ = self.inner.events.send(event);
        }

        let result = relay_result.and(led_result);
        if let Err(e) = &result {
            error!(state = %to, error = %e, "Gate output did not follow state");
        }
        result
    }
}

fn spawn_auto_return<O: DigitalOutput + 'static>(
    inner: Weak<Inner<O>>,
    generation: u64,
    deadline: Instant,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let gate = GateActuator { inner };
        let mut core = gate.inner.core.lock().await;

        if core.state != GateState::Open || core.generation != generation {
            debug!(generation, "Stale auto-return timer ignored");
            return;
        }

        core.timer = None;
        core.deadline = None;
        // Errors are logged inside transition.
        let _ = gate
            .transition(&mut core, GateState::Closed, TransitionCause::AutoReturn)
            .await;
    })
}
