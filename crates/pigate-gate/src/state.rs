//! Gate states, transitions and events.
//!
//! # States
//!
//! - `Closed`: relay de-energized (initial, and after every restart)
//! - `Open`: relay energized, auto-return timer armed
//! - `LockedOpen`: relay energized until an explicit close
//!
//! # Transitions
//!
//! | From | `open` | `lock_open` | `close` | timer |
//! |------|--------|-------------|---------|-------|
//! | Closed | Open | LockedOpen | Closed | - |
//! | Open | no-op | LockedOpen | Closed | Closed |
//! | LockedOpen | no-op | no-op | Closed | - |

use pigate_core::constants::{STATUS_CLOSED, STATUS_OPENED};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Closed,
    Open,
    LockedOpen,
}

impl GateState {
    /// Whether the relay is driven high in this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use pigate_gate::GateState;
    ///
    /// assert!(GateState::Open.is_energized());
    /// assert!(GateState::LockedOpen.is_energized());
    /// assert!(!GateState::Closed.is_energized());
    /// ```
    pub fn is_energized(self) -> bool {
        matches!(self, GateState::Open | GateState::LockedOpen)
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GateState::Closed => "Closed",
            GateState::Open => "Open",
            GateState::LockedOpen => "LockedOpen",
        };
        f.write_str(text)
    }
}

/// What caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    Open,
    LockOpen,
    Close,
    AutoReturn,
}

/// A recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateTransition {
    pub from: GateState,
    pub to: GateState,
    pub cause: TransitionCause,
    pub at: Instant,
}

/// Broadcast whenever the gate crosses between energized and de-energized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateEvent {
    Opened,
    Closed,
}

impl GateEvent {
    /// Event for a change from `from` to `to`, if the energized level changed.
    pub fn between(from: GateState, to: GateState) -> Option<Self> {
        match (from.is_energized(), to.is_energized()) {
            (false, true) => Some(GateEvent::Opened),
            (true, false) => Some(GateEvent::Closed),
            _ => None,
        }
    }

    /// Status payload published for this event.
    pub fn status_payload(self) -> &'static str {
        match self {
            GateEvent::Opened => STATUS_OPENED,
            GateEvent::Closed => STATUS_CLOSED,
        }
    }
}
