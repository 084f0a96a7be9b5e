//! Gate actuation for the PiGate edge controller.
//!
//! One relay (plus an optional status LED mirroring it) is driven through a
//! three-state machine: `Closed`, `Open` with a timed auto-return, and
//! `LockedOpen` until an explicit close. See [`state`] for the transition
//! table.
//!
//! Every transition updates the logical state first and then drives the
//! pins; a failed pin write is logged and returned, never retried. Changes
//! between energized and de-energized are broadcast as [`GateEvent`]s.

pub mod actuator;
pub mod error;
pub mod state;

pub use actuator::{GateActuator, GateConfig};
pub use error::{GateError, Result};
pub use state::{GateEvent, GateState, GateTransition, TransitionCause};
