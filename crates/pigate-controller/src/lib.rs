//! # PiGate Controller
//!
//! The edge controller process: configuration, the command router, and the
//! runtime that wires keypad, gate, credential store, sync and messaging
//! together.
//!
//! ```text
//! pulses -> KeypadReader -> code -+
//! command topic ------------------+-> CommandRouter -> GateActuator -> status topic
//! credentials topic --------------+        |
//!                                          +-> SyncScheduler -> SyncEngine -> store
//! ```

pub mod config;
pub mod router;
pub mod runtime;

pub use config::{ConfigError, ControllerConfig};
pub use router::{CommandRouter, RouteOutcome, RouterEvent, forwarding_handler};
pub use runtime::{Controller, ControllerRouter, MockHardware};
