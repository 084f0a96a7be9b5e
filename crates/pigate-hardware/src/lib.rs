//! GPIO abstraction layer for the PiGate edge controller.
//!
//! This crate provides trait-based abstractions for the two kinds of pins the
//! controller drives: digital outputs (gate relay, status LED) and the pair of
//! Wiegand data lines a keypad or badge reader pulses. Mock implementations
//! let the rest of the workspace run without a board. On real hardware the
//! relay and LED are driven through `/sys/class/gpio`, and keypad edges come
//! from the GPIO character device ([`cdev`]) or a sysfs sampler, either one
//! read on its own thread ([`edge`]).
//!
//! # Device Traits
//!
//! ## Digital Outputs
//!
//! The [`DigitalOutput`] trait drives a single pin high or low:
//!
//! ```no_run
//! use pigate_hardware::{DigitalOutput, Level, Result};
//!
//! async fn pulse_relay<O: DigitalOutput>(relay: &mut O) -> Result<()> {
//!     relay.set_level(Level::High).await?;
//!     relay.set_level(Level::Low).await
//! }
//! ```
//!
//! ## Pulse Inputs
//!
//! The [`PulseInput`] trait yields one [`Pulse`] per falling edge on either
//! data line. D0 carries a `0` bit, D1 a `1` bit:
//!
//! ```no_run
//! use pigate_hardware::{PulseInput, Result};
//!
//! async fn next_bit<P: PulseInput>(input: &mut P) -> Result<u8> {
//!     Ok(input.next_pulse().await?.line.bit())
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Native `async fn` in traits is not object-safe, so runtime selection goes
//! through the enum wrappers in [`devices`] ([`AnyOutput`], [`AnyPulseInput`]).
//!
//! [`DigitalOutput`]: traits::DigitalOutput
//! [`PulseInput`]: traits::PulseInput
//! [`AnyOutput`]: devices::AnyOutput
//! [`AnyPulseInput`]: devices::AnyPulseInput

pub mod cdev;
pub mod devices;
pub mod edge;
pub mod error;
pub mod mock;
pub mod sysfs;
pub mod traits;
pub mod types;

pub use devices::{AnyOutput, AnyPulseInput};
pub use edge::{EdgeSource, EdgeThreadInput};
pub use error::{HardwareError, Result};
pub use traits::{DigitalOutput, PulseInput};
pub use types::{DataLine, Level, Pulse};
