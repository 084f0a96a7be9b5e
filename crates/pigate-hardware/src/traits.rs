//! GPIO device trait definitions.
//!
//! These traits are the contract between the controller and its pins. The
//! returned futures are declared `Send` so a generic device can be moved into
//! a spawned Tokio task; implementations simply write `async fn`.
//!
//! # Object Safety
//!
//! The traits are NOT object-safe (`impl Future` return types). Use generics,
//! or the enum wrappers in [`devices`](crate::devices) when the concrete
//! device is chosen at runtime.

use crate::error::Result;
use crate::types::{Level, Pulse};
use std::future::Future;

/// A single digital output pin.
///
/// # Examples
///
/// ```
/// use pigate_hardware::mock::MockOutput;
/// use pigate_hardware::{DigitalOutput, Level};
///
/// #[tokio::main]
/// async fn main() -> pigate_hardware::Result<()> {
///     let (mut relay, handle) = MockOutput::new(17);
///
///     relay.set_level(Level::High).await?;
///     assert_eq!(handle.level(), Level::High);
///
///     Ok(())
/// }
/// ```
pub trait DigitalOutput: Send + Sync {
    /// Drive the pin to `level`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write does not reach the pin. The caller's
    /// logical state is not rolled back by a failed write.
    fn set_level(&mut self, level: Level) -> impl Future<Output = Result<()>> + Send;

    /// Pin number (BCM numbering on a Raspberry Pi).
    fn pin(&self) -> u32;
}

/// A pair of Wiegand data lines.
pub trait PulseInput: Send {
    /// Wait for the next falling edge on either line.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Disconnected` when the source is gone. Readers
    /// treat this as end of input.
    fn next_pulse(&mut self) -> impl Future<Output = Result<Pulse>> + Send;

    /// Human-readable device name for logging.
    fn name(&self) -> &str;
}
