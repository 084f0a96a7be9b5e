//! Enum wrappers for GPIO device dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn DigitalOutput>`
//! is unavailable. These enums give the controller one concrete type per
//! device kind while the backend (mock or real GPIO) is chosen from config.
//!
//! # Examples
//!
//! ```
//! use pigate_hardware::devices::AnyOutput;
//! use pigate_hardware::mock::MockOutput;
//!
//! let (relay, _handle) = MockOutput::new(17);
//! let relay = AnyOutput::Mock(relay);
//! ```

use crate::mock::{MockOutput, MockPulseInput};
use crate::edge::EdgeThreadInput;
use crate::sysfs::SysfsOutput;
use crate::traits::{DigitalOutput, PulseInput};
use crate::{Level, Pulse, Result};

/// Enum wrapper for output pin dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyOutput {
    /// In-memory output for development and testing.
    Mock(MockOutput),
    /// Linux sysfs GPIO.
    Sysfs(SysfsOutput),
}

impl DigitalOutput for AnyOutput {
    async fn set_level(&mut self, level: Level) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_level(level).await,
            Self::Sysfs(device) => device.set_level(level).await,
        }
    }

    fn pin(&self) -> u32 {
        match self {
            Self::Mock(device) => device.pin(),
            Self::Sysfs(device) => device.pin(),
        }
    }
}

/// Enum wrapper for Wiegand input dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyPulseInput {
    /// Channel-fed input for development and testing.
    Mock(MockPulseInput),
    /// Edges read on a dedicated thread (character device or sysfs sampler).
    Edge(EdgeThreadInput),
}

impl PulseInput for AnyPulseInput {
    async fn next_pulse(&mut self) -> Result<Pulse> {
        match self {
            Self::Mock(device) => device.next_pulse().await,
            Self::Edge(device) => device.next_pulse().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Mock(device) => device.name(),
            Self::Edge(device) => device.name(),
        }
    }
}
