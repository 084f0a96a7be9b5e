//! GPIO character device edge events.
//!
//! Both data lines are requested from `/dev/gpiochipN` with falling-edge
//! detection. The kernel timestamps and queues every edge, so pulses far
//! shorter than any userspace polling period are still seen, in order.

use crate::{DataLine, HardwareError, Result, edge::EdgeSource};
use gpiocdev::Request;
use gpiocdev::line::EdgeDetection;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Default GPIO character device on a Raspberry Pi.
pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

const CONSUMER: &str = "pigate-keypad";

/// Falling edges on the two Wiegand data lines, read from the kernel.
pub struct CdevEdges {
    name: String,
    d0_pin: u32,
    d1_pin: u32,
    request: Request,
}

impl std::fmt::Debug for CdevEdges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdevEdges")
            .field("name", &self.name)
            .field("d0_pin", &self.d0_pin)
            .field("d1_pin", &self.d1_pin)
            .finish()
    }
}

impl CdevEdges {
    /// Request `d0_pin` and `d1_pin` on `chip` as edge-detecting inputs.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::PinUnavailable` naming D0 if the request is
    /// refused (missing chip, line busy, no permission).
    pub fn request(chip: impl AsRef<Path>, d0_pin: u32, d1_pin: u32) -> Result<Self> {
        let chip = chip.as_ref();
        let request = Request::builder()
            .on_chip(chip)
            .with_consumer(CONSUMER)
            .with_lines(&[d0_pin, d1_pin])
            .as_input()
            .with_edge_detection(EdgeDetection::FallingEdge)
            .request()
            .map_err(|e| {
                HardwareError::pin_unavailable(d0_pin, format!("{}: {e}", chip.display()))
            })?;

        info!(chip = %chip.display(), d0_pin, d1_pin, "Keypad lines requested");
        Ok(Self {
            name: format!("cdev wiegand(d0={d0_pin}, d1={d1_pin})"),
            d0_pin,
            d1_pin,
            request,
        })
    }
}

/// The data line an edge on `offset` belongs to.
fn line_for(offset: u32, d0_pin: u32, d1_pin: u32) -> Option<DataLine> {
    if offset == d0_pin {
        Some(DataLine::D0)
    } else if offset == d1_pin {
        Some(DataLine::D1)
    } else {
        None
    }
}

impl EdgeSource for CdevEdges {
    fn wait_edge(&mut self, timeout: Duration) -> Result<Option<DataLine>> {
        let ready = self
            .request
            .wait_edge_event(timeout)
            .map_err(|e| HardwareError::invalid_data(format!("{}: {e}", self.name)))?;
        if !ready {
            return Ok(None);
        }

        let event = self
            .request
            .read_edge_event()
            .map_err(|e| HardwareError::invalid_data(format!("{}: {e}", self.name)))?;
        Ok(line_for(event.offset, self.d0_pin, self.d1_pin))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
