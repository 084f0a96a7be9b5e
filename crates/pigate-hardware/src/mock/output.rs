//! Mock digital output.
//!
//! Records every level written to it and can be told to fail writes, which
//! lets the gate tests exercise the pin-failure path.

use crate::{HardwareError, Result, traits::DigitalOutput, types::Level};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct OutputState {
    level: Level,
    history: Vec<Level>,
    failing: bool,
}

fn lock(state: &Mutex<OutputState>) -> MutexGuard<'_, OutputState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock output pin.
///
/// # Examples
///
/// ```
/// use pigate_hardware::mock::MockOutput;
/// use pigate_hardware::{DigitalOutput, Level};
///
/// #[tokio::main]
/// async fn main() -> pigate_hardware::Result<()> {
///     let (mut led, handle) = MockOutput::new(27);
///
///     led.set_level(Level::High).await?;
///     led.set_level(Level::Low).await?;
///
///     assert_eq!(handle.history(), vec![Level::High, Level::Low]);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockOutput {
    pin: u32,
    state: Arc<Mutex<OutputState>>,
}

impl MockOutput {
    /// Create a new mock output on `pin`, initially low.
    pub fn new(pin: u32) -> (Self, MockOutputHandle) {
        let state = Arc::new(Mutex::new(OutputState::default()));
        let output = Self {
            pin,
            state: Arc::clone(&state),
        };
        (output, MockOutputHandle { pin, state })
    }
}

impl DigitalOutput for MockOutput {
    async fn set_level(&mut self, level: Level) -> Result<()> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(HardwareError::write_failed(self.pin, "injected failure"));
        }
        state.level = level;
        state.history.push(level);
        Ok(())
    }

    fn pin(&self) -> u32 {
        self.pin
    }
}

/// Observer and fault injector for a [`MockOutput`].
#[derive(Debug, Clone)]
pub struct MockOutputHandle {
    pin: u32,
    state: Arc<Mutex<OutputState>>,
}

impl MockOutputHandle {
    /// Current level of the pin.
    pub fn level(&self) -> Level {
        lock(&self.state).level
    }

    /// Every level successfully written, oldest first.
    pub fn history(&self) -> Vec<Level> {
        lock(&self.state).history.clone()
    }

    /// Make subsequent writes fail (`true`) or succeed again.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    /// Pin number of the observed output.
    pub fn pin(&self) -> u32 {
        self.pin
    }
}
