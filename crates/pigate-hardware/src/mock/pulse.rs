//! Mock Wiegand data lines.

use crate::{
    HardwareError, Result,
    traits::PulseInput,
    types::{DataLine, Pulse},
};
use tokio::sync::mpsc;

/// Mock pulse input fed through a [`MockPulseInputHandle`].
///
/// # Examples
///
/// ```
/// use pigate_hardware::mock::MockPulseInput;
/// use pigate_hardware::{DataLine, PulseInput};
///
/// #[tokio::main]
/// async fn main() -> pigate_hardware::Result<()> {
///     let (mut input, handle) = MockPulseInput::new();
///
///     handle.send_bits(&[1, 0]).await?;
///
///     assert_eq!(input.next_pulse().await?.line, DataLine::D1);
///     assert_eq!(input.next_pulse().await?.line, DataLine::D0);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockPulseInput {
    pulse_rx: mpsc::Receiver<DataLine>,
    name: String,
}

impl MockPulseInput {
    /// Create a new mock input with the default name.
    pub fn new() -> (Self, MockPulseInputHandle) {
        Self::with_name("Mock Wiegand".to_string())
    }

    /// Create a new mock input with a custom name.
    pub fn with_name(name: String) -> (Self, MockPulseInputHandle) {
        let (pulse_tx, pulse_rx) = mpsc::channel(256);
        let input = Self {
            pulse_rx,
            name: name.clone(),
        };
        (input, MockPulseInputHandle { pulse_tx, name })
    }
}

impl PulseInput for MockPulseInput {
    async fn next_pulse(&mut self) -> Result<Pulse> {
        self.pulse_rx
            .recv()
            .await
            .map(Pulse::now)
            .ok_or_else(|| HardwareError::disconnected(self.name.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handle for pulsing a mock input's data lines.
#[derive(Debug, Clone)]
pub struct MockPulseInputHandle {
    pulse_tx: mpsc::Sender<DataLine>,
    name: String,
}

impl MockPulseInputHandle {
    /// Pulse one data line.
    ///
    /// # Errors
    ///
    /// Returns an error if the input has been dropped.
    pub async fn pulse(&self, line: DataLine) -> Result<()> {
        self.pulse_tx
            .send(line)
            .await
            .map_err(|_| HardwareError::disconnected(self.name.clone()))
    }

    /// Pulse the lines encoding `bits`, in order.
    pub async fn send_bits(&self, bits: &[u8]) -> Result<()> {
        for &bit in bits {
            self.pulse(DataLine::for_bit(bit)).await?;
        }
        Ok(())
    }

    /// Pulse the 4-bit MSB-first encoding of each key.
    ///
    /// `*` is sent as `0xA` and `#` as `0xB`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InvalidData` for any other character.
    pub async fn send_keys(&self, keys: &str) -> Result<()> {
        for key in keys.chars() {
            let nibble = match key {
                '0'..='9' => key as u8 - b'0',
                '*' => 0xA,
                '#' => 0xB,
                other => {
                    return Err(HardwareError::invalid_data(format!(
                        "Key must be 0-9, * or #, got {other:?}"
                    )));
                }
            };
            for shift in (0..4).rev() {
                self.pulse(DataLine::for_bit((nibble >> shift) & 1)).await?;
            }
        }
        Ok(())
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect_bits(input: &mut MockPulseInput, count: usize) -> Vec<u8> {
        let mut bits = Vec::with_capacity(count);
        for _ in 0..count {
            bits.push(input.next_pulse().await.unwrap().line.bit());
        }
        bits
    }

    #[tokio::test]
    async fn test_send_bits() {
        let (mut input, handle) = MockPulseInput::new();

        handle.send_bits(&[0, 1, 1, 0]).await.unwrap();

        assert_eq!(collect_bits(&mut input, 4).await, vec![0, 1, 1, 0]);
    }

    #[tokio::test]
    async fn test_send_keys_msb_first() {
        let (mut input, handle) = MockPulseInput::new();

        handle.send_keys("5#").await.unwrap();

        assert_eq!(
            collect_bits(&mut input, 8).await,
            vec![0, 1, 0, 1, 1, 0, 1, 1]
        );
    }

    #[tokio::test]
    async fn test_send_keys_rejects_letters() {
        let (_input, handle) = MockPulseInput::new();
        assert!(handle.send_keys("1A").await.is_err());
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (mut input, handle) = MockPulseInput::with_name("lobby".to_string());
        drop(handle);

        let result = input.next_pulse().await;
        assert!(matches!(result, Err(HardwareError::Disconnected { .. })));
        assert_eq!(input.name(), "lobby");
    }
}
