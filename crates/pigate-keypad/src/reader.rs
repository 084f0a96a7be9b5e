//! Decoder task and pulse sampling.
//!
//! One task owns the decoder. It waits on three things at once: the bit
//! queue, the decoder's nearest deadline, and shutdown. Bit arrival and
//! deadline expiry are therefore serialized on the same task.

use crate::decoder::{AnyDecoder, Decoder, DecoderConfig};
use crate::error::Result;
use crate::queue::{BitSender, CodeStream};
use pigate_hardware::{HardwareError, PulseInput};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const CODE_CHANNEL_CAPACITY: usize = 16;

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// The decoder task.
#[derive(Debug)]
pub struct KeypadReader {
    decoder: AnyDecoder,
    bit_rx: mpsc::Receiver<u8>,
    code_tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
}

impl KeypadReader {
    /// Build the decoder from `config` and spawn its task.
    ///
    /// Returns the bit entry point, the code stream and the task handle. The
    /// task ends when `shutdown` is cancelled, when every [`BitSender`] is
    /// dropped, or when the [`CodeStream`] is dropped.
    ///
    /// # Errors
    ///
    /// Returns a `DecodeError` if the configuration is invalid.
    pub fn start(
        config: &DecoderConfig,
        shutdown: CancellationToken,
    ) -> Result<(BitSender, CodeStream, JoinHandle<()>)> {
        let decoder = config.build()?;
        let (bit_tx, bit_rx) = mpsc::channel(config.queue_capacity);
        let (code_tx, code_rx) = mpsc::channel(CODE_CHANNEL_CAPACITY);

        let reader = Self {
            decoder,
            bit_rx,
            code_tx,
            shutdown,
        };
        let handle = tokio::spawn(reader.run());

        Ok((BitSender::new(bit_tx), CodeStream::new(code_rx), handle))
    }

    async fn run(mut self) {
        info!(mode = self.decoder_kind(), "Keypad reader started");

        loop {
            let deadline = self.decoder.next_deadline();

            let code = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("Keypad reader received shutdown signal");
                    break;
                }
                bit = self.bit_rx.recv() => match bit {
                    Some(bit) => self.decoder.push_bit(bit, Instant::now()),
                    None => {
                        debug!("Bit queue closed");
                        break;
                    }
                },
                () = sleep_until_opt(deadline) => self.decoder.poll_deadline(Instant::now()),
            };

            if let Some(code) = code {
                debug!(keys = code.len(), "Code decoded");
                if self.code_tx.send(code).await.is_err() {
                    debug!("Code stream dropped");
                    break;
                }
            }
        }

        info!("Keypad reader stopped");
    }

    fn decoder_kind(&self) -> &'static str {
        match self.decoder {
            AnyDecoder::Nibble(_) => "nibble",
            AnyDecoder::FixedWidth(_) => "fixed_width",
        }
    }
}

/// Forward every pulse of `input` into `bits` until shutdown or disconnect.
pub fn spawn_pulse_sampler<P>(
    mut input: P,
    bits: BitSender,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    P: PulseInput + 'static,
{
    tokio::spawn(async move {
        info!(device = input.name(), "Pulse sampler started");

        loop {
            let pulse = tokio::select! {
                _ = shutdown.cancelled() => break,
                pulse = input.next_pulse() => pulse,
            };

            match pulse {
                Ok(pulse) => {
                    bits.offer(pulse.line.bit());
                }
                Err(HardwareError::Disconnected { device }) => {
                    info!(device = %device, "Pulse input disconnected");
                    break;
                }
                Err(e) => {
                    error!(device = input.name(), error = %e, "Pulse input failed");
                    break;
                }
            }
        }

        info!(device = input.name(), "Pulse sampler stopped");
    })
}
