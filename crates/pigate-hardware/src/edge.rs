//! Edge delivery from a dedicated blocking thread.
//!
//! Wiegand pulses are 50-100 µs wide, well below the resolution of the tokio
//! timer. Edge sources therefore block on their own OS thread and hand each
//! falling edge to the async side through a bounded channel. The thread
//! stops when the [`EdgeThreadInput`] is dropped or the source fails.

use crate::{DataLine, HardwareError, Pulse, Result, traits::PulseInput};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

const EDGE_QUEUE_CAPACITY: usize = 256;

/// How long one blocking wait may last before the thread checks whether the
/// receiving side is still there.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// A blocking source of falling edges.
pub trait EdgeSource: Send + 'static {
    /// Wait up to `timeout` for the next falling edge.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    ///
    /// # Errors
    ///
    /// Any error ends the edge thread; it is reported once to the reader.
    fn wait_edge(&mut self, timeout: Duration) -> Result<Option<DataLine>>;

    /// Human-readable device name for logging.
    fn name(&self) -> &str;
}

/// [`PulseInput`] fed by an [`EdgeSource`] running on its own thread.
#[derive(Debug)]
pub struct EdgeThreadInput {
    name: String,
    rx: mpsc::Receiver<Result<Pulse>>,
}

impl EdgeThreadInput {
    /// Move `source` onto a new thread and start draining it.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Io` if the thread cannot be spawned.
    pub fn spawn<E: EdgeSource>(source: E) -> Result<Self> {
        let name = source.name().to_string();
        let (tx, rx) = mpsc::channel(EDGE_QUEUE_CAPACITY);

        std::thread::Builder::new()
            .name("pigate-edges".to_string())
            .spawn(move || drain(source, tx))?;

        Ok(Self { name, rx })
    }
}

fn drain<E: EdgeSource>(mut source: E, tx: mpsc::Sender<Result<Pulse>>) {
    debug!(device = source.name(), "Edge thread started");

    while !tx.is_closed() {
        match source.wait_edge(STOP_CHECK_INTERVAL) {
            Ok(Some(line)) => {
                if tx.blocking_send(Ok(Pulse::now(line))).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(device = source.name(), error = %e, "Edge source failed");
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }

    debug!(device = source.name(), "Edge thread stopped");
}

impl PulseInput for EdgeThreadInput {
    async fn next_pulse(&mut self) -> Result<Pulse> {
        match self.rx.recv().await {
            Some(pulse) => pulse,
            None => Err(HardwareError::disconnected(self.name.clone())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
