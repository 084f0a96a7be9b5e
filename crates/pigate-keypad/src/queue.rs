//! Channels on either side of the decoder task.

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::warn;

/// Non-blocking producer of bits for the decoder task.
///
/// Offering never waits: when the queue is full the new bit is dropped, the
/// drop counter is incremented and a warning is logged. Clones share the
/// queue and the counter.
#[derive(Debug, Clone)]
pub struct BitSender {
    tx: mpsc::Sender<u8>,
    dropped: Arc<AtomicU64>,
}

impl BitSender {
    pub(crate) fn new(tx: mpsc::Sender<u8>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue one bit. Returns `false` if it was dropped.
    pub fn offer(&self, bit: u8) -> bool {
        match self.tx.try_send(bit) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(bit, dropped_total = total, "Bit queue full, dropping bit");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Bits dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the decoder task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Lazy, unbounded sequence of decoded codes.
///
/// Ends when the decoder task stops. Usable directly through
/// [`recv`](Self::recv) or as a [`futures::Stream`].
#[derive(Debug)]
pub struct CodeStream {
    rx: mpsc::Receiver<String>,
}

impl CodeStream {
    pub(crate) fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Next code, or `None` once the decoder task has stopped.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Stream for CodeStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_drops_newest_when_full() {
        let (tx, mut rx) = mpsc::channel(2);
        let sender = BitSender::new(tx);

        assert!(sender.offer(1));
        assert!(sender.offer(0));
        assert!(!sender.offer(1));
        assert!(!sender.offer(1));

        assert_eq!(sender.dropped(), 2);
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_clones_share_counter() {
        let (tx, _rx) = mpsc::channel(1);
        let sender = BitSender::new(tx);
        let clone = sender.clone();

        sender.offer(1);
        clone.offer(1);

        assert_eq!(sender.dropped(), 1);
        assert_eq!(clone.dropped(), 1);
    }

    #[test]
    fn test_offer_after_close() {
        let (tx, rx) = mpsc::channel(4);
        let sender = BitSender::new(tx);
        drop(rx);

        assert!(sender.is_closed());
        assert!(!sender.offer(0));
        assert_eq!(sender.dropped(), 0);
    }

    #[tokio::test]
    async fn test_code_stream_as_stream() {
        use futures::StreamExt;

        let (tx, rx) = mpsc::channel(4);
        let mut codes = CodeStream::new(rx);

        tx.send("123".to_string()).await.unwrap();
        tx.send("45".to_string()).await.unwrap();
        drop(tx);

        let collected: Vec<String> = (&mut codes).collect().await;
        assert_eq!(collected, vec!["123", "45"]);
        assert_eq!(codes.recv().await, None);
    }
}
