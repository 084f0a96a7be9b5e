//! Fixed-width badge frame decoding (Wiegand 26 and friends).
//!
//! A frame is `bits` long. The first and last bits are parity and are
//! stripped without being checked; the bits between them are read MSB first
//! as an unsigned integer and rendered in decimal.

use crate::deadline::Deadline;
use crate::decoder::Decoder;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct FixedWidthDecoder {
    frame_bits: usize,
    frame_timeout: Duration,
    value: u64,
    count: usize,
    deadline: Deadline,
}

impl FixedWidthDecoder {
    /// Smallest frame with at least one data bit.
    pub const MIN_BITS: usize = 3;

    /// Largest frame whose data bits fit in a `u64`.
    pub const MAX_BITS: usize = 66;

    pub fn new(frame_bits: usize, frame_timeout: Duration) -> Self {
        Self {
            frame_bits: frame_bits.clamp(Self::MIN_BITS, Self::MAX_BITS),
            frame_timeout,
            value: 0,
            count: 0,
            deadline: Deadline::disarmed(),
        }
    }

    pub fn frame_bits(&self) -> usize {
        self.frame_bits
    }

    fn clear(&mut self) {
        self.value = 0;
        self.count = 0;
        self.deadline.cancel();
    }
}

impl Decoder for FixedWidthDecoder {
    fn push_bit(&mut self, bit: u8, now: Instant) -> Option<String> {
        self.poll_deadline(now);

        if bit > 1 {
            warn!(bit, "Discarding invalid bit value");
            return None;
        }

        let position = self.count;
        self.count += 1;
        // Leading and trailing parity bits are skipped.
        if position != 0 && position != self.frame_bits - 1 {
            self.value = (self.value << 1) | u64::from(bit);
        }

        if self.count < self.frame_bits {
            self.deadline.arm(now, self.frame_timeout);
            return None;
        }

        let code = self.value.to_string();
        debug!(bits = self.frame_bits, code = %code, "Badge frame decoded");
        self.clear();
        Some(code)
    }

    fn poll_deadline(&mut self, now: Instant) -> Option<String> {
        if self.deadline.is_expired(now) {
            warn!(
                received = self.count,
                expected = self.frame_bits,
                "Frame timeout, discarding incomplete frame"
            );
            self.clear();
        }
        None
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadline.at()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_TIMEOUT: Duration = Duration::from_millis(50);

    /// Wiegand 26 frame: parity, 8-bit facility, 16-bit card, parity.
    fn w26_frame(facility: u8, card: u16) -> Vec<u8> {
        let mut bits = vec![0];
        bits.extend((0..8).rev().map(|i| (facility >> i) & 1));
        bits.extend((0..16).rev().map(|i| ((card >> i) & 1) as u8));
        bits.push(1);
        bits
    }

    #[test]
    fn test_w26_decodes_data_bits() {
        let mut decoder = FixedWidthDecoder::new(26, FRAME_TIMEOUT);
        let now = Instant::now();

        let mut out = None;
        for bit in w26_frame(1, 2) {
            out = decoder.push_bit(bit, now);
        }

        // facility 1, card 2 => 0x010002
        assert_eq!(out.as_deref(), Some("65538"));
        assert_eq!(decoder.next_deadline(), None);
    }

    #[test]
    fn test_parity_bits_ignored() {
        let now = Instant::now();
        let mut a = FixedWidthDecoder::new(26, FRAME_TIMEOUT);
        let mut b = FixedWidthDecoder::new(26, FRAME_TIMEOUT);

        let mut frame_a = w26_frame(12, 345);
        let mut frame_b = frame_a.clone();
        frame_b[0] ^= 1;
        frame_b[25] ^= 1;

        let last_a = frame_a.pop().unwrap();
        let last_b = frame_b.pop().unwrap();
        for (&x, &y) in frame_a.iter().zip(frame_b.iter()) {
            a.push_bit(x, now);
            b.push_bit(y, now);
        }

        assert_eq!(a.push_bit(last_a, now), b.push_bit(last_b, now));
    }

    #[test]
    fn test_incomplete_frame_discarded_after_timeout() {
        let mut decoder = FixedWidthDecoder::new(26, FRAME_TIMEOUT);
        let t0 = Instant::now();

        for bit in &w26_frame(1, 1)[..10] {
            decoder.push_bit(*bit, t0);
        }
        assert_eq!(decoder.next_deadline(), Some(t0 + FRAME_TIMEOUT));

        assert_eq!(decoder.poll_deadline(t0 + FRAME_TIMEOUT), None);
        assert_eq!(decoder.next_deadline(), None);

        let later = t0 + Duration::from_secs(1);
        let mut out = None;
        for bit in w26_frame(0, 42) {
            out = decoder.push_bit(bit, later);
        }
        assert_eq!(out.as_deref(), Some("42"));
    }

    #[test]
    fn test_stale_partial_frame_dropped_on_next_bit() {
        let mut decoder = FixedWidthDecoder::new(4, FRAME_TIMEOUT);
        let t0 = Instant::now();

        decoder.push_bit(1, t0);
        decoder.push_bit(1, t0);

        let late = t0 + Duration::from_millis(500);
        for bit in [0, 1, 0] {
            assert_eq!(decoder.push_bit(bit, late), None);
        }
        assert_eq!(decoder.push_bit(0, late).as_deref(), Some("2"));
    }
}
