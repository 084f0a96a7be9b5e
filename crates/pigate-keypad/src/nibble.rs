//! 4-bit-per-key keypad decoding.
//!
//! Each key arrives as four bits, MSB first. `0x0..=0x9` map to digits,
//! `0xA` to `*`, `0xB` to `#`; anything else becomes the unknown marker.
//!
//! Two accumulators with one deadline each:
//!
//! | Accumulator | Deadline | On expiry |
//! |-------------|----------|-----------|
//! | partial key (< 4 bits) | key frame, re-armed per bit | discarded |
//! | completed keys (< max) | inter-key, re-armed per key | emitted as a shorter code |
//!
//! Reaching the key limit emits immediately.

use crate::deadline::{Deadline, earliest};
use crate::decoder::Decoder;
use pigate_core::constants::{BITS_PER_KEY, UNKNOWN_KEY};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Map a 4-bit value to its key character.
///
/// # Examples
///
/// ```
/// use pigate_keypad::nibble::key_for_nibble;
///
/// assert_eq!(key_for_nibble(0x7), '7');
/// assert_eq!(key_for_nibble(0xA), '*');
/// assert_eq!(key_for_nibble(0xB), '#');
/// assert_eq!(key_for_nibble(0xF), '?');
/// ```
pub fn key_for_nibble(value: u8) -> char {
    match value {
        0x0..=0x9 => char::from(b'0' + value),
        0xA => '*',
        0xB => '#',
        _ => UNKNOWN_KEY,
    }
}

#[derive(Debug)]
pub struct NibbleDecoder {
    key_frame_timeout: Duration,
    inter_key_timeout: Duration,
    max_keys: usize,

    key_bits: u8,
    key_bit_count: usize,
    key_deadline: Deadline,

    keys: String,
    code_deadline: Deadline,
}

impl NibbleDecoder {
    pub fn new(key_frame_timeout: Duration, inter_key_timeout: Duration, max_keys: usize) -> Self {
        Self {
            key_frame_timeout,
            inter_key_timeout,
            max_keys,
            key_bits: 0,
            key_bit_count: 0,
            key_deadline: Deadline::disarmed(),
            keys: String::with_capacity(max_keys),
            code_deadline: Deadline::disarmed(),
        }
    }

    /// Number of bits of the key currently being received.
    pub fn pending_bits(&self) -> usize {
        self.key_bit_count
    }

    /// Keys completed but not yet emitted.
    pub fn pending_keys(&self) -> &str {
        &self.keys
    }

    fn clear_key(&mut self) {
        self.key_bits = 0;
        self.key_bit_count = 0;
        self.key_deadline.cancel();
    }

    fn take_code(&mut self) -> String {
        self.code_deadline.cancel();
        std::mem::replace(&mut self.keys, String::with_capacity(self.max_keys))
    }
}

impl Decoder for NibbleDecoder {
    fn push_bit(&mut self, bit: u8, now: Instant) -> Option<String> {
        let expired = self.poll_deadline(now);

        if bit > 1 {
            warn!(bit, "Discarding invalid bit value");
            return expired;
        }

        self.key_bits = (self.key_bits << 1) | bit;
        self.key_bit_count += 1;
        self.key_deadline.arm(now, self.key_frame_timeout);

        if self.key_bit_count < BITS_PER_KEY {
            return expired;
        }

        let key = key_for_nibble(self.key_bits);
        self.clear_key();
        self.keys.push(key);
        debug!(key = %key, collected = self.keys.len(), "Key decoded");

        if self.keys.len() >= self.max_keys {
            return Some(self.take_code());
        }

        self.code_deadline.arm(now, self.inter_key_timeout);
        expired
    }

    fn poll_deadline(&mut self, now: Instant) -> Option<String> {
        if self.key_deadline.is_expired(now) {
            warn!(
                bits = self.key_bit_count,
                "Key frame timeout, discarding partial key"
            );
            self.clear_key();
        }

        if self.code_deadline.is_expired(now) {
            let code = self.take_code();
            if !code.is_empty() {
                debug!(keys = code.len(), "Inter-key timeout, emitting short code");
                return Some(code);
            }
        }

        None
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest(self.key_deadline.at(), self.code_deadline.at())
    }

    fn reset(&mut self) {
        self.clear_key();
        self.keys.clear();
        self.code_deadline.cancel();
    }
}
