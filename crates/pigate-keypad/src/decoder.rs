//! Decoder contract and configuration.

use crate::error::{DecodeError, Result};
use crate::fixed_width::FixedWidthDecoder;
use crate::nibble::NibbleDecoder;
use pigate_core::constants::{
    DEFAULT_BADGE_FRAME_BITS, DEFAULT_BADGE_FRAME_TIMEOUT_MS, DEFAULT_BIT_QUEUE_CAPACITY,
    DEFAULT_INTER_KEY_TIMEOUT_MS, DEFAULT_KEY_FRAME_TIMEOUT_MS, MAX_KEYS_PER_CODE,
};
use std::time::Duration;
use tokio::time::Instant;

/// Time-injected bit-to-code state machine.
///
/// Implementations own all accumulation state and every deadline guarding
/// it. The caller supplies the current instant, which keeps decoders pure
/// and lets tests drive them without a clock.
///
/// `push_bit` first settles any deadline already reached at `now`, then
/// applies the bit. At most one code results from a single call.
pub trait Decoder: Send {
    /// Feed one bit (`0` or `1`). Any other value is discarded.
    fn push_bit(&mut self, bit: u8, now: Instant) -> Option<String>;

    /// Settle deadlines reached at `now`, possibly emitting a code.
    fn poll_deadline(&mut self, now: Instant) -> Option<String>;

    /// Nearest armed deadline, if any.
    fn next_deadline(&self) -> Option<Instant>;

    /// Drop all partial state.
    fn reset(&mut self);
}

/// How bits are grouped into codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderMode {
    /// 4 bits per key, up to `max_keys` keys per code.
    #[default]
    Nibble,
    /// One fixed-length frame per badge, parity bits at both ends.
    FixedWidth { bits: usize },
}

/// Decoder configuration.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub mode: DecoderMode,

    /// Maximum gap between bits of one key (nibble mode).
    pub key_frame_timeout: Duration,

    /// Maximum gap between completed keys of one code (nibble mode).
    pub inter_key_timeout: Duration,

    /// Keys that complete a code immediately (nibble mode).
    pub max_keys: usize,

    /// Maximum gap between bits of one frame (fixed-width mode).
    pub frame_timeout: Duration,

    /// Capacity of the bit queue in front of the decoder task.
    pub queue_capacity: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            mode: DecoderMode::Nibble,
            key_frame_timeout: Duration::from_millis(DEFAULT_KEY_FRAME_TIMEOUT_MS),
            inter_key_timeout: Duration::from_millis(DEFAULT_INTER_KEY_TIMEOUT_MS),
            max_keys: MAX_KEYS_PER_CODE,
            frame_timeout: Duration::from_millis(DEFAULT_BADGE_FRAME_TIMEOUT_MS),
            queue_capacity: DEFAULT_BIT_QUEUE_CAPACITY,
        }
    }
}

impl DecoderConfig {
    /// Nibble keypad with default timing.
    pub fn nibble() -> Self {
        Self::default()
    }

    /// Badge reader with `bits`-wide frames.
    pub fn fixed_width(bits: usize) -> Self {
        Self {
            mode: DecoderMode::FixedWidth { bits },
            ..Default::default()
        }
    }

    /// Wiegand 26 badge reader.
    pub fn wiegand26() -> Self {
        Self::fixed_width(DEFAULT_BADGE_FRAME_BITS)
    }

    pub fn key_frame_timeout(mut self, timeout: Duration) -> Self {
        self.key_frame_timeout = timeout;
        self
    }

    pub fn inter_key_timeout(mut self, timeout: Duration) -> Self {
        self.inter_key_timeout = timeout;
        self
    }

    pub fn max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Check that the configuration yields a working decoder.
    ///
    /// # Errors
    ///
    /// Returns a `DecodeError` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(DecodeError::InvalidQueueCapacity(self.queue_capacity));
        }
        match self.mode {
            DecoderMode::Nibble if self.max_keys == 0 => {
                Err(DecodeError::InvalidKeyLimit(self.max_keys))
            }
            DecoderMode::FixedWidth { bits }
                if !(FixedWidthDecoder::MIN_BITS..=FixedWidthDecoder::MAX_BITS).contains(&bits) =>
            {
                Err(DecodeError::InvalidFrameWidth {
                    bits,
                    min: FixedWidthDecoder::MIN_BITS,
                    max: FixedWidthDecoder::MAX_BITS,
                })
            }
            _ => Ok(()),
        }
    }

    /// Build the decoder selected by `mode`.
    ///
    /// # Errors
    ///
    /// Returns a `DecodeError` if [`validate`](Self::validate) fails.
    pub fn build(&self) -> Result<AnyDecoder> {
        self.validate()?;
        Ok(match self.mode {
            DecoderMode::Nibble => AnyDecoder::Nibble(NibbleDecoder::new(
                self.key_frame_timeout,
                self.inter_key_timeout,
                self.max_keys,
            )),
            DecoderMode::FixedWidth { bits } => {
                AnyDecoder::FixedWidth(FixedWidthDecoder::new(bits, self.frame_timeout))
            }
        })
    }
}

/// Enum wrapper for decoder dispatch.
#[derive(Debug)]
pub enum AnyDecoder {
    Nibble(NibbleDecoder),
    FixedWidth(FixedWidthDecoder),
}

impl Decoder for AnyDecoder {
    fn push_bit(&mut self, bit: u8, now: Instant) -> Option<String> {
        match self {
            Self::Nibble(decoder) => decoder.push_bit(bit, now),
            Self::FixedWidth(decoder) => decoder.push_bit(bit, now),
        }
    }

    fn poll_deadline(&mut self, now: Instant) -> Option<String> {
        match self {
            Self::Nibble(decoder) => decoder.poll_deadline(now),
            Self::FixedWidth(decoder) => decoder.poll_deadline(now),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match self {
            Self::Nibble(decoder) => decoder.next_deadline(),
            Self::FixedWidth(decoder) => decoder.next_deadline(),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Nibble(decoder) => decoder.reset(),
            Self::FixedWidth(decoder) => decoder.reset(),
        }
    }
}
