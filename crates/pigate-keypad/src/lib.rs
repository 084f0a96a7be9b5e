//! Wiegand keypad and badge decoding for the PiGate edge controller.
//!
//! Raw pulses from the two data lines become bits, bits become keys, keys
//! become codes. The pieces are:
//!
//! - [`Decoder`]: a pure, time-injected state machine. [`NibbleDecoder`]
//!   handles 4-bit-per-key keypads, [`FixedWidthDecoder`] handles badge
//!   frames such as Wiegand 26.
//! - [`BitSender`]: the non-blocking entry point. Bits offered to a full queue
//!   are dropped and counted.
//! - [`KeypadReader`]: the single task that owns a decoder, drives its
//!   deadlines and publishes codes on a [`CodeStream`].
//!
//! # Example
//!
//! ```no_run
//! use pigate_keypad::{DecoderConfig, KeypadReader};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> pigate_keypad::Result<()> {
//! let shutdown = CancellationToken::new();
//! let (bits, mut codes, _task) = KeypadReader::start(&DecoderConfig::default(), shutdown)?;
//!
//! // 0001 0010 0011 0100 0101
//! for bit in [0, 0, 0, 1, 0, 0, 1, 0, 0, 0, 1, 1, 0, 1, 0, 0, 0, 1, 0, 1] {
//!     bits.offer(bit);
//! }
//!
//! assert_eq!(codes.recv().await.as_deref(), Some("12345"));
//! # Ok(())
//! # }
//! ```

pub mod deadline;
pub mod decoder;
pub mod error;
pub mod fixed_width;
pub mod nibble;
pub mod queue;
pub mod reader;

pub use deadline::Deadline;
pub use decoder::{AnyDecoder, Decoder, DecoderConfig, DecoderMode};
pub use error::{DecodeError, Result};
pub use fixed_width::FixedWidthDecoder;
pub use nibble::NibbleDecoder;
pub use queue::{BitSender, CodeStream};
pub use reader::{KeypadReader, spawn_pulse_sampler};
