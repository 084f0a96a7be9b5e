//! Error types for keypad decoding.
//!
//! Malformed input on the wire is never an error here: partial keys and
//! incomplete frames are discarded with a warning. These variants cover
//! configuration that cannot produce a working decoder.

/// Result type alias for keypad operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Badge frame width outside the decodable range.
    #[error("Invalid frame width {bits}: must be between {min} and {max} bits")]
    InvalidFrameWidth { bits: usize, min: usize, max: usize },

    /// Keys per code must be at least one.
    #[error("Invalid key limit {0}: must be at least 1")]
    InvalidKeyLimit(usize),

    /// The bit queue needs room for at least one bit.
    #[error("Invalid queue capacity {0}: must be at least 1")]
    InvalidQueueCapacity(usize),
}
