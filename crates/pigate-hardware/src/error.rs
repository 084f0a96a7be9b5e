//! Error types for GPIO operations.
//!
//! Covers pin claiming at startup, reads and writes on claimed pins, and the
//! closed-channel case of the mock devices.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during GPIO operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or its channel has been closed.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// The requested pin does not exist or could not be exported.
    #[error("Pin {pin} unavailable: {message}")]
    PinUnavailable { pin: u32, message: String },

    /// Writing a level to a claimed pin failed.
    #[error("Write to pin {pin} failed: {message}")]
    WriteFailed { pin: u32, message: String },

    /// A pin value file held something other than `0` or `1`.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new pin unavailable error.
    pub fn pin_unavailable(pin: u32, message: impl Into<String>) -> Self {
        Self::PinUnavailable {
            pin,
            message: message.into(),
        }
    }

    /// Create a new write failure error.
    pub fn write_failed(pin: u32, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            pin,
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }
}
