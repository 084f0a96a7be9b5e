use pigate_hardware::HardwareError;

/// Result type alias for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// Errors returned by gate transitions.
///
/// A transition always updates the logical state, even when a pin write
/// fails; the error reports the pin that did not follow.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Relay output failed: {0}")]
    Relay(#[source] HardwareError),

    #[error("Status LED output failed: {0}")]
    Led(#[source] HardwareError),
}
