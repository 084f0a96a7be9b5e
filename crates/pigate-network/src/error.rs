use thiserror::Error;

/// Result type alias for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Errors raised by the messaging layer.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The transport has no live link to the broker.
    #[error("Not connected to broker")]
    NotConnected,

    /// A transport call did not complete in time.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The broker rejected or failed the request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A command payload outside `open`, `close`, `hold_open`.
    #[error("Unknown gate command: {0:?}")]
    UnknownCommand(String),

    /// A credentials status payload other than `update_available`.
    #[error("Unknown credentials notice: {0:?}")]
    UnknownNotice(String),
}

impl MessagingError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}
