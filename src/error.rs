use thiserror::Error;

/// Result type for alert device operations
pub type Result<T> = std::result::Result<T, AlertError>;

/// Errors that can occur when interacting with alert devices
#[derive(Error, Debug)]
pub enum AlertError {
    /// I/O error on the device socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Timed out waiting for the remote endpoint
    #[error("Timeout")]
    Timeout,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or unexpected message from the remote endpoint
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}
