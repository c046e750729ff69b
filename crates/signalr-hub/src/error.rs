//! Error types for the hub protocol layer.

use signalr_connection::ConnectionError;
use thiserror::Error;

/// Result type alias for hub operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hub operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument was rejected before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the current connection state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The handshake was rejected by the server or cut short.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server sent something the protocol does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The hub method completed with an error.
    #[error("hub method failed: {0}")]
    RemoteInvocation(String),

    /// A received frame could not be parsed.
    #[error("failed to parse message: {0}")]
    Parse(String),

    /// The invocation was still pending when the connection went away.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The underlying connection failed.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// An outbound message could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
