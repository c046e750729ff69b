use thiserror::Error;

/// Errors surfaced by a `Connection` implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The connection could not be established.
    #[error("failed to start connection: {0}")]
    StartFailed(String),

    /// A payload could not be transmitted.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The verb requires a connected transport.
    #[error("connection is not connected (state: {0})")]
    NotConnected(String),

    /// The connection was closed by the remote side or locally.
    #[error("connection closed")]
    Closed,

    /// The verb is not valid in the current state.
    #[error("invalid connection state: {0}")]
    InvalidState(String),
}
