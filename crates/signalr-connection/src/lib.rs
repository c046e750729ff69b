//! Abstract interface for the persistent connection a hub connection rides on.
//!
//! The connection owns the transport: opening and closing it, sending raw text
//! payloads, and raising notifications when a payload arrives or the link goes
//! away. Concrete implementations (in-memory, WebSocket, long polling) live in
//! separate crates.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::ConnectionError;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a connection.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected. The only state in which the connection can be started.
    #[default]
    Disconnected,

    /// A start is in progress.
    Connecting,

    /// The transport is up.
    Connected,

    /// A stop is in progress.
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Client configuration handed to the connection before it starts.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Extra headers sent with every HTTP request and the transport upgrade.
    pub http_headers: HashMap<String, String>,

    /// Optional proxy URL for outbound requests.
    pub proxy: Option<String>,

    /// Skip TLS certificate validation. Only meant for local development.
    pub accept_invalid_certs: bool,
}

/// Callback invoked with every raw text payload received from the transport.
pub type MessageReceivedHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback invoked when the connection transitions to disconnected.
pub type DisconnectedHandler = Arc<dyn Fn() + Send + Sync>;

/// A persistent, bidirectional text connection.
///
/// All verbs are non-blocking. Notifications are raised on whatever task the
/// implementation chooses; handlers must not assume the caller's context.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Opens the transport. Only valid while disconnected.
    async fn start(&self) -> Result<(), ConnectionError>;

    /// Sends a raw text payload.
    async fn send(&self, payload: String) -> Result<(), ConnectionError>;

    /// Closes the transport. Stopping an already stopped connection is a no-op.
    async fn stop(&self) -> Result<(), ConnectionError>;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Identifier assigned to the current connection, empty while disconnected.
    fn connection_id(&self) -> String;

    /// Replaces the "message received" notification handler.
    fn set_message_received(&self, handler: MessageReceivedHandler);

    /// Replaces the "disconnected" notification handler.
    fn set_disconnected(&self, handler: DisconnectedHandler);

    /// Applies client configuration, used by the next `start`.
    fn set_client_config(&self, config: ClientConfig);
}
