//! In-memory connection implementation for testing.
//!
//! A [`MemoryConnection`] is paired with a [`MemoryServer`] handle that plays
//! the remote endpoint: it reads what the client sends, pushes payloads back,
//! drops the link, and can inject start or send failures.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use signalr_connection::{
    ClientConfig, Connection, ConnectionError, ConnectionState, DisconnectedHandler,
    MessageReceivedHandler,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

struct Shared {
    id: Uuid,
    state: RwLock<ConnectionState>,
    connection_id: RwLock<String>,
    message_received: RwLock<Option<MessageReceivedHandler>>,
    disconnected: RwLock<Option<DisconnectedHandler>>,
    config: RwLock<ClientConfig>,
    start_failure: RwLock<Option<String>>,
    send_failure: RwLock<Option<String>>,
    delivery: Mutex<Option<JoinHandle<()>>>,
    to_server: flume::Sender<String>,
    from_server: flume::Receiver<String>,
}

impl Shared {
    /// Moves the connection to disconnected and raises the notification.
    /// Returns false if it was already disconnected.
    fn close(&self) -> bool {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Disconnected {
                return false;
            }
            *state = ConnectionState::Disconnecting;
        }

        if let Some(task) = self.delivery.lock().take() {
            task.abort();
        }

        self.connection_id.write().clear();
        *self.state.write() = ConnectionState::Disconnected;

        info!("Memory connection {} disconnected", self.id);

        let handler = self.disconnected.read().clone();
        if let Some(handler) = handler {
            handler();
        }

        true
    }

    fn spawn_delivery(shared: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(shared);
        let receiver = shared.from_server.clone();

        tokio::spawn(async move {
            while let Ok(payload) = receiver.recv_async().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };

                debug!(
                    "Memory connection {} received {} bytes",
                    shared.id,
                    payload.len()
                );

                let handler = shared.message_received.read().clone();
                if let Some(handler) = handler {
                    handler(&payload);
                }
            }
        })
    }
}

/// Client side of an in-memory connection.
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("id", &self.shared.id)
            .field("state", &*self.shared.state.read())
            .finish()
    }
}

impl MemoryConnection {
    /// Creates a connected pair of client connection and server handle.
    #[must_use]
    pub fn pair() -> (Self, MemoryServer) {
        let (client_to_server_tx, client_to_server_rx) = flume::unbounded();
        let (server_to_client_tx, server_to_client_rx) = flume::unbounded();

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            state: RwLock::new(ConnectionState::Disconnected),
            connection_id: RwLock::new(String::new()),
            message_received: RwLock::new(None),
            disconnected: RwLock::new(None),
            config: RwLock::new(ClientConfig::default()),
            start_failure: RwLock::new(None),
            send_failure: RwLock::new(None),
            delivery: Mutex::new(None),
            to_server: client_to_server_tx,
            from_server: server_to_client_rx,
        });

        let server = MemoryServer {
            shared: Arc::clone(&shared),
            from_client: client_to_server_rx,
            to_client: server_to_client_tx,
        };

        (Self { shared }, server)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn start(&self) -> Result<(), ConnectionError> {
        {
            let mut state = self.shared.state.write();
            if *state != ConnectionState::Disconnected {
                return Err(ConnectionError::InvalidState(format!(
                    "cannot start a connection that is {}",
                    *state
                )));
            }

            if let Some(reason) = self.shared.start_failure.read().clone() {
                return Err(ConnectionError::StartFailed(reason));
            }

            *state = ConnectionState::Connecting;
        }

        let connection_id = Uuid::new_v4().to_string();
        debug!(
            "Memory connection {} starting as {}",
            self.shared.id, connection_id
        );
        *self.shared.connection_id.write() = connection_id;

        let task = Shared::spawn_delivery(&self.shared);
        *self.shared.delivery.lock() = Some(task);
        *self.shared.state.write() = ConnectionState::Connected;

        info!("Memory connection {} connected", self.shared.id);

        Ok(())
    }

    async fn send(&self, payload: String) -> Result<(), ConnectionError> {
        if let Some(reason) = self.shared.send_failure.read().clone() {
            return Err(ConnectionError::SendFailed(reason));
        }

        let state = *self.shared.state.read();
        if state != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected(state.to_string()));
        }

        debug!(
            "Memory connection {} sending {} bytes",
            self.shared.id,
            payload.len()
        );

        self.shared
            .to_server
            .send_async(payload)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    async fn stop(&self) -> Result<(), ConnectionError> {
        debug!("Stopping memory connection {}", self.shared.id);
        self.shared.close();
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    fn connection_id(&self) -> String {
        self.shared.connection_id.read().clone()
    }

    fn set_message_received(&self, handler: MessageReceivedHandler) {
        *self.shared.message_received.write() = Some(handler);
    }

    fn set_disconnected(&self, handler: DisconnectedHandler) {
        *self.shared.disconnected.write() = Some(handler);
    }

    fn set_client_config(&self, config: ClientConfig) {
        *self.shared.config.write() = config;
    }
}

/// Server side of an in-memory connection.
pub struct MemoryServer {
    shared: Arc<Shared>,
    from_client: flume::Receiver<String>,
    to_client: flume::Sender<String>,
}

impl Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServer")
            .field("id", &self.shared.id)
            .finish()
    }
}

impl MemoryServer {
    /// Waits for the next payload sent by the client.
    pub async fn recv(&self) -> Option<String> {
        self.from_client.recv_async().await.ok()
    }

    /// Returns the next payload sent by the client if one is queued.
    #[must_use]
    pub fn try_recv(&self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Queues a payload for delivery to the client's "message received" handler.
    ///
    /// # Errors
    ///
    /// Returns an error if the client connection has been dropped.
    pub fn push(&self, payload: impl Into<String>) -> Result<(), ConnectionError> {
        self.to_client
            .send(payload.into())
            .map_err(|_| ConnectionError::Closed)
    }

    /// Drops the link from the server side, raising the client's
    /// "disconnected" notification.
    pub fn disconnect(&self) -> bool {
        self.shared.close()
    }

    /// Makes every subsequent `start` fail with the given reason, or clears it.
    pub fn fail_start(&self, reason: Option<&str>) {
        *self.shared.start_failure.write() = reason.map(str::to_string);
    }

    /// Makes every subsequent `send` fail with the given reason, or clears it.
    pub fn fail_sends(&self, reason: Option<&str>) {
        *self.shared.send_failure.write() = reason.map(str::to_string);
    }

    /// The client configuration most recently applied to the connection.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        self.shared.config.read().clone()
    }
}
