//! Hub connection: handshake, invocations and event subscriptions on top of
//! a [`Connection`].

use crate::callback::{CallbackRegistry, Resolution};
use crate::error::{Error, Result};
use crate::handshake::{HANDSHAKE_INTERRUPTED, Handshake};
use crate::protocol::{HandshakeRequest, InvocationRequest, write_message};
use crate::trace::TraceSink;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use signalr_connection::{ClientConfig, Connection, ConnectionState, DisconnectedHandler};
use tokio::sync::oneshot;
use tracing::{Dispatch, debug, error, info, instrument, warn};

/// Handler for a server-pushed event, called with the event's arguments.
pub type EventHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

const OUT_OF_SCOPE: &str = "connection went out of scope before invocation result was received";
const STOPPED: &str = "connection was stopped before invocation result was received";
const DISCONNECTED: &str = "connection was closed before invocation result was received";
const RESULT_DROPPED: &str = "invocation was discarded before a result was received";

/// Builder for creating hub connections.
#[derive(Default)]
pub struct HubConnectionBuilder {
    connection: Option<Arc<dyn Connection>>,
    config: ClientConfig,
    disconnected: Option<DisconnectedHandler>,
    dispatch: Option<Dispatch>,
}

impl HubConnectionBuilder {
    /// Create a new hub connection builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection the hub protocol runs over.
    #[must_use]
    pub fn connection(mut self, connection: impl Connection) -> Self {
        self.connection = Some(Arc::new(connection));
        self
    }

    /// Set the client configuration applied on every start.
    #[must_use]
    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the handler called whenever the connection is lost or stopped.
    #[must_use]
    pub fn on_disconnected<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.disconnected = Some(Arc::new(handler));
        self
    }

    /// Route this hub's log output to `dispatch` instead of the global
    /// default subscriber.
    #[must_use]
    pub fn log_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Build the hub connection.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection was provided.
    pub fn build(self) -> Result<HubConnection> {
        let connection = self
            .connection
            .ok_or_else(|| Error::InvalidArgument("connection not specified".to_string()))?;

        Ok(HubConnection::from_parts(
            connection,
            self.config,
            self.disconnected.unwrap_or_else(|| Arc::new(|| {})),
            TraceSink::new(self.dispatch),
        ))
    }
}

pub(crate) struct HubConnectionInner {
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) subscriptions: RwLock<HashMap<String, EventHandler>>,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) handshake: Handshake,
    pub(crate) trace: TraceSink,
    disconnected: RwLock<DisconnectedHandler>,
    config: RwLock<ClientConfig>,
}

/// Client side of a hub: invokes remote methods and receives pushed events.
///
/// Dropping the last handle rejects every pending invocation. The underlying
/// connection only holds weak references back to the hub.
#[derive(Clone)]
pub struct HubConnection {
    inner: Arc<HubConnectionInner>,
}

impl Debug for HubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConnection")
            .field("connection_id", &self.inner.connection.connection_id())
            .field("state", &self.inner.connection.state())
            .field("pending_invocations", &self.inner.callbacks.len())
            .finish()
    }
}

impl HubConnection {
    /// Create a new hub connection builder.
    #[must_use]
    pub fn builder() -> HubConnectionBuilder {
        HubConnectionBuilder::new()
    }

    /// Creates a hub connection over `connection` with default settings.
    #[must_use]
    pub fn new(connection: impl Connection) -> Self {
        Self::from_parts(
            Arc::new(connection),
            ClientConfig::default(),
            Arc::new(|| {}),
            TraceSink::default(),
        )
    }

    fn from_parts(
        connection: Arc<dyn Connection>,
        config: ClientConfig,
        disconnected: DisconnectedHandler,
        trace: TraceSink,
    ) -> Self {
        let inner = Arc::new(HubConnectionInner {
            connection,
            subscriptions: RwLock::new(HashMap::new()),
            callbacks: CallbackRegistry::new(OUT_OF_SCOPE),
            handshake: Handshake::default(),
            trace,
            disconnected: RwLock::new(disconnected),
            config: RwLock::new(config),
        });

        HubConnectionInner::attach(&inner);

        Self { inner }
    }

    /// Registers `handler` for server-pushed events named `event_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty name, and
    /// [`Error::InvalidState`] if the connection is not disconnected or the
    /// name is already registered.
    pub fn on<F>(&self, event_name: &str, handler: F) -> Result<()>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.subscribe(event_name, Arc::new(handler))
    }

    /// Starts the connection and performs the handshake.
    ///
    /// Resolves once the server has accepted the handshake. If the handshake
    /// fails the connection is stopped before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the connection is disconnected,
    /// the transport's error if it fails to start, or the handshake failure.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        inner.trace.scoped_async(|| inner.start()).await
    }

    /// Rejects every pending invocation and stops the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to stop.
    pub async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        inner.trace.scoped_async(|| inner.stop()).await
    }

    /// Invokes a hub method and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteInvocation`] if the method failed on the server,
    /// [`Error::ConnectionClosed`] if the connection was stopped or lost first,
    /// or the transport's error if the invocation could not be sent.
    pub async fn invoke(&self, method_name: &str, arguments: Vec<Value>) -> Result<Value> {
        let inner = &self.inner;
        inner
            .trace
            .scoped_async(|| inner.invoke(method_name, arguments))
            .await
    }

    /// Invokes a hub method without waiting for a result.
    ///
    /// Resolves once the invocation has been handed to the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the invocation could not be sent.
    pub async fn send(&self, method_name: &str, arguments: Vec<Value>) -> Result<()> {
        let inner = &self.inner;
        inner
            .trace
            .scoped_async(|| inner.send(method_name, arguments))
            .await
    }

    /// Current state of the underlying connection.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Identifier of the underlying connection.
    #[must_use]
    pub fn connection_id(&self) -> String {
        self.inner.connection.connection_id()
    }

    /// Stores `config` and applies it to the connection.
    pub fn set_client_config(&self, config: ClientConfig) {
        self.inner.connection.set_client_config(config.clone());
        *self.inner.config.write() = config;
    }

    /// Replaces the handler called whenever the connection is lost or stopped.
    pub fn set_disconnected<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.disconnected.write() = Arc::new(handler);
    }

    /// Number of invocations still waiting for a completion.
    #[must_use]
    pub fn pending_invocations(&self) -> usize {
        self.inner.callbacks.len()
    }
}

impl HubConnectionInner {
    /// Hooks the connection's notifications up to this hub through weak
    /// references, so the connection never keeps the hub alive.
    fn attach(inner: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(inner);
        inner
            .connection
            .set_message_received(Arc::new(move |payload: &str| {
                if let Some(inner) = weak.upgrade() {
                    inner.process_message(payload);
                }
            }));

        let weak: Weak<Self> = Arc::downgrade(inner);
        inner.connection.set_disconnected(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_disconnected();
            }
        }));
    }

    fn subscribe(&self, event_name: &str, handler: EventHandler) -> Result<()> {
        if event_name.is_empty() {
            return Err(Error::InvalidArgument(
                "event_name cannot be empty".to_string(),
            ));
        }

        let state = self.connection.state();
        if state != ConnectionState::Disconnected {
            return Err(Error::InvalidState(format!(
                "can't register a handler unless the connection is disconnected (state: {state})"
            )));
        }

        match self.subscriptions.write().entry(event_name.to_string()) {
            Entry::Occupied(_) => Err(Error::InvalidState(format!(
                "an action for this event has already been registered. event name: {event_name}"
            ))),
            Entry::Vacant(entry) => {
                entry.insert(handler);
                Ok(())
            }
        }
    }

    #[instrument(skip(self))]
    async fn start(&self) -> Result<()> {
        let state = self.connection.state();
        if state != ConnectionState::Disconnected {
            return Err(Error::InvalidState(format!(
                "the connection can only be started if it is in the disconnected state (state: {state})"
            )));
        }

        let config = self.config.read().clone();
        self.connection.set_client_config(config);

        let signal = self.handshake.reset();
        self.connection.start().await?;

        debug!(
            "Connection {} started, sending handshake request",
            self.connection.connection_id()
        );

        if let Err(e) = self.negotiate(signal).await {
            error!("Handshake failed: {}", e);
            if let Err(stop_error) = self.connection.stop().await {
                warn!("Failed to stop connection after handshake failure: {}", stop_error);
            }
            return Err(e);
        }

        info!("Hub connection {} started", self.connection.connection_id());

        Ok(())
    }

    async fn negotiate(&self, signal: oneshot::Receiver<Result<()>>) -> Result<()> {
        let request = write_message(&HandshakeRequest::json())?;
        self.connection.send(request).await?;

        signal
            .await
            .map_err(|_| Error::Handshake(HANDSHAKE_INTERRUPTED.to_string()))?
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<()> {
        self.callbacks.clear(STOPPED);
        self.connection.stop().await?;
        Ok(())
    }

    #[instrument(skip(self, arguments))]
    async fn invoke(&self, method_name: &str, arguments: Vec<Value>) -> Result<Value> {
        let (result_tx, result_rx) = oneshot::channel();
        let invocation_id = self.callbacks.register(invocation_callback(result_tx));
        let _slot = PendingSlot {
            callbacks: &self.callbacks,
            invocation_id: &invocation_id,
        };

        let payload = write_message(&InvocationRequest::new(
            method_name,
            &arguments,
            Some(&invocation_id),
        ))?;

        debug!(
            "Sending invocation {} (pending: {})",
            invocation_id,
            self.callbacks.len()
        );

        self.connection.send(payload).await?;

        result_rx
            .await
            .map_err(|_| Error::ConnectionClosed(RESULT_DROPPED.to_string()))?
    }

    #[instrument(skip(self, arguments))]
    async fn send(&self, method_name: &str, arguments: Vec<Value>) -> Result<()> {
        let payload = write_message(&InvocationRequest::new(method_name, &arguments, None))?;
        self.connection.send(payload).await?;
        Ok(())
    }

    fn handle_disconnected(&self) {
        self.trace.scoped(|| {
            if self.handshake.interrupt() {
                warn!("Connection closed while handshake was in progress");
            }

            self.callbacks.clear(DISCONNECTED);

            let handler = self.disconnected.read().clone();
            handler();
        });
    }
}

/// Removes an invocation's registry slot when the invoking future finishes
/// or is dropped. Removing an already completed id is a no-op.
struct PendingSlot<'a> {
    callbacks: &'a CallbackRegistry,
    invocation_id: &'a str,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.callbacks.remove(self.invocation_id);
    }
}

/// Continuation that forwards a resolution to the awaiting caller, once.
fn invocation_callback(
    result_tx: oneshot::Sender<Result<Value>>,
) -> impl Fn(Resolution) + Send + Sync + 'static {
    let result_tx = Mutex::new(Some(result_tx));

    move |resolution| {
        let Some(result_tx) = result_tx.lock().take() else {
            return;
        };

        let outcome = match resolution {
            Resolution::Completed(completion) => completion.into_result(),
            Resolution::Cancelled(reason) => Err(Error::ConnectionClosed(reason)),
        };

        let _ = result_tx.send(outcome);
    }
}
