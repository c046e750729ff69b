//! Client side of the hub protocol.
//!
//! A [`HubConnection`] runs the JSON hub protocol over any [`Connection`]:
//! it negotiates the handshake, frames and dispatches received messages,
//! correlates invocations with their completions, and routes server-pushed
//! events to registered handlers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod callback;
mod dispatcher;
mod error;
mod handshake;
mod hub_connection;
pub mod protocol;
mod trace;

pub use callback::{Callback, CallbackRegistry, Resolution};
pub use error::{Error, Result};
pub use handshake::HANDSHAKE_INTERRUPTED;
pub use hub_connection::{EventHandler, HubConnection, HubConnectionBuilder};

pub use signalr_connection::{
    ClientConfig, Connection, ConnectionError, ConnectionState, DisconnectedHandler,
    MessageReceivedHandler,
};
