//! Protocol layer for the hub connection.
//!
//! This module contains the JSON hub protocol definitions:
//! - Record-separator framing
//! - Message types and the handshake request

pub mod framing;
pub mod message;

pub use framing::{RECORD_SEPARATOR, frames, write_message};
pub use message::{
    Completion, HandshakeRequest, HubMessage, Invocation, InvocationRequest, MessageType,
};
