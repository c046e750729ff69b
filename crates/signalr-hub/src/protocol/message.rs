//! Hub protocol message types.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Wire discriminator carried in the `type` field of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Method invocation, in either direction.
    Invocation = 1,
    /// Item of a streamed result.
    StreamItem = 2,
    /// Result or error of an invocation.
    Completion = 3,
    /// Client request for a streamed result.
    StreamInvocation = 4,
    /// Client request to cancel a stream.
    CancelInvocation = 5,
    /// Keep-alive.
    Ping = 6,
    /// Graceful close.
    Close = 7,
}

impl MessageType {
    /// Looks up a wire code. Unknown codes yield `None`.
    #[must_use]
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Invocation),
            2 => Some(Self::StreamItem),
            3 => Some(Self::Completion),
            4 => Some(Self::StreamInvocation),
            5 => Some(Self::CancelInvocation),
            6 => Some(Self::Ping),
            7 => Some(Self::Close),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invocation => "Invocation",
            Self::StreamItem => "StreamItem",
            Self::Completion => "Completion",
            Self::StreamInvocation => "StreamInvocation",
            Self::CancelInvocation => "CancelInvocation",
            Self::Ping => "Ping",
            Self::Close => "Close",
        };
        f.write_str(name)
    }
}

/// The one handshake message a client sends after the transport connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandshakeRequest {
    /// Hub protocol name.
    pub protocol: &'static str,
    /// Hub protocol version.
    pub version: u32,
}

impl HandshakeRequest {
    /// Handshake for version 1 of the JSON hub protocol.
    #[must_use]
    pub const fn json() -> Self {
        Self {
            protocol: "json",
            version: 1,
        }
    }
}

/// Outbound invocation as written to the wire.
///
/// `invocationId` is omitted entirely for fire-and-forget sends.
#[derive(Debug, Serialize)]
pub struct InvocationRequest<'a> {
    #[serde(rename = "type")]
    message_type: u8,
    #[serde(rename = "invocationId", skip_serializing_if = "Option::is_none")]
    invocation_id: Option<&'a str>,
    target: &'a str,
    arguments: &'a [Value],
}

impl<'a> InvocationRequest<'a> {
    /// Creates an invocation of `target` with positional `arguments`.
    #[must_use]
    pub const fn new(target: &'a str, arguments: &'a [Value], invocation_id: Option<&'a str>) -> Self {
        Self {
            message_type: MessageType::Invocation as u8,
            invocation_id,
            target,
            arguments,
        }
    }
}

/// Server-to-client invocation of a client-side event handler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    /// Event name the handler was registered under.
    pub target: String,
    /// Positional arguments.
    pub arguments: Vec<Value>,
    /// Set only when the server expects a result.
    #[serde(default)]
    pub invocation_id: Option<String>,
}

/// Result of a client invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Correlation id of the invocation this completes.
    pub invocation_id: String,
    /// Return value, if the method succeeded.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error reported by the server, if the method failed. Usually a string.
    #[serde(default)]
    pub error: Option<Value>,
}

impl Completion {
    /// Whether the completion carries both a result and an error.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        self.result.is_some() && self.error.is_some()
    }

    /// Converts the completion into the value the caller awaits.
    ///
    /// A result wins over an error; a completion with neither yields `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteInvocation`] if only an error is present. A
    /// non-string error is carried as its JSON text.
    pub fn into_result(self) -> Result<Value> {
        match (self.result, self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(Value::String(error))) => Err(Error::RemoteInvocation(error)),
            (None, Some(error)) => Err(Error::RemoteInvocation(error.to_string())),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// A message the client may receive.
///
/// `StreamInvocation` and `CancelInvocation` are absent: they only travel
/// client to server, and receiving one is a protocol violation.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Server invoking a client event handler.
    Invocation(Invocation),
    /// Stream item; accepted but not processed.
    StreamItem {
        /// Stream the item belongs to.
        invocation_id: Option<String>,
    },
    /// Result of a client invocation.
    Completion(Completion),
    /// Keep-alive.
    Ping,
    /// Server is closing the connection.
    Close {
        /// Reason given by the server.
        error: Option<String>,
    },
}

impl HubMessage {
    /// Decodes a JSON object into a message.
    ///
    /// Returns `Ok(None)` for type codes this client does not know.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the object is malformed, and
    /// [`Error::ProtocolViolation`] for client-to-server only message types.
    pub fn from_value(value: Value) -> Result<Option<Self>> {
        let code = value
            .get("type")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Parse("message has no integer 'type' field".to_string()))?;

        let Some(message_type) = MessageType::from_code(code) else {
            return Ok(None);
        };

        let message = match message_type {
            MessageType::StreamInvocation | MessageType::CancelInvocation => {
                return Err(Error::ProtocolViolation(format!(
                    "Received unexpected message type '{message_type}'."
                )));
            }
            MessageType::Invocation => Self::Invocation(decode(value, message_type)?),
            MessageType::Completion => Self::Completion(decode(value, message_type)?),
            MessageType::StreamItem => Self::StreamItem {
                invocation_id: string_field(&value, "invocationId"),
            },
            MessageType::Ping => Self::Ping,
            MessageType::Close => Self::Close {
                error: string_field(&value, "error"),
            },
        };

        Ok(Some(message))
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, message_type: MessageType) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::Parse(format!("invalid {message_type} message: {e}")))
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}
