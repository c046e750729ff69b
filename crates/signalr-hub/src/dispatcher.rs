//! Routing of received payloads: handshake response first, then hub messages.

use crate::error::{Error, Result};
use crate::hub_connection::HubConnectionInner;
use crate::protocol::{Completion, HubMessage, Invocation, frames};

use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Whether the rest of a batch should still be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

impl HubConnectionInner {
    /// Splits `payload` into frames and processes them in order.
    ///
    /// The first frame after a start is the handshake response and ends its
    /// batch. A frame that fails to parse also ends the batch; frames after
    /// it are dropped.
    pub(crate) fn process_message(&self, payload: &str) {
        self.trace.scoped(|| {
            for frame in frames(payload) {
                match self.process_frame(frame) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Halt) => return,
                    Err(e) => {
                        error!("error occurred when parsing response: {e}. response: {payload}");
                        return;
                    }
                }
            }
        });
    }

    fn process_frame(&self, frame: &str) -> Result<Flow> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| Error::Parse(e.to_string()))?;
        if !value.is_object() {
            return Err(Error::Parse(format!("expected a JSON object, got: {frame}")));
        }

        if !self.handshake.is_received() {
            return Ok(self.process_handshake(&value));
        }

        if let Some(message) = HubMessage::from_value(value)? {
            self.dispatch(message);
        } else {
            debug!("Ignoring message of unknown type: {frame}");
        }

        Ok(Flow::Continue)
    }

    fn process_handshake(&self, value: &Value) -> Flow {
        if let Some(reason) = value.get("error") {
            let reason = reason
                .as_str()
                .map_or_else(|| reason.to_string(), str::to_string);
            error!("handshake error: {reason}");
            self.handshake.resolve(Err(Error::Handshake(reason)));
            return Flow::Halt;
        }

        if value.get("type").is_some() {
            let message = "Received unexpected message while waiting for the handshake response.";
            warn!("{message}");
            self.handshake
                .resolve(Err(Error::ProtocolViolation(message.to_string())));
        }

        // A failure resolved just above wins over this success.
        self.handshake.mark_received();
        if self.handshake.resolve(Ok(())) {
            debug!("Handshake completed");
        }

        // Frames sharing a payload with the handshake response are dropped.
        Flow::Halt
    }

    fn dispatch(&self, message: HubMessage) {
        match message {
            HubMessage::Invocation(invocation) => self.invoke_handler(&invocation),
            HubMessage::Completion(completion) => self.complete_invocation(completion),
            HubMessage::StreamItem { invocation_id } => {
                debug!("Ignoring stream item for invocation {invocation_id:?}");
            }
            HubMessage::Ping => debug!("Received ping"),
            HubMessage::Close { error } => debug!("Received close message: {error:?}"),
        }
    }

    fn invoke_handler(&self, invocation: &Invocation) {
        let handler = self.subscriptions.read().get(&invocation.target).cloned();

        match handler {
            Some(handler) => handler(&invocation.arguments),
            None => debug!("No handler registered for event '{}'", invocation.target),
        }
    }

    fn complete_invocation(&self, completion: Completion) {
        if completion.is_ambiguous() {
            warn!(
                "Completion {} carries both a result and an error, using the result",
                completion.invocation_id
            );
        }

        let invocation_id = completion.invocation_id.clone();
        if !self.callbacks.complete(&invocation_id, completion, true) {
            info!("no callback found for id: {invocation_id}");
        }
    }
}
