//! One-shot handshake state for a single connection attempt.

use crate::error::{Error, Result};

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Failure reported when the transport drops before the handshake resolves.
pub const HANDSHAKE_INTERRUPTED: &str = "connection closed while handshake was in progress.";

/// Received flag plus a single-shot signal, recreated on every start.
#[derive(Debug, Default)]
pub struct Handshake {
    received: AtomicBool,
    signal: Mutex<Option<oneshot::Sender<Result<()>>>>,
}

impl Handshake {
    /// Arms a fresh signal and clears the received flag.
    ///
    /// Any signal left over from a previous attempt is dropped.
    pub fn reset(&self) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        *self.signal.lock() = Some(tx);
        self.received.store(false, Ordering::SeqCst);
        rx
    }

    /// Whether the server's handshake response has been accepted.
    pub fn is_received(&self) -> bool {
        self.received.load(Ordering::SeqCst)
    }

    /// Records that the handshake response has been accepted.
    pub fn mark_received(&self) {
        self.received.store(true, Ordering::SeqCst);
    }

    /// Fires the signal with `outcome`.
    ///
    /// Only the first call after a `reset` has an effect; later calls return
    /// false and the outcome is discarded.
    pub fn resolve(&self, outcome: Result<()>) -> bool {
        match self.signal.lock().take() {
            Some(signal) => {
                let _ = signal.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Fails a still-pending handshake because the transport went away.
    pub fn interrupt(&self) -> bool {
        self.resolve(Err(Error::Handshake(HANDSHAKE_INTERRUPTED.to_string())))
    }
}
