//! Correlation of outstanding invocations with their completions.

use crate::protocol::Completion;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

/// What a registered callback is resolved with.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The server answered with a completion.
    Completed(Completion),
    /// The registry was cleared before any answer arrived.
    Cancelled(String),
}

/// A continuation waiting for a completion.
pub type Callback = Arc<dyn Fn(Resolution) + Send + Sync>;

/// Maps invocation ids to pending continuations.
///
/// Every operation holds the map lock for its whole lookup-and-mutate step,
/// so a completion racing a `clear` resolves each callback at most once.
/// Callbacks run after the lock is released.
pub struct CallbackRegistry {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<String, Callback>>,
    drop_reason: String,
}

impl CallbackRegistry {
    /// Creates an empty registry. `drop_reason` is handed to every callback
    /// still pending when the registry is dropped.
    #[must_use]
    pub fn new(drop_reason: impl Into<String>) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            callbacks: Mutex::new(HashMap::new()),
            drop_reason: drop_reason.into(),
        }
    }

    /// Stores a callback under a fresh id and returns the id.
    pub fn register<F>(&self, callback: F) -> String
    where
        F: Fn(Resolution) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        self.callbacks.lock().insert(id.clone(), Arc::new(callback));
        id
    }

    /// Resolves the callback registered under `id` with `completion`.
    ///
    /// With `remove_after_complete` the entry is taken out in the same
    /// critical section as the lookup, so an id completes at most once.
    /// Returns false if no callback is registered under `id`.
    pub fn complete(&self, id: &str, completion: Completion, remove_after_complete: bool) -> bool {
        let callback = {
            let mut callbacks = self.callbacks.lock();
            if remove_after_complete {
                callbacks.remove(id)
            } else {
                callbacks.get(id).cloned()
            }
        };

        match callback {
            Some(callback) => {
                callback(Resolution::Completed(completion));
                true
            }
            None => false,
        }
    }

    /// Discards the callback registered under `id` without running it.
    pub fn remove(&self, id: &str) -> bool {
        self.callbacks.lock().remove(id).is_some()
    }

    /// Resolves every pending callback with `reason` and empties the registry.
    pub fn clear(&self, reason: &str) {
        let drained: Vec<Callback> = {
            let mut callbacks = self.callbacks.lock();
            callbacks.drain().map(|(_, callback)| callback).collect()
        };

        if !drained.is_empty() {
            debug!("Cancelling {} pending callbacks: {}", drained.len(), reason);
        }

        for callback in drained {
            callback(Resolution::Cancelled(reason.to_string()));
        }
    }

    /// Number of pending callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Whether no callback is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }
}

impl Drop for CallbackRegistry {
    fn drop(&mut self) {
        let reason = std::mem::take(&mut self.drop_reason);
        self.clear(&reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn completion(id: &str) -> Completion {
        Completion {
            invocation_id: id.to_string(),
            result: Some(json!(id)),
            error: None,
        }
    }

    fn recording() -> (Arc<Mutex<Vec<Resolution>>>, impl Fn(Resolution) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |resolution| sink.lock().push(resolution))
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = CallbackRegistry::new("dropped");
        let first = registry.register(|_| {});
        let second = registry.register(|_| {});

        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_complete_and_remove_runs_once() {
        let registry = CallbackRegistry::new("dropped");
        let (seen, callback) = recording();
        let id = registry.register(callback);

        assert!(registry.complete(&id, completion(&id), true));
        assert!(!registry.complete(&id, completion(&id), true));
        assert!(registry.is_empty());
        assert_eq!(*seen.lock(), vec![Resolution::Completed(completion(&id))]);
    }

    #[test]
    fn test_complete_without_remove_keeps_entry() {
        let registry = CallbackRegistry::new("dropped");
        let (seen, callback) = recording();
        let id = registry.register(callback);

        assert!(registry.complete(&id, completion(&id), false));
        assert_eq!(registry.len(), 1);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_remove_does_not_run_callback() {
        let registry = CallbackRegistry::new("dropped");
        let (seen, callback) = recording();
        let id = registry.register(callback);

        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_clear_cancels_everything() {
        let registry = CallbackRegistry::new("dropped");
        let (seen, callback) = recording();
        let first = registry.register(callback);
        let (seen_second, callback) = recording();
        registry.register(callback);

        registry.clear("stopped");

        assert!(registry.is_empty());
        assert_eq!(*seen.lock(), vec![Resolution::Cancelled("stopped".to_string())]);
        assert_eq!(
            *seen_second.lock(),
            vec![Resolution::Cancelled("stopped".to_string())]
        );

        // A completion arriving after the clear finds nothing.
        assert!(!registry.complete(&first, completion(&first), true));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_drop_cancels_pending() {
        let (seen, callback) = recording();
        {
            let registry = CallbackRegistry::new("went out of scope");
            registry.register(callback);
        }

        assert_eq!(
            *seen.lock(),
            vec![Resolution::Cancelled("went out of scope".to_string())]
        );
    }

    #[test]
    fn test_concurrent_complete_and_clear() {
        let registry = Arc::new(CallbackRegistry::new("dropped"));
        let counts = Arc::new(Mutex::new(HashMap::<String, usize>::new()));

        let ids: Vec<String> = (0..200)
            .map(|_| {
                let counts = Arc::clone(&counts);
                registry.register(move |resolution| {
                    let key = match resolution {
                        Resolution::Completed(c) => c.invocation_id,
                        Resolution::Cancelled(_) => "cancelled".to_string(),
                    };
                    *counts.lock().entry(key).or_default() += 1;
                })
            })
            .collect();

        let completer = {
            let registry = Arc::clone(&registry);
            let ids = ids.clone();
            std::thread::spawn(move || {
                for id in ids {
                    registry.complete(&id, completion(&id), true);
                }
            })
        };
        registry.clear("stopped");
        completer.join().unwrap();

        let counts = counts.lock();
        let total: usize = counts.values().sum();
        assert_eq!(total, ids.len());
        assert!(counts.iter().all(|(key, n)| key == "cancelled" || *n == 1));
        assert!(registry.is_empty());
    }
}
