//! Routing of log output to an injected subscriber.

use std::future::Future;

use tracing::Dispatch;
use tracing::instrument::WithSubscriber;

/// Where the hub's log lines go.
///
/// With no dispatch configured, lines go to the global default subscriber.
#[derive(Clone, Default)]
pub struct TraceSink {
    dispatch: Option<Dispatch>,
}

impl TraceSink {
    pub const fn new(dispatch: Option<Dispatch>) -> Self {
        Self { dispatch }
    }

    /// Runs `f` with this sink as the default subscriber.
    pub fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    /// Builds and drives the future produced by `f` with this sink as the
    /// default subscriber, so spans created when `f` runs land here too.
    pub async fn scoped_async<F, Fut>(&self, f: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        match &self.dispatch {
            Some(dispatch) => async move { f().await }
                .with_subscriber(dispatch.clone())
                .await,
            None => f().await,
        }
    }
}
