//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use tracing::warn;
use tuteskillz_core::ports::{DocumentScanner, Notification, Notifier, TutoringStore};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TutoringStore>,
    pub notifier: Arc<dyn Notifier>,
    pub scanner: Arc<dyn DocumentScanner>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Sends a notification after the primary write has committed.
    ///
    /// Delivery failures are logged and never reach the caller.
    pub async fn notify_best_effort(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(to = %notification.to, "Failed to send notification: {}", e);
        }
    }
}

#[cfg(test)]
impl AppState {
    /// State over an in-process store, logging notifier and passthrough scanner.
    pub(crate) fn for_tests(store: Arc<crate::adapters::MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            notifier: Arc::new(crate::adapters::LogNotifier),
            scanner: Arc::new(crate::adapters::PassthroughScanner),
            config: Arc::new(Config::for_tests()),
        })
    }
}
