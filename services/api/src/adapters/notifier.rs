//! services/api/src/adapters/notifier.rs
//!
//! Notification adapters. Mail delivery is owned by an external relay; this service
//! only renders the message and hands it over.

use async_trait::async_trait;
use tracing::info;
use tuteskillz_core::ports::{Notification, Notifier, PortResult};

/// A `Notifier` that writes each message to the log instead of sending it.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> PortResult<()> {
        info!(
            to = %notification.to,
            subject = %notification.subject,
            "Notification queued:\n{}",
            notification.body
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::sync::Mutex;
    use tuteskillz_core::ports::PortError;

    /// Keeps every notification so tests can inspect what would have been sent.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: &Notification) -> PortResult<()> {
            self.sent.lock().await.push(notification.clone());
            Ok(())
        }
    }

    /// Always fails, like a relay that is down.
    pub(crate) struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _notification: &Notification) -> PortResult<()> {
            Err(PortError::Unexpected("SMTP relay unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn log_notifier_accepts_every_message() {
        let notification = Notification {
            to: "tutor@tuteskillz.lk".to_string(),
            subject: "Approved".to_string(),
            body: "Welcome".to_string(),
        };
        assert!(LogNotifier.notify(&notification).await.is_ok());
    }
}
