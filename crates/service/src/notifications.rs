//! Outbound notifications.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::{Result, ServiceError};

/// Delivers a message to an address.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, to: &str, message: &str) -> Result<()>;
}

/// Sender that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send(&self, to: &str, message: &str) -> Result<()> {
        tracing::warn!(to, message, "notification");
        Ok(())
    }
}

/// A notification recorded by [`InMemoryNotificationSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub to: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct InMemorySenderState {
    sent: Vec<SentNotification>,
    fail_on_send: bool,
}

/// Sender that records notifications, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSender {
    state: Arc<RwLock<InMemorySenderState>>,
}

impl InMemoryNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sender to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_send = fail;
    }

    /// Returns the notifications sent so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }
}

#[async_trait]
impl NotificationSender for InMemoryNotificationSender {
    async fn send(&self, to: &str, message: &str) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_send {
            return Err(ServiceError::Notification(format!(
                "could not deliver to {to}"
            )));
        }
        state.sent.push(SentNotification {
            to: to.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sent_messages() {
        let sender = InMemoryNotificationSender::new();

        sender.send("stock@made.com", "Out of stock for LAMP").await.unwrap();

        assert_eq!(
            sender.sent(),
            vec![SentNotification {
                to: "stock@made.com".to_string(),
                message: "Out of stock for LAMP".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn fail_on_send() {
        let sender = InMemoryNotificationSender::new();
        sender.set_fail_on_send(true);

        let result = sender.send("stock@made.com", "hello").await;

        assert!(matches!(result, Err(ServiceError::Notification(_))));
        assert!(sender.sent().is_empty());
    }
}
