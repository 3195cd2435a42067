//! Post-commit notification delivery.
//!
//! Inbox rows are persisted by the change set itself; a sink only receives a
//! copy after the commit succeeded. Delivery is fire-and-forget: a sink never
//! fails the operation that produced the notification.

use async_trait::async_trait;

use nominalroll_personnel::Notification;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification);
}

/// Default sink: emits one structured log event per notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) {
        tracing::info!(
            notification_id = %notification.id,
            recipient_id = %notification.recipient_id,
            staff_id = ?notification.staff_id,
            message = %notification.message,
            "notification delivered"
        );
    }
}

/// Captures deliveries so tests can assert on them.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    delivered: std::sync::Mutex<Vec<Notification>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &Notification) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(notification.clone());
        }
    }
}
