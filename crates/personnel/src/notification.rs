use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nominalroll_core::{Entity, NotificationId, StaffId, UserId};

/// An inbox row for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub message: String,
    pub staff_id: Option<StaffId>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(
        recipient_id: UserId,
        message: impl Into<String>,
        staff_id: Option<StaffId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            recipient_id,
            message: message.into(),
            staff_id,
            created_at,
            read: false,
        }
    }
}

impl Entity for Notification {
    type Id = NotificationId;

    fn id(&self) -> &NotificationId {
        &self.id
    }

    fn kind() -> &'static str {
        "notification"
    }
}
