use nominalroll_auth::Principal;
use nominalroll_core::NotificationId;
use nominalroll_personnel::Notification;

use super::{PersonnelService, ServiceResult};

impl PersonnelService {
    /// The caller's own inbox, newest first.
    pub async fn list_notifications(&self, principal: &Principal, unread_only: bool) -> ServiceResult<Vec<Notification>> {
        Ok(self
            .store
            .list_notifications(principal.user_id, unread_only)
            .await?)
    }

    pub async fn mark_notification_read(&self, principal: &Principal, id: NotificationId) -> ServiceResult<Notification> {
        Ok(self
            .store
            .mark_notification_read(id, principal.user_id)
            .await?)
    }
}
