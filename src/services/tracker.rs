use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use tracing::{debug, info, warn};

use crate::{
    models::{
        delivery::DeliveryResult,
        notification::{NewNotification, NotificationRecord},
        status::NotificationStatus,
    },
    traits::{NotificationStore, Upserted},
};

/// Owns the `pending -> sent | failed` lifecycle of notification records.
#[derive(Clone)]
pub struct DeliveryTracker {
    store: Arc<dyn NotificationStore>,
}

impl DeliveryTracker {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, notification: NewNotification) -> Result<Upserted, Error> {
        let event_id = notification.event_id.clone();
        let channel = notification.channel;

        let upserted = self.store.insert_pending(notification).await?;

        if upserted.created {
            debug!(
                notification_id = %upserted.record.id,
                event_id = %event_id,
                channel = %channel,
                "Notification record created"
            );
        } else {
            info!(
                notification_id = %upserted.record.id,
                event_id = %event_id,
                channel = %channel,
                status = %upserted.record.status,
                "Notification record already exists for event"
            );
        }

        Ok(upserted)
    }

    pub async fn mark_result(
        &self,
        record: &NotificationRecord,
        result: &DeliveryResult,
    ) -> Result<NotificationRecord, Error> {
        let next = NotificationStatus::from(result.status);

        if !record.status.can_transition_to(next) {
            return Err(anyhow!(
                "Notification {} cannot move from {} to {}",
                record.id,
                record.status,
                next
            ));
        }

        match self.store.complete(record.id, next, result).await? {
            Some(updated) => {
                debug!(
                    notification_id = %updated.id,
                    status = %updated.status,
                    "Notification status recorded"
                );
                Ok(updated)
            }
            None => {
                // Someone else finished the record first; theirs stands.
                let current = self
                    .store
                    .find(record.id)
                    .await?
                    .ok_or_else(|| anyhow!("Notification {} disappeared", record.id))?;

                warn!(
                    notification_id = %record.id,
                    status = %current.status,
                    "Notification was no longer pending, keeping stored status"
                );
                Ok(current)
            }
        }
    }

    /// Fails a record that will never see its send complete.
    pub async fn abandon(
        &self,
        record: &NotificationRecord,
        reason: &str,
    ) -> Result<NotificationRecord, Error> {
        self.mark_result(record, &DeliveryResult::failed(reason))
            .await
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }
}
