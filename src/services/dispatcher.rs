use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    models::{
        delivery::DeliveryResult,
        event::DomainEvent,
        notification::{Channel, NewNotification, NotificationRecord, OutboundNotification},
        status::NotificationStatus,
        validation::validate_recipient,
    },
    services::{
        templates::{TemplateCatalog, template_variables},
        tracker::DeliveryTracker,
    },
    traits::{ChannelSender, Upserted},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDelivery {
    pub channel: Channel,
    pub recipient: String,
}

impl PlannedDelivery {
    fn new(channel: Channel, recipient: &str) -> Self {
        Self {
            channel,
            recipient: recipient.to_string(),
        }
    }
}

/// Channels an event is announced on. Email always goes out; SMS and push
/// only when the user has a number or device on file.
pub fn plan_channels(event: &DomainEvent) -> Vec<PlannedDelivery> {
    let user = event.user();
    let mut plan = vec![PlannedDelivery::new(Channel::Email, &user.email)];

    let sms = user.phone.as_deref().filter(|phone| !phone.trim().is_empty());
    let push = user.push_token.as_deref().filter(|token| !token.trim().is_empty());

    match event {
        DomainEvent::UserCreated(_)
        | DomainEvent::UserUpdated(_)
        | DomainEvent::OrderUpdated(_) => {}
        DomainEvent::OrderCreated(_)
        | DomainEvent::OrderShipped(_)
        | DomainEvent::OrderCancelled(_) => {
            if let Some(phone) = sms {
                plan.push(PlannedDelivery::new(Channel::Sms, phone));
            }
        }
        DomainEvent::OrderDelivered(_) => {
            if let Some(token) = push {
                plan.push(PlannedDelivery::new(Channel::Push, token));
            }
        }
    }

    plan
}

/// Metadata stored on every record created for an event.
pub fn event_metadata(
    event: &DomainEvent,
    occurred_at: Option<DateTime<Utc>>,
) -> Map<String, JsonValue> {
    let mut metadata = Map::new();
    metadata.insert(
        "eventType".to_string(),
        JsonValue::from(event.event_type().as_str()),
    );

    if let Some(order) = event.order() {
        metadata.insert("orderId".to_string(), JsonValue::from(order.id.as_str()));
    }

    if let Some(user_id) = event.user_id() {
        metadata.insert("userId".to_string(), JsonValue::from(user_id));
    }

    if let Some(occurred_at) = occurred_at {
        metadata.insert(
            "eventTimestamp".to_string(),
            JsonValue::from(occurred_at.to_rfc3339()),
        );
    }

    metadata
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    /// Records already terminal from an earlier delivery of the same event.
    pub skipped: usize,
    pub notification_ids: Vec<Uuid>,
}

impl DispatchReport {
    fn record(&mut self, record: &NotificationRecord) {
        match record.status {
            NotificationStatus::Sent => self.sent += 1,
            NotificationStatus::Failed => self.failed += 1,
            NotificationStatus::Pending => {}
        }
        self.notification_ids.push(record.id);
    }

    pub fn total(&self) -> usize {
        self.notification_ids.len()
    }
}

pub struct NotificationDispatcher {
    tracker: DeliveryTracker,
    templates: TemplateCatalog,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl NotificationDispatcher {
    pub fn new(tracker: DeliveryTracker, templates: TemplateCatalog) -> Self {
        Self {
            tracker,
            templates,
            senders: HashMap::new(),
        }
    }

    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub fn tracker(&self) -> &DeliveryTracker {
        &self.tracker
    }

    /// Persists one record per planned channel before sending on it, then
    /// records the send result. Store failures are returned so the caller
    /// can retry; re-dispatching the same `event_key` reuses existing records.
    pub async fn dispatch(
        &self,
        event_key: &str,
        event: &DomainEvent,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<DispatchReport, Error> {
        let event_type = event.event_type();
        let variables = template_variables(event);
        let metadata = event_metadata(event, occurred_at);
        let mut report = DispatchReport::default();

        for planned in plan_channels(event) {
            let content = self.templates.render(event_type, planned.channel, &variables)?;

            let notification = NewNotification::new(
                event_key.to_string(),
                event_type,
                planned.channel,
                planned.recipient,
                content.title,
                content.body,
            )
            .with_user_id(event.user_id())
            .with_metadata(metadata.clone());

            let Upserted { record, .. } = self.tracker.create(notification).await?;

            if record.status.is_terminal() {
                report.skipped += 1;
                report.notification_ids.push(record.id);
                continue;
            }

            let result = self.deliver(&record).await;
            let updated = self.tracker.mark_result(&record, &result).await?;

            info!(
                event_id = %event_key,
                event_type = %event_type,
                notification_id = %updated.id,
                channel = %updated.channel,
                status = %updated.status,
                "Notification delivery recorded"
            );

            report.record(&updated);
        }

        Ok(report)
    }

    async fn deliver(&self, record: &NotificationRecord) -> DeliveryResult {
        if let Err(e) = validate_recipient(record.channel, &record.recipient) {
            warn!(
                notification_id = %record.id,
                channel = %record.channel,
                error = %e,
                "Recipient failed validation, not sending"
            );
            return DeliveryResult::failed(format!("Invalid recipient: {}", e));
        }

        let Some(sender) = self.senders.get(&record.channel) else {
            warn!(
                notification_id = %record.id,
                channel = %record.channel,
                "No sender configured for channel"
            );
            return DeliveryResult::failed(format!(
                "No sender configured for channel {}",
                record.channel
            ));
        };

        sender.send(&OutboundNotification::from(record)).await
    }
}
