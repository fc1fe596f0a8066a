use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use anyhow::{Error, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::models::{event::EventType, status::NotificationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "push" => Ok(Channel::Push),
            other => Err(anyhow!("Unknown channel '{}'", other)),
        }
    }
}

/// One delivery attempt, as persisted in the `notifications` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub user_id: Option<String>,
    pub channel: Channel,
    pub title: String,
    pub body: String,
    pub status: NotificationStatus,
    pub recipient: String,
    pub metadata: JsonValue,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn order_id(&self) -> Option<&str> {
        self.metadata.get("orderId").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewNotification {
    pub event_id: String,
    pub event_type: EventType,
    pub user_id: Option<String>,
    pub channel: Channel,
    pub title: String,
    pub body: String,
    pub recipient: String,
    pub metadata: Map<String, JsonValue>,
}

impl NewNotification {
    pub fn new(
        event_id: String,
        event_type: EventType,
        channel: Channel,
        recipient: String,
        title: String,
        body: String,
    ) -> Self {
        Self {
            event_id,
            event_type,
            user_id: None,
            channel,
            title,
            body,
            recipient,
            metadata: Map::new(),
        }
    }

    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, JsonValue>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// The row a store inserts for this notification.
    pub fn into_pending_record(self, now: DateTime<Utc>) -> NotificationRecord {
        NotificationRecord {
            id: Uuid::new_v4(),
            event_id: self.event_id,
            event_type: self.event_type.as_str().to_string(),
            user_id: self.user_id,
            channel: self.channel,
            title: self.title,
            body: self.body,
            status: NotificationStatus::Pending,
            recipient: self.recipient,
            metadata: JsonValue::Object(self.metadata),
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What a channel sender needs to deliver one notification.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundNotification {
    pub notification_id: Uuid,
    pub channel: Channel,
    pub recipient: String,
    pub title: String,
    pub body: String,
}

impl From<&NotificationRecord> for OutboundNotification {
    fn from(record: &NotificationRecord) -> Self {
        Self {
            notification_id: record.id,
            channel: record.channel,
            recipient: record.recipient.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
        }
    }
}
