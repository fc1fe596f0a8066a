use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use uuid::Uuid;

pub const ENVELOPE_VERSION: u32 = 1;

pub const USER_EVENTS_TOPIC: &str = "user-events";
pub const ORDER_EVENTS_TOPIC: &str = "order-events";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    UserCreated,
    UserUpdated,
    OrderCreated,
    OrderUpdated,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::UserCreated,
        EventType::UserUpdated,
        EventType::OrderCreated,
        EventType::OrderUpdated,
        EventType::OrderShipped,
        EventType::OrderDelivered,
        EventType::OrderCancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserCreated => "USER_CREATED",
            EventType::UserUpdated => "USER_UPDATED",
            EventType::OrderCreated => "ORDER_CREATED",
            EventType::OrderUpdated => "ORDER_UPDATED",
            EventType::OrderShipped => "ORDER_SHIPPED",
            EventType::OrderDelivered => "ORDER_DELIVERED",
            EventType::OrderCancelled => "ORDER_CANCELLED",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event_type| event_type.as_str() == name)
    }

    /// Topic the owning service publishes this event type to.
    pub fn topic(&self) -> &'static str {
        match self {
            EventType::UserCreated | EventType::UserUpdated => USER_EVENTS_TOPIC,
            _ => ORDER_EVENTS_TOPIC,
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Message has no payload")]
    EmptyPayload,

    #[error("Message payload is not valid UTF-8")]
    NotUtf8,

    #[error("Malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Unknown event type '{0}'")]
    UnknownType(String),

    #[error("Invalid {event_type} payload: {source}")]
    InvalidPayload {
        event_type: EventType,
        source: serde_json::Error,
    },
}

/// Wire format shared by every producer and this consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,

    pub payload: JsonValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, rename = "eventId", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl Envelope {
    pub fn new(event: &DomainEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type: event.event_type().as_str().to_string(),
            payload: event.payload_json()?,
            timestamp: Some(Utc::now()),
            event_id: Some(Uuid::new_v4().to_string()),
            version: Some(ENVELOPE_VERSION),
        })
    }

    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(raw).map_err(EnvelopeError::Malformed)
    }

    pub fn decode(&self) -> Result<DomainEvent, EnvelopeError> {
        let event_type = EventType::from_name(&self.event_type)
            .ok_or_else(|| EnvelopeError::UnknownType(self.event_type.clone()))?;

        DomainEvent::from_payload(event_type, self.payload.clone())
            .map_err(|source| EnvelopeError::InvalidPayload { event_type, source })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", alias = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("there")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,

    pub total_amount: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracking {
    pub tracking_number: String,
    pub carrier: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUpdatedPayload {
    pub user: User,

    #[serde(default)]
    pub changes: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub order: Order,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdatedPayload {
    pub order: Order,
    pub user: User,

    #[serde(default)]
    pub changes: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShippedPayload {
    pub order: Order,
    pub user: User,
    pub tracking: Tracking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledPayload {
    pub order: Order,
    pub user: User,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    UserCreated(UserPayload),
    UserUpdated(UserUpdatedPayload),
    OrderCreated(OrderPayload),
    OrderUpdated(OrderUpdatedPayload),
    OrderShipped(OrderShippedPayload),
    OrderDelivered(OrderPayload),
    OrderCancelled(OrderCancelledPayload),
}

impl DomainEvent {
    pub fn from_payload(
        event_type: EventType,
        payload: JsonValue,
    ) -> Result<Self, serde_json::Error> {
        match event_type {
            EventType::UserCreated => serde_json::from_value(payload).map(Self::UserCreated),
            EventType::UserUpdated => serde_json::from_value(payload).map(Self::UserUpdated),
            EventType::OrderCreated => serde_json::from_value(payload).map(Self::OrderCreated),
            EventType::OrderUpdated => serde_json::from_value(payload).map(Self::OrderUpdated),
            EventType::OrderShipped => serde_json::from_value(payload).map(Self::OrderShipped),
            EventType::OrderDelivered => serde_json::from_value(payload).map(Self::OrderDelivered),
            EventType::OrderCancelled => serde_json::from_value(payload).map(Self::OrderCancelled),
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            DomainEvent::UserCreated(_) => EventType::UserCreated,
            DomainEvent::UserUpdated(_) => EventType::UserUpdated,
            DomainEvent::OrderCreated(_) => EventType::OrderCreated,
            DomainEvent::OrderUpdated(_) => EventType::OrderUpdated,
            DomainEvent::OrderShipped(_) => EventType::OrderShipped,
            DomainEvent::OrderDelivered(_) => EventType::OrderDelivered,
            DomainEvent::OrderCancelled(_) => EventType::OrderCancelled,
        }
    }

    pub fn payload_json(&self) -> Result<JsonValue, serde_json::Error> {
        match self {
            DomainEvent::UserCreated(payload) => serde_json::to_value(payload),
            DomainEvent::UserUpdated(payload) => serde_json::to_value(payload),
            DomainEvent::OrderCreated(payload) => serde_json::to_value(payload),
            DomainEvent::OrderUpdated(payload) => serde_json::to_value(payload),
            DomainEvent::OrderShipped(payload) => serde_json::to_value(payload),
            DomainEvent::OrderDelivered(payload) => serde_json::to_value(payload),
            DomainEvent::OrderCancelled(payload) => serde_json::to_value(payload),
        }
    }

    pub fn user(&self) -> &User {
        match self {
            DomainEvent::UserCreated(payload) => &payload.user,
            DomainEvent::UserUpdated(payload) => &payload.user,
            DomainEvent::OrderCreated(payload) | DomainEvent::OrderDelivered(payload) => {
                &payload.user
            }
            DomainEvent::OrderUpdated(payload) => &payload.user,
            DomainEvent::OrderShipped(payload) => &payload.user,
            DomainEvent::OrderCancelled(payload) => &payload.user,
        }
    }

    pub fn order(&self) -> Option<&Order> {
        match self {
            DomainEvent::UserCreated(_) | DomainEvent::UserUpdated(_) => None,
            DomainEvent::OrderCreated(payload) | DomainEvent::OrderDelivered(payload) => {
                Some(&payload.order)
            }
            DomainEvent::OrderUpdated(payload) => Some(&payload.order),
            DomainEvent::OrderShipped(payload) => Some(&payload.order),
            DomainEvent::OrderCancelled(payload) => Some(&payload.order),
        }
    }

    /// Recipient-user identifier, taken from the user or the order it belongs to.
    pub fn user_id(&self) -> Option<String> {
        self.user()
            .id
            .clone()
            .or_else(|| self.order().and_then(|order| order.user_id.clone()))
    }

    /// Events for one aggregate share a key so they land on one partition.
    pub fn partition_key(&self) -> String {
        match self.order() {
            Some(order) => order.id.clone(),
            None => self
                .user()
                .id
                .clone()
                .unwrap_or_else(|| self.user().email.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_order_shipped_without_timestamp() {
        let raw = json!({
            "type": "ORDER_SHIPPED",
            "payload": {
                "order": {"_id": "O1", "totalAmount": 42},
                "user": {"email": "a@b.com", "phone": "+15551234567"},
                "tracking": {"trackingNumber": "T1", "carrier": "X", "trackingUrl": "http://t"}
            }
        })
        .to_string();

        let envelope = Envelope::parse(&raw).unwrap();
        assert!(envelope.timestamp.is_none());

        match envelope.decode().unwrap() {
            DomainEvent::OrderShipped(payload) => {
                assert_eq!(payload.order.id, "O1");
                assert_eq!(payload.order.total_amount, 42.0);
                assert_eq!(payload.user.phone.as_deref(), Some("+15551234567"));
                assert_eq!(payload.tracking.tracking_url.as_deref(), Some("http://t"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn unknown_type_is_reported_by_name() {
        let envelope = Envelope::parse(r#"{"type":"UNKNOWN_EVENT","payload":{}}"#).unwrap();
        let err = envelope.decode().unwrap_err();
        assert!(matches!(err, EnvelopeError::UnknownType(ref name) if name == "UNKNOWN_EVENT"));
    }

    #[test]
    fn missing_type_is_malformed() {
        let err = Envelope::parse(r#"{"payload":{}}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }

    #[test]
    fn missing_required_field_is_invalid_payload() {
        let envelope =
            Envelope::parse(r#"{"type":"ORDER_CREATED","payload":{"user":{"email":"a@b.com"}}}"#)
                .unwrap();
        let err = envelope.decode().unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::InvalidPayload {
                event_type: EventType::OrderCreated,
                ..
            }
        ));
    }

    #[test]
    fn envelope_new_stamps_id_version_and_type() {
        let event = DomainEvent::UserCreated(UserPayload {
            user: User {
                id: Some("U1".to_string()),
                name: Some("Ada".to_string()),
                email: "ada@example.com".to_string(),
                phone: None,
                push_token: None,
            },
        });

        let envelope = Envelope::new(&event).unwrap();
        assert_eq!(envelope.event_type, "USER_CREATED");
        assert_eq!(envelope.version, Some(ENVELOPE_VERSION));
        assert!(envelope.event_id.is_some());
        assert_eq!(envelope.payload["user"]["_id"], "U1");
        assert_eq!(envelope.decode().unwrap(), event);
    }

    #[test]
    fn user_events_and_order_events_use_their_own_topics() {
        assert_eq!(EventType::UserUpdated.topic(), USER_EVENTS_TOPIC);
        assert_eq!(EventType::OrderCancelled.topic(), ORDER_EVENTS_TOPIC);
        assert_eq!(EventType::from_name("ORDER_DELIVERED"), Some(EventType::OrderDelivered));
        assert_eq!(EventType::from_name("order_delivered"), None);
    }
}
