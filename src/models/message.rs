use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A broker message detached from the consumer that received it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    pub fn new(topic: &str, partition: i32, offset: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.to_string(),
            partition,
            offset,
            key: None,
            payload: Some(payload.into()),
        }
    }

    /// Idempotency key for envelopes that carry no `eventId`. Stable across
    /// redelivery of the same offset.
    pub fn position_key(&self) -> String {
        format!("{}-{}-{}", self.topic, self.partition, self.offset)
    }

    pub fn payload_lossy(&self) -> String {
        self.payload
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqMessage {
    pub source_topic: String,
    pub partition: i32,
    pub offset: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    pub payload: String,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
}

impl DlqMessage {
    pub fn from_inbound(message: &InboundMessage, failure_reason: String) -> Self {
        Self {
            source_topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            key: message.key.clone(),
            payload: message.payload_lossy(),
            failure_reason,
            failed_at: Utc::now(),
        }
    }
}
