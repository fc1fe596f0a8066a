use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::models::status::DeliveryStatus;

/// Structured result of a channel send. Senders report failures here
/// instead of returning an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub status: DeliveryStatus,
    pub completed_at: DateTime<Utc>,
    pub metadata: Map<String, JsonValue>,
}

impl DeliveryResult {
    pub fn sent() -> Self {
        Self {
            status: DeliveryStatus::Sent,
            completed_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("error".to_string(), JsonValue::String(error.into()));

        Self {
            status: DeliveryStatus::Failed,
            completed_at: Utc::now(),
            metadata,
        }
    }

    pub fn with_message_id(self, message_id: impl Into<String>) -> Self {
        self.with_meta("messageId", JsonValue::String(message_id.into()))
    }

    pub fn with_provider_status(self, status: u16) -> Self {
        self.with_meta("providerStatus", JsonValue::from(status))
    }

    pub fn with_meta(mut self, key: &str, value: JsonValue) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }

    pub fn error(&self) -> Option<&str> {
        self.metadata.get("error").and_then(|v| v.as_str())
    }
}
