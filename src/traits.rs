//! Seams between the dispatch flow and its backing services.
//!
//! Production implementations live in `clients`; tests swap in in-memory
//! versions.

use anyhow::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    delivery::DeliveryResult,
    message::DlqMessage,
    notification::{Channel, NewNotification, NotificationRecord, OutboundNotification},
    status::{IdempotencyStatus, NotificationStatus},
};

/// Result of an idempotent insert.
#[derive(Debug, Clone)]
pub struct Upserted {
    pub record: NotificationRecord,
    pub created: bool,
}

/// Persistence for notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts a `pending` record unless one already exists for the same
    /// event and channel, in which case the existing record is returned.
    async fn insert_pending(&self, notification: NewNotification) -> Result<Upserted, Error>;

    /// Moves a `pending` record to `status`. Returns `None` when the record
    /// is missing or no longer pending.
    async fn complete(
        &self,
        id: Uuid,
        status: NotificationStatus,
        result: &DeliveryResult,
    ) -> Result<Option<NotificationRecord>, Error>;

    async fn find(&self, id: Uuid) -> Result<Option<NotificationRecord>, Error>;

    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>, Error>;
}

/// Delivers a notification on one channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, notification: &OutboundNotification) -> DeliveryResult;
}

/// Per-event processing state used to skip events already handled.
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    async fn check_idempotency(&self, key: &str) -> Result<IdempotencyStatus, Error>;

    async fn mark_as_processing(&self, key: &str) -> Result<(), Error>;

    async fn mark_as_completed(&self, key: &str) -> Result<(), Error>;

    async fn mark_as_failed(&self, key: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn publish_dead_letter(&self, message: &DlqMessage) -> Result<(), Error>;
}
