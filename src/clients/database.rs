use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    models::{
        delivery::DeliveryResult,
        notification::{NewNotification, NotificationRecord},
        status::NotificationStatus,
    },
    traits::{NotificationStore, Upserted},
};

const SCHEMA: &str = include_str!("../../migrations/001_create_notifications.sql");

const RECORD_COLUMNS: &str = "id, event_id, event_type, user_id, channel, title, body, status, \
                              recipient, metadata, sent_at, created_at, updated_at";

#[derive(Clone)]
pub struct DatabaseClient {
    client: Arc<Client>,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        self.client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| anyhow!("Failed to apply notifications schema: {}", e))?;

        info!("Notifications schema applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }

    async fn find_by_event_channel(
        &self,
        event_id: &str,
        channel: &str,
    ) -> Result<NotificationRecord, Error> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE event_id = $1 AND channel = $2",
            RECORD_COLUMNS
        );

        let row = self
            .client
            .query_one(&sql, &[&event_id, &channel])
            .await
            .map_err(|e| anyhow!("Failed to load existing notification: {}", e))?;

        record_from_row(&row)
    }
}

fn record_from_row(row: &Row) -> Result<NotificationRecord, Error> {
    let channel: String = row.try_get("channel")?;
    let status: String = row.try_get("status")?;

    Ok(NotificationRecord {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        event_type: row.try_get("event_type")?,
        user_id: row.try_get("user_id")?,
        channel: channel.parse()?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        status: status.parse()?,
        recipient: row.try_get("recipient")?,
        metadata: row.try_get("metadata")?,
        sent_at: row.try_get("sent_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl NotificationStore for DatabaseClient {
    async fn insert_pending(&self, notification: NewNotification) -> Result<Upserted, Error> {
        let record = notification.into_pending_record(Utc::now());
        let channel = record.channel.as_str();
        let status = record.status.to_string();

        let sql = format!(
            r#"
            INSERT INTO notifications ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (event_id, channel) DO NOTHING
            RETURNING {cols}
            "#,
            cols = RECORD_COLUMNS
        );

        let rows = self
            .client
            .query(
                &sql,
                &[
                    &record.id,
                    &record.event_id,
                    &record.event_type,
                    &record.user_id,
                    &channel,
                    &record.title,
                    &record.body,
                    &status,
                    &record.recipient,
                    &record.metadata,
                    &record.sent_at,
                    &record.created_at,
                    &record.updated_at,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    event_id = %record.event_id,
                    channel,
                    "Failed to insert notification record"
                );
                anyhow!("Database write failed: {}", e)
            })?;

        match rows.first() {
            Some(row) => Ok(Upserted {
                record: record_from_row(row)?,
                created: true,
            }),
            None => {
                debug!(
                    event_id = %record.event_id,
                    channel,
                    "Notification already recorded for event"
                );
                Ok(Upserted {
                    record: self.find_by_event_channel(&record.event_id, channel).await?,
                    created: false,
                })
            }
        }
    }

    async fn complete(
        &self,
        id: Uuid,
        status: NotificationStatus,
        result: &DeliveryResult,
    ) -> Result<Option<NotificationRecord>, Error> {
        let sent_at: Option<DateTime<Utc>> =
            (status == NotificationStatus::Sent).then_some(result.completed_at);
        let status_str = status.to_string();
        let metadata = JsonValue::Object(result.metadata.clone());

        let sql = format!(
            r#"
            UPDATE notifications
            SET status = $2,
                sent_at = COALESCE($3, sent_at),
                metadata = metadata || $4::jsonb,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            RECORD_COLUMNS
        );

        let row = self
            .client
            .query_opt(&sql, &[&id, &status_str, &sent_at, &metadata])
            .await
            .map_err(|e| {
                error!(error = %e, notification_id = %id, "Failed to update notification status");
                anyhow!("Database write failed: {}", e)
            })?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find(&self, id: Uuid) -> Result<Option<NotificationRecord>, Error> {
        let sql = format!("SELECT {} FROM notifications WHERE id = $1", RECORD_COLUMNS);

        let row = self
            .client
            .query_opt(&sql, &[&id])
            .await
            .map_err(|e| anyhow!("Failed to load notification {}: {}", id, e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>, Error> {
        let sql = format!(
            r#"
            SELECT {}
            FROM notifications
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at
            LIMIT $2
            "#,
            RECORD_COLUMNS
        );

        let rows = self
            .client
            .query(&sql, &[&created_before, &limit])
            .await
            .map_err(|e| anyhow!("Failed to list stale notifications: {}", e))?;

        rows.iter().map(record_from_row).collect()
    }
}
