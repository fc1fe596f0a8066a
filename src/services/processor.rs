use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::{
    models::{
        event::{DomainEvent, Envelope, EnvelopeError},
        message::{DlqMessage, InboundMessage},
        retry::RetryConfig,
        status::IdempotencyStatus,
    },
    services::dispatcher::{DispatchReport, NotificationDispatcher},
    traits::{DeadLetterSink, IdempotencyLedger},
    utils::retry_with_backoff,
};

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    /// Idempotency key: the producer's `eventId`, or the message position.
    pub key: String,
    pub event: DomainEvent,
    pub occurred_at: Option<DateTime<Utc>>,
}

pub fn decode_message(message: &InboundMessage) -> Result<DecodedEvent, EnvelopeError> {
    let bytes = message
        .payload
        .as_deref()
        .filter(|bytes| !bytes.is_empty())
        .ok_or(EnvelopeError::EmptyPayload)?;
    let raw = std::str::from_utf8(bytes).map_err(|_| EnvelopeError::NotUtf8)?;

    let envelope = Envelope::parse(raw)?;
    let event = envelope.decode()?;

    let key = envelope
        .event_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| message.position_key());

    Ok(DecodedEvent {
        key,
        event,
        occurred_at: envelope.timestamp,
    })
}

/// What happened to a message. Every variant means the offset may be
/// committed.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Dispatched(DispatchReport),
    AlreadyHandled,
    UnknownType(String),
    DeadLettered(String),
}

pub struct EventProcessor {
    dispatcher: NotificationDispatcher,
    ledger: Arc<dyn IdempotencyLedger>,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry_config: RetryConfig,
}

impl EventProcessor {
    pub fn new(
        dispatcher: NotificationDispatcher,
        ledger: Arc<dyn IdempotencyLedger>,
        dead_letters: Arc<dyn DeadLetterSink>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            dispatcher,
            ledger,
            dead_letters,
            retry_config,
        }
    }

    /// Handles one message without ever panicking. An `Err` means the
    /// message was neither handled nor dead-lettered and its offset must not
    /// be committed.
    pub async fn handle(&self, message: &InboundMessage) -> Result<MessageOutcome, Error> {
        match AssertUnwindSafe(self.process(message)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = format!("Handler panicked: {}", panic_message(panic.as_ref()));
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    reason = %reason,
                    "Recovered from handler panic"
                );
                self.dead_letter(message, reason).await
            }
        }
    }

    async fn process(&self, message: &InboundMessage) -> Result<MessageOutcome, Error> {
        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Processing message"
        );

        let decoded = match decode_message(message) {
            Ok(decoded) => decoded,
            Err(EnvelopeError::UnknownType(event_type)) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    event_type = %event_type,
                    "Skipping message with unknown event type"
                );
                return Ok(MessageOutcome::UnknownType(event_type));
            }
            Err(e) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Rejecting undecodable message"
                );
                return self.dead_letter(message, e.to_string()).await;
            }
        };

        let key = decoded.key.as_str();

        match self.ledger.check_idempotency(key).await {
            Ok(IdempotencyStatus::Completed) | Ok(IdempotencyStatus::Failed) => {
                info!(event_id = %key, "Event already handled, skipping");
                return Ok(MessageOutcome::AlreadyHandled);
            }
            Ok(IdempotencyStatus::Processing) => {
                info!(event_id = %key, "Resuming event left in processing by an earlier attempt");
            }
            Ok(IdempotencyStatus::NotFound) => {}
            Err(e) => {
                warn!(event_id = %key, error = %e, "Idempotency check failed, continuing");
            }
        }

        if let Err(e) = self.ledger.mark_as_processing(key).await {
            warn!(event_id = %key, error = %e, "Failed to mark event as processing");
        }

        let dispatched = retry_with_backoff(&self.retry_config, || {
            self.dispatcher
                .dispatch(key, &decoded.event, decoded.occurred_at)
        })
        .await;

        match dispatched {
            Ok(report) => {
                if let Err(e) = self.ledger.mark_as_completed(key).await {
                    warn!(event_id = %key, error = %e, "Failed to mark event as completed");
                }

                info!(
                    event_id = %key,
                    event_type = %decoded.event.event_type(),
                    sent = report.sent,
                    failed = report.failed,
                    skipped = report.skipped,
                    "Event dispatched"
                );
                Ok(MessageOutcome::Dispatched(report))
            }
            Err(e) => {
                error!(event_id = %key, error = %e, "Dispatch failed after retries");

                // The ledger stays `processing` until the dead letter is
                // published, so a redelivery after a failed publish retries.
                let outcome = self
                    .dead_letter(message, format!("Dispatch failed: {}", e))
                    .await?;

                if let Err(mark_err) = self.ledger.mark_as_failed(key).await {
                    warn!(event_id = %key, error = %mark_err, "Failed to mark event as failed");
                }

                Ok(outcome)
            }
        }
    }

    async fn dead_letter(
        &self,
        message: &InboundMessage,
        reason: String,
    ) -> Result<MessageOutcome, Error> {
        let dlq_message = DlqMessage::from_inbound(message, reason.clone());

        self.dead_letters
            .publish_dead_letter(&dlq_message)
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to dead-letter {}-{}-{}: {}",
                    message.topic,
                    message.partition,
                    message.offset,
                    e
                )
            })?;

        info!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            reason = %reason,
            "Message dead-lettered"
        );

        Ok(MessageOutcome::DeadLettered(reason))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
