use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use rdkafka::{
    ClientConfig, Message, Offset, TopicPartitionList,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::BorrowedMessage,
    producer::{FutureProducer, FutureRecord, Producer},
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    models::{
        event::{DomainEvent, Envelope},
        message::{DlqMessage, InboundMessage},
    },
    services::processor::{EventProcessor, MessageOutcome},
    traits::DeadLetterSink,
};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

impl From<&BorrowedMessage<'_>> for InboundMessage {
    fn from(message: &BorrowedMessage<'_>) -> Self {
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|key| String::from_utf8_lossy(key).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec),
        }
    }
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    pub fn connect(config: &Config) -> Result<Self, Error> {
        info!(brokers = %config.kafka_brokers, group_id = %config.kafka_group_id, "Connecting to Kafka");

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("group.id", &config.kafka_group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set(
                "session.timeout.ms",
                config.kafka_session_timeout_ms.to_string(),
            )
            .create()
            .map_err(|e| anyhow!("Failed to create Kafka consumer: {}", e))?;

        let topics: Vec<&str> = config.kafka_topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| anyhow!("Failed to subscribe to {:?}: {}", topics, e))?;

        info!(topics = ?topics, "Kafka consumer subscribed");

        Ok(Self { consumer })
    }

    /// Processes messages one at a time until shutdown. Offsets are committed
    /// only after the processor has an outcome for the message, so an error
    /// return leaves the message to be redelivered on the next start.
    pub async fn run(
        &self,
        processor: &EventProcessor,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), Error> {
        loop {
            let inbound = tokio::select! {
                _ = shutdown.changed() => {
                    info!("Kafka consumer stopping");
                    return Ok(());
                }
                received = self.consumer.recv() => match received {
                    Ok(message) => InboundMessage::from(&message),
                    Err(e) => {
                        warn!(error = %e, "Kafka receive error");
                        continue;
                    }
                },
            };

            match processor.handle(&inbound).await {
                Ok(outcome) => {
                    log_outcome(&inbound, &outcome);
                    self.commit(&inbound)?;
                }
                Err(e) => {
                    error!(
                        topic = %inbound.topic,
                        partition = inbound.partition,
                        offset = inbound.offset,
                        error = %e,
                        "Message could not be handled, stopping without commit"
                    );
                    return Err(e);
                }
            }
        }
    }

    fn commit(&self, message: &InboundMessage) -> Result<(), Error> {
        let mut positions = TopicPartitionList::new();
        positions
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| anyhow!("Failed to build commit position: {}", e))?;

        self.consumer
            .commit(&positions, CommitMode::Async)
            .map_err(|e| anyhow!("Failed to commit offset: {}", e))
    }
}

fn log_outcome(message: &InboundMessage, outcome: &MessageOutcome) {
    match outcome {
        MessageOutcome::Dispatched(report) => debug!(
            topic = %message.topic,
            offset = message.offset,
            notifications = report.total(),
            "Message handled"
        ),
        MessageOutcome::AlreadyHandled => debug!(
            topic = %message.topic,
            offset = message.offset,
            "Duplicate message acknowledged"
        ),
        MessageOutcome::UnknownType(_) | MessageOutcome::DeadLettered(_) => {}
    }
}

/// Produces envelopes for upstream services and dead letters for the worker.
#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    dead_letter_topic: String,
}

impl KafkaPublisher {
    pub fn connect(config: &Config) -> Result<Self, Error> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| anyhow!("Failed to create Kafka producer: {}", e))?;

        info!("Kafka producer created");

        Ok(Self {
            producer,
            dead_letter_topic: config.dead_letter_topic.clone(),
        })
    }

    pub async fn publish_event(&self, event: &DomainEvent) -> Result<Envelope, Error> {
        let envelope = Envelope::new(event)?;
        let payload = serde_json::to_vec(&envelope)?;
        let topic = event.event_type().topic();

        self.send(topic, &event.partition_key(), &payload).await?;

        debug!(
            topic,
            event_type = %envelope.event_type,
            event_id = ?envelope.event_id,
            "Event published"
        );

        Ok(envelope)
    }

    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), Error> {
        self.producer
            .send(
                FutureRecord::to(topic).key(key).payload(payload),
                SEND_TIMEOUT,
            )
            .await
            .map_err(|(e, _)| anyhow!("Failed to publish to {}: {}", topic, e))?;

        Ok(())
    }

    /// Blocking metadata round trip used by the health check.
    pub fn check_brokers(&self, timeout: Duration) -> Result<usize, Error> {
        let metadata = self
            .producer
            .client()
            .fetch_metadata(None, timeout)
            .map_err(|e| anyhow!("Kafka metadata request failed: {}", e))?;

        Ok(metadata.brokers().len())
    }

    pub fn flush(&self) {
        if let Err(e) = self.producer.flush(SEND_TIMEOUT) {
            warn!(error = %e, "Kafka producer flush failed");
        }
    }
}

#[async_trait]
impl DeadLetterSink for KafkaPublisher {
    async fn publish_dead_letter(&self, message: &DlqMessage) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;
        let key = message.key.clone().unwrap_or_else(|| {
            format!("{}-{}-{}", message.source_topic, message.partition, message.offset)
        });

        self.send(&self.dead_letter_topic, &key, &payload).await
    }
}
