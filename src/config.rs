use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{
    circuit_breaker::CircuitBreakerConfig,
    event::{ORDER_EVENTS_TOPIC, USER_EVENTS_TOPIC},
    retry::RetryConfig,
};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub kafka_brokers: String,
    pub kafka_group_id: String,
    #[serde(default = "default_kafka_topics")]
    pub kafka_topics: Vec<String>,
    #[serde(default = "default_dead_letter_topic")]
    pub dead_letter_topic: String,
    #[serde(default = "default_kafka_session_timeout_ms")]
    pub kafka_session_timeout_ms: u32,

    pub redis_url: String,
    pub idempotency_ttl_seconds: u64,

    pub database_url: String,

    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,

    pub sms_api_url: String,
    pub sms_api_key: String,
    pub sms_from: String,

    /// Push is only delivered when a Firebase project is configured.
    #[serde(default)]
    pub fcm_project_id: Option<String>,

    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,

    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_timeout_seconds: u64,
    pub circuit_breaker_success_threshold: u32,

    pub max_retry_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_stale_pending_after_seconds")]
    pub stale_pending_after_seconds: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: i64,

    pub server_port: u16,
}

/// Thirty days.
pub const MAX_STALE_PENDING_AFTER_SECONDS: u64 = 30 * 24 * 60 * 60;

fn default_kafka_topics() -> Vec<String> {
    vec![USER_EVENTS_TOPIC.to_string(), ORDER_EVENTS_TOPIC.to_string()]
}

fn default_dead_letter_topic() -> String {
    "notification-events-dlq".to_string()
}

fn default_kafka_session_timeout_ms() -> u32 {
    10_000
}

fn default_http_timeout_seconds() -> u64 {
    10
}

fn default_stale_pending_after_seconds() -> u64 {
    900
}

fn default_sweep_interval_seconds() -> u64 {
    300
}

fn default_sweep_batch_size() -> i64 {
    100
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.kafka_topics.is_empty() {
            return Err(anyhow!("KAFKA_TOPICS must name at least one topic"));
        }

        if self.kafka_topics.contains(&self.dead_letter_topic) {
            return Err(anyhow!(
                "DEAD_LETTER_TOPIC '{}' cannot also be a consumed topic",
                self.dead_letter_topic
            ));
        }

        if self.max_retry_attempts == 0 {
            return Err(anyhow!("MAX_RETRY_ATTEMPTS must be at least 1"));
        }

        if self.retry_backoff_multiplier == 0 {
            return Err(anyhow!("RETRY_BACKOFF_MULTIPLIER must be at least 1"));
        }

        if self.sweep_interval_seconds == 0 {
            return Err(anyhow!("SWEEP_INTERVAL_SECONDS must be at least 1"));
        }

        if self.sweep_batch_size <= 0 {
            return Err(anyhow!("SWEEP_BATCH_SIZE must be positive"));
        }

        if self.stale_pending_after_seconds > MAX_STALE_PENDING_AFTER_SECONDS {
            return Err(anyhow!(
                "STALE_PENDING_AFTER_SECONDS must be at most {}",
                MAX_STALE_PENDING_AFTER_SECONDS
            ));
        }

        let max_send = self.max_send_duration();
        if Duration::from_secs(self.stale_pending_after_seconds) <= max_send {
            return Err(anyhow!(
                "STALE_PENDING_AFTER_SECONDS ({}) must exceed the longest possible send ({}s)",
                self.stale_pending_after_seconds,
                max_send.as_secs_f64().ceil()
            ));
        }

        Ok(())
    }

    /// Upper bound on one channel send: every attempt hitting the HTTP
    /// timeout, plus the longest jittered backoff between attempts.
    pub fn max_send_duration(&self) -> Duration {
        let attempts = u64::from(self.max_retry_attempts);
        let timeouts_ms = self
            .http_timeout_seconds
            .saturating_mul(1000)
            .saturating_mul(attempts);
        let backoff_ms = self
            .max_retry_delay_ms
            .saturating_mul(11)
            / 10;
        let backoffs_ms = backoff_ms.saturating_mul(attempts.saturating_sub(1));

        Duration::from_millis(timeouts_ms.saturating_add(backoffs_ms))
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_failure_threshold,
            timeout_seconds: self.circuit_breaker_timeout_seconds,
            success_threshold: self.circuit_breaker_success_threshold,
        }
    }
}
