use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{info, warn};

use crate::{
    config::Config,
    models::{retry::RetryConfig, status::IdempotencyStatus},
    traits::IdempotencyLedger,
    utils::retry_with_backoff,
};

#[derive(Clone)]
pub struct RedisClient {
    connection: MultiplexedConnection,
    idempotency_ttl_seconds: u64,
    retry_config: RetryConfig,
}

fn idempotency_key(key: &str) -> String {
    format!("idempotency:{}", key)
}

impl RedisClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            idempotency_ttl_seconds: config.idempotency_ttl_seconds,
            retry_config: config.retry_config(),
        })
    }

    /// Shared with the circuit breakers and the health checker.
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        conn.ping::<String>()
            .await
            .map_err(|e| anyhow!("Redis ping failed: {}", e))?;
        Ok(())
    }

    async fn set_status(&self, key: &str, status: IdempotencyStatus) -> Result<(), Error> {
        let key = idempotency_key(key);
        let mut conn = self.connection.clone();

        conn.set_ex::<_, _, ()>(&key, status.as_str(), self.idempotency_ttl_seconds)
            .await
            .map_err(|e| anyhow!("Failed to mark {} as {}: {}", key, status.as_str(), e))
    }
}

#[async_trait]
impl IdempotencyLedger for RedisClient {
    async fn check_idempotency(&self, key: &str) -> Result<IdempotencyStatus, Error> {
        let key = idempotency_key(key);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| anyhow!("Failed to get cached value: {}", e))?;

        match value.as_deref() {
            None => Ok(IdempotencyStatus::NotFound),
            Some(stored) => {
                let status = IdempotencyStatus::from_string(stored);
                if status == IdempotencyStatus::NotFound {
                    warn!(key = %key, value = %stored, "Unknown idempotency status");
                }
                Ok(status)
            }
        }
    }

    async fn mark_as_processing(&self, key: &str) -> Result<(), Error> {
        self.set_status(key, IdempotencyStatus::Processing).await
    }

    /// Retried: losing this write means the event is dispatched again on
    /// redelivery.
    async fn mark_as_completed(&self, key: &str) -> Result<(), Error> {
        let key = idempotency_key(key);

        retry_with_backoff(&self.retry_config, || {
            let key_clone = key.clone();
            let mut conn = self.connection.clone();
            let ttl = self.idempotency_ttl_seconds;

            async move {
                conn.set_ex::<_, _, ()>(&key_clone, IdempotencyStatus::Completed.as_str(), ttl)
                    .await
                    .map_err(|e| e.to_string())
            }
        })
        .await
        .map_err(|e| anyhow!("mark_as_completed failed: {}", e))?;

        Ok(())
    }

    async fn mark_as_failed(&self, key: &str) -> Result<(), Error> {
        self.set_status(key, IdempotencyStatus::Failed).await
    }
}
