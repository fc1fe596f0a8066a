use std::{collections::HashMap, time::Duration};

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    clients::{
        circuit_breaker::CircuitBreaker, database::DatabaseClient, kafka::KafkaPublisher,
        redis::RedisClient,
    },
    models::{
        circuit_breaker::CircuitState,
        health::{HealthCheckResponse, ServiceHealth, overall_status},
    },
};

const BROKER_TIMEOUT: Duration = Duration::from_secs(3);

pub struct HealthChecker {
    database: DatabaseClient,
    redis: RedisClient,
    publisher: KafkaPublisher,
    circuit_breakers: Vec<CircuitBreaker>,
}

impl HealthChecker {
    pub fn new(
        database: DatabaseClient,
        redis: RedisClient,
        publisher: KafkaPublisher,
        circuit_breakers: Vec<CircuitBreaker>,
    ) -> Self {
        Self {
            database,
            redis,
            publisher,
            circuit_breakers,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database().await);
        checks.insert("cache_service".to_string(), self.check_redis().await);
        checks.insert("message_broker".to_string(), self.check_kafka().await);

        for breaker in &self.circuit_breakers {
            checks.insert(
                breaker.service_name().to_string(),
                Self::check_circuit_breaker(breaker).await,
            );
        }

        HealthCheckResponse {
            service: env!("CARGO_PKG_NAME").to_string(),
            status: overall_status(checks.values()),
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.database.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::unhealthy(e.to_string())
            }
        }
    }

    async fn check_redis(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.redis.ping().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Redis health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                ServiceHealth::unhealthy(e.to_string())
            }
        }
    }

    async fn check_kafka(&self) -> ServiceHealth {
        let start = Instant::now();
        let publisher = self.publisher.clone();

        let checked =
            tokio::task::spawn_blocking(move || publisher.check_brokers(BROKER_TIMEOUT)).await;

        match checked {
            Ok(Ok(brokers)) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, brokers, "Kafka health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Kafka health check failed");
                ServiceHealth::unhealthy(e.to_string())
            }
            Err(e) => {
                warn!(error = %e, "Kafka health check task failed");
                ServiceHealth::unhealthy(format!("Health check task failed: {}", e))
            }
        }
    }

    async fn check_circuit_breaker(breaker: &CircuitBreaker) -> ServiceHealth {
        match breaker.current_state().await {
            Ok(state) => {
                let state_str = state.as_str().to_string();
                debug!(
                    service = breaker.service_name(),
                    circuit_state = %state_str,
                    "Circuit breaker state checked"
                );

                match state {
                    CircuitState::Closed => ServiceHealth::healthy(0).with_circuit_breaker(state_str),
                    CircuitState::HalfOpen => ServiceHealth::degraded(
                        state_str,
                        Some("Circuit breaker in recovery mode".to_string()),
                    ),
                    CircuitState::Open => ServiceHealth::degraded(state_str, None),
                }
            }
            Err(e) => {
                warn!(
                    service = breaker.service_name(),
                    error = %e,
                    "Failed to check circuit breaker state"
                );
                ServiceHealth::unhealthy(format!("Cannot check circuit breaker: {}", e))
            }
        }
    }
}
