use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    clients::circuit_breaker::CircuitBreaker,
    models::{delivery::DeliveryResult, provider::ProviderAck, retry::RetryConfig},
    utils::retry_with_backoff,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    pub status: u16,
    pub message_id: Option<String>,
}

/// JSON-over-HTTP provider (mail relay, SMS gateway) behind retry and an
/// optional circuit breaker.
#[derive(Clone)]
pub struct HttpGateway {
    name: &'static str,
    http_client: Client,
    url: String,
    api_key: String,
    retry_config: RetryConfig,
    circuit_breaker: Option<CircuitBreaker>,
}

impl HttpGateway {
    pub fn new(
        name: &'static str,
        url: &str,
        api_key: &str,
        timeout: Duration,
        retry_config: RetryConfig,
    ) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client for {}: {}", name, e))?;

        Ok(Self {
            name,
            http_client,
            url: url.to_string(),
            api_key: api_key.to_string(),
            retry_config,
            circuit_breaker: None,
        })
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    /// Never fails: provider errors come back as a `failed` result.
    pub async fn deliver<B: Serialize + Sync>(&self, body: &B) -> DeliveryResult {
        let outcome = match &self.circuit_breaker {
            Some(breaker) => {
                breaker
                    .call(|| retry_with_backoff(&self.retry_config, || self.post_once(body)))
                    .await
            }
            None => retry_with_backoff(&self.retry_config, || self.post_once(body)).await,
        };

        match outcome {
            Ok(reply) => {
                let result = DeliveryResult::sent().with_provider_status(reply.status);
                match reply.message_id {
                    Some(id) => result.with_message_id(id),
                    None => result,
                }
            }
            Err(e) => {
                warn!(provider = self.name, error = %e, "Provider delivery failed");
                DeliveryResult::failed(e.to_string())
            }
        }
    }

    async fn post_once<B: Serialize + Sync>(&self, body: &B) -> Result<ProviderReply, Error> {
        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow!("{} request failed: {}", self.name, e))?;

        let status = response.status();

        if status.is_success() {
            let ack: ProviderAck = response.json().await.unwrap_or_default();
            debug!(provider = self.name, status = status.as_u16(), "Provider accepted message");

            Ok(ProviderReply {
                status: status.as_u16(),
                message_id: ack.id,
            })
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(anyhow!(
                "{} returned status {}: {}",
                self.name,
                status.as_u16(),
                error_text
            ))
        }
    }
}
