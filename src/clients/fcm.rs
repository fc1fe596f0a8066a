use std::{collections::HashMap, time::Duration};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::{
    clients::circuit_breaker::CircuitBreaker,
    models::{
        delivery::DeliveryResult,
        fcm::{FcmMessage, FcmNotification, FcmRequest, FcmResponse},
        notification::{Channel, OutboundNotification},
        retry::RetryConfig,
    },
    traits::ChannelSender,
    utils::retry_with_backoff,
};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

pub struct FcmClient {
    http_client: Client,
    fcm_project_id: String,
    retry_config: RetryConfig,
    circuit_breaker: CircuitBreaker,
}

impl FcmClient {
    pub fn new(
        fcm_project_id: &str,
        timeout: Duration,
        retry_config: RetryConfig,
        circuit_breaker: CircuitBreaker,
    ) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client for FCM: {}", e))?;

        info!(project_id = %fcm_project_id, "FCM client initialized");

        Ok(Self {
            http_client,
            fcm_project_id: fcm_project_id.to_string(),
            retry_config,
            circuit_breaker,
        })
    }

    fn build_request(notification: &OutboundNotification) -> FcmRequest {
        let mut data = HashMap::new();
        data.insert(
            "notification_id".to_string(),
            notification.notification_id.to_string(),
        );

        FcmRequest {
            message: FcmMessage {
                token: notification.recipient.clone(),
                notification: FcmNotification {
                    title: notification.title.clone(),
                    body: notification.body.clone(),
                },
                data: Some(data),
            },
        }
    }

    async fn send_once(&self, request: &FcmRequest) -> Result<FcmResponse, Error> {
        let provider = gcp_auth::provider().await?;
        let token = provider.token(FCM_SCOPES).await?;

        let url = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.fcm_project_id
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.as_str())
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            let body: FcmResponse = response.json().await?;
            Ok(body)
        } else {
            let error_text = response.text().await?;
            Err(anyhow!("FCM request failed: {}", error_text))
        }
    }
}

#[async_trait]
impl ChannelSender for FcmClient {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, notification: &OutboundNotification) -> DeliveryResult {
        debug!(
            notification_id = %notification.notification_id,
            "Sending FCM push notification"
        );

        let request = Self::build_request(notification);

        let outcome = self
            .circuit_breaker
            .call(|| retry_with_backoff(&self.retry_config, || self.send_once(&request)))
            .await;

        match outcome {
            Ok(response) => {
                info!(
                    notification_id = %notification.notification_id,
                    "FCM push notification sent successfully"
                );
                let result = DeliveryResult::sent();
                match response.name {
                    Some(name) => result.with_message_id(name),
                    None => result,
                }
            }
            Err(e) => {
                warn!(
                    notification_id = %notification.notification_id,
                    error = %e,
                    "FCM push notification failed"
                );
                DeliveryResult::failed(format!("FCM send failed: {}", e))
            }
        }
    }
}
