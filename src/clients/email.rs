use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    clients::{circuit_breaker::CircuitBreaker, gateway::HttpGateway},
    config::Config,
    models::{
        circuit_breaker::EMAIL_GATEWAY,
        delivery::DeliveryResult,
        notification::{Channel, OutboundNotification},
        provider::EmailRequest,
    },
    traits::ChannelSender,
};

/// Sends email through an HTTP mail relay.
pub struct EmailClient {
    gateway: HttpGateway,
    from: String,
}

impl EmailClient {
    pub fn new(gateway: HttpGateway, from: &str) -> Self {
        Self {
            gateway,
            from: from.to_string(),
        }
    }

    pub fn from_config(config: &Config, circuit_breaker: CircuitBreaker) -> Result<Self, Error> {
        let gateway = HttpGateway::new(
            EMAIL_GATEWAY,
            &config.email_api_url,
            &config.email_api_key,
            Duration::from_secs(config.http_timeout_seconds),
            config.retry_config(),
        )?
        .with_circuit_breaker(circuit_breaker);

        Ok(Self::new(gateway, &config.email_from))
    }
}

#[async_trait]
impl ChannelSender for EmailClient {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, notification: &OutboundNotification) -> DeliveryResult {
        debug!(
            notification_id = %notification.notification_id,
            "Sending email notification"
        );

        let request = EmailRequest {
            from: self.from.clone(),
            to: notification.recipient.clone(),
            subject: notification.title.clone(),
            text: notification.body.clone(),
        };

        self.gateway.deliver(&request).await
    }
}
