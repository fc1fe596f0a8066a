use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    clients::{circuit_breaker::CircuitBreaker, gateway::HttpGateway},
    config::Config,
    models::{
        circuit_breaker::SMS_GATEWAY,
        delivery::DeliveryResult,
        notification::{Channel, OutboundNotification},
        provider::SmsRequest,
    },
    traits::ChannelSender,
};

/// Sends text messages through an HTTP SMS gateway. SMS has no subject, so
/// only the body is sent.
pub struct SmsClient {
    gateway: HttpGateway,
    from: String,
}

impl SmsClient {
    pub fn new(gateway: HttpGateway, from: &str) -> Self {
        Self {
            gateway,
            from: from.to_string(),
        }
    }

    pub fn from_config(config: &Config, circuit_breaker: CircuitBreaker) -> Result<Self, Error> {
        let gateway = HttpGateway::new(
            SMS_GATEWAY,
            &config.sms_api_url,
            &config.sms_api_key,
            Duration::from_secs(config.http_timeout_seconds),
            config.retry_config(),
        )?
        .with_circuit_breaker(circuit_breaker);

        Ok(Self::new(gateway, &config.sms_from))
    }
}

#[async_trait]
impl ChannelSender for SmsClient {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, notification: &OutboundNotification) -> DeliveryResult {
        debug!(
            notification_id = %notification.notification_id,
            "Sending SMS notification"
        );

        let request = SmsRequest {
            from: self.from.clone(),
            to: notification.recipient.clone(),
            body: notification.body.clone(),
        };

        self.gateway.deliver(&request).await
    }
}
