use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn from_string(s: &str) -> Self {
        match s {
            "open" => CircuitState::Open,
            "half_open" => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
    pub success_threshold: u32,
}

/// Redis keys shared by the breaker and the health checker.
pub fn circuit_key(service_name: &str, field: &str) -> String {
    format!("circuit:{}:{}", service_name, field)
}

pub const EMAIL_GATEWAY: &str = "email_gateway";
pub const SMS_GATEWAY: &str = "sms_gateway";
pub const FCM: &str = "fcm";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_state_text_reads_as_closed() {
        assert_eq!(CircuitState::from_string("half_open"), CircuitState::HalfOpen);
        assert_eq!(CircuitState::from_string("garbage"), CircuitState::Closed);
        assert_eq!(circuit_key(SMS_GATEWAY, "state"), "circuit:sms_gateway:state");
    }
}
