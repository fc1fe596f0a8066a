use std::{
    fmt::{Display, Formatter, Result},
    str::FromStr,
};

use anyhow::{Error, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NotificationStatus::Pending)
    }

    /// `pending -> sent` and `pending -> failed` are the only transitions.
    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        *self == NotificationStatus::Pending && next.is_terminal()
    }
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(anyhow!("Unknown notification status '{}'", other)),
        }
    }
}

/// Outcome reported by a channel sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl From<DeliveryStatus> for NotificationStatus {
    fn from(status: DeliveryStatus) -> Self {
        match status {
            DeliveryStatus::Sent => NotificationStatus::Sent,
            DeliveryStatus::Failed => NotificationStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyStatus {
    NotFound,
    Processing,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::NotFound => "not_found",
            IdempotencyStatus::Processing => "processing",
            IdempotencyStatus::Completed => "completed",
            IdempotencyStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "processing" => IdempotencyStatus::Processing,
            "completed" => IdempotencyStatus::Completed,
            "failed" => IdempotencyStatus::Failed,
            _ => IdempotencyStatus::NotFound,
        }
    }
}
