use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct EmailRequest {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmsRequest {
    pub from: String,
    pub to: String,
    pub body: String,
}

/// Acknowledgement returned by the mail relay and the SMS gateway. Providers
/// disagree on the id field name, so the common spellings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderAck {
    #[serde(alias = "messageId", alias = "message_id", alias = "sid")]
    pub id: Option<String>,
}
