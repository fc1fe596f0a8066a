use anyhow::{Result, anyhow};

use crate::models::notification::Channel;

pub fn validate_recipient(channel: Channel, recipient: &str) -> Result<()> {
    match channel {
        Channel::Email => validate_email(recipient),
        Channel::Sms => validate_phone_number(recipient),
        Channel::Push => validate_fcm_token(recipient),
    }
}

pub fn validate_email(address: &str) -> Result<()> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Email address cannot be empty"));
    }

    if address.len() > 254 {
        return Err(anyhow!("Email address too long (maximum 254 characters)"));
    }

    let (local, domain) = address
        .split_once('@')
        .ok_or_else(|| anyhow!("Email address must contain '@'"))?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(anyhow!("Email address is malformed"));
    }

    if address.chars().any(char::is_whitespace) {
        return Err(anyhow!("Email address contains whitespace"));
    }

    Ok(())
}

/// E.164: a leading '+' followed by 8 to 15 digits.
pub fn validate_phone_number(number: &str) -> Result<()> {
    let digits = number
        .strip_prefix('+')
        .ok_or_else(|| anyhow!("Phone number must be in E.164 format (leading '+')"))?;

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(anyhow!("Phone number contains non-digit characters"));
    }

    if !(8..=15).contains(&digits.len()) {
        return Err(anyhow!("Phone number must have between 8 and 15 digits"));
    }

    if digits.starts_with('0') {
        return Err(anyhow!("Phone number country code cannot start with 0"));
    }

    Ok(())
}

pub fn validate_fcm_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(anyhow!("Device token cannot be empty"));
    }

    if token.len() < 20 {
        return Err(anyhow!("Device token too short (minimum 20 characters)"));
    }

    if token.len() > 200 {
        return Err(anyhow!("Device token too long (maximum 200 characters)"));
    }

    let valid_chars = token
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

    if !valid_chars {
        return Err(anyhow!("Device token contains invalid characters"));
    }

    Ok(())
}
