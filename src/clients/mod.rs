pub mod circuit_breaker;
pub mod database;
pub mod email;
pub mod fcm;
pub mod gateway;
pub mod health;
pub mod kafka;
pub mod redis;
pub mod sms;
