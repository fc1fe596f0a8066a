pub mod circuit_breaker;
pub mod delivery;
pub mod event;
pub mod fcm;
pub mod health;
pub mod message;
pub mod notification;
pub mod provider;
pub mod retry;
pub mod status;
pub mod validation;
