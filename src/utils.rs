use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::models::retry::RetryConfig;

pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts = config.max_attempts,
                        "Retry succeeded"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    warn!(
                        max_attempts = config.max_attempts,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(e);
                }

                debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms,
                    error = %e,
                    "Attempt failed, backing off"
                );

                sleep(Duration::from_millis(jittered(delay_ms))).await;

                delay_ms = delay_ms
                    .saturating_mul(config.backoff_multiplier)
                    .min(config.max_delay_ms);
            }
        }
    }
}

/// ±10% around `delay_ms`.
fn jittered(delay_ms: u64) -> u64 {
    let jitter = rand::random_range(-0.1..=0.1);
    (delay_ms as f64 * (1.0 + jitter)) as u64
}
