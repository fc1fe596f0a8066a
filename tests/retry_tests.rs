use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use anyhow::{Result, anyhow};
use notification_service::{models::retry::RetryConfig, utils::retry_with_backoff};
use tokio::{sync::Mutex, time::Instant};

fn retry(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms,
        max_delay_ms,
        backoff_multiplier: 2,
    }
}

/// Runs an always-failing operation and returns the elapsed time of each attempt.
async fn attempt_times(config: &RetryConfig) -> Vec<u128> {
    let start = Instant::now();
    let times = Arc::new(Mutex::new(Vec::new()));

    let _ = retry_with_backoff(config, || {
        let times = Arc::clone(&times);
        async move {
            times.lock().await.push(start.elapsed().as_millis());
            Err::<(), _>(anyhow!("provider unavailable"))
        }
    })
    .await;

    let recorded = times.lock().await.clone();
    recorded
}

/// Test: A send that succeeds first time is not repeated
#[tokio::test]
async fn test_first_success_is_not_retried() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let message_id = retry_with_backoff(&retry(3, 50, 500), || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("msg-1")
        }
    })
    .await?;

    assert_eq!(message_id, "msg-1");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    Ok(())
}

/// Test: Transient provider errors are retried until one attempt succeeds
#[tokio::test]
async fn test_transient_errors_are_retried() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let result = retry_with_backoff(&retry(5, 20, 200), || {
        let counter = Arc::clone(&counter);
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("503 from gateway"))
            } else {
                Ok("delivered")
            }
        }
    })
    .await?;

    assert_eq!(result, "delivered");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    Ok(())
}

/// Test: The last error is returned once every attempt has failed
#[tokio::test]
async fn test_exhausted_attempts_return_last_error() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let result = retry_with_backoff(&retry(4, 10, 100), || {
        let counter = Arc::clone(&counter);
        async move {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<(), _>(anyhow!("attempt {} failed", attempt))
        }
    })
    .await;

    let error = result.expect_err("all attempts fail");
    assert_eq!(error.to_string(), "attempt 4 failed");
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    Ok(())
}

/// Test: Delays double between attempts, within the jitter band
#[tokio::test]
async fn test_delays_back_off_exponentially() -> Result<()> {
    let config = retry(4, 100, 1000);
    let times = attempt_times(&config).await;

    assert_eq!(times.len(), 4);
    assert!(times[0] < 50, "first attempt runs immediately");

    for i in 1..times.len() {
        let gap = times[i] - times[i - 1];
        let base = (config.initial_delay_ms * config.backoff_multiplier.pow(i as u32 - 1)) as u128;

        assert!(
            gap >= base * 8 / 10 && gap <= base * 13 / 10,
            "gap {} was {}ms, expected about {}ms",
            i,
            gap,
            base
        );
    }

    Ok(())
}

/// Test: Backoff never waits longer than the configured cap
#[tokio::test]
async fn test_delay_is_capped() -> Result<()> {
    let config = retry(6, 100, 250);
    let times = attempt_times(&config).await;

    assert_eq!(times.len(), 6);
    for i in 3..times.len() {
        let gap = times[i] - times[i - 1];
        assert!(gap <= 250 * 13 / 10, "gap {} was {}ms", i, gap);
    }

    Ok(())
}

/// Test: Concurrent retries keep separate attempt counts
#[tokio::test]
async fn test_concurrent_retries_are_independent() -> Result<()> {
    let config = Arc::new(retry(3, 10, 100));
    let mut handles = Vec::new();

    for i in 0..8u32 {
        let config = Arc::clone(&config);
        handles.push(tokio::spawn(async move {
            let attempts = Arc::new(AtomicU32::new(0));
            let counter = Arc::clone(&attempts);

            let result = retry_with_backoff(&config, || {
                let counter = Arc::clone(&counter);
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < i % 3 {
                        Err(anyhow!("flaky"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

            (i, result.is_ok(), attempts.load(Ordering::SeqCst))
        }));
    }

    for outcome in futures_util::future::join_all(handles).await {
        let (i, succeeded, attempts) = outcome?;
        assert!(succeeded, "operation {} should succeed", i);
        assert_eq!(attempts, i % 3 + 1, "operation {} attempt count", i);
    }

    Ok(())
}
