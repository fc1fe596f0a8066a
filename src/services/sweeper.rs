use anyhow::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::{
    sync::watch,
    time::{Duration, MissedTickBehavior, interval},
};
use tracing::{debug, error, info, warn};

use crate::{
    models::{notification::NotificationRecord, status::NotificationStatus},
    services::tracker::DeliveryTracker,
};

pub const ABANDONED_REASON: &str = "delivery abandoned: worker interrupted before send completed";

/// Fails records left `pending` by a worker that died between creating the
/// record and recording the send result.
pub struct PendingSweeper {
    tracker: DeliveryTracker,
    stale_after: ChronoDuration,
    batch_size: i64,
}

impl PendingSweeper {
    pub fn new(tracker: DeliveryTracker, stale_after_seconds: u64, batch_size: i64) -> Self {
        Self {
            tracker,
            stale_after: i64::try_from(stale_after_seconds)
                .ok()
                .and_then(ChronoDuration::try_seconds)
                .unwrap_or(ChronoDuration::MAX),
            batch_size,
        }
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize, Error> {
        let Some(cutoff) = now.checked_sub_signed(self.stale_after) else {
            return Ok(0);
        };
        let stale = self
            .tracker
            .store()
            .list_stale_pending(cutoff, self.batch_size)
            .await?;

        let mut abandoned = 0;
        for record in &stale {
            match self.tracker.abandon(record, ABANDONED_REASON).await {
                Ok(updated) if was_abandoned(&updated) => abandoned += 1,
                Ok(updated) => debug!(
                    notification_id = %updated.id,
                    status = %updated.status,
                    "Stale notification finished before it could be abandoned"
                ),
                Err(e) => warn!(
                    notification_id = %record.id,
                    error = %e,
                    "Failed to abandon stale notification"
                ),
            }
        }

        if abandoned > 0 {
            info!(abandoned, cutoff = %cutoff, "Stale pending notifications marked failed");
        }

        Ok(abandoned)
    }

    pub async fn run(self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        error!(error = %e, "Pending sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("Pending sweeper stopping");
                    break;
                }
            }
        }
    }
}

fn was_abandoned(record: &NotificationRecord) -> bool {
    record.status == NotificationStatus::Failed
        && record.metadata.get("error").and_then(|e| e.as_str()) == Some(ABANDONED_REASON)
}
