//! Denylist Sweeper
//! Mission: Periodically drop revoked tokens that have expired on their own

use crate::store::TokenRepository;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Run one cleanup pass at `now`.
pub async fn sweep_once(tokens: &dyn TokenRepository, now: DateTime<Utc>) -> Result<u64> {
    let deleted = tokens.cleanup(now).await?;
    if deleted > 0 {
        info!("🧹 Swept {} expired denylist entries", deleted);
    }
    Ok(deleted)
}

/// Sweep every `period` forever. Failures are logged and retried next tick.
pub async fn run_cleanup_loop(tokens: Arc<dyn TokenRepository>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; skip it so the sweep runs one period after startup.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = sweep_once(tokens.as_ref(), Utc::now()).await {
            warn!("denylist cleanup failed: {:#}", e);
        }
    }
}
