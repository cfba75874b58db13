//! Background refresh ticker.
//!
//! Every tick sweeps the token store for overdue cursors and re-runs the
//! incremental path for each. A cycle is bounded by a hard deadline so one
//! stuck provider cannot pile cycles on top of each other.

use super::CrawlOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Spawn the refresh loop. Runs until the shutdown token fires.
pub fn spawn_background_refresher(
    orchestrator: Arc<CrawlOrchestrator>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(orchestrator.settings().refresh_interval_secs);
        let cycle_timeout = Duration::from_secs(orchestrator.settings().refresh_cycle_timeout_secs);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        tracing::info!(
            interval_secs = interval.as_secs(),
            "Background refresh ticker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Background refresh ticker shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match tokio::time::timeout(cycle_timeout, orchestrator.refresh_overdue()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(count)) => {
                    tracing::info!(tokens = count, "Refresh cycle complete");
                    metrics::counter!("crawler_refresh_cycles_total").increment(1);
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Refresh cycle failed");
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_secs = cycle_timeout.as_secs(),
                        "Refresh cycle hit its deadline"
                    );
                }
            }
        }
    });
}
