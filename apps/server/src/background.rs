//! Background tasks
//!
//! History retention: when `history.retention_days` is set, entries older than
//! the window are pruned periodically. Each resource keeps its latest entry.

use crate::{config::HistoryConfig, db::VersionTracker, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

/// One pruning pass. Returns the number of entries removed.
pub async fn prune_history_once(
    tracker: &dyn VersionTracker,
    retention_days: u32,
) -> Result<u64> {
    let cutoff = Utc::now() - ChronoDuration::days(i64::from(retention_days));
    let removed = tracker.prune_before(cutoff).await?;

    crate::metrics::HISTORY_ENTRIES_PRUNED_TOTAL
        .with_label_values(&["success"])
        .inc_by(removed);
    tracing::info!(removed, cutoff = %cutoff, "Pruned version history");
    Ok(removed)
}

/// Spawn the retention task, or `None` when retention is off or tracking is
/// disabled. The task stops when `shutdown` flips to `true`.
pub fn spawn_history_pruner(
    config: &HistoryConfig,
    tracker: Option<Arc<dyn VersionTracker>>,
    mut shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    let retention_days = config.retention_days?;
    let tracker = tracker?;
    let period = Duration::from_secs(config.prune_interval_seconds.max(1));

    tracing::info!(
        retention_days,
        interval_seconds = period.as_secs(),
        "Starting history retention task"
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("History retention task stopping");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = prune_history_once(tracker.as_ref(), retention_days).await {
                        crate::metrics::HISTORY_ENTRIES_PRUNED_TOTAL
                            .with_label_values(&["error"])
                            .inc();
                        tracing::error!(error = %e, "History pruning failed");
                    }
                }
            }
        }
    }))
}
