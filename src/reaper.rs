use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tracing::info;

use crate::engine::Engine;
use crate::model::{minute_of, Minute};

/// Note attached to pending reservations that ran out the clock.
pub const EXPIRED_NOTE: &str = "expired";

const REAP_INTERVAL: Duration = Duration::from_secs(60);
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Settle every reservation that ended before (`today`, `now`): confirmed
/// ones are completed and pending ones are cancelled. Returns how many
/// were settled.
pub async fn reap_once(engine: &Engine, today: NaiveDate, now: Minute) -> usize {
    let mut settled = 0;
    for (id, status) in engine.collect_finished(today, now).await {
        match engine.settle_finished(id, today, now, EXPIRED_NOTE).await {
            Ok(Some(r)) => {
                settled += 1;
                info!("reaper: reservation {id} {status} -> {}", r.status);
            }
            Ok(None) => tracing::debug!("reaper skip {id}: no longer finished"),
            // Someone else may have settled or deleted it meanwhile.
            Err(e) => tracing::debug!("reaper skip {id}: {e}"),
        }
    }
    settled
}

/// Background task settling finished reservations against the local clock.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);
    loop {
        interval.tick().await;
        let now = Local::now().naive_local();
        let settled = reap_once(&engine, now.date(), minute_of(now.time())).await;
        if settled > 0 {
            metrics::counter!(crate::observability::RESERVATIONS_REAPED_TOTAL).increment(settled as u64);
        }
    }
}

/// Background task compacting the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::error!("WAL compaction failed: {e}"),
        }
    }
}
