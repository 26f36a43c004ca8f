// src/sweeper.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info};

use crate::clock::Clock;
use crate::error::StoreResult;
use crate::models::TaskPatch;
use crate::query::TaskFilter;
use crate::store::{TaskStore, WriteOp};

/// Periodically flags every past-due, unfinished task in the store as overdue.
/// It never clears the flag; that only happens through a task update.
pub struct OverdueSweeper {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl OverdueSweeper {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self { store, clock, interval }
    }

    /// One pass over the whole store. Returns how many tasks were flagged.
    pub async fn sweep_once(&self) -> StoreResult<u64> {
        let op = WriteOp::UpdateMany {
            filter: TaskFilter::overdue_candidates(self.clock.now()),
            patch: TaskPatch::overdue(true),
        };
        let result = self.store.bulk_write(vec![op]).await?;
        Ok(result.modified)
    }

    /// Runs a sweep at every multiple of the interval since the epoch until
    /// the runtime shuts down. Failures are logged and the next run retries.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Overdue sweeper started, interval {:?}", self.interval);
            loop {
                let now = self.clock.now();
                let wait = (next_run_after(now, self.interval) - now)
                    .to_std()
                    .unwrap_or_default();
                tokio::time::sleep(wait).await;

                match self.sweep_once().await {
                    Ok(flagged) => info!("Overdue sweep flagged {} tasks", flagged),
                    Err(e) => error!("Overdue sweep failed: {}", e),
                }
            }
        })
    }
}

/// The first multiple of `interval` since the Unix epoch strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = (interval.as_millis() as i64).max(1);
    let millis = now.timestamp_millis();
    let next = (millis.div_euclid(step) + 1) * step;
    DateTime::from_timestamp_millis(next).unwrap_or(now)
}
