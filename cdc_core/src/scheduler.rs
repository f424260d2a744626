//! Background refresh of the shared baseline schedule.
//!
//! One operator identity is fetched on a fixed interval and ingested into the [`EventStore`].
//! Cycles never overlap: a cycle that finds another one in flight is skipped.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use tokio::{
    sync::Mutex,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    campus_client::{FetchError, ScheduleSource},
    model::{normalize_all, CredentialPair, InvalidTimestamp},
    store::{EventStore, StoreError},
};

const INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// Delete stored events that the last successful cycle did not see.
    pub prune_stale: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: INTERVAL,
            prune_stale: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetching the baseline failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("upstream sent an unusable record: {0}")]
    Timestamp(#[from] InvalidTimestamp),
    #[error("storing the baseline failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed {
        fetched: usize,
        inserted: usize,
        removed: usize,
    },
    /// Another cycle was still running.
    Skipped,
    Failed(CycleError),
}

pub struct RefreshScheduler {
    source: Arc<dyn ScheduleSource>,
    events: EventStore,
    operator: CredentialPair,
    config: SchedulerConfig,
    in_flight: Mutex<()>,
}

impl RefreshScheduler {
    pub fn new(
        source: Arc<dyn ScheduleSource>,
        events: EventStore,
        operator: CredentialPair,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            source,
            events,
            operator,
            config,
            in_flight: Mutex::new(()),
        }
    }

    /// Tick until `cancel` fires. The first cycle runs right away.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.config.interval, "refresh scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
        info!("refresh scheduler stopped");
    }

    /// Run one refresh cycle unless another one is in flight.
    ///
    /// Failures are logged and reported, never propagated.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("previous refresh cycle is still running, skipping");
            return CycleOutcome::Skipped;
        };
        debug!("running refresh cycle");
        match self.refresh().await {
            Ok(outcome) => {
                info!(?outcome, "refresh cycle completed");
                outcome
            }
            Err(err) => {
                error!(error = %err, "refresh cycle failed");
                CycleOutcome::Failed(err)
            }
        }
    }

    async fn refresh(&self) -> Result<CycleOutcome, CycleError> {
        let generation = Utc::now().timestamp_millis();
        let records = self
            .source
            .fetch(&self.operator.identifier, &self.operator.secret)
            .await?;
        let fetched = records.len();
        let events = normalize_all(records)?;
        let inserted = self.events.upsert_all(events, generation).await?;
        // an empty answer is what Campus Dual sends for a broken login, so nothing is pruned then
        let removed = if self.config.prune_stale && fetched > 0 {
            self.events.sweep_stale(generation).await?
        } else {
            0
        };
        Ok(CycleOutcome::Completed {
            fetched,
            inserted,
            removed,
        })
    }
}
