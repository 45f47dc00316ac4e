// src/refresh/scheduler.rs
//! Periodic trigger for refresh cycles, with stale-trigger dropping and bounded retries.

use super::coordinator::{RefreshCoordinator, RefreshOutcome};
use crate::config::Config;
use crate::error::{DividendError, RetryPolicy};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// Triggers that fire later than this after their scheduled time are dropped.
    pub trigger_expiry: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Outer bound on one attempt. An attempt cut off here leaves the status as
    /// `in_progress` until its TTL runs out.
    pub hard_limit: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.refresh_interval_secs),
            trigger_expiry: Duration::from_secs(config.trigger_expiry_secs),
            max_retries: config.refresh_max_retries,
            retry_delay: Duration::from_secs(config.refresh_retry_delay_secs),
            hard_limit: Duration::from_secs(config.refresh_hard_limit_secs),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries + 1, self.retry_delay)
    }
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Completed(u64),
    Skipped,
    /// Every attempt failed; the schedule carries on.
    Failed(DividendError),
}

pub struct Scheduler {
    coordinator: Arc<RefreshCoordinator>,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(coordinator: Arc<RefreshCoordinator>, settings: SchedulerSettings) -> Self {
        Self {
            coordinator,
            settings,
        }
    }

    /// Fires a refresh every interval until `shutdown` flips or its sender goes away.
    /// The first trigger fires immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Refresh scheduler started (interval {:?}, {} retries, {:?} retry delay)",
            self.settings.interval, self.settings.max_retries, self.settings.retry_delay
        );
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let scheduled = tokio::select! {
                scheduled = ticker.tick() => scheduled,
                _ = shutdown.changed() => break,
            };

            let lateness = Instant::now().saturating_duration_since(scheduled);
            if lateness > self.settings.trigger_expiry {
                warn!(
                    "Dropping refresh trigger that is {:.1}s late (expiry {:?})",
                    lateness.as_secs_f64(),
                    self.settings.trigger_expiry
                );
                continue;
            }

            tokio::select! {
                outcome = self.run_tick() => debug!("Refresh tick finished: {:?}", outcome_label(&outcome)),
                _ = shutdown.changed() => {
                    info!("Shutdown requested, letting the running refresh finish");
                    self.coordinator.wait_idle().await;
                    break;
                }
            }
        }
        info!("Refresh scheduler stopped");
    }

    /// One scheduled trigger: the initial attempt plus up to `max_retries` retries.
    pub async fn run_tick(&self) -> TickOutcome {
        let hard_limit = self.settings.hard_limit;
        let coordinator = self.coordinator.clone();

        let result = self
            .settings
            .retry_policy()
            .execute(move || {
                let coordinator = coordinator.clone();
                async move { coordinator.refresh_within(hard_limit).await }
            })
            .await;

        match result {
            Ok(RefreshOutcome::Skipped) => TickOutcome::Skipped,
            Ok(outcome) => TickOutcome::Completed(outcome.processed_count()),
            Err(e) => {
                error!("Max retries exceeded for cache update: {}", e);
                TickOutcome::Failed(e)
            }
        }
    }
}

fn outcome_label(outcome: &TickOutcome) -> String {
    match outcome {
        TickOutcome::Completed(n) => format!("completed ({} records)", n),
        TickOutcome::Skipped => "skipped".to_string(),
        TickOutcome::Failed(e) => format!("failed ({})", e),
    }
}
