// src/refresh/coordinator.rs
//! Full-range refresh of the dividend cache with a single-flight guard.

use crate::cache::DividendCache;
use crate::chain::{ChainConnector, ChainSession};
use crate::config::Config;
use crate::error::{DividendError, Result};
use crate::types::{ChainReference, DividendRecord, RefreshStatus};
use crate::utils::Timer;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, error, info, warn};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;

const PROGRESS_EVERY: u64 = 1000;
const WRITE_CONCURRENCY: usize = 32;

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub endpoint: String,
    pub subnets: RangeInclusive<u16>,
    pub chain_call_timeout: Duration,
    pub query_concurrency: usize,
    pub soft_limit: Duration,
}

impl RefreshSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.chain_endpoint.clone(),
            subnets: config.subnets(),
            chain_call_timeout: config.chain_call_timeout(),
            query_concurrency: config.chain_query_concurrency.max(1),
            soft_limit: Duration::from_secs(config.refresh_soft_limit_secs),
        }
    }
}

/// What one completed cycle fetched and stored.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub reference: ChainReference,
    pub records: Vec<DividendRecord>,
    pub processed: u64,
    pub failed_subnets: Vec<u16>,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// Another cycle holds the guard; nothing was touched.
    Skipped,
    Completed(RefreshReport),
}

impl RefreshOutcome {
    pub fn processed_count(&self) -> u64 {
        match self {
            RefreshOutcome::Skipped => 0,
            RefreshOutcome::Completed(report) => report.processed,
        }
    }
}

/// Runs refresh cycles. Each cycle executes in its own task, so a caller that stops
/// waiting never interrupts a cycle half way through.
#[derive(Clone)]
pub struct RefreshCoordinator {
    cache: DividendCache,
    chain: Arc<dyn ChainConnector>,
    settings: RefreshSettings,
    /// Held shared by every running cycle.
    running: Arc<RwLock<()>>,
}

impl RefreshCoordinator {
    pub fn new(cache: DividendCache, chain: Arc<dyn ChainConnector>, settings: RefreshSettings) -> Self {
        Self {
            cache,
            chain,
            settings,
            running: Arc::new(RwLock::new(())),
        }
    }

    pub fn cache(&self) -> &DividendCache {
        &self.cache
    }

    pub fn chain(&self) -> &Arc<dyn ChainConnector> {
        &self.chain
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Runs one refresh cycle unless another is already in flight. Errors escaping the
    /// cycle mark it `failed` and are returned to the caller, which owns retry policy.
    pub async fn refresh_all(&self) -> Result<RefreshOutcome> {
        let cycle = self.spawn_cycle().await;
        Self::joined(cycle.await)
    }

    /// Like `refresh_all`, but a cycle still running after `hard_limit` is killed. The
    /// status is then left `in_progress` until its TTL runs out.
    pub async fn refresh_within(&self, hard_limit: Duration) -> Result<RefreshOutcome> {
        let mut cycle = self.spawn_cycle().await;
        match timeout(hard_limit, &mut cycle).await {
            Ok(joined) => Self::joined(joined),
            Err(_) => {
                cycle.abort();
                error!("Refresh attempt killed at hard limit of {:?}", hard_limit);
                Err(DividendError::TimeoutError(format!(
                    "refresh exceeded hard time limit of {:?}",
                    hard_limit
                )))
            }
        }
    }

    /// Resolves once no cycle started by this coordinator is still running.
    pub async fn wait_idle(&self) {
        let _idle = self.running.write().await;
    }

    async fn spawn_cycle(&self) -> JoinHandle<Result<RefreshOutcome>> {
        let running = self.running.clone().read_owned().await;
        let coordinator = self.clone();
        tokio::spawn(async move {
            let outcome = coordinator.guarded_cycle().await;
            drop(running);
            outcome
        })
    }

    fn joined(
        joined: std::result::Result<Result<RefreshOutcome>, JoinError>,
    ) -> Result<RefreshOutcome> {
        match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                // The status entry is left to its TTL; this task may not have owned it.
                error!("Refresh task ended abnormally: {}", e);
                Err(DividendError::RefreshFailed(format!("refresh task ended abnormally: {}", e)))
            }
        }
    }

    async fn guarded_cycle(&self) -> Result<RefreshOutcome> {
        if !self.cache.try_begin_refresh().await? {
            info!("Update already in progress, skipping refresh");
            return Ok(RefreshOutcome::Skipped);
        }
        info!("Starting cache update for subnets {:?}", self.settings.subnets);

        let result = match timeout(self.settings.soft_limit, self.run_cycle()).await {
            Ok(result) => result,
            Err(_) => Err(DividendError::TimeoutError(format!(
                "refresh exceeded soft time limit of {:?}",
                self.settings.soft_limit
            ))),
        };

        match result {
            Ok(report) => {
                self.cache.put_status(RefreshStatus::Completed).await?;
                info!(
                    "Cache update completed: {} records processed at {} ({} subnets failed) in {:.2}s",
                    report.processed,
                    report.reference,
                    report.failed_subnets.len(),
                    report.duration.as_secs_f64()
                );
                Ok(RefreshOutcome::Completed(report))
            }
            Err(e) => {
                error!("Error in cache update: {}", e);
                self.mark_failed().await;
                Err(e)
            }
        }
    }

    async fn mark_failed(&self) {
        if let Err(status_err) = self.cache.put_status(RefreshStatus::Failed).await {
            error!("Could not record failed refresh status: {}", status_err);
        }
    }

    async fn run_cycle(&self) -> Result<RefreshReport> {
        let mut timer = Timer::start("Dividend cache update");
        self.cache.put_start_time(Utc::now()).await?;
        self.cache.put_progress(0).await?;

        let session = self.chain.connect(&self.settings.endpoint).await?;
        let fetched = self.fetch_all(&session).await;
        session.close().await;
        let (reference, records, failed_subnets) = fetched?;
        timer.checkpoint("chain fetch");

        self.cache.put_block_reference(&reference).await?;
        info!("Cached block hash: {}", reference);

        let processed = self.store_records(&records).await;
        timer.checkpoint("cache writes");
        if let Err(e) = self.cache.put_progress(processed).await {
            warn!("Could not publish final progress {}: {}", processed, e);
        }

        Ok(RefreshReport {
            reference,
            records,
            processed,
            failed_subnets,
            duration: timer.finish(),
        })
    }

    /// Pins a reference and queries every subnet against it, at most
    /// `query_concurrency` at a time. Per-subnet failures and timeouts are logged and
    /// reported, never propagated.
    async fn fetch_all(
        &self,
        session: &Arc<dyn ChainSession>,
    ) -> Result<(ChainReference, Vec<DividendRecord>, Vec<u16>)> {
        let call_timeout = self.settings.chain_call_timeout;
        let reference = timeout(call_timeout, session.current_reference()).await??;
        debug!("Pinned refresh to block {}", reference);

        let mut subnets = self.settings.subnets.clone();
        let mut pending = FuturesUnordered::new();
        let mut records = Vec::new();
        let mut failed = Vec::new();
        loop {
            while pending.len() < self.settings.query_concurrency {
                let Some(netuid) = subnets.next() else { break };
                pending.push(query_subnet(session.clone(), reference.clone(), netuid, call_timeout));
            }
            let Some((netuid, result)) = pending.next().await else { break };

            match result {
                Ok(entries) => {
                    debug!("Subnet {}: {} entries", netuid, entries.len());
                    records.extend(
                        entries
                            .into_iter()
                            .map(|(hotkey, dividend)| DividendRecord::new(netuid, hotkey, dividend)),
                    );
                }
                Err(DividendError::TimeoutError(_)) => {
                    warn!("Range query for subnet {} timed out after {:?}", netuid, call_timeout);
                    failed.push(netuid);
                }
                Err(e) => {
                    error!("Error processing query map result for subnet {}: {}", netuid, e);
                    failed.push(netuid);
                }
            }
        }

        // One write per key per cycle.
        records.sort_by(|a, b| (a.netuid, &a.hotkey).cmp(&(b.netuid, &b.hotkey)));
        records.dedup_by(|a, b| a.netuid == b.netuid && a.hotkey == b.hotkey);
        failed.sort_unstable();

        info!("Fetched {} dividend records ({} subnets failed)", records.len(), failed.len());
        Ok((reference, records, failed))
    }

    /// Best-effort writes: failures are logged and not counted.
    async fn store_records(&self, records: &[DividendRecord]) -> u64 {
        let mut queued = records.iter().cloned();
        let mut writes = FuturesUnordered::new();
        let mut processed = 0u64;
        loop {
            while writes.len() < WRITE_CONCURRENCY {
                let Some(record) = queued.next() else { break };
                writes.push(write_record(self.cache.clone(), record));
            }
            let Some((record, result)) = writes.next().await else { break };

            match result {
                Ok(()) => {
                    processed += 1;
                    if processed % PROGRESS_EVERY == 0 {
                        info!("Processed {} records", processed);
                        if let Err(e) = self.cache.put_progress(processed).await {
                            warn!("Could not publish progress {}: {}", processed, e);
                        }
                    }
                }
                Err(e) => {
                    error!("Error caching netuid={} hotkey={}: {}", record.netuid, record.hotkey, e);
                }
            }
        }
        processed
    }
}

async fn query_subnet(
    session: Arc<dyn ChainSession>,
    reference: ChainReference,
    netuid: u16,
    call_timeout: Duration,
) -> (u16, Result<Vec<(String, u64)>>) {
    let result = match timeout(call_timeout, session.range_query(netuid, &reference)).await {
        Ok(result) => result,
        Err(_) => Err(DividendError::TimeoutError(format!(
            "range query for subnet {} exceeded {:?}",
            netuid, call_timeout
        ))),
    };
    (netuid, result)
}

async fn write_record(cache: DividendCache, record: DividendRecord) -> (DividendRecord, Result<()>) {
    let result = cache.put_dividend(&record).await;
    (record, result)
}
