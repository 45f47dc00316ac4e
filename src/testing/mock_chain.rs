//! Scripted in-memory chain for exercising the coordinator and resolver without a node.

use crate::chain::{ChainConnector, ChainSession};
use crate::error::{DividendError, Result};
use crate::types::ChainReference;
use async_trait::async_trait;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockChainInner {
    reference: Mutex<String>,
    subnets: Mutex<HashMap<u16, Vec<(String, u64)>>>,
    failing_subnets: Mutex<HashSet<u16>>,
    points: Mutex<HashMap<(u16, String), u64>>,
    range_delay: Mutex<Option<Duration>>,
    fail_connect: AtomicBool,
    fail_reference: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
    reference_calls: AtomicUsize,
    range_calls: AtomicUsize,
    point_calls: AtomicUsize,
    in_flight_ranges: AtomicUsize,
    max_in_flight_ranges: AtomicUsize,
}

/// Call counters observed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MockChainStats {
    pub connects: usize,
    pub closes: usize,
    pub reference_calls: usize,
    pub range_calls: usize,
    pub point_calls: usize,
    pub max_in_flight_ranges: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MockChain {
    inner: Arc<MockChainInner>,
}

impl MockChain {
    pub fn new(reference: &str) -> Self {
        let chain = Self::default();
        chain.set_reference(reference);
        chain
    }

    /// Every subnet in `subnets` returns one record for `hotkey-{netuid}` worth `netuid * 10`.
    pub fn with_one_record_per_subnet(self, subnets: std::ops::RangeInclusive<u16>) -> Self {
        for netuid in subnets {
            self.set_subnet(netuid, vec![(format!("hotkey-{}", netuid), u64::from(netuid) * 10)]);
        }
        self
    }

    pub fn with_subnet(self, netuid: u16, entries: Vec<(&str, u64)>) -> Self {
        self.set_subnet(
            netuid,
            entries.into_iter().map(|(h, v)| (h.to_string(), v)).collect(),
        );
        self
    }

    pub fn with_failing_subnet(self, netuid: u16) -> Self {
        lock(&self.inner.failing_subnets).insert(netuid);
        self
    }

    pub fn with_point(self, netuid: u16, hotkey: &str, value: u64) -> Self {
        lock(&self.inner.points).insert((netuid, hotkey.to_string()), value);
        self
    }

    pub fn with_range_delay(self, delay: Duration) -> Self {
        *lock(&self.inner.range_delay) = Some(delay);
        self
    }

    pub fn set_reference(&self, reference: &str) {
        *lock(&self.inner.reference) = reference.to_string();
    }

    pub fn set_subnet(&self, netuid: u16, entries: Vec<(String, u64)>) {
        lock(&self.inner.subnets).insert(netuid, entries);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reference(&self, fail: bool) {
        self.inner.fail_reference.store(fail, Ordering::SeqCst);
    }

    pub fn stats(&self) -> MockChainStats {
        let i = &self.inner;
        MockChainStats {
            connects: i.connects.load(Ordering::SeqCst),
            closes: i.closes.load(Ordering::SeqCst),
            reference_calls: i.reference_calls.load(Ordering::SeqCst),
            range_calls: i.range_calls.load(Ordering::SeqCst),
            point_calls: i.point_calls.load(Ordering::SeqCst),
            max_in_flight_ranges: i.max_in_flight_ranges.load(Ordering::SeqCst),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ChainConnector for MockChain {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainSession>> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_connect.load(Ordering::SeqCst) {
            return Err(DividendError::NetworkError(format!("cannot reach {}", endpoint)));
        }
        debug!("Mock chain session opened for {}", endpoint);
        Ok(Arc::new(MockSession {
            inner: self.inner.clone(),
        }))
    }
}

struct MockSession {
    inner: Arc<MockChainInner>,
}

#[async_trait]
impl ChainSession for MockSession {
    async fn current_reference(&self) -> Result<ChainReference> {
        self.inner.reference_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_reference.load(Ordering::SeqCst) {
            return Err(DividendError::RpcError("chain_getBlockHash unavailable".into()));
        }
        Ok(ChainReference::new(lock(&self.inner.reference).clone()))
    }

    async fn range_query(&self, netuid: u16, _reference: &ChainReference) -> Result<Vec<(String, u64)>> {
        self.inner.range_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.inner.in_flight_ranges.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight_ranges.fetch_max(now, Ordering::SeqCst);

        let delay = *lock(&self.inner.range_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.in_flight_ranges.fetch_sub(1, Ordering::SeqCst);

        if lock(&self.inner.failing_subnets).contains(&netuid) {
            return Err(DividendError::RpcError(format!("query_map failed for subnet {}", netuid)));
        }
        Ok(lock(&self.inner.subnets).get(&netuid).cloned().unwrap_or_default())
    }

    async fn point_query(&self, netuid: u16, hotkey: &str, _reference: &ChainReference) -> Result<Option<u64>> {
        self.inner.point_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(value) = lock(&self.inner.points).get(&(netuid, hotkey.to_string())) {
            return Ok(Some(*value));
        }
        Ok(lock(&self.inner.subnets)
            .get(&netuid)
            .and_then(|entries| entries.iter().find(|(h, _)| h == hotkey).map(|(_, v)| *v)))
    }

    async fn close(&self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}
