// src/cache/mod.rs
//! Key-value cache store abstraction and the typed dividend view on top of it.

pub mod keys;
pub mod memory;
pub mod redis_store;

pub use keys::{CacheKey, DividendFilter};
pub use memory::MemoryCache;
pub use redis_store::RedisCache;

use crate::error::Result;
use crate::types::{ChainReference, DividendRecord, RefreshStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Minimal string key-value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Values in key order; expired or missing keys come back as `None`.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically writes `value` unless the key currently holds `unless`.
    /// Returns whether the write happened.
    async fn set_ex_unless(&self, key: &str, unless: &str, value: &str, ttl: Duration)
        -> Result<bool>;

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remaining time to live, `None` when the key is absent or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    async fn ping(&self) -> Result<()>;
}

/// What `GET /tao-dividends/status` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: RefreshStatus,
    pub start_time: Option<String>,
    pub progress: Option<String>,
}

/// Typed access to the dividend key space. Every write carries the configured TTL.
#[derive(Clone)]
pub struct DividendCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl std::fmt::Debug for DividendCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DividendCache").field("ttl", &self.ttl).finish()
    }
}

impl DividendCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn put(&self, key: &CacheKey, value: &str) -> Result<()> {
        self.store.set_ex(&key.to_string(), value, self.ttl).await
    }

    /// A value that does not parse reads as a miss.
    pub async fn get_dividend(&self, netuid: u16, hotkey: &str) -> Result<Option<u64>> {
        let key = CacheKey::dividend(netuid, hotkey).to_string();
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring cache key {} with unparsable value '{}': {}", key, raw, e);
                Ok(None)
            }
        }
    }

    /// Values are stored as JSON numbers.
    pub async fn put_dividend(&self, record: &DividendRecord) -> Result<()> {
        let key = CacheKey::dividend(record.netuid, record.hotkey.clone());
        self.put(&key, &serde_json::to_string(&record.dividend)?).await
    }

    pub async fn block_reference(&self) -> Result<Option<ChainReference>> {
        Ok(self
            .store
            .get(&CacheKey::BlockHash.to_string())
            .await?
            .map(ChainReference::new))
    }

    pub async fn put_block_reference(&self, reference: &ChainReference) -> Result<()> {
        self.put(&CacheKey::BlockHash, reference.as_str()).await
    }

    /// Absence of the status entry reads as `NotStarted`.
    pub async fn status(&self) -> Result<RefreshStatus> {
        match self.store.get(&CacheKey::UpdateStatus.to_string()).await? {
            Some(raw) => raw.parse(),
            None => Ok(RefreshStatus::NotStarted),
        }
    }

    pub async fn status_snapshot(&self) -> Result<StatusSnapshot> {
        let keys = [
            CacheKey::UpdateStatus.to_string(),
            CacheKey::UpdateStartTime.to_string(),
            CacheKey::UpdateProgress.to_string(),
        ];
        let mut values = self.store.get_many(&keys).await?.into_iter();
        let status = values.next().flatten();
        let start_time = values.next().flatten();
        let progress = values.next().flatten();

        match status {
            None => Ok(StatusSnapshot {
                status: RefreshStatus::NotStarted,
                start_time: None,
                progress: None,
            }),
            Some(raw) => Ok(StatusSnapshot {
                status: raw.parse()?,
                start_time,
                progress,
            }),
        }
    }

    /// Single-flight guard: flips the status to `in_progress` unless it already is.
    pub async fn try_begin_refresh(&self) -> Result<bool> {
        let in_progress = RefreshStatus::InProgress.as_str();
        self.store
            .set_ex_unless(
                &CacheKey::UpdateStatus.to_string(),
                in_progress,
                in_progress,
                self.ttl,
            )
            .await
    }

    pub async fn put_status(&self, status: RefreshStatus) -> Result<()> {
        self.put(&CacheKey::UpdateStatus, status.as_str()).await
    }

    pub async fn put_start_time(&self, started: DateTime<Utc>) -> Result<()> {
        self.put(&CacheKey::UpdateStartTime, &started.to_rfc3339()).await
    }

    pub async fn put_progress(&self, processed: u64) -> Result<()> {
        self.put(&CacheKey::UpdateProgress, &processed.to_string()).await
    }

    /// Enumerates cached dividends. Keys that expire between the scan and the read, or
    /// whose values do not parse, are skipped.
    pub async fn list_dividends(&self, filter: &DividendFilter) -> Result<Vec<DividendRecord>> {
        let pattern = filter.pattern();
        let mut matched: Vec<(u16, String, String)> = self
            .store
            .keys_matching(&pattern)
            .await?
            .into_iter()
            .filter_map(|raw| match CacheKey::parse(&raw) {
                Some(CacheKey::Dividend { netuid, hotkey }) if filter.accepts(netuid, &hotkey) => {
                    Some((netuid, hotkey, raw))
                }
                _ => None,
            })
            .collect();
        // SCAN may report a key more than once.
        matched.sort();
        matched.dedup();

        let raw_keys: Vec<String> = matched.iter().map(|(_, _, raw)| raw.clone()).collect();
        let values = self.store.get_many(&raw_keys).await?;

        let mut records = Vec::with_capacity(matched.len());
        for ((netuid, hotkey, raw), value) in matched.into_iter().zip(values) {
            let Some(value) = value else {
                debug!("Key {} expired during listing", raw);
                continue;
            };
            match serde_json::from_str::<u64>(&value) {
                Ok(dividend) => records.push(DividendRecord {
                    netuid,
                    hotkey,
                    dividend,
                }),
                Err(e) => warn!("Skipping cache key {} with unparsable value '{}': {}", raw, value, e),
            }
        }
        debug!("Listed {} cached dividends for pattern {}", records.len(), pattern);
        Ok(records)
    }

    pub async fn get_sentiment(&self, netuid: u16) -> Result<Option<String>> {
        self.store.get(&CacheKey::Sentiment { netuid }.to_string()).await
    }

    pub async fn put_sentiment(&self, netuid: u16, payload: &str) -> Result<()> {
        self.put(&CacheKey::Sentiment { netuid }, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cache() -> DividendCache {
        DividendCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(240))
    }

    #[tokio::test]
    async fn status_defaults_to_not_started() {
        let cache = cache();
        assert_eq!(cache.status().await.unwrap(), RefreshStatus::NotStarted);
        assert_eq!(
            cache.status_snapshot().await.unwrap(),
            StatusSnapshot {
                status: RefreshStatus::NotStarted,
                start_time: None,
                progress: None,
            }
        );
    }

    #[tokio::test]
    async fn refresh_guard_is_single_flight() {
        let cache = cache();
        assert!(cache.try_begin_refresh().await.unwrap());
        assert!(!cache.try_begin_refresh().await.unwrap());

        cache.put_status(RefreshStatus::Failed).await.unwrap();
        assert!(cache.try_begin_refresh().await.unwrap());
        assert_eq!(cache.status().await.unwrap(), RefreshStatus::InProgress);
    }

    #[tokio::test]
    async fn dividends_are_stored_as_json_numbers() {
        let cache = cache();
        cache.put_dividend(&DividendRecord::new(18, "5FFA", 250)).await.unwrap();
        assert_eq!(
            cache.store().get("tao_dividend:18:5FFA").await.unwrap().as_deref(),
            Some("250")
        );
        assert_eq!(cache.get_dividend(18, "5FFA").await.unwrap(), Some(250));
        assert_eq!(cache.get_dividend(18, "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn listing_filters_by_subnet_and_account() {
        let cache = cache();
        for record in [
            DividendRecord::new(1, "alice", 10),
            DividendRecord::new(1, "bob", 11),
            DividendRecord::new(10, "alice", 12),
            DividendRecord::new(2, "a:lice", 13),
        ] {
            cache.put_dividend(&record).await.unwrap();
        }
        cache.put_block_reference(&ChainReference::new("0xabc")).await.unwrap();
        cache.put_status(RefreshStatus::Completed).await.unwrap();

        let subnet_one = cache.list_dividends(&DividendFilter::Subnet(1)).await.unwrap();
        assert_eq!(
            subnet_one,
            vec![DividendRecord::new(1, "alice", 10), DividendRecord::new(1, "bob", 11)]
        );

        let alice = cache
            .list_dividends(&DividendFilter::Account("alice".into()))
            .await
            .unwrap();
        assert_eq!(
            alice,
            vec![DividendRecord::new(1, "alice", 10), DividendRecord::new(10, "alice", 12)]
        );

        let all = cache.list_dividends(&DividendFilter::All).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.contains(&DividendRecord::new(2, "a:lice", 13)));
    }

    #[tokio::test]
    async fn unparsable_values_are_skipped_in_listings() {
        let cache = cache();
        cache
            .store()
            .set_ex("tao_dividend:3:broken", "not-json", Duration::from_secs(10))
            .await
            .unwrap();
        cache.put_dividend(&DividendRecord::new(3, "fine", 1)).await.unwrap();
        assert_eq!(
            cache.list_dividends(&DividendFilter::Subnet(3)).await.unwrap(),
            vec![DividendRecord::new(3, "fine", 1)]
        );
    }

    #[tokio::test]
    async fn unparsable_point_value_reads_as_a_miss() {
        let cache = cache();
        cache
            .store()
            .set_ex("tao_dividend:3:broken", "not-json", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.get_dividend(3, "broken").await.unwrap(), None);
    }

    /// Store whose key scan reports every key twice.
    struct RepeatingScan {
        inner: MemoryCache,
    }

    #[async_trait]
    impl CacheStore for RepeatingScan {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }
        async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
            self.inner.get_many(keys).await
        }
        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            self.inner.set_ex(key, value, ttl).await
        }
        async fn set_ex_unless(&self, key: &str, unless: &str, value: &str, ttl: Duration) -> Result<bool> {
            self.inner.set_ex_unless(key, unless, value, ttl).await
        }
        async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
            let keys = self.inner.keys_matching(pattern).await?;
            Ok(keys.iter().chain(keys.iter()).cloned().collect())
        }
        async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
            self.inner.ttl(key).await
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn repeated_scan_keys_are_listed_once() {
        let store = RepeatingScan {
            inner: MemoryCache::new(),
        };
        let cache = DividendCache::new(Arc::new(store), Duration::from_secs(240));
        cache.put_dividend(&DividendRecord::new(1, "alice", 10)).await.unwrap();
        cache.put_dividend(&DividendRecord::new(2, "bob", 20)).await.unwrap();

        assert_eq!(
            cache.list_dividends(&DividendFilter::All).await.unwrap(),
            vec![DividendRecord::new(1, "alice", 10), DividendRecord::new(2, "bob", 20)]
        );
    }
}
