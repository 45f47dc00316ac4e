// src/resolver/mod.rs
//! Cache-first read path for point, range and full listings.

use crate::cache::{CacheKey, DividendCache, DividendFilter, StatusSnapshot};
use crate::chain::ChainSession;
use crate::config::Config;
use crate::error::{DividendError, Result};
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::types::{validate_netuid, ChainReference, DividendRecord};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Identity used when a lookup leaves out the subnet, the account or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultIdentity {
    pub netuid: u16,
    pub hotkey: String,
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub endpoint: String,
    pub subnets: RangeInclusive<u16>,
    pub chain_call_timeout: Duration,
    pub defaults: DefaultIdentity,
}

impl ResolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.chain_endpoint.clone(),
            subnets: config.subnets(),
            chain_call_timeout: config.chain_call_timeout(),
            defaults: DefaultIdentity {
                netuid: config.default_netuid,
                hotkey: config.default_hotkey.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointDividend {
    pub netuid: u16,
    pub hotkey: String,
    pub dividend: u64,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DividendListing {
    pub records: Vec<DividendRecord>,
    pub block_reference: Option<ChainReference>,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DividendQuery {
    Single(PointDividend),
    Many(DividendListing),
}

/// Key counts and remaining lifetimes, for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub total_dividend_keys: usize,
    pub keys_per_subnet: BTreeMap<u16, usize>,
    pub block_reference: Option<ChainReference>,
    /// Seconds left per singleton key, `None` when absent.
    pub ttl_secs: BTreeMap<String, Option<u64>>,
}

pub struct DividendResolver {
    coordinator: Arc<RefreshCoordinator>,
    settings: ResolverSettings,
}

impl DividendResolver {
    pub fn new(coordinator: Arc<RefreshCoordinator>, settings: ResolverSettings) -> Self {
        Self {
            coordinator,
            settings,
        }
    }

    fn cache(&self) -> &DividendCache {
        self.coordinator.cache()
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Returns `(dividend, from_cache)`. A miss does a single point query, never a
    /// full refresh.
    pub async fn get_one(&self, netuid: u16, hotkey: &str) -> Result<(u64, bool)> {
        let netuid = validate_netuid(netuid, &self.settings.subnets)?;
        if hotkey.trim().is_empty() {
            return Err(DividendError::InvalidInput("hotkey must not be empty".to_string()));
        }
        self.coordinator.chain().validate_account(hotkey)?;

        if let Some(value) = self.cache().get_dividend(netuid, hotkey).await? {
            info!("Cache hit for {}/{}", netuid, hotkey);
            return Ok((value, true));
        }

        info!("Cache miss for {}/{}, fetching from chain", netuid, hotkey);
        let value = self.fetch_point(netuid, hotkey).await?;
        if let Err(e) = self
            .cache()
            .put_dividend(&DividendRecord::new(netuid, hotkey, value))
            .await
        {
            warn!("Could not cache fetched value for {}/{}: {}", netuid, hotkey, e);
        } else {
            debug!("Cached new value for {}/{}", netuid, hotkey);
        }
        Ok((value, false))
    }

    async fn fetch_point(&self, netuid: u16, hotkey: &str) -> Result<u64> {
        let session = self.coordinator.chain().connect(&self.settings.endpoint).await?;
        let result = self.point_in_session(session.as_ref(), netuid, hotkey).await;
        session.close().await;

        match result? {
            Some(value) if value > 0 => Ok(value),
            _ => {
                warn!("No dividend found for {}/{}", netuid, hotkey);
                Err(DividendError::NotFound(format!("no dividend for {}/{}", netuid, hotkey)))
            }
        }
    }

    async fn point_in_session(
        &self,
        session: &dyn ChainSession,
        netuid: u16,
        hotkey: &str,
    ) -> Result<Option<u64>> {
        let call_timeout = self.settings.chain_call_timeout;
        let reference = timeout(call_timeout, session.current_reference()).await??;
        timeout(call_timeout, session.point_query(netuid, hotkey, &reference)).await?
    }

    /// Point lookup when both parts are given, otherwise a cached listing for the part
    /// that is given. An empty listing falls back to a point lookup with the missing
    /// part filled in from the default identity.
    pub async fn get_range(&self, netuid: Option<u16>, hotkey: Option<&str>) -> Result<DividendQuery> {
        let defaults = &self.settings.defaults;
        let (netuid, hotkey) = match (netuid, hotkey) {
            (Some(netuid), Some(hotkey)) => (netuid, hotkey.to_string()),
            (Some(netuid), None) => {
                let netuid = validate_netuid(netuid, &self.settings.subnets)?;
                if let Some(listing) = self.cached_listing(&DividendFilter::Subnet(netuid)).await? {
                    info!("Cache hit for netuid {}: {} items", netuid, listing.records.len());
                    return Ok(DividendQuery::Many(listing));
                }
                info!("Cache miss for netuid {}, using default hotkey", netuid);
                (netuid, defaults.hotkey.clone())
            }
            (None, Some(hotkey)) => {
                let filter = DividendFilter::Account(hotkey.to_string());
                if let Some(listing) = self.cached_listing(&filter).await? {
                    info!("Cache hit for hotkey {}: {} items", hotkey, listing.records.len());
                    return Ok(DividendQuery::Many(listing));
                }
                info!("Cache miss for hotkey {}, using default netuid", hotkey);
                (defaults.netuid, hotkey.to_string())
            }
            (None, None) => (defaults.netuid, defaults.hotkey.clone()),
        };

        let (dividend, cached) = self.get_one(netuid, &hotkey).await?;
        Ok(DividendQuery::Single(PointDividend {
            netuid,
            hotkey,
            dividend,
            cached,
        }))
    }

    async fn cached_listing(&self, filter: &DividendFilter) -> Result<Option<DividendListing>> {
        let records = self.cache().list_dividends(filter).await?;
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(DividendListing {
            records,
            block_reference: self.cache().block_reference().await?,
            cached: true,
        }))
    }

    /// Everything cached for the current generation. With no generation marker the
    /// listing comes from an inline refresh instead.
    pub async fn list_all(&self) -> Result<DividendListing> {
        if let Some(reference) = self.cache().block_reference().await? {
            let records = self.cache().list_dividends(&DividendFilter::All).await?;
            info!("Returning {} cached dividend records", records.len());
            return Ok(DividendListing {
                records,
                block_reference: Some(reference),
                cached: true,
            });
        }

        info!("No cached block hash found, fetching fresh data");
        match self.coordinator.refresh_all().await? {
            RefreshOutcome::Completed(report) => Ok(DividendListing {
                records: report.records,
                block_reference: Some(report.reference),
                cached: false,
            }),
            RefreshOutcome::Skipped => {
                debug!("Refresh already running, serving the partial generation");
                Ok(DividendListing {
                    records: self.cache().list_dividends(&DividendFilter::All).await?,
                    block_reference: self.cache().block_reference().await?,
                    cached: true,
                })
            }
        }
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        self.cache().status_snapshot().await
    }

    pub async fn cache_info(&self) -> Result<CacheInfo> {
        let records = self.cache().list_dividends(&DividendFilter::All).await?;
        let mut keys_per_subnet = BTreeMap::new();
        for record in &records {
            *keys_per_subnet.entry(record.netuid).or_insert(0usize) += 1;
        }

        let mut ttl_secs = BTreeMap::new();
        for key in [
            CacheKey::BlockHash,
            CacheKey::UpdateStatus,
            CacheKey::UpdateStartTime,
            CacheKey::UpdateProgress,
        ] {
            let key = key.to_string();
            let ttl = self.cache().store().ttl(&key).await?;
            ttl_secs.insert(key, ttl.map(|d| d.as_secs()));
        }

        Ok(CacheInfo {
            total_dividend_keys: records.len(),
            keys_per_subnet,
            block_reference: self.cache().block_reference().await?,
            ttl_secs,
        })
    }
}
