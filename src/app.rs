// src/app.rs
//! Explicit wiring of the services from configuration and injected backends.

use crate::api::ApiState;
use crate::cache::{CacheStore, DividendCache};
use crate::chain::ChainConnector;
use crate::config::Config;
use crate::error::Result;
use crate::refresh::{RefreshCoordinator, RefreshSettings, Scheduler, SchedulerSettings};
use crate::resolver::{DividendResolver, ResolverSettings};
use crate::sentiment::{ChutesScorer, DaturaClient, SentimentAnalyzer};
use crate::trading::{PaperStakeSubmitter, TradeExecutor};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

const SENTIMENT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Services {
    pub coordinator: Arc<RefreshCoordinator>,
    pub resolver: Arc<DividendResolver>,
    pub trader: Option<Arc<TradeExecutor>>,
    scheduler_settings: SchedulerSettings,
}

impl Services {
    pub fn build(config: &Config, store: Arc<dyn CacheStore>, chain: Arc<dyn ChainConnector>) -> Result<Self> {
        let cache = DividendCache::new(store, config.cache_ttl());
        let coordinator = Arc::new(RefreshCoordinator::new(
            cache.clone(),
            chain,
            RefreshSettings::from_config(config),
        ));
        let resolver = Arc::new(DividendResolver::new(
            coordinator.clone(),
            ResolverSettings::from_config(config),
        ));
        let trader = build_trader(config, cache)?;

        Ok(Self {
            coordinator,
            resolver,
            trader,
            scheduler_settings: SchedulerSettings::from_config(config),
        })
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            resolver: self.resolver.clone(),
            trader: self.trader.clone(),
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.coordinator.clone(), self.scheduler_settings.clone())
    }
}

fn build_trader(config: &Config, cache: DividendCache) -> Result<Option<Arc<TradeExecutor>>> {
    let (Some(datura_key), Some(chutes_key)) = (&config.datura_api_key, &config.chutes_api_key) else {
        info!("Sentiment trading disabled: DATURA_API_KEY and CHUTES_API_KEY are required");
        return Ok(None);
    };
    if !config.paper_trading {
        warn!("Live staking needs wallet signing, which this service does not do; sentiment trading disabled");
        return Ok(None);
    }

    let analyzer = SentimentAnalyzer::new(
        Arc::new(DaturaClient::new(datura_key.clone(), SENTIMENT_HTTP_TIMEOUT)?),
        Arc::new(ChutesScorer::new(
            chutes_key.clone(),
            config.llm_model.clone(),
            SENTIMENT_HTTP_TIMEOUT,
        )?),
        cache,
    );
    info!("Sentiment trading enabled in paper mode with model {}", config.llm_model);
    Ok(Some(Arc::new(TradeExecutor::new(
        Arc::new(analyzer),
        Arc::new(PaperStakeSubmitter::new()),
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::testing::MockChain;

    #[test]
    fn trading_needs_both_keys_and_paper_mode() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let chain: Arc<dyn ChainConnector> = Arc::new(MockChain::new("0x0"));

        let mut config = Config::default();
        assert!(Services::build(&config, store.clone(), chain.clone()).unwrap().trader.is_none());

        config.datura_api_key = Some("d".into());
        config.chutes_api_key = Some("c".into());
        assert!(Services::build(&config, store.clone(), chain.clone()).unwrap().trader.is_some());

        config.paper_trading = false;
        assert!(Services::build(&config, store, chain).unwrap().trader.is_none());
    }
}
