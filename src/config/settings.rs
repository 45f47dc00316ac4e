// src/config/settings.rs
use log::info;
use std::env;
use std::ops::RangeInclusive;
use std::time::Duration;

pub const DEFAULT_CHAIN_ENDPOINT: &str = "https://entrypoint-finney.opentensor.ai:443";
pub const DEFAULT_HOTKEY: &str = "5FFApaS75bv5pJHfAp2FVLBj9ZaXuFDjEypsaBNc1wCfe52v";
pub const DEFAULT_NETUID: u16 = 18;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub cache_ttl_secs: u64,
    pub chain_endpoint: String,
    pub subnet_min: u16,
    pub subnet_max: u16,
    pub refresh_interval_secs: u64,
    pub trigger_expiry_secs: u64,
    pub refresh_max_retries: u32,
    pub refresh_retry_delay_secs: u64,
    pub refresh_soft_limit_secs: u64,
    pub refresh_hard_limit_secs: u64,
    pub chain_call_timeout_ms: u64,
    pub chain_query_concurrency: usize,
    pub rpc_max_retries: usize,
    pub rpc_retry_delay_ms: u64,
    pub default_netuid: u16,
    pub default_hotkey: String,
    pub http_port: u16,
    pub log_level: String,
    pub datura_api_key: Option<String>,
    pub chutes_api_key: Option<String>,
    pub llm_model: String,
    pub paper_trading: bool,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            redis_url: "redis://localhost:6379/0".to_string(),
            cache_ttl_secs: 240,
            chain_endpoint: DEFAULT_CHAIN_ENDPOINT.to_string(),
            subnet_min: 1,
            subnet_max: 50,
            refresh_interval_secs: 60,
            trigger_expiry_secs: 15,
            refresh_max_retries: 3,
            refresh_retry_delay_secs: 60,
            refresh_soft_limit_secs: 240,
            refresh_hard_limit_secs: 300,
            chain_call_timeout_ms: 20_000,
            chain_query_concurrency: 10,
            rpc_max_retries: 3,
            rpc_retry_delay_ms: 500,
            default_netuid: DEFAULT_NETUID,
            default_hotkey: DEFAULT_HOTKEY.to_string(),
            http_port: 8000,
            log_level: "info".to_string(),
            datura_api_key: None,
            chutes_api_key: None,
            llm_model: "unsloth/Llama-3.2-3B-Instruct".to_string(),
            paper_trading: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Config::default();
        Config {
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| {
                // REDIS_HOST/PORT/DB are still honoured for older deployments.
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port: u16 = parse_or("REDIS_PORT", 6379);
                let db: u32 = parse_or("REDIS_DB", 0);
                format!("redis://{}:{}/{}", host, port, db)
            }),
            cache_ttl_secs: parse_or("CACHE_TTL_SECS", d.cache_ttl_secs),
            chain_endpoint: env::var("CHAIN_ENDPOINT").unwrap_or(d.chain_endpoint),
            subnet_min: parse_or("SUBNET_MIN", d.subnet_min),
            subnet_max: parse_or("SUBNET_MAX", d.subnet_max),
            refresh_interval_secs: parse_or("REFRESH_INTERVAL_SECS", d.refresh_interval_secs),
            trigger_expiry_secs: parse_or("TRIGGER_EXPIRY_SECS", d.trigger_expiry_secs),
            refresh_max_retries: parse_or("REFRESH_MAX_RETRIES", d.refresh_max_retries),
            refresh_retry_delay_secs: parse_or(
                "REFRESH_RETRY_DELAY_SECS",
                d.refresh_retry_delay_secs,
            ),
            refresh_soft_limit_secs: parse_or("REFRESH_SOFT_LIMIT_SECS", d.refresh_soft_limit_secs),
            refresh_hard_limit_secs: parse_or("REFRESH_HARD_LIMIT_SECS", d.refresh_hard_limit_secs),
            chain_call_timeout_ms: parse_or("CHAIN_CALL_TIMEOUT_MS", d.chain_call_timeout_ms),
            chain_query_concurrency: parse_or(
                "CHAIN_QUERY_CONCURRENCY",
                d.chain_query_concurrency,
            ),
            rpc_max_retries: parse_or("RPC_MAX_RETRIES", d.rpc_max_retries),
            rpc_retry_delay_ms: parse_or("RPC_RETRY_DELAY_MS", d.rpc_retry_delay_ms),
            default_netuid: parse_or("DEFAULT_NETUID", d.default_netuid),
            default_hotkey: env::var("DEFAULT_HOTKEY").unwrap_or(d.default_hotkey),
            http_port: parse_or("HTTP_PORT", d.http_port),
            log_level: env::var("LOG_LEVEL").unwrap_or(d.log_level),
            datura_api_key: env::var("DATURA_API_KEY").ok().filter(|k| !k.is_empty()),
            chutes_api_key: env::var("CHUTES_API_KEY").ok().filter(|k| !k.is_empty()),
            llm_model: env::var("LLM_MODEL").unwrap_or(d.llm_model),
            paper_trading: parse_or("PAPER_TRADING", d.paper_trading),
        }
    }

    pub fn subnets(&self) -> RangeInclusive<u16> {
        self.subnet_min..=self.subnet_max
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn chain_call_timeout(&self) -> Duration {
        Duration::from_millis(self.chain_call_timeout_ms)
    }

    pub fn validate_and_log(&self) {
        info!("Configuration loaded:");
        info!("  redis_url: {}", self.redis_url);
        info!("  cache_ttl_secs: {}", self.cache_ttl_secs);
        info!("  chain_endpoint: {}", self.chain_endpoint);
        info!("  subnets: {}..={}", self.subnet_min, self.subnet_max);
        info!(
            "  refresh: every {}s (expires after {}s), {} retries {}s apart",
            self.refresh_interval_secs,
            self.trigger_expiry_secs,
            self.refresh_max_retries,
            self.refresh_retry_delay_secs
        );
        info!(
            "  refresh limits: soft {}s, hard {}s",
            self.refresh_soft_limit_secs, self.refresh_hard_limit_secs
        );
        info!(
            "  chain calls: timeout {}ms, concurrency {}",
            self.chain_call_timeout_ms, self.chain_query_concurrency
        );
        info!("  default identity: {}/{}", self.default_netuid, self.default_hotkey);
        info!("  http_port: {}", self.http_port);
        info!("  sentiment enabled: {}", self.sentiment_enabled());
        info!("  paper_trading: {}", self.paper_trading);
    }

    pub fn sentiment_enabled(&self) -> bool {
        self.datura_api_key.is_some() && self.chutes_api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(240));
        assert_eq!(config.subnets(), 1..=50);
        assert_eq!(config.refresh_interval_secs, 60);
        assert_eq!(config.trigger_expiry_secs, 15);
        assert_eq!(config.refresh_max_retries, 3);
        assert_eq!(config.refresh_soft_limit_secs, 240);
        assert_eq!(config.refresh_hard_limit_secs, 300);
        assert_eq!(config.default_netuid, 18);
        assert_eq!(config.log_level, "info");
        assert!(!config.sentiment_enabled());
    }
}
