pub mod settings;

pub use settings::Config;

use crate::error::DividendError;
use std::sync::Arc;

/// Loads and validates the application configuration. Logging it is left to the caller,
/// which may not have a logger yet.
pub fn load_config() -> Result<Arc<Config>, DividendError> {
    dotenv::dotenv().ok(); // Load .env file if present, ignore errors

    let config = Config::from_env();

    if config.redis_url.is_empty() {
        return Err(DividendError::ConfigError("REDIS_URL cannot be empty".to_string()));
    }
    if config.chain_endpoint.is_empty() {
        return Err(DividendError::ConfigError("CHAIN_ENDPOINT cannot be empty".to_string()));
    }
    if config.subnet_min == 0 || config.subnet_min > config.subnet_max {
        return Err(DividendError::ConfigError(format!(
            "invalid subnet range {}..={}",
            config.subnet_min, config.subnet_max
        )));
    }
    if config.cache_ttl_secs == 0 {
        return Err(DividendError::ConfigError("CACHE_TTL_SECS must be positive".to_string()));
    }
    if config.refresh_soft_limit_secs > config.refresh_hard_limit_secs {
        return Err(DividendError::ConfigError(
            "REFRESH_SOFT_LIMIT_SECS must not exceed REFRESH_HARD_LIMIT_SECS".to_string(),
        ));
    }

    Ok(Arc::new(config))
}
