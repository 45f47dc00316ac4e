// src/error/mod.rs
use log::{debug, error, info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Clone, Error)]
pub enum DividendError {
    /// Network/connectivity issues
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// Chain JSON-RPC errors
    #[error("RPC Error: {0}")]
    RpcError(String),

    /// Cache/Redis errors
    #[error("Cache Error: {0}")]
    CacheError(String),

    /// Timeout errors for chain calls and refresh cycles
    #[error("Timeout Error: {0}")]
    TimeoutError(String),

    /// Malformed chain data, cache values or keys
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Invalid input parameters (subnet out of range, bad address)
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// The chain holds no value for the requested entry
    #[error("Not Found: {0}")]
    NotFound(String),

    /// A refresh cycle failed as a whole
    #[error("Refresh Failed: {0}")]
    RefreshFailed(String),

    /// Tweet search or LLM scoring failed
    #[error("Sentiment Error: {0}")]
    SentimentError(String),

    /// Stake/unstake submission failed
    #[error("Trade Error: {0}")]
    TradeError(String),

    /// Unknown/unclassified errors
    #[error("Unknown Error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for DividendError {
    fn from(err: serde_json::Error) -> Self {
        DividendError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<redis::RedisError> for DividendError {
    fn from(err: redis::RedisError) -> Self {
        DividendError::CacheError(format!("Redis error: {}", err))
    }
}

impl From<reqwest::Error> for DividendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DividendError::TimeoutError(format!("HTTP request timed out: {}", err))
        } else {
            DividendError::NetworkError(format!("HTTP client error: {}", err))
        }
    }
}

impl From<anyhow::Error> for DividendError {
    fn from(err: anyhow::Error) -> Self {
        DividendError::Unknown(format!("Anyhow error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for DividendError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        DividendError::TimeoutError(err.to_string())
    }
}

impl DividendError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            DividendError::NetworkError(_) => true,
            DividendError::RpcError(_) => true,
            DividendError::CacheError(_) => true, // Redis might recover
            DividendError::TimeoutError(_) => true,
            DividendError::ParseError(_) => false, // Data format issues aren't recoverable
            DividendError::ConfigError(_) => false,
            DividendError::InvalidInput(_) => false,
            DividendError::NotFound(_) => false,
            DividendError::RefreshFailed(_) => true,
            DividendError::SentimentError(_) => true,
            DividendError::TradeError(_) => false,
            DividendError::Unknown(_) => true,
        }
    }

    /// Determines if operation should be retried immediately
    pub fn should_retry(&self) -> bool {
        self.is_recoverable()
            && matches!(
                self,
                DividendError::NetworkError(_)
                    | DividendError::RpcError(_)
                    | DividendError::CacheError(_)
                    | DividendError::TimeoutError(_)
                    | DividendError::RefreshFailed(_)
                    | DividendError::Unknown(_)
            )
    }
}

/// Retry policy with fixed or exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Same delay between every attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, delay)
    }

    /// Calculate delay for a given attempt (exponential backoff, capped at `max_delay`)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let factor = 2_u128.saturating_pow(attempt - 1);
        let delay_ms = self.base_delay.as_millis().saturating_mul(factor);
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis()) as u64);

        debug!("Retry attempt {}: delay = {:?}", attempt, delay);
        delay
    }

    /// Execute operation with retry logic
    pub async fn execute<F, T, E, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        E: Into<DividendError>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                sleep(self.delay_for_attempt(attempt)).await;
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    let err: DividendError = e.into();

                    if !err.should_retry() {
                        warn!("Non-retryable error on attempt {}: {}", attempt + 1, err);
                        return Err(err);
                    }

                    warn!(
                        "Attempt {}/{} failed: {} (retrying...)",
                        attempt + 1,
                        self.max_attempts,
                        err
                    );
                    last_error = Some(err);
                }
            }
        }

        error!("All {} retry attempts failed", self.max_attempts);
        Err(last_error
            .unwrap_or_else(|| DividendError::Unknown("Max retries exceeded".to_string())))
    }
}

pub type Result<T> = std::result::Result<T, DividendError>;
