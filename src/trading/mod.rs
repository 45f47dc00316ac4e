// src/trading/mod.rs
//! Sentiment-driven stake sizing and submission.

pub mod paper;

pub use paper::PaperStakeSubmitter;

use crate::error::{DividendError, Result};
use crate::sentiment::{SentimentAnalyzer, SentimentResult};
use async_trait::async_trait;
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;

/// Stake moved per point of sentiment.
pub const TAO_PER_SENTIMENT_POINT: f64 = 0.01;
pub const RAO_PER_TAO: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeAction {
    AddStake,
    Unstake,
    NoAction,
}

impl StakeAction {
    pub fn for_delta(delta_tao: f64) -> Self {
        if delta_tao > 0.0 {
            StakeAction::AddStake
        } else if delta_tao < 0.0 {
            StakeAction::Unstake
        } else {
            StakeAction::NoAction
        }
    }
}

/// Signed TAO amount for a sentiment score: positive stakes, negative unstakes.
pub fn stake_delta(score: f64) -> f64 {
    score * TAO_PER_SENTIMENT_POINT
}

pub fn tao_to_rao(tao: f64) -> u64 {
    (tao.abs() * RAO_PER_TAO as f64).round() as u64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakeReceipt {
    pub tx_id: String,
    pub action: StakeAction,
    pub netuid: u16,
    pub hotkey: String,
    /// Amount actually moved, always non-negative.
    pub amount_tao: f64,
    pub simulated: bool,
}

#[async_trait]
pub trait StakeSubmitter: Send + Sync {
    async fn submit_stake_delta(&self, hotkey: &str, netuid: u16, signed_amount: f64) -> Result<StakeReceipt>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeReport {
    pub sentiment: SentimentResult,
    pub action: StakeAction,
    pub delta_tao: f64,
    pub receipt: Option<StakeReceipt>,
}

pub struct TradeExecutor {
    analyzer: Arc<SentimentAnalyzer>,
    submitter: Arc<dyn StakeSubmitter>,
}

impl TradeExecutor {
    pub fn new(analyzer: Arc<SentimentAnalyzer>, submitter: Arc<dyn StakeSubmitter>) -> Self {
        Self { analyzer, submitter }
    }

    /// Scores the subnet and stakes or unstakes in proportion. A zero score submits nothing.
    pub async fn trade_on_sentiment(&self, netuid: u16, hotkey: &str) -> Result<TradeReport> {
        let sentiment = self.analyzer.analyze(netuid).await?;
        let delta_tao = stake_delta(sentiment.score);
        let action = StakeAction::for_delta(delta_tao);

        let receipt = match action {
            StakeAction::NoAction => {
                info!("Neutral sentiment for netuid {}, no stake change", netuid);
                None
            }
            _ => {
                let receipt = self
                    .submitter
                    .submit_stake_delta(hotkey, netuid, delta_tao)
                    .await
                    .map_err(|e| {
                        error!("Stake submission for {}/{} failed: {}", netuid, hotkey, e);
                        match e {
                            DividendError::TradeError(_) => e,
                            other => DividendError::TradeError(other.to_string()),
                        }
                    })?;
                info!(
                    "{:?} of {:.4} TAO on {}/{} (tx {})",
                    receipt.action, receipt.amount_tao, netuid, hotkey, receipt.tx_id
                );
                Some(receipt)
            }
        };

        Ok(TradeReport {
            sentiment,
            action,
            delta_tao,
            receipt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DividendCache, MemoryCache};
    use crate::sentiment::{SentimentScorer, TweetSource};
    use assert_approx_eq::assert_approx_eq;
    use std::time::Duration;

    struct OneTweet;

    #[async_trait]
    impl TweetSource for OneTweet {
        async fn search(&self, _netuid: u16) -> Result<Vec<String>> {
            Ok(vec!["sn7 shipping".to_string()])
        }
    }

    struct Fixed(f64);

    #[async_trait]
    impl SentimentScorer for Fixed {
        async fn score(&self, _text: &str) -> Result<f64> {
            Ok(self.0)
        }
    }

    fn executor(score: f64, submitter: Arc<PaperStakeSubmitter>) -> TradeExecutor {
        let cache = DividendCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(240));
        let analyzer = SentimentAnalyzer::new(Arc::new(OneTweet), Arc::new(Fixed(score)), cache);
        TradeExecutor::new(Arc::new(analyzer), submitter)
    }

    #[test]
    fn sizing_follows_score_sign() {
        assert_approx_eq!(stake_delta(37.0), 0.37);
        assert_approx_eq!(stake_delta(-100.0), -1.0);
        assert_eq!(StakeAction::for_delta(stake_delta(0.0)), StakeAction::NoAction);
        assert_eq!(StakeAction::for_delta(0.2), StakeAction::AddStake);
        assert_eq!(StakeAction::for_delta(-0.2), StakeAction::Unstake);
        assert_eq!(tao_to_rao(-0.37), 370_000_000);
    }

    #[tokio::test]
    async fn positive_sentiment_stakes() {
        let submitter = Arc::new(PaperStakeSubmitter::new());
        let report = executor(50.0, submitter.clone())
            .trade_on_sentiment(7, "5Hot")
            .await
            .unwrap();

        assert_eq!(report.action, StakeAction::AddStake);
        assert_approx_eq!(report.delta_tao, 0.5);
        let receipt = report.receipt.unwrap();
        assert!(receipt.simulated);
        assert_approx_eq!(submitter.position_tao(7, "5Hot"), 0.5);
    }

    #[tokio::test]
    async fn neutral_sentiment_submits_nothing() {
        let submitter = Arc::new(PaperStakeSubmitter::new());
        let report = executor(0.0, submitter.clone())
            .trade_on_sentiment(7, "5Hot")
            .await
            .unwrap();

        assert_eq!(report.action, StakeAction::NoAction);
        assert!(report.receipt.is_none());
        assert!(submitter.history().is_empty());
    }
}
