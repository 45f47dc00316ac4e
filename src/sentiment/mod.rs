// src/sentiment/mod.rs
//! Subnet sentiment: tweet search, LLM scoring and a TTL-bounded result cache.

pub mod datura;
pub mod llm;

pub use datura::DaturaClient;
pub use llm::ChutesScorer;

use crate::cache::DividendCache;
use crate::error::{DividendError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MIN_SCORE: f64 = -100.0;
pub const MAX_SCORE: f64 = 100.0;

#[async_trait]
pub trait TweetSource: Send + Sync {
    /// Tweet texts mentioning the subnet.
    async fn search(&self, netuid: u16) -> Result<Vec<String>>;
}

#[async_trait]
pub trait SentimentScorer: Send + Sync {
    /// Overall score of `text` in `[MIN_SCORE, MAX_SCORE]`.
    async fn score(&self, text: &str) -> Result<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub netuid: u16,
    pub score: f64,
    pub tweets_analyzed: usize,
    #[serde(default)]
    pub cached: bool,
}

/// Pulls the first number out of a model reply and clamps it into range.
pub fn parse_score(reply: &str) -> Result<f64> {
    let start = reply
        .char_indices()
        .find(|(i, c)| {
            c.is_ascii_digit()
                || ((*c == '-' || *c == '+')
                    && reply[i + 1..].chars().next().is_some_and(|n| n.is_ascii_digit()))
        })
        .map(|(i, _)| i)
        .ok_or_else(|| DividendError::SentimentError(format!("no score in model reply '{}'", reply.trim())))?;

    let tail = &reply[start..];
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in tail.char_indices() {
        let accepted = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (c == '.' && !seen_dot && i > 0);
        if !accepted {
            break;
        }
        seen_dot |= c == '.';
        end = i + c.len_utf8();
    }

    let number = tail[..end].trim_end_matches('.');
    let score: f64 = number
        .parse()
        .map_err(|e| DividendError::SentimentError(format!("bad score '{}': {}", number, e)))?;
    Ok(score.clamp(MIN_SCORE, MAX_SCORE))
}

pub struct SentimentAnalyzer {
    tweets: Arc<dyn TweetSource>,
    scorer: Arc<dyn SentimentScorer>,
    cache: DividendCache,
}

impl SentimentAnalyzer {
    pub fn new(tweets: Arc<dyn TweetSource>, scorer: Arc<dyn SentimentScorer>, cache: DividendCache) -> Self {
        Self { tweets, scorer, cache }
    }

    /// Serves a cached score when one is live, otherwise searches and scores afresh.
    pub async fn analyze(&self, netuid: u16) -> Result<SentimentResult> {
        match self.cache.get_sentiment(netuid).await {
            Ok(Some(raw)) => match serde_json::from_str::<SentimentResult>(&raw) {
                Ok(mut cached) => {
                    debug!("Sentiment cache hit for netuid {}", netuid);
                    cached.cached = true;
                    return Ok(cached);
                }
                Err(e) => warn!("Ignoring unparsable cached sentiment for {}: {}", netuid, e),
            },
            Ok(None) => {}
            Err(e) => warn!("Sentiment cache read failed for {}: {}", netuid, e),
        }

        let tweets: Vec<String> = self
            .tweets
            .search(netuid)
            .await?
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .collect();
        if tweets.is_empty() {
            return Err(DividendError::SentimentError(format!("no tweets found for netuid {}", netuid)));
        }

        let score = self.scorer.score(&tweets.join("\n")).await?;
        let result = SentimentResult {
            netuid,
            score,
            tweets_analyzed: tweets.len(),
            cached: false,
        };
        info!(
            "Sentiment for netuid {}: {:.1} over {} tweets",
            netuid, result.score, result.tweets_analyzed
        );

        if let Err(e) = self.cache.put_sentiment(netuid, &serde_json::to_string(&result)?).await {
            warn!("Could not cache sentiment for {}: {}", netuid, e);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use assert_approx_eq::assert_approx_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedTweets(Vec<&'static str>);

    #[async_trait]
    impl TweetSource for FixedTweets {
        async fn search(&self, _netuid: u16) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|t| t.to_string()).collect())
        }
    }

    struct CountingScorer {
        score: f64,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SentimentScorer for CountingScorer {
        async fn score(&self, text: &str) -> Result<f64> {
            assert!(!text.is_empty());
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.score)
        }
    }

    fn cache() -> DividendCache {
        DividendCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(240))
    }

    #[test]
    fn scores_are_parsed_and_clamped() {
        assert_approx_eq!(parse_score("42").unwrap(), 42.0);
        assert_approx_eq!(parse_score("Score: -37.5.").unwrap(), -37.5);
        assert_approx_eq!(parse_score(" +12 overall").unwrap(), 12.0);
        assert_approx_eq!(parse_score("250").unwrap(), 100.0);
        assert_approx_eq!(parse_score("-9000").unwrap(), -100.0);
        assert!(parse_score("very positive").is_err());
        assert!(parse_score("- nothing").is_err());
    }

    #[tokio::test]
    async fn second_analysis_is_served_from_cache() {
        let scorer = Arc::new(CountingScorer {
            score: 64.0,
            calls: AtomicUsize::new(0),
        });
        let cache = cache();
        let analyzer = SentimentAnalyzer::new(
            Arc::new(FixedTweets(vec!["bullish on sn18", "great subnet"])),
            scorer.clone(),
            cache.clone(),
        );

        let first = analyzer.analyze(18).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.tweets_analyzed, 2);
        assert_approx_eq!(first.score, 64.0);

        let second = analyzer.analyze(18).await.unwrap();
        assert!(second.cached);
        assert_approx_eq!(second.score, 64.0);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 1);
        assert!(cache.get_sentiment(18).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn no_tweets_is_an_error() {
        let analyzer = SentimentAnalyzer::new(
            Arc::new(FixedTweets(vec!["  "])),
            Arc::new(CountingScorer {
                score: 1.0,
                calls: AtomicUsize::new(0),
            }),
            cache(),
        );
        assert!(matches!(
            analyzer.analyze(3).await.unwrap_err(),
            DividendError::SentimentError(_)
        ));
    }
}
