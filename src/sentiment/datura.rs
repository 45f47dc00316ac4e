// src/sentiment/datura.rs
//! Datura tweet search.

use super::TweetSource;
use crate::error::{DividendError, Result};
use async_trait::async_trait;
use log::{debug, error};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DATURA_SEARCH_URL: &str = "https://apis.datura.ai/twitter";
const TWEET_COUNT: usize = 5;

#[derive(Debug, Deserialize)]
struct Tweet {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DaturaClient {
    http: reqwest::Client,
    api_key: String,
    search_url: String,
}

impl DaturaClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::with_url(api_key, DATURA_SEARCH_URL, timeout)
    }

    pub fn with_url(api_key: impl Into<String>, search_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DividendError::ConfigError(format!("failed to build Datura client: {}", e)))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            search_url: search_url.to_string(),
        })
    }

    fn query_for(netuid: u16) -> String {
        format!("Bittensor netuid {}", netuid)
    }
}

#[async_trait]
impl TweetSource for DaturaClient {
    async fn search(&self, netuid: u16) -> Result<Vec<String>> {
        let body = json!({
            "query": Self::query_for(netuid),
            "sort": "Top",
            "lang": "en",
            "count": TWEET_COUNT,
        });
        let response = self
            .http
            .post(&self.search_url)
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Error searching tweets ({}): {}", status, text);
            return Err(DividendError::SentimentError(format!("tweet search returned HTTP {}", status)));
        }

        let tweets: Vec<Tweet> = response.json().await?;
        let texts: Vec<String> = tweets.into_iter().filter_map(|t| t.text).collect();
        debug!("Datura returned {} tweets for netuid {}", texts.len(), netuid);
        Ok(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tweets_without_text_are_tolerated() {
        let raw = r#"[{"text":"sn18 is up"},{"id":"42"},{"text":null}]"#;
        let tweets: Vec<Tweet> = serde_json::from_str(raw).unwrap();
        let texts: Vec<String> = tweets.into_iter().filter_map(|t| t.text).collect();
        assert_eq!(texts, vec!["sn18 is up".to_string()]);
        assert_eq!(DaturaClient::query_for(18), "Bittensor netuid 18");
    }
}
