// src/sentiment/llm.rs
//! Chutes chat-completions scorer.

use super::{parse_score, SentimentScorer};
use crate::error::{DividendError, Result};
use async_trait::async_trait;
use log::{debug, error};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const CHUTES_COMPLETIONS_URL: &str = "https://llm.chutes.ai/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "unsloth/Llama-3.2-3B-Instruct";

const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

fn sentiment_prompt(tweets: &str) -> String {
    format!(
        "Rate the overall sentiment of these tweets from -100 (very negative) to 100 (very positive). \
         Reply with the number only.\n\nTweets:\n{}",
        tweets
    )
}

#[derive(Debug, Clone)]
pub struct ChutesScorer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl ChutesScorer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::with_url(api_key, model, CHUTES_COMPLETIONS_URL, timeout)
    }

    pub fn with_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DividendError::ConfigError(format!("failed to build LLM client: {}", e)))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl SentimentScorer for ChutesScorer {
    async fn score(&self, text: &str) -> Result<f64> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": sentiment_prompt(text) }],
            "stream": false,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Failed to call Chutes API ({}): {}", status, text);
            return Err(DividendError::SentimentError(format!("LLM returned HTTP {}", status)));
        }

        let completion: Completion = response.json().await?;
        let reply = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DividendError::SentimentError("LLM returned no choices".to_string()))?;
        debug!("LLM reply: {}", reply.trim());
        parse_score(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_content_is_extracted() {
        let raw = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":" 35 "}}]}"#;
        let completion: Completion = serde_json::from_str(raw).unwrap();
        assert_eq!(completion.choices[0].message.content.trim(), "35");
        assert!(sentiment_prompt("gm").ends_with("gm"));
    }
}
