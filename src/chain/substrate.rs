// src/chain/substrate.rs
//! Substrate JSON-RPC (HTTP transport) client for dividend storage.

use super::storage::{
    account_from_key, decode_u64, dividend_key, from_hex, ss58_decode, ss58_encode, subnet_prefix,
    to_hex,
};
use super::{ChainConnector, ChainSession};
use crate::error::{DividendError, Result};
use crate::types::ChainReference;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

const KEYS_PAGE_SIZE: usize = 1000;
const QUERY_CHUNK_SIZE: usize = 500;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct StorageChangeSet {
    #[allow(dead_code)]
    block: String,
    changes: Vec<(String, Option<String>)>,
}

/// Accepts `ws(s)://` endpoints too: Substrate nodes serve HTTP JSON-RPC on the same port.
pub fn http_endpoint(endpoint: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| DividendError::ConfigError(format!("invalid chain endpoint {}: {}", endpoint, e)))?;
    let scheme = match url.scheme() {
        "wss" | "https" => "https",
        "ws" | "http" => "http",
        other => {
            return Err(DividendError::ConfigError(format!(
                "unsupported chain endpoint scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| DividendError::ConfigError(format!("cannot use {} over {}", endpoint, scheme)))?;
    Ok(url)
}

/// Connector with per-call retries and jitter.
#[derive(Debug, Clone)]
pub struct SubstrateRpcClient {
    http: reqwest::Client,
    max_retries: usize,
    retry_delay: Duration,
}

impl SubstrateRpcClient {
    pub fn new(request_timeout: Duration, max_retries: usize, retry_delay: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DividendError::ConfigError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            max_retries: max_retries.max(1),
            retry_delay,
        })
    }
}

#[async_trait]
impl ChainConnector for SubstrateRpcClient {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainSession>> {
        let session = SubstrateSession {
            http: self.http.clone(),
            url: http_endpoint(endpoint)?,
            next_id: AtomicU64::new(1),
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            closed: AtomicBool::new(false),
        };
        let chain: String = session.call("system_chain", json!([])).await?;
        info!("Connected to chain '{}' at {}", chain, session.url);
        Ok(Arc::new(session))
    }

    fn validate_account(&self, hotkey: &str) -> Result<()> {
        ss58_decode(hotkey).map(|_| ())
    }
}

pub struct SubstrateSession {
    http: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
    max_retries: usize,
    retry_delay: Duration,
    closed: AtomicBool,
}

impl SubstrateSession {
    async fn call_once<T: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let response = self.http.post(self.url.clone()).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DividendError::RpcError(format!("{} returned HTTP {}: {}", method, status, text)));
        }
        let parsed: RpcResponse<T> = response.json().await?;
        if let Some(err) = parsed.error {
            return Err(DividendError::RpcError(format!("{} failed ({}): {}", method, err.code, err.message)));
        }
        Ok(parsed.result)
    }

    async fn call_opt<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let mut last_error = None;
        for attempt in 0..self.max_retries {
            match self.call_once(method, &params).await {
                Ok(result) => {
                    debug!("[RPC - {}] succeeded on attempt {}", method, attempt + 1);
                    return Ok(result);
                }
                Err(e) if e.should_retry() => {
                    warn!("[RPC - {}] attempt {}/{} failed: {}", method, attempt + 1, self.max_retries, e);
                    last_error = Some(e);
                    if attempt + 1 < self.max_retries {
                        let mut delay_ms = self.retry_delay.as_millis() as u64;
                        if delay_ms > 0 {
                            delay_ms += rand::thread_rng().gen_range(0..(delay_ms / 4).max(1));
                        }
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        error!("[RPC - {}] All RPC attempts failed.", method);
        Err(last_error.unwrap_or_else(|| DividendError::RpcError(format!("{}: no attempts made", method))))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.call_opt(method, params)
            .await?
            .ok_or_else(|| DividendError::RpcError(format!("{} returned null", method)))
    }

    async fn keys_with_prefix(&self, prefix: &[u8], at: &ChainReference) -> Result<Vec<String>> {
        let prefix_hex = to_hex(prefix);
        let mut keys: Vec<String> = Vec::new();
        loop {
            let start_key = keys.last().cloned();
            let page: Vec<String> = self
                .call(
                    "state_getKeysPaged",
                    json!([prefix_hex, KEYS_PAGE_SIZE, start_key, at.as_str()]),
                )
                .await?;
            let done = page.len() < KEYS_PAGE_SIZE;
            keys.extend(page);
            if done {
                return Ok(keys);
            }
        }
    }
}

impl Drop for SubstrateSession {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Relaxed) {
            debug!("Chain session for {} dropped without close", self.url);
        }
    }
}

#[async_trait]
impl ChainSession for SubstrateSession {
    async fn current_reference(&self) -> Result<ChainReference> {
        let hash: String = self.call("chain_getBlockHash", json!([])).await?;
        Ok(ChainReference::new(hash))
    }

    async fn range_query(&self, netuid: u16, reference: &ChainReference) -> Result<Vec<(String, u64)>> {
        let keys = self.keys_with_prefix(&subnet_prefix(netuid), reference).await?;
        let mut entries = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(QUERY_CHUNK_SIZE) {
            let change_sets: Vec<StorageChangeSet> = self
                .call("state_queryStorageAt", json!([chunk, reference.as_str()]))
                .await?;
            for (key_hex, value_hex) in change_sets.into_iter().flat_map(|set| set.changes) {
                let Some(value_hex) = value_hex else { continue };
                let account = account_from_key(&from_hex(&key_hex)?)?;
                let dividend = decode_u64(&from_hex(&value_hex)?)?;
                entries.push((ss58_encode(&account), dividend));
            }
        }
        debug!("Subnet {} returned {} entries at {}", netuid, entries.len(), reference);
        Ok(entries)
    }

    async fn point_query(&self, netuid: u16, hotkey: &str, reference: &ChainReference) -> Result<Option<u64>> {
        let account = ss58_decode(hotkey)?;
        let key = to_hex(&dividend_key(netuid, &account));
        let value: Option<String> = self
            .call_opt("state_getStorage", json!([key, reference.as_str()]))
            .await?;
        value.map(|raw| decode_u64(&from_hex(&raw)?)).transpose()
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::Relaxed) {
            debug!("Closed chain session for {}", self.url);
        }
    }
}
