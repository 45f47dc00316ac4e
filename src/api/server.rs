// src/api/server.rs
//! axum router and handlers for the dividend API.

use super::error::ApiError;
use crate::error::DividendError;
use crate::refresh::RefreshOutcome;
use crate::resolver::{DividendListing, DividendQuery, DividendResolver};
use crate::trading::TradeExecutor;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;

pub const API_PREFIX: &str = "/api/v1";

#[derive(Clone)]
pub struct ApiState {
    pub resolver: Arc<DividendResolver>,
    /// Present only when sentiment trading is configured.
    pub trader: Option<Arc<TradeExecutor>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DividendParams {
    #[serde(default, alias = "subnetId")]
    pub netuid: Option<u16>,
    #[serde(default, alias = "accountKey")]
    pub hotkey: Option<String>,
    #[serde(default)]
    pub trade: bool,
}

pub fn router(state: ApiState) -> Router {
    let api = Router::new()
        .route("/tao-dividends", get(get_dividends))
        .route("/tao-dividends/all", get(list_all_dividends))
        .route("/tao-dividends/status", get(refresh_status))
        .route("/tao-dividends/refresh", post(trigger_refresh))
        .route("/tao-dividends/cache-info", get(cache_info));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest(API_PREFIX, api)
        .with_state(state)
}

pub struct ApiServer {
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(port: u16, state: ApiState) -> Self {
        Self { port, state }
    }

    /// Serves until `shutdown` flips or its sender goes away.
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> Result<(), DividendError> {
        let app = router(self.state);
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.port))
            .await
            .map_err(|e| DividendError::NetworkError(format!("cannot bind port {}: {}", self.port, e)))?;

        info!("HTTP API listening on port {} under {}", self.port, API_PREFIX);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| DividendError::NetworkError(format!("HTTP server error: {}", e)))?;
        info!("HTTP API stopped");
        Ok(())
    }
}

fn listing_json(listing: DividendListing) -> Value {
    json!({
        "data": listing.records,
        "block_reference": listing.block_reference,
        "cached": listing.cached,
    })
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "TAO dividend cache API", "docs": format!("{}/tao-dividends", API_PREFIX) }))
}

async fn health_check(State(state): State<ApiState>) -> (StatusCode, Json<Value>) {
    let cache = state.resolver.coordinator().cache().store().ping().await;
    let (status, cache_state) = match &cache {
        Ok(()) => (StatusCode::OK, "ok".to_string()),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    };
    (
        status,
        Json(json!({
            "status": if cache.is_ok() { "healthy" } else { "degraded" },
            "cache": cache_state,
            "timestamp": chrono::Utc::now().timestamp(),
        })),
    )
}

async fn get_dividends(
    State(state): State<ApiState>,
    Query(params): Query<DividendParams>,
) -> Result<Json<Value>, ApiError> {
    let query = state
        .resolver
        .get_range(params.netuid, params.hotkey.as_deref())
        .await?;

    match query {
        DividendQuery::Many(listing) => Ok(Json(listing_json(listing))),
        DividendQuery::Single(point) => {
            let stake_tx_triggered = params.trade && spawn_trade(&state, point.netuid, &point.hotkey);
            Ok(Json(json!({
                "netuid": point.netuid,
                "hotkey": point.hotkey,
                "dividend": point.dividend,
                "cached": point.cached,
                "stake_tx_triggered": stake_tx_triggered,
            })))
        }
    }
}

/// Starts a sentiment trade in the background; returns whether one was started.
fn spawn_trade(state: &ApiState, netuid: u16, hotkey: &str) -> bool {
    let Some(trader) = state.trader.clone() else {
        warn!("Trade requested for {}/{} but sentiment trading is not configured", netuid, hotkey);
        return false;
    };
    let hotkey = hotkey.to_string();
    tokio::spawn(async move {
        match trader.trade_on_sentiment(netuid, &hotkey).await {
            Ok(report) => info!(
                "Sentiment trade for {}/{}: score {:.1}, {:?}",
                netuid, hotkey, report.sentiment.score, report.action
            ),
            Err(e) => error!("Sentiment trade for {}/{} failed: {}", netuid, hotkey, e),
        }
    });
    true
}

async fn list_all_dividends(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let listing = state.resolver.list_all().await?;
    Ok(Json(listing_json(listing)))
}

async fn refresh_status(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let snapshot = state.resolver.status().await?;
    Ok(Json(serde_json::to_value(snapshot).map_err(DividendError::from)?))
}

async fn trigger_refresh(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    match state.resolver.coordinator().refresh_all().await? {
        RefreshOutcome::Skipped => Ok(Json(json!({ "status": "skipped", "processed": 0 }))),
        RefreshOutcome::Completed(report) => Ok(Json(json!({
            "status": "completed",
            "processed": report.processed,
            "block_reference": report.reference,
            "failed_subnets": report.failed_subnets,
        }))),
    }
}

async fn cache_info(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let info = state.resolver.cache_info().await?;
    Ok(Json(serde_json::to_value(info).map_err(DividendError::from)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DividendCache, MemoryCache};
    use crate::config::settings::DEFAULT_HOTKEY;
    use crate::refresh::{RefreshCoordinator, RefreshSettings};
    use crate::resolver::{DefaultIdentity, ResolverSettings};
    use crate::testing::MockChain;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(chain: &MockChain) -> Router {
        let cache = DividendCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(240));
        let coordinator = Arc::new(RefreshCoordinator::new(
            cache,
            Arc::new(chain.clone()),
            RefreshSettings {
                endpoint: "mock://chain".to_string(),
                subnets: 1..=50,
                chain_call_timeout: Duration::from_secs(5),
                query_concurrency: 8,
                soft_limit: Duration::from_secs(240),
            },
        ));
        let resolver = DividendResolver::new(
            coordinator,
            ResolverSettings {
                endpoint: "mock://chain".to_string(),
                subnets: 1..=50,
                chain_call_timeout: Duration::from_secs(5),
                defaults: DefaultIdentity {
                    netuid: 18,
                    hotkey: DEFAULT_HOTKEY.to_string(),
                },
            },
        );
        router(ApiState {
            resolver: Arc::new(resolver),
            trader: None,
        })
    }

    async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn point_lookup_misses_then_hits() {
        let chain = MockChain::new("0xhead").with_point(18, DEFAULT_HOTKEY, 250);
        let app = app(&chain);
        let uri = format!("/api/v1/tao-dividends?netuid=18&hotkey={}", DEFAULT_HOTKEY);

        let (status, body) = call(&app, "GET", &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "netuid": 18,
                "hotkey": DEFAULT_HOTKEY,
                "dividend": 250,
                "cached": false,
                "stake_tx_triggered": false,
            })
        );

        let (_, body) = call(&app, "GET", &uri).await;
        assert_eq!(body["cached"], json!(true));
        assert_eq!(chain.stats().point_calls, 1);
    }

    #[tokio::test]
    async fn aliases_and_trade_flag_are_accepted() {
        let chain = MockChain::new("0xhead").with_point(4, "5Alias", 9);
        let (status, body) = call(
            &app(&chain),
            "GET",
            "/api/v1/tao-dividends?subnetId=4&accountKey=5Alias&trade=true",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dividend"], json!(9));
        // No trader configured.
        assert_eq!(body["stake_tx_triggered"], json!(false));
    }

    #[tokio::test]
    async fn invalid_and_missing_entries_map_to_client_errors() {
        let chain = MockChain::new("0xhead");
        let app = app(&chain);

        let (status, body) = call(&app, "GET", "/api/v1/tao-dividends?netuid=99&hotkey=x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("99"));

        let (status, _) = call(&app, "GET", "/api/v1/tao-dividends?netuid=3&hotkey=nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(chain.stats().connects, 1);
    }

    #[tokio::test]
    async fn status_before_any_refresh() {
        let (status, body) = call(&app(&MockChain::new("0xhead")), "GET", "/api/v1/tao-dividends/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "status": "not_started", "start_time": null, "progress": null })
        );
    }

    #[tokio::test]
    async fn refresh_then_list_all_from_cache() {
        let chain = MockChain::new("0xhead")
            .with_one_record_per_subnet(1..=50)
            .with_failing_subnet(37);
        let app = app(&chain);

        let (status, body) = call(&app, "POST", "/api/v1/tao-dividends/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("completed"));
        assert_eq!(body["processed"], json!(49));
        assert_eq!(body["failed_subnets"], json!([37]));

        let (_, body) = call(&app, "GET", "/api/v1/tao-dividends/all").await;
        assert_eq!(body["cached"], json!(true));
        assert_eq!(body["block_reference"], json!("0xhead"));
        assert_eq!(body["data"].as_array().unwrap().len(), 49);

        let (_, body) = call(&app, "GET", "/api/v1/tao-dividends?netuid=5").await;
        assert_eq!(
            body["data"],
            json!([{ "netuid": 5, "hotkey": "hotkey-5", "dividend": 50 }])
        );

        let (_, body) = call(&app, "GET", "/api/v1/tao-dividends/cache-info").await;
        assert_eq!(body["total_dividend_keys"], json!(49));
    }

    #[tokio::test]
    async fn health_reports_cache_state() {
        let (status, body) = call(&app(&MockChain::new("0xhead")), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
    }
}
