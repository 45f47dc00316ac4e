// src/main.rs
use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tao_dividend_cache::{
    api::ApiServer,
    cache::{CacheStore, RedisCache},
    chain::{ChainConnector, SubstrateRpcClient},
    config::load_config,
    refresh::RefreshOutcome,
    utils::setup_logging,
    Services,
};
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "tao-dividend-cache", about = "Caches Bittensor subnet dividends and serves them over HTTP")]
struct Cli {
    /// Run a single refresh cycle and exit.
    #[arg(long)]
    once: bool,

    /// Serve the API without the periodic refresh.
    #[arg(long)]
    no_scheduler: bool,

    /// Overrides HTTP_PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Overrides LOG_LEVEL.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = (*load_config()?).clone();

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    setup_logging(level).context("failed to initialize logging")?;
    info!("TAO dividend cache starting");
    config.validate_and_log();

    if let Some(port) = cli.port {
        config.http_port = port;
    }

    // An unreachable cache is fatal at startup.
    let store: Arc<dyn CacheStore> = match RedisCache::connect(&config.redis_url).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            error!("Failed to connect to Redis at {}: {}", config.redis_url, e);
            return Err(e.into());
        }
    };

    let chain: Arc<dyn ChainConnector> = Arc::new(SubstrateRpcClient::new(
        config.chain_call_timeout(),
        config.rpc_max_retries,
        Duration::from_millis(config.rpc_retry_delay_ms),
    )?);
    let services = Services::build(&config, store, chain)?;

    if cli.once {
        return match services.coordinator.refresh_all().await? {
            RefreshOutcome::Skipped => {
                warn!("A refresh is already in progress elsewhere; nothing done");
                Ok(())
            }
            RefreshOutcome::Completed(report) => {
                info!("Refreshed {} records at {}", report.processed, report.reference);
                Ok(())
            }
        };
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = if cli.no_scheduler {
        info!("Periodic refresh disabled by --no-scheduler");
        None
    } else {
        Some(tokio::spawn(services.scheduler().run(shutdown_rx.clone())))
    };

    let server = ApiServer::new(config.http_port, services.api_state());
    let mut server_handle = tokio::spawn(server.start(shutdown_rx));

    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            (&mut server_handle).await
        }
        result = &mut server_handle => {
            let _ = shutdown_tx.send(true);
            result
        }
    };
    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task ended abnormally: {}", e),
    }

    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }
    services.coordinator.wait_idle().await;

    info!("TAO dividend cache stopped");
    Ok(())
}
