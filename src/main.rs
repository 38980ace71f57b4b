//! Sentinel — prediction-market anomaly research pipeline.
//!
//! Boots the warehouse, cache, clients and pipeline, serves the analysis
//! API, and runs the background loops: strategy-queue drain and periodic
//! strategy monitoring.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel_backend::api::{build_router, ApiState};
use sentinel_backend::clients::{ExplorerClient, MarketApiClient};
use sentinel_backend::config::Config;
use sentinel_backend::monitor::{strategy::start_periodic_monitoring, MonitorConfig, StrategyMonitor};
use sentinel_backend::pipeline::{IngestPipeline, StrategyJob};
use sentinel_backend::rolling::RollingStateEngine;
use sentinel_backend::storage::{KvCache, Warehouse};
use sentinel_backend::wallet::WalletEnricher;

#[derive(Debug, Parser)]
#[command(name = "sentinel", about = "Prediction-market anomaly research pipeline")]
struct Args {
    /// Override PORT from the environment.
    #[arg(long)]
    port: Option<u16>,
    /// Override DATABASE_PATH from the environment.
    #[arg(long)]
    database: Option<String>,
    /// Skip the periodic strategy monitor.
    #[arg(long, default_value_t = false)]
    no_monitor: bool,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env().context("load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(db) = args.database {
        config.database_path = db;
    }
    init_tracing();
    info!(port = config.port, db = config.database_path, "sentinel starting");

    let warehouse = match Warehouse::new(&config.database_path) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!(error = %e, "warehouse unavailable; research endpoints degraded");
            None
        }
    };
    let cache = warehouse.as_ref().map(KvCache::new);

    let market_client = MarketApiClient::new(&config.market_api_base, config.http_timeout_secs)
        .map_err(|e| {
            warn!(error = %e, "market client unavailable");
            e
        })
        .ok();
    let explorer = ExplorerClient::new(
        &config.explorer_api_base,
        config.explorer_api_key.clone(),
        config.http_timeout_secs,
    )
    .ok();

    let enricher = cache.as_ref().map(|cache| {
        Arc::new(WalletEnricher::new(
            cache.clone(),
            explorer,
            config.ttls.wallet_secs,
        ))
    });

    // Streaming pipeline and strategy queue.
    let rolling = Arc::new(RollingStateEngine::new(config.hawkes, config.cusum));
    let (job_tx, mut job_rx) = mpsc::channel::<StrategyJob>(1_024);
    let _pipeline = enricher.as_ref().map(|enricher| {
        Arc::new(IngestPipeline::new(
            &config,
            rolling.clone(),
            enricher.clone(),
            cache.clone(),
            job_tx.clone(),
        ))
    });

    tokio::spawn(async move {
        while let Some(job) = job_rx.recv().await {
            info!(
                token_id = job.token_id,
                strength = job.score.signal_strength.as_str(),
                composite = format!("{:.3}", job.score.composite),
                "strategy job"
            );
        }
    });

    // Periodic strategy monitoring.
    let monitor = warehouse.as_ref().map(|wh| {
        Arc::new(StrategyMonitor::new(
            wh.clone(),
            MonitorConfig {
                check_interval_minutes: config.monitor_interval_minutes,
                ..MonitorConfig::default()
            },
        ))
    });
    let _monitor_handle = match (&monitor, args.no_monitor) {
        (Some(m), false) => Some(start_periodic_monitoring(m.clone())),
        _ => None,
    };

    let state = ApiState {
        config: Arc::new(config.clone()),
        warehouse,
        market_client,
        enricher,
        monitor,
        optimize_abort: Arc::new(AtomicBool::new(false)),
    };
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    info!(addr, "analysis API listening");
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}
