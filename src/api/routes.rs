//! Router assembly and shared API state.

use crate::api::analysis;
use crate::clients::MarketApiClient;
use crate::config::Config;
use crate::monitor::StrategyMonitor;
use crate::storage::Warehouse;
use crate::wallet::WalletEnricher;
use axum::routing::{get, post};
use axum::Router;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    /// Absent when storage is not configured; research POSTs then 503.
    pub warehouse: Option<Warehouse>,
    pub market_client: Option<MarketApiClient>,
    pub enricher: Option<Arc<WalletEnricher>>,
    pub monitor: Option<Arc<StrategyMonitor>>,
    /// Cooperative abort for the in-flight optimization job.
    pub optimize_abort: Arc<AtomicBool>,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/analysis/backfill", post(analysis::post_backfill))
        .route(
            "/api/analysis/backfill/status",
            get(analysis::get_backfill_status),
        )
        .route("/api/analysis/summary", get(analysis::get_summary))
        .route("/api/analysis/signals", get(analysis::get_signals))
        .route("/api/analysis/rolling", get(analysis::get_rolling))
        .route("/api/analysis/events", get(analysis::get_events))
        .route(
            "/api/analysis/breakdown/:factor",
            get(analysis::get_breakdown),
        )
        .route("/api/analysis/model", get(analysis::get_model))
        .route("/api/analysis/compare", get(analysis::get_compare))
        .route("/api/analysis/optimize", post(analysis::post_optimize))
        .route(
            "/api/analysis/optimize/status",
            get(analysis::get_optimize_status),
        )
        .route("/api/analysis/pareto", get(analysis::get_pareto))
        .route(
            "/api/analysis/sensitivity",
            post(analysis::post_sensitivity),
        )
        .route("/api/analysis/strategies", get(analysis::get_strategies))
        .route("/api/analysis/alerts", get(analysis::get_alerts))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
