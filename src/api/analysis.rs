//! `/api/analysis` handlers.
//!
//! All responses are JSON; expected-empty cases return 200 with an explicit
//! empty shape, storage-unavailable returns 503 on POSTs, and programming
//! errors surface as 500s. `summary` honors the has-data gate while
//! `breakdown` and `model` rely on their own minimum-sample guards — the
//! asymmetry is inherited behavior, kept deliberately.

use crate::api::routes::ApiState;
use crate::models::market_link;
use crate::monitor::strategy::DriftAlert;
use crate::research::backfill::{BackfillConfig, BackfillEngine, JobStatus};
use crate::research::breakdown::{compute_breakdown, BreakdownFactor, BreakdownGroup};
use crate::research::correlation::{
    compute_summary, rolling_correlation, CorrelationSummary, RollingPoint,
};
use crate::research::events::{AnalysisConfig, ContrarianMode, EventRow, OutcomeFilter};
use crate::research::model::{model_report, ModelReport, TrainConfig, MIN_MODEL_EVENTS};
use crate::research::optimize::{
    mark_pareto_frontier, run_grid_search, sensitivity_analysis, GridSearchConfig, Objective,
    OptimizationJob, OptimizationResult, SensitivityReport,
};
use crate::storage::Warehouse;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::Ordering;
use tracing::{error, info};

/// JSON error body with the matching status code.
pub struct ApiError(pub StatusCode, pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl ApiError {
    fn storage_unavailable() -> Self {
        ApiError(
            StatusCode::SERVICE_UNAVAILABLE,
            "warehouse not configured".to_string(),
        )
    }

    fn internal(e: impl std::fmt::Display) -> Self {
        error!(error = %e, "analysis handler failed");
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

/// POSTs require storage and 503 without it.
fn warehouse(state: &ApiState) -> Result<&Warehouse, ApiError> {
    state
        .warehouse
        .as_ref()
        .ok_or_else(ApiError::storage_unavailable)
}

/// GETs degrade to an explicit empty shape when storage is absent.
fn warehouse_opt(state: &ApiState) -> Option<&Warehouse> {
    state.warehouse.as_ref()
}

// ---------------------------------------------------------------------------
// Query options shared across the analysis endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisQuery {
    pub days: Option<i64>,
    pub min_size: Option<f64>,
    pub window_minutes: Option<i64>,
    pub contrarian_mode: Option<String>,
    pub require_asymmetry: Option<bool>,
    pub require_new_wallet: Option<bool>,
    pub max_wallet_age_days: Option<f64>,
    pub max_spread_bps: Option<f64>,
    pub min_depth_usd: Option<f64>,
    /// Comma-separated include list.
    pub categories: Option<String>,
    pub outcome_filter: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_z_score: Option<f64>,
    pub max_z_score: Option<f64>,
    pub min_minutes: Option<f64>,
    pub max_minutes: Option<f64>,
    pub ofi_trend_disagree: Option<bool>,
    // Endpoint-specific extras.
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub rolling_window: Option<i64>,
    pub fdr: Option<f64>,
}

impl AnalysisQuery {
    pub fn to_config(&self) -> AnalysisConfig {
        let defaults = AnalysisConfig::default();
        AnalysisConfig {
            lookback_days: self.days.unwrap_or(defaults.lookback_days),
            min_size_usd: self.min_size.unwrap_or(defaults.min_size_usd),
            window_minutes: self.window_minutes.unwrap_or(defaults.window_minutes),
            contrarian_mode: self
                .contrarian_mode
                .as_deref()
                .map(ContrarianMode::parse_or_default)
                .unwrap_or(defaults.contrarian_mode),
            require_asymmetric_book: self.require_asymmetry.unwrap_or(false),
            require_new_wallet: self.require_new_wallet.unwrap_or(false),
            max_wallet_age_days: self.max_wallet_age_days,
            max_spread_bps: self.max_spread_bps,
            min_depth_usd: self.min_depth_usd,
            categories: self
                .categories
                .as_deref()
                .map(|s| {
                    s.split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            min_price: self.min_price,
            max_price: self.max_price,
            min_minutes_to_close: self.min_minutes,
            max_minutes_to_close: self.max_minutes,
            outcome_filter: self
                .outcome_filter
                .as_deref()
                .map(OutcomeFilter::parse)
                .unwrap_or(OutcomeFilter::All),
            min_size_z: self.min_z_score,
            max_size_z: self.max_z_score,
            ofi_trend_disagree: self.ofi_trend_disagree.unwrap_or(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Backfill
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackfillRequest {
    pub days: Option<i64>,
    pub window_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillAccepted {
    pub accepted: bool,
    pub config: BackfillConfig,
}

/// POST /api/analysis/backfill — 202, runs asynchronously.
pub async fn post_backfill(
    State(state): State<ApiState>,
    Json(req): Json<BackfillRequest>,
) -> Result<(StatusCode, Json<BackfillAccepted>), ApiError> {
    let wh = warehouse(&state)?.clone();
    let defaults = BackfillConfig::default();
    let cfg = BackfillConfig {
        days: req.days.unwrap_or(defaults.days),
        window_minutes: req.window_minutes.unwrap_or(defaults.window_minutes),
    };

    let engine = BackfillEngine::new(wh, state.market_client.clone(), state.enricher.clone());
    tokio::spawn(async move {
        let now_ms = Utc::now().timestamp_millis();
        if let Err(e) = engine.run(cfg, now_ms).await {
            error!(error = %e, "backfill task failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(BackfillAccepted {
            accepted: true,
            config: cfg,
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillStatus {
    pub is_running: bool,
    pub status: Option<String>,
    pub items_processed: i64,
    pub items_total: i64,
    pub error_message: Option<String>,
    pub last_run_at: Option<i64>,
}

/// GET /api/analysis/backfill/status
pub async fn get_backfill_status(
    State(state): State<ApiState>,
) -> Result<Json<BackfillStatus>, ApiError> {
    let job = match warehouse_opt(&state) {
        Some(wh) => wh.latest_backfill_job().map_err(ApiError::internal)?,
        None => None,
    };
    Ok(Json(match job {
        Some(j) => BackfillStatus {
            is_running: j.status == JobStatus::Running,
            status: Some(j.status.as_str().to_string()),
            items_processed: j.items_processed,
            items_total: j.items_total,
            error_message: j.error_message,
            last_run_at: j.started_at,
        },
        None => BackfillStatus {
            is_running: false,
            status: None,
            items_processed: 0,
            items_total: 0,
            error_message: None,
            last_run_at: None,
        },
    }))
}

// ---------------------------------------------------------------------------
// Summary / rolling / signals / events
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub has_data: bool,
    pub summary: Option<CorrelationSummary>,
}

/// GET /api/analysis/summary — honors the has-data gate.
pub async fn get_summary(
    State(state): State<ApiState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let Some(wh) = warehouse_opt(&state) else {
        return Ok(Json(SummaryResponse {
            has_data: false,
            summary: None,
        }));
    };
    if wh.event_count().map_err(ApiError::internal)? == 0 {
        return Ok(Json(SummaryResponse {
            has_data: false,
            summary: None,
        }));
    }
    let cfg = query.to_config();
    let now_ms = Utc::now().timestamp_millis();
    let rows = wh.query_events(&cfg, now_ms).map_err(ApiError::internal)?;
    let events: Vec<_> = rows.into_iter().map(|r| r.event).collect();
    Ok(Json(SummaryResponse {
        has_data: true,
        summary: Some(compute_summary(&events, cfg.contrarian_mode)),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalView {
    #[serde(flatten)]
    pub row: EventRow,
    pub market_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalsResponse {
    pub signals: Vec<SignalView>,
    pub count: usize,
}

/// GET /api/analysis/signals?limit — recent events with URL enrichment.
pub async fn get_signals(
    State(state): State<ApiState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<SignalsResponse>, ApiError> {
    let Some(wh) = warehouse_opt(&state) else {
        return Ok(Json(SignalsResponse {
            signals: Vec::new(),
            count: 0,
        }));
    };
    let limit = query.limit.unwrap_or(50).min(100);
    let (rows, _) = wh.recent_events(limit, 0).map_err(ApiError::internal)?;
    let signals: Vec<SignalView> = rows
        .into_iter()
        .map(|row| {
            let market_url = row.event_slug.as_deref().map(|event_slug| {
                market_link(&state.config.market_host, event_slug, row.market_slug.as_deref())
            });
            SignalView { row, market_url }
        })
        .collect();
    let count = signals.len();
    Ok(Json(SignalsResponse { signals, count }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingResponse {
    pub points: Vec<RollingPoint>,
}

/// GET /api/analysis/rolling?rollingWindow
pub async fn get_rolling(
    State(state): State<ApiState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<RollingResponse>, ApiError> {
    let Some(wh) = warehouse_opt(&state) else {
        return Ok(Json(RollingResponse { points: Vec::new() }));
    };
    let cfg = query.to_config();
    let window = query.rolling_window.unwrap_or(7).max(1);
    let now_ms = Utc::now().timestamp_millis();
    let rows = wh.query_events(&cfg, now_ms).map_err(ApiError::internal)?;
    let events: Vec<_> = rows.into_iter().map(|r| r.event).collect();
    Ok(Json(RollingResponse {
        points: rolling_correlation(&events, cfg.contrarian_mode, window),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub events: Vec<EventRow>,
    pub total: i64,
    pub limit: usize,
    pub offset: usize,
}

/// GET /api/analysis/events?limit<=100&offset
pub async fn get_events(
    State(state): State<ApiState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50).min(100);
    let offset = query.offset.unwrap_or(0);
    let Some(wh) = warehouse_opt(&state) else {
        return Ok(Json(EventsResponse {
            events: Vec::new(),
            total: 0,
            limit,
            offset,
        }));
    };
    let (events, total) = wh.recent_events(limit, offset).map_err(ApiError::internal)?;
    Ok(Json(EventsResponse {
        events,
        total,
        limit,
        offset,
    }))
}

// ---------------------------------------------------------------------------
// Breakdown / model / compare
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownResponse {
    pub factor: String,
    pub groups: Vec<BreakdownGroup>,
}

/// GET /api/analysis/breakdown/{factor} — 400 on unknown factor.
pub async fn get_breakdown(
    State(state): State<ApiState>,
    Path(factor): Path<String>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<BreakdownResponse>, ApiError> {
    let parsed = BreakdownFactor::parse(&factor).ok_or_else(|| {
        ApiError(
            StatusCode::BAD_REQUEST,
            format!("unknown breakdown factor: {}", factor),
        )
    })?;
    let Some(wh) = warehouse_opt(&state) else {
        return Ok(Json(BreakdownResponse {
            factor,
            groups: Vec::new(),
        }));
    };
    let cfg = query.to_config();
    let now_ms = Utc::now().timestamp_millis();
    let rows = wh.query_events(&cfg, now_ms).map_err(ApiError::internal)?;
    Ok(Json(BreakdownResponse {
        factor,
        groups: compute_breakdown(&rows, parsed),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub error: Option<String>,
    pub report: Option<ModelReport>,
}

/// GET /api/analysis/model
pub async fn get_model(
    State(state): State<ApiState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<ModelResponse>, ApiError> {
    let Some(wh) = warehouse_opt(&state) else {
        return Ok(Json(ModelResponse {
            error: Some("warehouse not configured".to_string()),
            report: None,
        }));
    };
    let cfg = query.to_config();
    let now_ms = Utc::now().timestamp_millis();
    let rows = wh.query_events(&cfg, now_ms).map_err(ApiError::internal)?;
    let events: Vec<_> = rows.into_iter().map(|r| r.event).collect();
    match model_report(&events, TrainConfig::default()) {
        Some(report) => Ok(Json(ModelResponse {
            error: None,
            report: Some(report),
        })),
        None => Ok(Json(ModelResponse {
            error: Some(format!(
                "at least {} events required, have {}",
                MIN_MODEL_EVENTS,
                events.len()
            )),
            report: None,
        })),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeComparison {
    pub mode: String,
    pub summary: CorrelationSummary,
    pub adjusted_p_value: f64,
    pub is_significant: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResponse {
    pub fdr_alpha: f64,
    pub modes: Vec<ModeComparison>,
}

/// GET /api/analysis/compare?fdr — all four contrarian modes, FDR-adjusted.
pub async fn get_compare(
    State(state): State<ApiState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<CompareResponse>, ApiError> {
    let fdr_alpha = query.fdr.unwrap_or(0.05);
    let Some(wh) = warehouse_opt(&state) else {
        return Ok(Json(CompareResponse {
            fdr_alpha,
            modes: Vec::new(),
        }));
    };
    let cfg = query.to_config();
    let now_ms = Utc::now().timestamp_millis();
    let rows = wh.query_events(&cfg, now_ms).map_err(ApiError::internal)?;
    let events: Vec<_> = rows.into_iter().map(|r| r.event).collect();

    let summaries: Vec<CorrelationSummary> = ContrarianMode::ALL
        .iter()
        .map(|&mode| compute_summary(&events, mode))
        .collect();
    let p_values: Vec<f64> = summaries.iter().map(|s| s.overall.p_value).collect();
    let corrections = crate::research::stats::benjamini_hochberg(&p_values, fdr_alpha);

    let modes = summaries
        .into_iter()
        .zip(corrections)
        .map(|(summary, (adjusted, significant))| ModeComparison {
            mode: summary.mode.as_str().to_string(),
            summary,
            adjusted_p_value: adjusted,
            is_significant: significant,
        })
        .collect();

    Ok(Json(CompareResponse { fdr_alpha, modes }))
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizeRequest {
    pub lookback_days: Option<i64>,
    pub contrarian_modes: Option<Vec<String>>,
    pub min_sizes_usd: Option<Vec<f64>>,
    pub window_minutes: Option<Vec<i64>>,
    pub price_ranges: Option<Vec<(f64, f64)>>,
    pub time_ranges: Option<Vec<(f64, f64)>>,
    pub outcome_filters: Option<Vec<String>>,
    pub min_sample_size: Option<usize>,
    pub fdr_alpha: Option<f64>,
    pub objectives: Option<Vec<String>>,
}

impl OptimizeRequest {
    fn to_grid(&self) -> GridSearchConfig {
        let d = GridSearchConfig::default();
        GridSearchConfig {
            lookback_days: self.lookback_days.unwrap_or(d.lookback_days),
            contrarian_modes: self
                .contrarian_modes
                .as_ref()
                .map(|modes| {
                    modes
                        .iter()
                        .map(|m| ContrarianMode::parse_or_default(m))
                        .collect()
                })
                .unwrap_or(d.contrarian_modes),
            min_sizes_usd: self.min_sizes_usd.clone().unwrap_or(d.min_sizes_usd),
            window_minutes: self.window_minutes.clone().unwrap_or(d.window_minutes),
            price_ranges: self.price_ranges.clone().unwrap_or(d.price_ranges),
            time_ranges: self.time_ranges.clone().unwrap_or(d.time_ranges),
            outcome_filters: self
                .outcome_filters
                .as_ref()
                .map(|fs| fs.iter().map(|f| OutcomeFilter::parse(f)).collect())
                .unwrap_or(d.outcome_filters),
            min_sample_size: self.min_sample_size.unwrap_or(d.min_sample_size),
            fdr_alpha: self.fdr_alpha.unwrap_or(d.fdr_alpha),
            objectives: self
                .objectives
                .as_ref()
                .map(|objs| objs.iter().filter_map(|o| Objective::parse(o)).collect())
                .unwrap_or(d.objectives),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeAccepted {
    pub job_id: String,
    pub total_combinations: usize,
}

/// POST /api/analysis/optimize — 202 with the combination count.
pub async fn post_optimize(
    State(state): State<ApiState>,
    Json(req): Json<OptimizeRequest>,
) -> Result<(StatusCode, Json<OptimizeAccepted>), ApiError> {
    let wh = warehouse(&state)?.clone();
    let grid = req.to_grid();
    let total = grid.total_combinations();
    let job_id = uuid::Uuid::new_v4().to_string();
    let now_ms = Utc::now().timestamp_millis();

    let job = OptimizationJob {
        id: job_id.clone(),
        status: JobStatus::Running,
        config_json: serde_json::to_string(&grid).map_err(ApiError::internal)?,
        total_configs: total as i64,
        processed_configs: 0,
        valid_configs: 0,
        started_at: Some(now_ms),
        completed_at: None,
        execution_time_ms: None,
        error_message: None,
    };
    wh.create_optimization_job(&job).map_err(ApiError::internal)?;

    let abort = state.optimize_abort.clone();
    abort.store(false, Ordering::Relaxed);
    let spawned_job_id = job_id.clone();
    tokio::spawn(async move {
        let started = std::time::Instant::now();
        // One wide fetch; every grid point filters in memory.
        let widest = AnalysisConfig {
            lookback_days: grid.lookback_days,
            ..AnalysisConfig::default()
        };
        let rows = match wh.query_events(&widest, now_ms) {
            Ok(r) => r,
            Err(e) => {
                let _ = wh.finish_optimization_job(
                    &spawned_job_id,
                    JobStatus::Failed,
                    Utc::now().timestamp_millis(),
                    started.elapsed().as_millis() as i64,
                    Some(&e.to_string()),
                );
                return;
            }
        };

        let wh_progress = wh.clone();
        let progress_job_id = spawned_job_id.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            run_grid_search(&rows, &grid, &abort, move |processed, valid| {
                let _ = wh_progress.update_optimization_progress(
                    &progress_job_id,
                    processed as i64,
                    valid as i64,
                );
            })
        })
        .await;

        let finished_at = Utc::now().timestamp_millis();
        let elapsed_ms = started.elapsed().as_millis() as i64;
        match outcome {
            Ok(out) => {
                let persisted = wh.upsert_optimization_results(&spawned_job_id, &out.results);
                let status = if out.aborted {
                    JobStatus::Failed
                } else {
                    JobStatus::Completed
                };
                let error = match (&persisted, out.aborted) {
                    (Err(e), _) => Some(e.to_string()),
                    (_, true) => Some("aborted at checkpoint".to_string()),
                    _ => None,
                };
                let _ = wh.finish_optimization_job(
                    &spawned_job_id,
                    status,
                    finished_at,
                    elapsed_ms,
                    error.as_deref(),
                );
                info!(
                    job_id = spawned_job_id,
                    valid = out.valid,
                    "optimization finished"
                );
            }
            Err(e) => {
                let _ = wh.finish_optimization_job(
                    &spawned_job_id,
                    JobStatus::Failed,
                    finished_at,
                    elapsed_ms,
                    Some(&e.to_string()),
                );
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(OptimizeAccepted {
            job_id,
            total_combinations: total,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizeStatusQuery {
    pub job_id: Option<String>,
}

/// GET /api/analysis/optimize/status?jobId — job row or 404.
pub async fn get_optimize_status(
    State(state): State<ApiState>,
    Query(query): Query<OptimizeStatusQuery>,
) -> Result<Json<OptimizationJob>, ApiError> {
    let wh = warehouse_opt(&state)
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, "no such optimization job".into()))?;
    let job = match &query.job_id {
        Some(id) => wh.optimization_job(id).map_err(ApiError::internal)?,
        None => wh.latest_optimization_job().map_err(ApiError::internal)?,
    };
    job.map(Json)
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, "no such optimization job".into()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParetoQuery {
    pub objectives: Option<String>,
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParetoResponse {
    pub objectives: Vec<String>,
    pub points: Vec<OptimizationResult>,
}

/// GET /api/analysis/pareto?objectives=a,b,c — frontier recomputed over the
/// requested objective set.
pub async fn get_pareto(
    State(state): State<ApiState>,
    Query(query): Query<ParetoQuery>,
) -> Result<Json<ParetoResponse>, ApiError> {
    let objectives: Vec<Objective> = query
        .objectives
        .as_deref()
        .map(|s| s.split(',').filter_map(|o| Objective::parse(o.trim())).collect())
        .unwrap_or_else(|| vec![Objective::Roi, Objective::WinRate, Objective::Sharpe]);
    if objectives.is_empty() {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            "no recognized objectives".into(),
        ));
    }
    let objective_names: Vec<String> =
        objectives.iter().map(|o| o.as_str().to_string()).collect();

    let Some(wh) = warehouse_opt(&state) else {
        return Ok(Json(ParetoResponse {
            objectives: objective_names,
            points: Vec::new(),
        }));
    };

    let mut results = wh
        .optimization_results(query.job_id.as_deref(), "roi", 10_000, false)
        .map_err(ApiError::internal)?;
    mark_pareto_frontier(&mut results, &objectives);
    let points: Vec<OptimizationResult> =
        results.into_iter().filter(|r| r.is_pareto_optimal).collect();

    Ok(Json(ParetoResponse {
        objectives: objective_names,
        points,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityRequest {
    pub base_config: AnalysisConfig,
    pub parameter: String,
    pub values: Vec<f64>,
}

/// POST /api/analysis/sensitivity
pub async fn post_sensitivity(
    State(state): State<ApiState>,
    Json(req): Json<SensitivityRequest>,
) -> Result<Json<SensitivityReport>, ApiError> {
    let wh = warehouse(&state)?;
    let now_ms = Utc::now().timestamp_millis();
    let widest = AnalysisConfig {
        lookback_days: req.base_config.lookback_days,
        ..AnalysisConfig::default()
    };
    let rows = wh.query_events(&widest, now_ms).map_err(ApiError::internal)?;
    sensitivity_analysis(&rows, &req.base_config, &req.parameter, &req.values, 5)
        .map(Json)
        .ok_or_else(|| {
            ApiError(
                StatusCode::BAD_REQUEST,
                format!("unknown parameter: {}", req.parameter),
            )
        })
}

// ---------------------------------------------------------------------------
// Strategies / alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategiesQuery {
    pub sort_by: Option<String>,
    pub limit: Option<usize>,
    pub significant_only: Option<bool>,
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategiesResponse {
    pub strategies: Vec<OptimizationResult>,
    pub count: usize,
}

/// GET /api/analysis/strategies — ranked grid results.
pub async fn get_strategies(
    State(state): State<ApiState>,
    Query(query): Query<StrategiesQuery>,
) -> Result<Json<StrategiesResponse>, ApiError> {
    let Some(wh) = warehouse_opt(&state) else {
        return Ok(Json(StrategiesResponse {
            strategies: Vec::new(),
            count: 0,
        }));
    };
    let limit = query.limit.unwrap_or(20).min(100);
    let sort_by = query.sort_by.as_deref().unwrap_or("roi");
    let strategies = wh
        .optimization_results(
            query.job_id.as_deref(),
            sort_by,
            limit,
            query.significant_only.unwrap_or(false),
        )
        .map_err(ApiError::internal)?;
    let count = strategies.len();
    Ok(Json(StrategiesResponse { strategies, count }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertsQuery {
    pub severity: Option<String>,
    pub unacknowledged_only: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsResponse {
    pub alerts: Vec<DriftAlert>,
    pub count: usize,
}

/// GET /api/analysis/alerts
pub async fn get_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let Some(wh) = warehouse_opt(&state) else {
        return Ok(Json(AlertsResponse {
            alerts: Vec::new(),
            count: 0,
        }));
    };
    let limit = query.limit.unwrap_or(50).min(200);
    let alerts = wh
        .alerts(
            query.severity.as_deref(),
            query.unacknowledged_only.unwrap_or(false),
            limit,
        )
        .map_err(ApiError::internal)?;
    let count = alerts.len();
    Ok(Json(AlertsResponse { alerts, count }))
}

/// Smoke-level sanity for the id helper reused by optimize responses.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimize_request_fills_defaults() {
        let req = OptimizeRequest::default();
        let grid = req.to_grid();
        assert_eq!(grid.total_combinations(), GridSearchConfig::default().total_combinations());
    }

    #[test]
    fn optimize_request_overrides_stick() {
        let req = OptimizeRequest {
            contrarian_modes: Some(vec!["vs_both".into()]),
            min_sizes_usd: Some(vec![0.0]),
            window_minutes: Some(vec![60]),
            price_ranges: Some(vec![(0.0, 1.0)]),
            time_ranges: Some(vec![(0.0, 60.0)]),
            outcome_filters: Some(vec!["all".into()]),
            ..OptimizeRequest::default()
        };
        assert_eq!(req.to_grid().total_combinations(), 1);
    }

    #[test]
    fn analysis_query_maps_onto_config() {
        let q = AnalysisQuery {
            days: Some(14),
            min_size: Some(250.0),
            contrarian_mode: Some("bogus".into()),
            categories: Some("politics, sports".into()),
            outcome_filter: Some("Yes".into()),
            ..AnalysisQuery::default()
        };
        let cfg = q.to_config();
        assert_eq!(cfg.lookback_days, 14);
        assert_eq!(cfg.min_size_usd, 250.0);
        // Invalid modes fall back to vs_ofi.
        assert_eq!(cfg.contrarian_mode, ContrarianMode::VsOfi);
        assert_eq!(cfg.categories, vec!["politics", "sports"]);
        assert_eq!(cfg.outcome_filter, OutcomeFilter::Yes);
    }

    #[test]
    fn config_hash_helper_reachable() {
        let cfg = AnalysisConfig::default();
        assert_eq!(crate::research::optimize::config_hash(&cfg).len(), 32);
    }
}
