//! Grid-search optimization: cartesian configuration sweep, FDR-corrected
//! significance, per-objective ranks, Pareto frontier, sensitivity analysis.
//!
//! Evaluation is CPU-only over a pre-fetched event set; raw p-values are
//! collected in evaluation order and corrected in one pass after the loop.

use crate::research::backfill::JobStatus;
use crate::research::events::{AnalysisConfig, ContrarianMode, EventRow, OutcomeFilter};
use crate::research::pnl::{compute_pnl, PnlMetrics};
use crate::research::stats::{
    benjamini_hochberg, binomial_test_p, bootstrap_ci, mean, sharpe_annualized, std_dev,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info};

/// Progress checkpoint cadence (configs).
const PROGRESS_EVERY: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Roi,
    WinRate,
    Sharpe,
    ProfitFactor,
    EdgePoints,
    InformationRatio,
}

impl Objective {
    pub const ALL: [Objective; 6] = [
        Objective::Roi,
        Objective::WinRate,
        Objective::Sharpe,
        Objective::ProfitFactor,
        Objective::EdgePoints,
        Objective::InformationRatio,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "roi" => Some(Objective::Roi),
            "win_rate" => Some(Objective::WinRate),
            "sharpe" | "sharpe_ratio" => Some(Objective::Sharpe),
            "profit_factor" => Some(Objective::ProfitFactor),
            "edge_points" => Some(Objective::EdgePoints),
            "information_ratio" => Some(Objective::InformationRatio),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::Roi => "roi",
            Objective::WinRate => "win_rate",
            Objective::Sharpe => "sharpe",
            Objective::ProfitFactor => "profit_factor",
            Objective::EdgePoints => "edge_points",
            Objective::InformationRatio => "information_ratio",
        }
    }

    fn value_of(&self, m: &OptimizationMetrics) -> f64 {
        match self {
            Objective::Roi => m.roi,
            Objective::WinRate => m.win_rate,
            Objective::Sharpe => m.sharpe_ratio,
            Objective::ProfitFactor => m.profit_factor,
            Objective::EdgePoints => m.edge_points,
            Objective::InformationRatio => m.information_ratio,
        }
    }
}

/// Sweep ranges. The cartesian product is enumerated lazily; memory stays
/// O(1) in the product size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchConfig {
    pub lookback_days: i64,
    pub contrarian_modes: Vec<ContrarianMode>,
    pub min_sizes_usd: Vec<f64>,
    pub window_minutes: Vec<i64>,
    /// (min_price, max_price) pairs.
    pub price_ranges: Vec<(f64, f64)>,
    /// (min_minutes, max_minutes) pairs.
    pub time_ranges: Vec<(f64, f64)>,
    pub outcome_filters: Vec<OutcomeFilter>,
    pub min_sample_size: usize,
    pub fdr_alpha: f64,
    pub objectives: Vec<Objective>,
}

impl Default for GridSearchConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            contrarian_modes: ContrarianMode::ALL.to_vec(),
            min_sizes_usd: vec![0.0, 500.0, 2_000.0],
            window_minutes: vec![60, 120],
            price_ranges: vec![(0.0, 1.0), (0.0, 0.5)],
            time_ranges: vec![(0.0, 120.0), (0.0, 30.0)],
            outcome_filters: vec![OutcomeFilter::All],
            min_sample_size: 10,
            fdr_alpha: 0.05,
            objectives: vec![Objective::Roi, Objective::WinRate, Objective::Sharpe],
        }
    }
}

impl GridSearchConfig {
    pub fn total_combinations(&self) -> usize {
        self.contrarian_modes.len()
            * self.min_sizes_usd.len()
            * self.window_minutes.len()
            * self.price_ranges.len()
            * self.time_ranges.len()
            * self.outcome_filters.len()
    }

    /// Lazy cartesian product over the ranges.
    pub fn configs(&self) -> impl Iterator<Item = AnalysisConfig> + '_ {
        self.contrarian_modes.iter().flat_map(move |&mode| {
            self.min_sizes_usd.iter().flat_map(move |&min_size| {
                self.window_minutes.iter().flat_map(move |&window| {
                    self.price_ranges.iter().flat_map(move |&(min_p, max_p)| {
                        self.time_ranges.iter().flat_map(move |&(min_m, max_m)| {
                            self.outcome_filters.iter().map(move |&outcome| {
                                AnalysisConfig {
                                    lookback_days: self.lookback_days,
                                    min_size_usd: min_size,
                                    window_minutes: window,
                                    contrarian_mode: mode,
                                    min_price: Some(min_p),
                                    max_price: Some(max_p),
                                    min_minutes_to_close: Some(min_m),
                                    max_minutes_to_close: Some(max_m),
                                    outcome_filter: outcome,
                                    ..AnalysisConfig::default()
                                }
                            })
                        })
                    })
                })
            })
        })
    }
}

/// Deterministic configuration id: sha256 of the canonical JSON form.
pub fn config_hash(cfg: &AnalysisConfig) -> String {
    let json = serde_json::to_string(cfg).unwrap_or_default();
    let digest = Sha256::digest(json.as_bytes());
    hex::encode(&digest[..16])
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OptimizationMetrics {
    pub n: usize,
    pub win_rate: f64,
    pub pnl: f64,
    pub roi: f64,
    pub profit_factor: f64,
    pub edge_points: f64,
    pub sharpe_ratio: f64,
    pub kelly_fraction: f64,
    pub information_ratio: f64,
    pub avg_price: f64,
    pub p_value: f64,
    pub adjusted_p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Per-objective rank (1 = best). Absent for objectives outside the sweep.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ObjectiveRanks {
    pub roi: Option<usize>,
    pub win_rate: Option<usize>,
    pub sharpe: Option<usize>,
    pub profit_factor: Option<usize>,
    pub edge_points: Option<usize>,
    pub information_ratio: Option<usize>,
}

impl ObjectiveRanks {
    fn set(&mut self, objective: Objective, rank: usize) {
        match objective {
            Objective::Roi => self.roi = Some(rank),
            Objective::WinRate => self.win_rate = Some(rank),
            Objective::Sharpe => self.sharpe = Some(rank),
            Objective::ProfitFactor => self.profit_factor = Some(rank),
            Objective::EdgePoints => self.edge_points = Some(rank),
            Objective::InformationRatio => self.information_ratio = Some(rank),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub config_id: String,
    pub config: AnalysisConfig,
    pub metrics: OptimizationMetrics,
    pub ranks: ObjectiveRanks,
    pub is_statistically_significant: bool,
    pub is_pareto_optimal: bool,
}

/// Job row mirrored in the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationJob {
    pub id: String,
    pub status: JobStatus,
    pub config_json: String,
    pub total_configs: i64,
    pub processed_configs: i64,
    pub valid_configs: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub execution_time_ms: Option<i64>,
    pub error_message: Option<String>,
}

/// Weekly edge series for the information ratio: per ISO week, the realized
/// edge in points over that week's events.
fn information_ratio(events: &[&crate::research::events::ContrarianEvent]) -> f64 {
    let week_ms = 7 * 86_400_000i64;
    let mut weeks: std::collections::BTreeMap<i64, Vec<&crate::research::events::ContrarianEvent>> =
        std::collections::BTreeMap::new();
    for e in events {
        weeks.entry(e.trade_timestamp / week_ms).or_default().push(e);
    }
    let weekly_edges: Vec<f64> = weeks
        .values()
        .filter(|members| !members.is_empty())
        .map(|members| {
            let wins = members.iter().filter(|e| e.outcome_won).count() as f64;
            let win_rate = wins / members.len() as f64;
            let avg_price =
                members.iter().map(|e| e.trade_price).sum::<f64>() / members.len() as f64;
            (win_rate - avg_price) * 100.0
        })
        .collect();
    if weekly_edges.len() < 2 {
        return 0.0;
    }
    let sd = std_dev(&weekly_edges);
    if sd <= 1e-12 {
        return 0.0;
    }
    mean(&weekly_edges) / sd
}

/// Evaluate one configuration against the pre-fetched event set. `None`
/// when the filtered sample is below the minimum.
fn evaluate_config(
    rows: &[EventRow],
    cfg: &AnalysisConfig,
    min_sample_size: usize,
) -> Option<(PnlMetrics, OptimizationMetrics)> {
    let selected: Vec<&crate::research::events::ContrarianEvent> = rows
        .iter()
        .filter(|r| cfg.matches(r))
        .map(|r| &r.event)
        .filter(|e| e.is_contrarian_by_mode(cfg.contrarian_mode))
        .collect();

    if selected.len() < min_sample_size {
        return None;
    }

    let pnl = compute_pnl(&selected);
    let returns: Vec<f64> = selected
        .iter()
        .map(|e| {
            let ret = if e.outcome_won {
                1.0 - e.trade_price
            } else {
                -e.trade_price
            };
            ret
        })
        .collect();

    let outcomes: Vec<f64> = selected
        .iter()
        .map(|e| if e.outcome_won { 1.0 } else { 0.0 })
        .collect();
    let seed = selected.len() as u64 * 7919;
    let (ci_lower, ci_upper) = bootstrap_ci(&outcomes, 300, seed);

    let metrics = OptimizationMetrics {
        n: pnl.n,
        win_rate: pnl.win_rate,
        pnl: pnl.pnl,
        roi: pnl.roi,
        profit_factor: pnl.profit_factor,
        edge_points: pnl.edge_points,
        sharpe_ratio: sharpe_annualized(&returns),
        kelly_fraction: pnl.kelly_fraction,
        information_ratio: information_ratio(&selected),
        avg_price: pnl.avg_price,
        p_value: binomial_test_p(pnl.wins, pnl.n, 0.5),
        adjusted_p_value: 1.0,
        ci_lower,
        ci_upper,
    };
    Some((pnl, metrics))
}

/// Pareto dominance over the chosen objectives: `a` dominates `b` when it is
/// at least as good everywhere and strictly better somewhere.
fn dominates(a: &OptimizationMetrics, b: &OptimizationMetrics, objectives: &[Objective]) -> bool {
    let mut strictly_better = false;
    for obj in objectives {
        let av = obj.value_of(a);
        let bv = obj.value_of(b);
        if av < bv {
            return false;
        }
        if av > bv {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Mark the non-dominated subset.
pub fn mark_pareto_frontier(results: &mut [OptimizationResult], objectives: &[Objective]) {
    let metrics: Vec<OptimizationMetrics> = results.iter().map(|r| r.metrics).collect();
    for (i, r) in results.iter_mut().enumerate() {
        let dominated = metrics
            .iter()
            .enumerate()
            .any(|(j, other)| j != i && dominates(other, &metrics[i], objectives));
        r.is_pareto_optimal = !dominated;
    }
}

fn assign_ranks(results: &mut [OptimizationResult], objectives: &[Objective]) {
    for &obj in objectives {
        let mut order: Vec<usize> = (0..results.len()).collect();
        order.sort_by(|&a, &b| {
            obj.value_of(&results[b].metrics)
                .partial_cmp(&obj.value_of(&results[a].metrics))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (rank, idx) in order.into_iter().enumerate() {
            results[idx].ranks.set(obj, rank + 1);
        }
    }
}

/// Outcome of a full sweep, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchOutcome {
    pub total: usize,
    pub processed: usize,
    pub valid: usize,
    pub results: Vec<OptimizationResult>,
    pub aborted: bool,
}

/// Run the sweep over a pre-fetched event set. `abort` is honored at the
/// next progress checkpoint; `on_progress` receives (processed, valid).
pub fn run_grid_search<P>(
    rows: &[EventRow],
    grid: &GridSearchConfig,
    abort: &AtomicBool,
    mut on_progress: P,
) -> GridSearchOutcome
where
    P: FnMut(usize, usize),
{
    let total = grid.total_combinations();
    info!(total, events = rows.len(), "grid search starting");

    let processed = AtomicUsize::new(0);
    let valid = AtomicUsize::new(0);
    let mut results: Vec<(AnalysisConfig, OptimizationMetrics)> = Vec::new();
    let mut aborted = false;

    // Chunked evaluation: rayon inside a chunk, checkpoints between chunks.
    let all_configs: Vec<AnalysisConfig> = grid.configs().collect();
    for chunk in all_configs.chunks(PROGRESS_EVERY) {
        if abort.load(Ordering::Relaxed) {
            aborted = true;
            break;
        }
        let evaluated: Vec<(AnalysisConfig, OptimizationMetrics)> = chunk
            .par_iter()
            .filter_map(|cfg| {
                let out = evaluate_config(rows, cfg, grid.min_sample_size);
                processed.fetch_add(1, Ordering::Relaxed);
                out.map(|(_, metrics)| {
                    valid.fetch_add(1, Ordering::Relaxed);
                    (cfg.clone(), metrics)
                })
            })
            .collect();
        results.extend(evaluated);
        on_progress(processed.load(Ordering::Relaxed), valid.load(Ordering::Relaxed));
    }

    // Single FDR pass after all evaluations; never interleaved.
    let p_values: Vec<f64> = results.iter().map(|(_, m)| m.p_value).collect();
    let corrections = benjamini_hochberg(&p_values, grid.fdr_alpha);

    let mut final_results: Vec<OptimizationResult> = results
        .into_iter()
        .zip(corrections)
        .map(|((cfg, mut metrics), (adjusted, significant))| {
            metrics.adjusted_p_value = adjusted;
            OptimizationResult {
                config_id: config_hash(&cfg),
                config: cfg,
                metrics,
                ranks: ObjectiveRanks::default(),
                is_statistically_significant: significant,
                is_pareto_optimal: false,
            }
        })
        .collect();

    assign_ranks(&mut final_results, &grid.objectives);
    mark_pareto_frontier(&mut final_results, &grid.objectives);

    debug!(
        valid = final_results.len(),
        pareto = final_results.iter().filter(|r| r.is_pareto_optimal).count(),
        "grid search evaluated"
    );

    GridSearchOutcome {
        total,
        processed: processed.load(Ordering::Relaxed),
        valid: valid.load(Ordering::Relaxed),
        results: final_results,
        aborted,
    }
}

// ---------------------------------------------------------------------------
// Sensitivity analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityVariation {
    pub value: f64,
    pub metrics: Option<OptimizationMetrics>,
    pub delta_roi: Option<f64>,
    pub delta_win_rate: Option<f64>,
    /// |delta roi| above 5 points marks the parameter as load-bearing.
    pub is_significant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityReport {
    pub parameter: String,
    pub base_metrics: Option<OptimizationMetrics>,
    pub variations: Vec<SensitivityVariation>,
}

fn apply_parameter(cfg: &AnalysisConfig, parameter: &str, value: f64) -> Option<AnalysisConfig> {
    let mut out = cfg.clone();
    match parameter {
        "min_size_usd" => out.min_size_usd = value,
        "window_minutes" => out.window_minutes = value as i64,
        "max_spread_bps" => out.max_spread_bps = Some(value),
        "max_wallet_age_days" => out.max_wallet_age_days = Some(value),
        "min_price" => out.min_price = Some(value),
        "max_price" => out.max_price = Some(value),
        "min_minutes_to_close" => out.min_minutes_to_close = Some(value),
        "max_minutes_to_close" => out.max_minutes_to_close = Some(value),
        "lookback_days" => out.lookback_days = value as i64,
        _ => return None,
    }
    Some(out)
}

/// Recompute the metrics for each parameter value and report deltas against
/// the base configuration.
pub fn sensitivity_analysis(
    rows: &[EventRow],
    base: &AnalysisConfig,
    parameter: &str,
    values: &[f64],
    min_sample_size: usize,
) -> Option<SensitivityReport> {
    // Unknown parameter names are a caller error, not an empty report.
    apply_parameter(base, parameter, values.first().copied().unwrap_or(0.0))?;

    let base_metrics = evaluate_config(rows, base, min_sample_size).map(|(_, m)| m);

    let variations = values
        .iter()
        .map(|&value| {
            let varied = apply_parameter(base, parameter, value)
                .and_then(|cfg| evaluate_config(rows, &cfg, min_sample_size))
                .map(|(_, m)| m);
            let delta_roi = match (&base_metrics, &varied) {
                (Some(b), Some(v)) => Some(v.roi - b.roi),
                _ => None,
            };
            let delta_win_rate = match (&base_metrics, &varied) {
                (Some(b), Some(v)) => Some(v.win_rate - b.win_rate),
                _ => None,
            };
            SensitivityVariation {
                value,
                metrics: varied,
                delta_roi,
                delta_win_rate,
                is_significant: delta_roi.map(|d| d.abs() > 0.05).unwrap_or(false),
            }
        })
        .collect();

    Some(SensitivityReport {
        parameter: parameter.to_string(),
        base_metrics,
        variations,
    })
}
