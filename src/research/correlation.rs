//! Correlation between the contrarian predictor and resolved outcomes.

use crate::research::events::{ContrarianEvent, ContrarianMode};
use crate::research::pnl::{compute_pnl, PnlMetrics};
use crate::research::stats::{auc, fisher_ci, point_biserial};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events needed before the chronological 60/20/20 split is attempted.
const MIN_SPLIT_EVENTS: usize = 30;
/// Events needed inside a rolling window.
const MIN_ROLLING_EVENTS: usize = 5;

pub const BASELINE_WIN_RATE: f64 = 0.5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationStats {
    pub n: usize,
    pub predictor_count: usize,
    pub r: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub signal_win_rate: f64,
    pub baseline_win_rate: f64,
    pub lift: f64,
    pub auc: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitStats {
    pub train: CorrelationStats,
    pub validate: CorrelationStats,
    pub test: CorrelationStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationSummary {
    pub mode: ContrarianMode,
    pub overall: CorrelationStats,
    /// Absent below the split minimum.
    pub splits: Option<SplitStats>,
    /// P&L over the predictor-positive events.
    pub pnl: PnlMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingPoint {
    /// Window end date, YYYY-MM-DD.
    pub date: String,
    pub r: f64,
    pub win_rate: f64,
    pub sample_size: usize,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

fn stats_for(events: &[&ContrarianEvent], mode: ContrarianMode) -> CorrelationStats {
    let n = events.len();
    let predictor: Vec<bool> = events
        .iter()
        .map(|e| e.is_contrarian_by_mode(mode))
        .collect();
    let outcome: Vec<bool> = events.iter().map(|e| e.outcome_won).collect();

    let (r, p_value) = point_biserial(&predictor, &outcome);
    let (ci_lower, ci_upper) = fisher_ci(r, n);

    let predictor_count = predictor.iter().filter(|&&p| p).count();
    let signal_wins = predictor
        .iter()
        .zip(&outcome)
        .filter(|(&p, &o)| p && o)
        .count();
    let signal_win_rate = if predictor_count > 0 {
        signal_wins as f64 / predictor_count as f64
    } else {
        0.0
    };
    let lift = (signal_win_rate - BASELINE_WIN_RATE) / BASELINE_WIN_RATE;

    let scores: Vec<f64> = events.iter().map(|e| e.indicator_score()).collect();
    let auc_value = if n >= 10 { auc(&scores, &outcome) } else { 0.5 };

    CorrelationStats {
        n,
        predictor_count,
        r,
        p_value,
        ci_lower,
        ci_upper,
        signal_win_rate,
        baseline_win_rate: BASELINE_WIN_RATE,
        lift,
        auc: auc_value,
    }
}

/// Full correlation summary for one contrarian mode. Events are sorted
/// chronologically before splitting.
pub fn compute_summary(events: &[ContrarianEvent], mode: ContrarianMode) -> CorrelationSummary {
    let mut ordered: Vec<&ContrarianEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.trade_timestamp);

    let overall = stats_for(&ordered, mode);

    let splits = if ordered.len() >= MIN_SPLIT_EVENTS {
        let n = ordered.len();
        let train_end = n * 60 / 100;
        let val_end = n * 80 / 100;
        Some(SplitStats {
            train: stats_for(&ordered[..train_end], mode),
            validate: stats_for(&ordered[train_end..val_end], mode),
            test: stats_for(&ordered[val_end..], mode),
        })
    } else {
        None
    };

    let signal_events: Vec<&ContrarianEvent> = ordered
        .iter()
        .copied()
        .filter(|e| e.is_contrarian_by_mode(mode))
        .collect();
    let pnl = compute_pnl(&signal_events);

    CorrelationSummary {
        mode,
        overall,
        splits,
        pnl,
    }
}

/// Daily-stepped rolling correlation with a fixed window width.
pub fn rolling_correlation(
    events: &[ContrarianEvent],
    mode: ContrarianMode,
    window_days: i64,
) -> Vec<RollingPoint> {
    if events.is_empty() {
        return Vec::new();
    }
    let mut ordered: Vec<&ContrarianEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.trade_timestamp);

    let window_ms = window_days.max(1) * 86_400_000;
    let day_ms = 86_400_000i64;
    let first_day = ordered.first().unwrap().trade_timestamp / day_ms;
    let last_day = ordered.last().unwrap().trade_timestamp / day_ms;

    let mut points = Vec::new();
    for day in first_day..=last_day {
        let end_ms = (day + 1) * day_ms;
        let start_ms = end_ms - window_ms;
        let window: Vec<&ContrarianEvent> = ordered
            .iter()
            .copied()
            .filter(|e| e.trade_timestamp >= start_ms && e.trade_timestamp < end_ms)
            .collect();
        if window.len() < MIN_ROLLING_EVENTS {
            continue;
        }
        let stats = stats_for(&window, mode);
        let date = DateTime::<Utc>::from_timestamp_millis(end_ms - 1)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        points.push(RollingPoint {
            date,
            r: stats.r,
            win_rate: stats.signal_win_rate,
            sample_size: stats.n,
            ci_lower: stats.ci_lower,
            ci_upper: stats.ci_upper,
        });
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, Side};

    fn event(ts: i64, contrarian: bool, won: bool) -> ContrarianEvent {
        ContrarianEvent {
            id: None,
            condition_id: "c".into(),
            token_id: "t".into(),
            trade_timestamp: ts,
            minutes_before_close: 30.0,
            trade_side: Side::Buy,
            trade_price: 0.4,
            trade_size: 100.0,
            trade_notional: 40.0,
            taker_address: "0xabc".into(),
            size_percentile: 50.0,
            size_z_score: 0.0,
            is_tail_trade: false,
            is_price_contrarian: contrarian,
            price_trend_30m: 0.0,
            is_against_trend: contrarian,
            ofi_30m: 0.0,
            is_against_ofi: contrarian,
            is_contrarian: contrarian,
            book_imbalance: 0.0,
            thin_opposite_ratio: 1.0,
            spread_bps: 0.0,
            is_asymmetric_book: false,
            wallet_age_days: None,
            wallet_trade_count: None,
            is_new_wallet: false,
            traded_outcome: Outcome::Yes,
            outcome_won: won,
            drift_30m: None,
            drift_60m: None,
        }
    }

    #[test]
    fn aligned_predictor_scores_high() {
        // Contrarian events win, non-contrarian lose; predictor is perfect.
        let events: Vec<ContrarianEvent> = (0..60)
            .map(|i| {
                let contrarian = i % 2 == 0;
                event(i * 3_600_000, contrarian, contrarian)
            })
            .collect();
        let s = compute_summary(&events, ContrarianMode::VsBoth);
        assert!(s.overall.r > 0.9);
        assert!(s.overall.p_value < 1e-6);
        assert!(s.overall.ci_lower <= s.overall.r && s.overall.r <= s.overall.ci_upper);
        assert!((s.overall.signal_win_rate - 1.0).abs() < 1e-12);
        assert!((s.overall.lift - 1.0).abs() < 1e-12);
        assert!(s.overall.auc > 0.9);
        assert!(s.splits.is_some());
        assert_eq!(s.pnl.n, 30);
    }

    #[test]
    fn small_samples_skip_split() {
        let events: Vec<ContrarianEvent> =
            (0..10).map(|i| event(i * 1_000, true, i % 2 == 0)).collect();
        let s = compute_summary(&events, ContrarianMode::PriceOnly);
        assert!(s.splits.is_none());
        assert_eq!(s.overall.n, 10);
    }

    #[test]
    fn rolling_needs_five_events_per_window() {
        let day = 86_400_000i64;
        // Three events per day: below the window minimum for 1-day windows.
        let sparse: Vec<ContrarianEvent> = (0..9)
            .map(|i| event((i / 3) * day + i * 1_000, true, true))
            .collect();
        assert!(rolling_correlation(&sparse, ContrarianMode::PriceOnly, 1).is_empty());

        // Seven days of six events each: 7-day windows qualify.
        let dense: Vec<ContrarianEvent> = (0..42)
            .map(|i| event((i / 6) * day + (i % 6) * 3_600_000, i % 2 == 0, i % 2 == 0))
            .collect();
        let points = rolling_correlation(&dense, ContrarianMode::PriceOnly, 7);
        assert!(!points.is_empty());
        assert!(points.iter().all(|p| p.sample_size >= MIN_ROLLING_EVENTS));
        assert!(points.iter().all(|p| p.date.len() == 10));
    }
}
