//! Regularized logistic model report.
//!
//! L2 logistic regression fit by batch gradient descent on a fixed
//! 8-feature design matrix, evaluated on a chronological 60/20/20 split
//! with a 10-bin calibration curve on the test set. Research reporting
//! only; nothing here feeds live decisions.

use crate::research::events::ContrarianEvent;
use crate::research::stats::auc;
use serde::{Deserialize, Serialize};

/// Minimum events before a report is attempted.
pub const MIN_MODEL_EVENTS: usize = 50;

pub const FEATURE_NAMES: [&str; 8] = [
    "price_contrarian",
    "against_trend",
    "against_ofi",
    "tail_trade",
    "asymmetric_book",
    "new_wallet",
    "size_percentile",
    "minutes_to_close",
];

/// Normalization cap for minutes-to-close.
const MTC_CAP: f64 = 120.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub learning_rate: f64,
    pub iterations: usize,
    pub l2_lambda: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            iterations: 500,
            l2_lambda: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bin_lower: f64,
    pub bin_upper: f64,
    pub mean_predicted: f64,
    pub observed_rate: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub n: usize,
    pub coefficients: Vec<(String, f64)>,
    pub intercept: f64,
    /// Absolute-coefficient share, sums to 1.
    pub feature_importance: Vec<(String, f64)>,
    pub auc_train: f64,
    pub auc_validate: f64,
    pub auc_test: f64,
    /// Empty bins filtered out.
    pub calibration: Vec<CalibrationBin>,
    pub train_config: TrainConfig,
}

fn features_of(e: &ContrarianEvent) -> [f64; 8] {
    [
        e.is_price_contrarian as u8 as f64,
        e.is_against_trend as u8 as f64,
        e.is_against_ofi as u8 as f64,
        e.is_tail_trade as u8 as f64,
        e.is_asymmetric_book as u8 as f64,
        e.is_new_wallet as u8 as f64,
        (e.size_percentile / 100.0).clamp(0.0, 1.0),
        (e.minutes_before_close / MTC_CAP).clamp(0.0, 1.0),
    ]
}

#[inline]
fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn predict(weights: &[f64; 8], intercept: f64, x: &[f64; 8]) -> f64 {
    let z = intercept + weights.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>();
    sigmoid(z)
}

/// Batch gradient descent with L2 on the weights (intercept unpenalized).
fn fit(xs: &[[f64; 8]], ys: &[f64], cfg: &TrainConfig) -> ([f64; 8], f64) {
    let n = xs.len() as f64;
    let mut w = [0.0f64; 8];
    let mut b = 0.0f64;

    for _ in 0..cfg.iterations {
        let mut grad_w = [0.0f64; 8];
        let mut grad_b = 0.0f64;
        for (x, &y) in xs.iter().zip(ys) {
            let err = predict(&w, b, x) - y;
            for (g, xi) in grad_w.iter_mut().zip(x) {
                *g += err * xi;
            }
            grad_b += err;
        }
        for (wi, g) in w.iter_mut().zip(&grad_w) {
            *wi -= cfg.learning_rate * (g / n + cfg.l2_lambda * *wi);
        }
        b -= cfg.learning_rate * grad_b / n;
    }
    (w, b)
}

fn auc_of(weights: &[f64; 8], intercept: f64, xs: &[[f64; 8]], labels: &[bool]) -> f64 {
    let scores: Vec<f64> = xs.iter().map(|x| predict(weights, intercept, x)).collect();
    auc(&scores, labels)
}

fn calibration_curve(
    weights: &[f64; 8],
    intercept: f64,
    xs: &[[f64; 8]],
    labels: &[bool],
) -> Vec<CalibrationBin> {
    let mut bins: Vec<(f64, f64, Vec<(f64, bool)>)> = (0..10)
        .map(|i| (i as f64 / 10.0, (i + 1) as f64 / 10.0, Vec::new()))
        .collect();
    for (x, &label) in xs.iter().zip(labels) {
        let p = predict(weights, intercept, x);
        let idx = ((p * 10.0).floor() as usize).min(9);
        bins[idx].2.push((p, label));
    }
    bins.into_iter()
        .filter(|(_, _, members)| !members.is_empty())
        .map(|(lo, hi, members)| {
            let count = members.len();
            let mean_predicted = members.iter().map(|(p, _)| p).sum::<f64>() / count as f64;
            let observed = members.iter().filter(|(_, l)| *l).count() as f64 / count as f64;
            CalibrationBin {
                bin_lower: lo,
                bin_upper: hi,
                mean_predicted,
                observed_rate: observed,
                count,
            }
        })
        .collect()
}

/// Fit and evaluate the report. Returns `None` below the event minimum.
pub fn model_report(events: &[ContrarianEvent], cfg: TrainConfig) -> Option<ModelReport> {
    if events.len() < MIN_MODEL_EVENTS {
        return None;
    }

    let mut ordered: Vec<&ContrarianEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.trade_timestamp);

    let xs: Vec<[f64; 8]> = ordered.iter().map(|e| features_of(e)).collect();
    let labels: Vec<bool> = ordered.iter().map(|e| e.outcome_won).collect();
    let ys: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();

    let n = xs.len();
    let train_end = n * 60 / 100;
    let val_end = n * 80 / 100;

    let (w, b) = fit(&xs[..train_end], &ys[..train_end], &cfg);

    let abs_sum: f64 = w.iter().map(|c| c.abs()).sum();
    let importance: Vec<(String, f64)> = FEATURE_NAMES
        .iter()
        .zip(&w)
        .map(|(name, c)| {
            let share = if abs_sum > 0.0 { c.abs() / abs_sum } else { 0.0 };
            (name.to_string(), share)
        })
        .collect();

    Some(ModelReport {
        n,
        coefficients: FEATURE_NAMES
            .iter()
            .zip(&w)
            .map(|(name, c)| (name.to_string(), *c))
            .collect(),
        intercept: b,
        feature_importance: importance,
        auc_train: auc_of(&w, b, &xs[..train_end], &labels[..train_end]),
        auc_validate: auc_of(&w, b, &xs[train_end..val_end], &labels[train_end..val_end]),
        auc_test: auc_of(&w, b, &xs[val_end..], &labels[val_end..]),
        calibration: calibration_curve(&w, b, &xs[val_end..], &labels[val_end..]),
        train_config: cfg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, Side};

    fn event(ts: i64, tail: bool, won: bool) -> ContrarianEvent {
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
            size_percentile: if tail { 97.0 } else { 40.0 },
            size_z_score: 0.0,
            is_tail_trade: tail,
            is_price_contrarian: tail,
            price_trend_30m: 0.0,
            is_against_trend: tail,
            ofi_30m: 0.0,
            is_against_ofi: false,
            is_contrarian: false,
            book_imbalance: 0.0,
            thin_opposite_ratio: 1.0,
            spread_bps: 100.0,
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
    fn below_minimum_returns_none() {
        let events: Vec<ContrarianEvent> =
            (0..49).map(|i| event(i, i % 2 == 0, i % 2 == 0)).collect();
        assert!(model_report(&events, TrainConfig::default()).is_none());
    }

    #[test]
    fn separable_data_learns_the_signal() {
        // Tail trades win, everything else loses; model should learn it.
        let events: Vec<ContrarianEvent> = (0..200)
            .map(|i| {
                let tail = i % 2 == 0;
                event(i as i64 * 60_000, tail, tail)
            })
            .collect();
        let report = model_report(&events, TrainConfig::default()).expect("enough events");

        assert_eq!(report.n, 200);
        assert!(report.auc_train > 0.9, "auc_train = {}", report.auc_train);
        assert!(report.auc_test > 0.9, "auc_test = {}", report.auc_test);

        let importance_sum: f64 = report.feature_importance.iter().map(|(_, s)| s).sum();
        assert!((importance_sum - 1.0).abs() < 1e-9);

        // None of the calibration bins are empty by construction.
        assert!(!report.calibration.is_empty());
        assert!(report.calibration.iter().all(|b| b.count > 0));
    }

    #[test]
    fn coefficients_carry_feature_names() {
        let events: Vec<ContrarianEvent> = (0..80)
            .map(|i| event(i as i64, i % 3 == 0, i % 2 == 0))
            .collect();
        let report = model_report(&events, TrainConfig::default()).unwrap();
        let names: Vec<&str> = report
            .coefficients
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, FEATURE_NAMES.to_vec());
    }
}
