//! Drift arithmetic: binomial z-scores, win-rate CUSUM, Kelly recalibration.

use crate::research::pnl::kelly_fraction;
use serde::{Deserialize, Serialize};

/// The recalibration deliberately assumes an average entry price of 0.5
/// irrespective of the strategy's actual price distribution. Known
/// simplification, kept as-is.
pub const ASSUMED_AVG_PRICE: f64 = 0.5;

/// Binomial z-score of an observed rate against an expected one.
pub fn binomial_z(observed: f64, expected: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = expected.clamp(1e-6, 1.0 - 1e-6);
    let se = (p * (1.0 - p) / n as f64).sqrt();
    if se <= 0.0 {
        return 0.0;
    }
    (observed - expected) / se
}

/// Rolling win rate over a fixed trade window.
pub fn rolling_win_rate(outcomes: &[bool], window: usize) -> Vec<f64> {
    let window = window.max(1);
    if outcomes.len() < window {
        return Vec::new();
    }
    outcomes
        .windows(window)
        .map(|w| w.iter().filter(|&&x| x).count() as f64 / window as f64)
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WinRateChangePoint {
    /// Index into the rolling series.
    pub index: usize,
    /// True for an upward shift.
    pub upward: bool,
    pub statistic: f64,
}

/// Batch CUSUM over the rolling win-rate series. The baseline is the mean
/// of the initial window; statistics reset after each detection so several
/// shifts can surface in one pass.
pub fn win_rate_change_points(
    outcomes: &[bool],
    window: usize,
    drift_k: f64,
    threshold_h: f64,
) -> Vec<WinRateChangePoint> {
    let series = rolling_win_rate(outcomes, window);
    if series.len() < window {
        return Vec::new();
    }

    let baseline: f64 = series[..window].iter().sum::<f64>() / window as f64;
    let std = {
        let var = series[..window]
            .iter()
            .map(|x| (x - baseline).powi(2))
            .sum::<f64>()
            / window as f64;
        var.sqrt().max(0.01)
    };

    let mut s_pos = 0.0f64;
    let mut s_neg = 0.0f64;
    let mut out = Vec::new();
    for (i, &x) in series.iter().enumerate() {
        let standardized = (x - baseline) / std;
        s_pos = (s_pos + standardized - drift_k).max(0.0);
        s_neg = (s_neg - standardized - drift_k).max(0.0);
        if s_pos > threshold_h {
            out.push(WinRateChangePoint {
                index: i,
                upward: true,
                statistic: s_pos,
            });
            s_pos = 0.0;
        }
        if s_neg > threshold_h {
            out.push(WinRateChangePoint {
                index: i,
                upward: false,
                statistic: s_neg,
            });
            s_neg = 0.0;
        }
    }
    out
}

/// Recalibrated Kelly: below the sample floor the baseline stands; above
/// it, the current half-Kelly (at the assumed 0.5 price) clamped to
/// `baseline * [1 - max_adj, 1 + max_adj]`.
pub fn recalibrate_kelly(
    baseline_kelly: f64,
    current_win_rate: f64,
    current_sample_size: usize,
    min_sample_size: usize,
    max_adjustment: f64,
) -> f64 {
    if current_sample_size < min_sample_size {
        return baseline_kelly;
    }
    let half_kelly = 0.5 * kelly_fraction(current_win_rate, ASSUMED_AVG_PRICE);
    let lo = baseline_kelly * (1.0 - max_adjustment);
    let hi = baseline_kelly * (1.0 + max_adjustment);
    half_kelly.clamp(lo.min(hi), hi.max(lo))
}
