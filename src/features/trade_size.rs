//! Trade-size tail features: robust window statistics plus the dollar-floored
//! tail score.

use crate::config::DollarFloors;
use crate::rolling::{mad, median, robust_z};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeSizeFeatures {
    pub notional: f64,
    pub rolling_median: f64,
    pub rolling_mad: f64,
    pub q95: f64,
    pub q99: f64,
    pub q999: f64,
    pub robust_z: f64,
    /// Lifetime percentile rank from the t-digest, [0, 100].
    pub percentile: f64,
    pub raw_size_tail_score: f64,
    pub dollar_floor_multiplier: f64,
    /// `raw * floor`; never exceeds the raw score.
    pub size_tail_score: f64,
    pub is_large_trade: bool,
    pub is_tail_trade: bool,
    pub is_extreme_trade: bool,
}

/// Piecewise-linear map from percentile rank to the raw tail score:
/// 0 -> 0.5 over [0, 95], 0.5 -> 0.9 over (95, 99], 0.9 -> 0.98 over
/// (99, 99.9], 0.98 -> 1.0 above.
pub fn raw_tail_score(percentile: f64) -> f64 {
    let p = percentile.clamp(0.0, 100.0);
    if p <= 95.0 {
        p / 95.0 * 0.5
    } else if p <= 99.0 {
        0.5 + (p - 95.0) / 4.0 * 0.4
    } else if p <= 99.9 {
        0.9 + (p - 99.0) / 0.9 * 0.08
    } else {
        0.98 + (p - 99.9) / 0.1 * 0.02
    }
}

/// Notional-based floor so a "tail" print in a dead market still has to be
/// real money before it scores.
pub fn dollar_floor_multiplier(notional: f64, floors: &DollarFloors) -> f64 {
    if notional < floors.zero {
        0.0
    } else if notional < floors.half {
        0.5
    } else if notional < floors.three_quarter {
        0.75
    } else {
        1.0
    }
}

/// Derive size features from the trailing-window notionals plus the lifetime
/// percentile rank. Fewer than 5 window samples degrades every statistic to
/// the notional itself with z = 0 and percentile = 50.
pub fn compute(
    notional: f64,
    window_notionals: &[f64],
    digest_percentile: f64,
    floors: &DollarFloors,
) -> TradeSizeFeatures {
    let degraded = window_notionals.len() < 5;

    let (rolling_median, rolling_mad, q95, q99, q999, z, percentile) = if degraded {
        (notional, 0.0, notional, notional, notional, 0.0, 50.0)
    } else {
        let med = median(window_notionals);
        let mad_v = mad(window_notionals, med);
        let mut sorted = window_notionals.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let q = |p: f64| -> f64 {
            let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };
        (
            med,
            mad_v,
            q(95.0),
            q(99.0),
            q(99.9),
            robust_z(notional, med, mad_v),
            digest_percentile,
        )
    };

    let raw = raw_tail_score(percentile);
    let floor = dollar_floor_multiplier(notional, floors);

    TradeSizeFeatures {
        notional,
        rolling_median,
        rolling_mad,
        q95,
        q99,
        q999,
        robust_z: z,
        percentile,
        raw_size_tail_score: raw,
        dollar_floor_multiplier: floor,
        size_tail_score: raw * floor,
        is_large_trade: z > 3.0 || percentile > 99.0,
        is_tail_trade: percentile > 95.0,
        is_extreme_trade: percentile > 99.9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_score_piecewise_anchors() {
        assert!((raw_tail_score(0.0) - 0.0).abs() < 1e-12);
        assert!((raw_tail_score(95.0) - 0.5).abs() < 1e-12);
        assert!((raw_tail_score(99.0) - 0.9).abs() < 1e-12);
        assert!((raw_tail_score(99.9) - 0.98).abs() < 1e-12);
        assert!((raw_tail_score(100.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn raw_score_monotone() {
        let mut last = -1.0;
        for i in 0..=1000 {
            let s = raw_tail_score(i as f64 / 10.0);
            assert!(s >= last - 1e-12);
            last = s;
        }
    }

    #[test]
    fn floor_brackets() {
        let f = DollarFloors::default();
        assert_eq!(dollar_floor_multiplier(4_999.0, &f), 0.0);
        assert_eq!(dollar_floor_multiplier(5_000.0, &f), 0.5);
        assert_eq!(dollar_floor_multiplier(10_000.0, &f), 0.75);
        assert_eq!(dollar_floor_multiplier(25_000.0, &f), 1.0);
    }

    #[test]
    fn floored_score_never_exceeds_raw() {
        let f = DollarFloors::default();
        for &(notional, pct) in &[(100.0, 99.95), (7_500.0, 99.5), (30_000.0, 96.0)] {
            let feats = compute(notional, &vec![50.0; 100], pct, &f);
            assert!(feats.size_tail_score <= feats.raw_size_tail_score + 1e-12);
            if notional >= f.three_quarter {
                assert!((feats.size_tail_score - feats.raw_size_tail_score).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn degraded_window_uses_notional() {
        let f = DollarFloors::default();
        let feats = compute(1_234.0, &[10.0, 20.0], 99.0, &f);
        assert_eq!(feats.rolling_median, 1_234.0);
        assert_eq!(feats.q999, 1_234.0);
        assert_eq!(feats.robust_z, 0.0);
        assert_eq!(feats.percentile, 50.0);
        assert!(!feats.is_tail_trade);
    }

    #[test]
    fn outlier_flags_fire() {
        let f = DollarFloors::default();
        let window: Vec<f64> = (0..200).map(|i| 100.0 + (i % 7) as f64).collect();
        let feats = compute(50_000.0, &window, 99.95, &f);
        assert!(feats.is_large_trade && feats.is_tail_trade && feats.is_extreme_trade);
        assert!(feats.robust_z > 3.0);
    }
}
