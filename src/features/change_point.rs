//! Change-point features folded across the per-metric CUSUM detectors.

use crate::rolling::cusum::{CusumSnapshot, ShiftDirection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegimeShift {
    None,
    Increase,
    Decrease,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChangePointFeatures {
    /// Max of the per-metric max statistics.
    pub focus_statistic: f64,
    /// Smooth saturating map of the focus statistic against its threshold:
    /// `1 - exp(-focus / h)`.
    pub change_point_score: f64,
    pub regime_shift: RegimeShift,
    /// Latch timestamp of the winning metric, if any.
    pub change_point_ms: Option<i64>,
}

pub fn compute(snapshots: &[CusumSnapshot]) -> ChangePointFeatures {
    let winner = snapshots.iter().max_by(|a, b| {
        a.max_statistic
            .partial_cmp(&b.max_statistic)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let Some(w) = winner else {
        return ChangePointFeatures {
            focus_statistic: 0.0,
            change_point_score: 0.0,
            regime_shift: RegimeShift::None,
            change_point_ms: None,
        };
    };

    let h = w.threshold_h.max(f64::EPSILON);
    let score = 1.0 - (-w.max_statistic / h).exp();
    let regime = match w.change_direction {
        Some(ShiftDirection::Increase) => RegimeShift::Increase,
        Some(ShiftDirection::Decrease) => RegimeShift::Decrease,
        None => RegimeShift::None,
    };

    ChangePointFeatures {
        focus_statistic: w.max_statistic,
        change_point_score: score.clamp(0.0, 1.0),
        regime_shift: regime,
        change_point_ms: w.change_point_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CusumConfig;
    use crate::rolling::cusum::{CusumMetric, PageHinkley};

    #[test]
    fn no_detectors_is_quiet() {
        let f = compute(&[]);
        assert_eq!(f.change_point_score, 0.0);
        assert_eq!(f.regime_shift, RegimeShift::None);
    }

    #[test]
    fn latched_shift_sets_regime_and_timestamp() {
        let mut spread = PageHinkley::new(CusumMetric::Spread, CusumConfig::default());
        for i in 0..60 {
            spread.update(10.0, i);
        }
        for i in 60..140 {
            spread.update(20.0, i);
        }
        let mut quiet = PageHinkley::new(CusumMetric::Imbalance, CusumConfig::default());
        for i in 0..140 {
            quiet.update(0.0, i);
        }

        let f = compute(&[spread.snapshot(), quiet.snapshot()]);
        assert_eq!(f.regime_shift, RegimeShift::Increase);
        assert!(f.change_point_ms.is_some());
        assert!(f.change_point_score > 0.6);
    }

    #[test]
    fn score_saturates_smoothly() {
        let mut d = PageHinkley::new(CusumMetric::TradeRate, CusumConfig::default());
        for i in 0..30 {
            d.update(1.0, i);
        }
        for i in 30..300 {
            d.update(100.0, i);
        }
        let f = compute(&[d.snapshot()]);
        assert!(f.change_point_score > 0.99 && f.change_point_score <= 1.0);
    }
}
