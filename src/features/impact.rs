//! Post-trade price-impact proxy.
//!
//! Mid drift at +30 s / +60 s after a trade, signed so positive means the
//! price moved in the trade's direction. Null whenever the mid history does
//! not cover the needed horizon.

use crate::models::Side;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Mid move (in price points) treated as full confirmation.
const FULL_CONFIRMATION_MOVE: f64 = 0.05;
/// Matching tolerance when sampling the history.
const LOOKUP_TOLERANCE_MS: i64 = 15_000;
/// History retention.
const HISTORY_MS: i64 = 10 * 60_000;

/// Bounded per-token mid-price history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MidHistory {
    points: VecDeque<(i64, f64)>,
}

impl MidHistory {
    pub fn push(&mut self, time_ms: i64, mid: f64) {
        self.points.push_back((time_ms, mid));
        let cutoff = time_ms - HISTORY_MS;
        while let Some(&(t, _)) = self.points.front() {
            if t < cutoff {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Mid nearest to `t_ms` within tolerance.
    pub fn mid_at(&self, t_ms: i64) -> Option<f64> {
        self.points
            .iter()
            .min_by_key(|(t, _)| (t - t_ms).abs())
            .filter(|(t, _)| (t - t_ms).abs() <= LOOKUP_TOLERANCE_MS)
            .map(|&(_, mid)| mid)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImpactFeatures {
    /// Signed drift at +30 s; positive confirms the trade direction.
    pub drift_30s: Option<f64>,
    /// Signed drift at +60 s.
    pub drift_60s: Option<f64>,
    pub impact_score: f64,
}

/// Compute the impact proxy for a trade at `trade_ms`. Returns `None` when
/// the history cannot anchor the trade-time mid or neither horizon resolves.
pub fn compute(history: &MidHistory, trade_ms: i64, side: Side) -> Option<ImpactFeatures> {
    let base = history.mid_at(trade_ms)?;
    let sign = match side {
        Side::Buy => 1.0,
        Side::Sell => -1.0,
    };

    let drift = |horizon_ms: i64| -> Option<f64> {
        history
            .mid_at(trade_ms + horizon_ms)
            .map(|m| (m - base) * sign)
    };

    let drift_30s = drift(30_000);
    let drift_60s = drift(60_000);
    let best = drift_60s.or(drift_30s)?;

    Some(ImpactFeatures {
        drift_30s,
        drift_60s,
        impact_score: (best / FULL_CONFIRMATION_MOVE).clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(points: &[(i64, f64)]) -> MidHistory {
        let mut h = MidHistory::default();
        for &(t, m) in points {
            h.push(t, m);
        }
        h
    }

    #[test]
    fn confirming_buy_scores_positive() {
        let h = history(&[(0, 0.50), (30_000, 0.53), (60_000, 0.55)]);
        let f = compute(&h, 0, Side::Buy).unwrap();
        assert!((f.drift_30s.unwrap() - 0.03).abs() < 1e-12);
        assert!((f.drift_60s.unwrap() - 0.05).abs() < 1e-12);
        assert_eq!(f.impact_score, 1.0);
    }

    #[test]
    fn adverse_move_scores_zero() {
        let h = history(&[(0, 0.50), (60_000, 0.55)]);
        let f = compute(&h, 0, Side::Sell).unwrap();
        assert!(f.drift_60s.unwrap() < 0.0);
        assert_eq!(f.impact_score, 0.0);
    }

    #[test]
    fn insufficient_history_is_none() {
        let h = history(&[(0, 0.50)]);
        assert!(compute(&h, 0, Side::Buy).is_none());
        let empty = MidHistory::default();
        assert!(compute(&empty, 0, Side::Buy).is_none());
    }

    #[test]
    fn history_is_bounded() {
        let mut h = MidHistory::default();
        for i in 0..10_000 {
            h.push(i * 1_000, 0.5);
        }
        assert!(h.len() <= (HISTORY_MS / 1_000 + 1) as usize);
    }
}
