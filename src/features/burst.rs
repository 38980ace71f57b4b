//! Burst features from the self-exciting intensity proxy.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BurstFeatures {
    pub trade_count_1m: usize,
    pub trade_count_5m: usize,
    pub intensity: f64,
    /// `intensity / baseline`.
    pub intensity_ratio: f64,
    /// `clip((ratio - 1) / 4, 0, 1)`: saturates at 5x baseline.
    pub burst_score: f64,
    pub burst_detected: bool,
}

pub fn compute(
    trade_count_1m: usize,
    trade_count_5m: usize,
    intensity: f64,
    baseline: f64,
    burst_detected: bool,
) -> BurstFeatures {
    let ratio = if baseline > 0.0 {
        intensity / baseline
    } else {
        0.0
    };
    BurstFeatures {
        trade_count_1m,
        trade_count_5m,
        intensity,
        intensity_ratio: ratio,
        burst_score: ((ratio - 1.0) / 4.0).clamp(0.0, 1.0),
        burst_detected,
    }
}
