//! Page-Hinkley CUSUM change-point detector.
//!
//!   S+ <- max(0, S+ + x - target - k)
//!   S- <- max(0, S- + target - x - k)
//!
//! The first crossing of the decision threshold `h` latches the change-point
//! index; the latch is never reset silently. The target is the mean of the
//! first third of observed samples.

use crate::config::CusumConfig;
use serde::{Deserialize, Serialize};

/// Metrics the engine runs a detector on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CusumMetric {
    TradeRate,
    Spread,
    Imbalance,
}

impl CusumMetric {
    pub const ALL: [CusumMetric; 3] = [
        CusumMetric::TradeRate,
        CusumMetric::Spread,
        CusumMetric::Imbalance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CusumMetric::TradeRate => "trade_rate",
            CusumMetric::Spread => "spread",
            CusumMetric::Imbalance => "imbalance",
        }
    }
}

/// Direction of the shift that latched the change point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftDirection {
    Increase,
    Decrease,
}

/// Read-only snapshot of a detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CusumSnapshot {
    pub metric: CusumMetric,
    pub target: f64,
    pub drift_k: f64,
    pub threshold_h: f64,
    pub s_pos: f64,
    pub s_neg: f64,
    pub max_statistic: f64,
    pub change_point_index: Option<usize>,
    pub change_direction: Option<ShiftDirection>,
    /// Timestamp of the sample that latched, if any.
    pub change_point_ms: Option<i64>,
    pub samples_seen: usize,
}

/// Streaming Page-Hinkley detector for one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageHinkley {
    metric: CusumMetric,
    drift_k: f64,
    threshold_h: f64,
    s_pos: f64,
    s_neg: f64,
    max_statistic: f64,
    change_point_index: Option<usize>,
    change_direction: Option<ShiftDirection>,
    change_point_ms: Option<i64>,
    samples_seen: usize,
    /// Early prefix kept for the first-third target estimate. Bounded.
    early: Vec<f64>,
}

/// Samples required before the statistics accumulate.
const MIN_TARGET_SAMPLES: usize = 9;
/// Early-prefix retention bound; the first-third mean stabilizes well below it.
const EARLY_CAP: usize = 256;

impl PageHinkley {
    pub fn new(metric: CusumMetric, cfg: CusumConfig) -> Self {
        Self {
            metric,
            drift_k: cfg.drift_k,
            threshold_h: cfg.threshold_h,
            s_pos: 0.0,
            s_neg: 0.0,
            max_statistic: 0.0,
            change_point_index: None,
            change_direction: None,
            change_point_ms: None,
            samples_seen: 0,
            early: Vec::new(),
        }
    }

    /// Mean of the first third of observed samples (capped prefix).
    pub fn target(&self) -> f64 {
        let third = (self.samples_seen / 3).clamp(1, self.early.len().max(1));
        if self.early.is_empty() {
            return 0.0;
        }
        let take = third.min(self.early.len());
        self.early[..take].iter().sum::<f64>() / take as f64
    }

    /// Feed one observation taken at `t_ms`.
    pub fn update(&mut self, x: f64, t_ms: i64) {
        if !x.is_finite() {
            return;
        }
        self.samples_seen += 1;
        if self.early.len() < EARLY_CAP {
            self.early.push(x);
        }
        if self.samples_seen < MIN_TARGET_SAMPLES {
            return;
        }

        let target = self.target();
        self.s_pos = (self.s_pos + x - target - self.drift_k).max(0.0);
        self.s_neg = (self.s_neg + target - x - self.drift_k).max(0.0);
        let stat = self.s_pos.max(self.s_neg);
        if stat > self.max_statistic {
            self.max_statistic = stat;
        }

        if self.change_point_index.is_none() && stat >= self.threshold_h {
            self.change_point_index = Some(self.samples_seen - 1);
            self.change_point_ms = Some(t_ms);
            self.change_direction = Some(if self.s_pos >= self.s_neg {
                ShiftDirection::Increase
            } else {
                ShiftDirection::Decrease
            });
        }
    }

    pub fn snapshot(&self) -> CusumSnapshot {
        CusumSnapshot {
            metric: self.metric,
            target: self.target(),
            drift_k: self.drift_k,
            threshold_h: self.threshold_h,
            s_pos: self.s_pos,
            s_neg: self.s_neg,
            max_statistic: self.max_statistic,
            change_point_index: self.change_point_index,
            change_direction: self.change_direction,
            change_point_ms: self.change_point_ms,
            samples_seen: self.samples_seen,
        }
    }
}
