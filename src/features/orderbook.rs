//! Order-book asymmetry features.

use crate::models::BookMetrics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookFeatures {
    /// Current mid, when a book exists.
    pub mid: Option<f64>,
    pub imbalance: f64,
    /// `min(1, |imbalance| / 0.7)`.
    pub book_imbalance_score: f64,
    /// `min(bid, ask) / max(bid, ask)` over the 10% depth buckets.
    pub thin_side_ratio: f64,
    /// `max(0, 1 - thin_side_ratio)`.
    pub thin_opposite_score: f64,
    pub spread_bps: f64,
    /// `max(0, 1 - spread_bps / 500)`.
    pub spread_score: f64,
    pub total_depth_usd: f64,
    /// `min(1, total_depth / 100)`.
    pub depth_score: f64,
    pub is_asymmetric: bool,
    /// False when no current book was available; the rest of the struct is
    /// the neutral default in that case.
    pub has_book: bool,
}

impl BookFeatures {
    /// Neutral default used when no current book exists.
    pub fn neutral() -> Self {
        Self {
            mid: None,
            imbalance: 0.0,
            book_imbalance_score: 0.0,
            thin_side_ratio: 1.0,
            thin_opposite_score: 0.0,
            spread_bps: 0.0,
            spread_score: 1.0,
            total_depth_usd: 0.0,
            depth_score: 0.0,
            is_asymmetric: false,
            has_book: false,
        }
    }
}

pub fn compute(metrics: Option<&BookMetrics>) -> BookFeatures {
    let Some(m) = metrics else {
        return BookFeatures::neutral();
    };

    let bid = m.bid_depth_10pct.max(0.0);
    let ask = m.ask_depth_10pct.max(0.0);
    let total = bid + ask;
    let thin_side_ratio = if bid.max(ask) > 0.0 {
        bid.min(ask) / bid.max(ask)
    } else {
        1.0
    };

    let book_imbalance_score = (m.imbalance.abs() / 0.7).min(1.0);
    let thin_opposite_score = (1.0 - thin_side_ratio).max(0.0);
    let spread_score = (1.0 - m.spread_bps / 500.0).max(0.0);
    let depth_score = (total / 100.0).min(1.0);

    BookFeatures {
        mid: Some(m.mid),
        imbalance: m.imbalance,
        book_imbalance_score,
        thin_side_ratio,
        thin_opposite_score,
        spread_bps: m.spread_bps,
        spread_score,
        total_depth_usd: total,
        depth_score,
        is_asymmetric: m.imbalance.abs() > 0.5 && thin_side_ratio < 0.3,
        has_book: true,
    }
}
