//! Score derivation over a feature vector.

use crate::config::{ScoringConfig, TripleSignalThresholds};
use crate::features::FeatureVector;
use crate::models::{SignalStrength, TriggeringTrade};
use crate::rolling::RollingStateEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Immutable score record for one (token, timestamp).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub token_id: String,
    pub condition_id: String,
    pub timestamp_ms: i64,
    pub anomaly: f64,
    pub execution: f64,
    pub edge_score: f64,
    pub composite: f64,
    pub ramp_multiplier: f64,
    pub signal_strength: SignalStrength,
    pub triggered: bool,
    pub triple_signal: bool,
    pub implied_probability: f64,
    pub estimated_probability: f64,
    pub edge: f64,
    pub edge_confidence: f64,
    pub aligned_signals: u8,
    pub slippage_estimate_bps: f64,
    pub fill_probability: f64,
    pub depth_at_limit_usd: f64,
    pub triggering_trades: Vec<TriggeringTrade>,
    pub highest_trade_1h: Option<TriggeringTrade>,
}

impl Score {
    /// Jobs go downstream only for a live signal outside the no-trade zone.
    pub fn should_emit_job(&self, in_no_trade_zone: bool) -> bool {
        self.signal_strength != SignalStrength::None && !in_no_trade_zone
    }
}

/// The three-way conjunction of size-tail, book-asymmetry and wallet
/// conditions. Monotone: raising any input never turns true into false.
pub fn triple_signal(
    size_tail: f64,
    book_imbalance: f64,
    thin_opposite: f64,
    wallet_new: f64,
    wallet_activity: f64,
    t: &TripleSignalThresholds,
) -> bool {
    size_tail >= t.size_tail
        && book_imbalance >= t.book_imbalance
        && thin_opposite >= t.thin_opposite
        && (wallet_new >= t.wallet_new || wallet_activity >= t.wallet_activity)
}

pub struct ScoreEngine {
    engine: Arc<RollingStateEngine>,
    cfg: ScoringConfig,
}

impl ScoreEngine {
    pub fn new(engine: Arc<RollingStateEngine>, cfg: ScoringConfig) -> Self {
        Self { engine, cfg }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.cfg
    }

    /// Derive all scores for a feature vector. `wallet_age_of` resolves
    /// cached wallet ages for triggering-trade enrichment; it must not block.
    pub fn compute_scores<F>(
        &self,
        features: &FeatureVector,
        target_size_usd: f64,
        wallet_age_of: F,
    ) -> Score
    where
        F: Fn(&str) -> Option<f64>,
    {
        let ramp = features.time.ramp_multiplier;

        let size_tail = features.trade_size.map(|t| t.size_tail_score).unwrap_or(0.0);
        let wallet_new = features
            .wallet
            .as_ref()
            .map(|w| w.wallet_new_score)
            .unwrap_or(0.0);
        let wallet_activity = features
            .wallet
            .as_ref()
            .map(|w| w.activity_score)
            .unwrap_or(0.0);
        let impact_score = features.impact.map(|i| i.impact_score).unwrap_or(0.0);
        let book = &features.book;

        // Anomaly: weighted core plus the stronger of the regime signals.
        let core = 0.35 * size_tail
            + 0.30 * (0.6 * book.book_imbalance_score + 0.4 * book.thin_opposite_score)
            + 0.20 * wallet_new
            + 0.15 * impact_score;
        let context = features
            .change_point
            .change_point_score
            .max(features.burst.burst_score);
        let anomaly = (ramp * (0.7 * core + 0.3 * context)).clamp(0.0, 1.0);

        let triple = triple_signal(
            size_tail,
            book.book_imbalance_score,
            book.thin_opposite_score,
            wallet_new,
            wallet_activity,
            &self.cfg.triple,
        );

        // Execution quality.
        let sp = &self.cfg.spread_penalty;
        let spread_penalty = ((book.spread_bps - sp.min_acceptable_bps)
            / (sp.max_acceptable_bps - sp.min_acceptable_bps))
            .clamp(0.0, 1.0);
        let vol_penalty =
            0.6 * (book.spread_bps / 500.0).min(1.0) + 0.4 * book.imbalance.abs();
        let time_score = (1.0 / ramp).min(1.0);
        let execution = (0.40 * book.depth_score
            + 0.25 * (1.0 - spread_penalty)
            + 0.25 * (1.0 - vol_penalty)
            + 0.10 * time_score)
            .clamp(0.0, 1.0);

        // Execution byproducts, proxies only.
        let depth_at_limit = book.total_depth_usd / 2.0;
        let slippage_estimate_bps = book.spread_bps / 2.0
            + (target_size_usd / depth_at_limit.max(1.0)).min(1.0) * 50.0;
        let fill_probability = if book.has_book {
            ((depth_at_limit / target_size_usd.max(1.0)).min(1.0)
                * (0.5 + 0.5 * book.spread_score))
                .clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Edge: book-pressure adjustment around the implied probability.
        let implied = book.mid.unwrap_or(0.5);
        let signed_imbalance = book.imbalance.signum();
        let is_new_account = features
            .wallet
            .as_ref()
            .map(|w| w.is_new_account)
            .unwrap_or(false);
        let is_large_trade = features
            .trade_size
            .map(|t| t.is_large_trade)
            .unwrap_or(false);

        let mut adjustment = signed_imbalance * (0.1 * anomaly).min(0.15)
            + signed_imbalance * book.imbalance.abs() * 0.05;
        if is_new_account && is_large_trade {
            adjustment *= 1.2;
        }
        let estimated = (implied + adjustment).clamp(0.01, 0.99);
        let edge = estimated - implied;

        let mut aligned: u8 = 0;
        if is_large_trade {
            aligned += 1;
        }
        if book.imbalance.abs() > 0.3 {
            aligned += 1;
        }
        if features.burst.burst_detected {
            aligned += 1;
        }
        if features.change_point.change_point_ms.is_some() {
            aligned += 1;
        }
        if is_new_account {
            aligned += 1;
        }
        let edge_confidence = (0.2 + 0.14 * aligned as f64).min(0.9);
        let edge_score = (edge.abs() * 5.0 * edge_confidence * execution).clamp(0.0, 1.0);

        // Composite.
        let (wa, we, wd) = self.cfg.composite_weights;
        let blended = (wa * anomaly + we * execution + wd * edge_score) / (wa + we + wd);
        let composite = (blended * ramp).clamp(0.0, 1.0);
        let signal_strength = SignalStrength::from_composite(composite);

        let (triggering_trades, highest_trade_1h) =
            self.extract_trades(&features.token_id, features.timestamp_ms, &wallet_age_of);

        Score {
            token_id: features.token_id.clone(),
            condition_id: features.condition_id.clone(),
            timestamp_ms: features.timestamp_ms,
            anomaly,
            execution,
            edge_score,
            composite,
            ramp_multiplier: ramp,
            signal_strength,
            triggered: anomaly >= self.cfg.anomaly_trigger,
            triple_signal: triple,
            implied_probability: implied,
            estimated_probability: estimated,
            edge,
            edge_confidence,
            aligned_signals: aligned,
            slippage_estimate_bps,
            fill_probability,
            depth_at_limit_usd: depth_at_limit,
            triggering_trades,
            highest_trade_1h,
        }
    }

    /// Triggering trades: notional >= floor and >= q95, top 3 by notional.
    /// The highest 1h trade is display-only and uses its own (lower) floor.
    fn extract_trades<F>(
        &self,
        token_id: &str,
        now_ms: i64,
        wallet_age_of: &F,
    ) -> (Vec<TriggeringTrade>, Option<TriggeringTrade>)
    where
        F: Fn(&str) -> Option<f64>,
    {
        let window = self.engine.trade_window(token_id, 60, now_ms);
        let q95 = self.engine.trade_size_quantile(token_id, 95.0);

        let to_record = |t: &crate::models::Trade| TriggeringTrade {
            trade_id: t.trade_id.clone(),
            timestamp_ms: t.timestamp_ms,
            side: t.side,
            price: t.price,
            size: t.size,
            notional: t.notional(),
            taker_address: t.taker_address.clone(),
            wallet_age_days: wallet_age_of(&t.taker_address),
            tx_hash: t.tx_hash.clone(),
        };

        let mut qualifying: Vec<&crate::models::Trade> = window
            .iter()
            .filter(|t| {
                t.notional() >= self.cfg.triggering_trade_floor_usd && t.notional() >= q95
            })
            .collect();
        qualifying.sort_by(|a, b| b.notional().partial_cmp(&a.notional()).unwrap());
        let triggering: Vec<TriggeringTrade> =
            qualifying.iter().take(3).map(|t| to_record(t)).collect();

        let highest = window
            .iter()
            .filter(|t| t.notional() >= self.cfg.highest_trade_display_floor_usd)
            .max_by(|a, b| a.notional().partial_cmp(&b.notional()).unwrap())
            .map(to_record);

        (triggering, highest)
    }
}
