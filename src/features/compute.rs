//! The feature computer: one (trade, book, meta, wallet) event in, one
//! feature vector out.
//!
//! All collaborator I/O (market metadata, wallet enrichment) happens before
//! this point; `compute_features` is CPU-only and never suspends. The
//! pipeline resolves the inputs and hands them in.

use crate::config::{DollarFloors, RampConfig, ScoringConfig};
use crate::features::{
    burst, change_point, impact, orderbook, time_to_close, trade_size, wallet, BookFeatures,
    BurstFeatures, ChangePointFeatures, ImpactFeatures, MidHistory, TimeFeatures,
    TradeSizeFeatures, WalletFeatures,
};
use crate::models::{BookMetrics, MarketMeta, Trade, WalletEnrichment};
use crate::rolling::RollingStateEngine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub token_id: String,
    pub condition_id: String,
    pub timestamp_ms: i64,
    pub time: TimeFeatures,
    /// Absent when the event carries no trade.
    pub trade_size: Option<TradeSizeFeatures>,
    pub book: BookFeatures,
    /// Absent when wallet enrichment was unavailable.
    pub wallet: Option<WalletFeatures>,
    /// Absent when the mid history cannot cover the impact horizon.
    pub impact: Option<ImpactFeatures>,
    pub burst: BurstFeatures,
    pub change_point: ChangePointFeatures,
}

/// Derives feature vectors against the rolling state engine. Owns the
/// per-token mid-price history backing the impact proxy.
pub struct FeatureComputer {
    engine: Arc<RollingStateEngine>,
    ramp: RampConfig,
    floors: DollarFloors,
    no_trade_zone_seconds: i64,
    mid_histories: Mutex<HashMap<String, MidHistory>>,
}

impl FeatureComputer {
    pub fn new(engine: Arc<RollingStateEngine>, scoring: &ScoringConfig) -> Self {
        Self {
            engine,
            ramp: scoring.ramp,
            floors: scoring.floors,
            no_trade_zone_seconds: scoring.no_trade_zone_seconds,
            mid_histories: Mutex::new(HashMap::new()),
        }
    }

    /// Record a book mid for the impact history. Called on every snapshot.
    pub fn observe_mid(&self, token_id: &str, time_ms: i64, mid: f64) {
        let mut map = self.mid_histories.lock();
        map.entry(token_id.to_string())
            .or_default()
            .push(time_ms, mid);
    }

    pub fn compute_features(
        &self,
        token_id: &str,
        condition_id: &str,
        now_ms: i64,
        trade: Option<&Trade>,
        book_metrics: Option<&BookMetrics>,
        meta: Option<&MarketMeta>,
        wallet_info: Option<&WalletEnrichment>,
    ) -> FeatureVector {
        let time = time_to_close::compute(
            meta.and_then(|m| m.end_date_ms()),
            now_ms,
            &self.ramp,
            self.no_trade_zone_seconds,
        );

        let trade_size_features = trade.map(|t| {
            let notionals = self.engine.window_notionals(token_id, 60, now_ms);
            let pct = self.engine.trade_size_percentile(token_id, t.notional());
            trade_size::compute(t.notional(), &notionals, pct, &self.floors)
        });

        let book_features = orderbook::compute(book_metrics);

        let wallet_features = wallet_info.map(|w| wallet::compute(w, now_ms));

        let impact_features = trade.and_then(|t| {
            let map = self.mid_histories.lock();
            map.get(token_id)
                .and_then(|h| impact::compute(h, t.timestamp_ms, t.side))
        });

        let (intensity, burst_detected) = self.engine.hawkes_intensity(token_id, now_ms);
        let burst_features = burst::compute(
            self.engine.trade_count(token_id, 1, now_ms),
            self.engine.trade_count(token_id, 5, now_ms),
            intensity,
            self.engine.hawkes_baseline(token_id),
            burst_detected,
        );

        let cp_features = change_point::compute(&self.engine.cusum_states(token_id));

        FeatureVector {
            token_id: token_id.to_string(),
            condition_id: condition_id.to_string(),
            timestamp_ms: now_ms,
            time,
            trade_size: trade_size_features,
            book: book_features,
            wallet: wallet_features,
            impact: impact_features,
            burst: burst_features,
            change_point: cp_features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoringConfig;
    use crate::models::{Side, WalletSource};

    fn trade(ts: i64, notional: f64) -> Trade {
        Trade {
            trade_id: format!("t{}", ts),
            token_id: "tok".into(),
            timestamp_ms: ts,
            taker_address: "0x1234567890abcdef1234567890abcdef12345678".into(),
            side: Side::Buy,
            price: 0.5,
            size: notional / 0.5,
            tx_hash: None,
        }
    }

    fn meta(end_ms: i64) -> MarketMeta {
        MarketMeta {
            condition_id: "cond".into(),
            question: "Will it settle Yes?".into(),
            end_date_iso: Some(
                chrono::DateTime::from_timestamp_millis(end_ms)
                    .unwrap()
                    .to_rfc3339(),
            ),
            category: Some("politics".into()),
            event_slug: None,
            market_slug: None,
            outcomes: vec!["Yes".into(), "No".into()],
        }
    }

    fn computer() -> (Arc<RollingStateEngine>, FeatureComputer) {
        let engine = Arc::new(RollingStateEngine::default());
        let fc = FeatureComputer::new(engine.clone(), &ScoringConfig::default());
        (engine, fc)
    }

    #[test]
    fn nullable_groups_track_inputs() {
        let (_, fc) = computer();
        let fv = fc.compute_features("tok", "cond", 1_000_000, None, None, None, None);
        assert!(fv.trade_size.is_none());
        assert!(fv.wallet.is_none());
        assert!(fv.impact.is_none());
        assert!(!fv.book.has_book);
        assert_eq!(fv.time.ramp_multiplier, 1.0);
    }

    #[test]
    fn trade_event_populates_size_group() {
        let (engine, fc) = computer();
        let now = 3_600_000;
        for i in 0..50 {
            engine.record_trade("tok", &trade(now - i * 10_000, 100.0));
        }
        let big = trade(now, 60_000.0);
        engine.record_trade("tok", &big);

        let fv = fc.compute_features(
            "tok",
            "cond",
            now,
            Some(&big),
            None,
            Some(&meta(now + 30 * 60_000)),
            None,
        );
        let ts = fv.trade_size.expect("trade group present");
        assert!(ts.is_tail_trade);
        assert!(ts.size_tail_score > 0.5);
        assert!(fv.time.within_30m);
        assert!(fv.time.ramp_multiplier > 1.0);
    }

    #[test]
    fn wallet_group_present_when_enriched() {
        let (_, fc) = computer();
        let now = 1_700_000_000_000;
        let w = WalletEnrichment {
            address: "0xabc".into(),
            first_seen_ts: Some(now - 2 * 86_400_000),
            first_seen_block: Some(1),
            tx_count: Some(4),
            enriched_at: now,
            source: WalletSource::Upstream,
        };
        let fv = fc.compute_features("tok", "cond", now, None, None, None, Some(&w));
        let wf = fv.wallet.expect("wallet group present");
        assert!(wf.is_new_account);
    }

    #[test]
    fn impact_uses_observed_mids() {
        let (engine, fc) = computer();
        let now = 600_000;
        let t = trade(now - 90_000, 10_000.0);
        engine.record_trade("tok", &t);
        fc.observe_mid("tok", now - 90_000, 0.50);
        fc.observe_mid("tok", now - 60_000, 0.52);
        fc.observe_mid("tok", now - 30_000, 0.54);

        let fv = fc.compute_features("tok", "cond", now, Some(&t), None, None, None);
        let imp = fv.impact.expect("impact present with covering history");
        assert!(imp.impact_score > 0.0);
    }
}
