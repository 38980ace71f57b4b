//! Per-token rolling state owner.
//!
//! One `TokenState` per token, behind its own mutex so different tokens
//! proceed in parallel while a single token's updates stay serialized.
//! Out-of-order arrivals are accepted; the Hawkes/CUSUM latches may then be
//! computed against a slightly permuted prefix, which is tolerated for
//! research accuracy. Multi-writer deployments must shard by token id;
//! persisted blobs are last-writer-wins.

use crate::config::{CusumConfig, HawkesConfig};
use crate::models::{BookMetrics, BookSnapshot, Trade};
use crate::rolling::cusum::{CusumMetric, CusumSnapshot, PageHinkley};
use crate::rolling::hawkes::HawkesState;
use crate::rolling::tdigest::TDigest;
use crate::rolling::window::TradeWindow;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Inter-arrival gap statistics over the trailing window, seconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InterArrivalStats {
    pub count: usize,
    pub mean_secs: f64,
    pub std_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
}

/// Serializable slice of per-token state for best-effort cache persistence.
/// The pieces map one-to-one onto the `hawkes_state`, `cpd_state` and
/// `trade_window` cache keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTokenState {
    pub hawkes: HawkesState,
    pub cusums: Vec<PageHinkley>,
    pub window: Vec<Trade>,
}

struct TokenState {
    digest: TDigest,
    hawkes: HawkesState,
    cusums: HashMap<CusumMetric, PageHinkley>,
    window: TradeWindow,
    current_book: Option<(BookSnapshot, BookMetrics)>,
}

impl TokenState {
    fn new(hawkes_cfg: HawkesConfig, cusum_cfg: CusumConfig) -> Self {
        let mut cusums = HashMap::with_capacity(3);
        for metric in CusumMetric::ALL {
            cusums.insert(metric, PageHinkley::new(metric, cusum_cfg));
        }
        Self {
            digest: TDigest::default(),
            hawkes: HawkesState::new(hawkes_cfg),
            cusums,
            window: TradeWindow::new(),
            current_book: None,
        }
    }
}

/// Owner of all per-token rolling state.
pub struct RollingStateEngine {
    hawkes_cfg: HawkesConfig,
    cusum_cfg: CusumConfig,
    tokens: RwLock<HashMap<String, Arc<Mutex<TokenState>>>>,
}

impl RollingStateEngine {
    pub fn new(hawkes_cfg: HawkesConfig, cusum_cfg: CusumConfig) -> Self {
        Self {
            hawkes_cfg,
            cusum_cfg,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    fn token(&self, token_id: &str) -> Arc<Mutex<TokenState>> {
        if let Some(state) = self.tokens.read().get(token_id) {
            return state.clone();
        }
        let mut map = self.tokens.write();
        map.entry(token_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(TokenState::new(self.hawkes_cfg, self.cusum_cfg)))
            })
            .clone()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.read().len()
    }

    /// Ingest one trade: t-digest on notional, Hawkes event, trade-rate
    /// CUSUM, bounded window.
    pub fn record_trade(&self, token_id: &str, trade: &Trade) {
        let state = self.token(token_id);
        let mut s = state.lock();
        let now_ms = trade.timestamp_ms;

        s.digest.insert(trade.notional());
        s.hawkes.record(now_ms);
        s.window.push(trade.clone(), now_ms);

        let rate_per_min = s.window.count_within(1, now_ms) as f64;
        if let Some(c) = s.cusums.get_mut(&CusumMetric::TradeRate) {
            c.update(rate_per_min, now_ms);
        }
    }

    /// Ingest one book snapshot: spread and imbalance CUSUMs plus the
    /// "current state" used by the feature computer.
    pub fn record_orderbook(&self, token_id: &str, snapshot: BookSnapshot, metrics: BookMetrics) {
        let state = self.token(token_id);
        let mut s = state.lock();
        let now_ms = snapshot.time_ms;
        if let Some(c) = s.cusums.get_mut(&CusumMetric::Spread) {
            c.update(metrics.spread_bps, now_ms);
        }
        if let Some(c) = s.cusums.get_mut(&CusumMetric::Imbalance) {
            c.update(metrics.imbalance, now_ms);
        }
        s.current_book = Some((snapshot, metrics));
    }

    pub fn current_book(&self, token_id: &str) -> Option<(BookSnapshot, BookMetrics)> {
        let state = self.token(token_id);
        let s = state.lock();
        s.current_book.clone()
    }

    pub fn trade_size_quantile(&self, token_id: &str, p: f64) -> f64 {
        let state = self.token(token_id);
        let mut s = state.lock();
        s.digest.percentile(p)
    }

    pub fn trade_size_percentile(&self, token_id: &str, notional: f64) -> f64 {
        let state = self.token(token_id);
        let mut s = state.lock();
        s.digest.percentile_rank(notional)
    }

    pub fn hawkes_intensity(&self, token_id: &str, now_ms: i64) -> (f64, bool) {
        let state = self.token(token_id);
        let s = state.lock();
        (s.hawkes.intensity_at(now_ms), s.hawkes.is_burst(now_ms))
    }

    pub fn hawkes_baseline(&self, token_id: &str) -> f64 {
        let state = self.token(token_id);
        let s = state.lock();
        s.hawkes.mu
    }

    pub fn cusum_state(&self, token_id: &str, metric: CusumMetric) -> Option<CusumSnapshot> {
        let state = self.token(token_id);
        let s = state.lock();
        s.cusums.get(&metric).map(|c| c.snapshot())
    }

    pub fn cusum_states(&self, token_id: &str) -> Vec<CusumSnapshot> {
        let state = self.token(token_id);
        let s = state.lock();
        CusumMetric::ALL
            .iter()
            .filter_map(|m| s.cusums.get(m).map(|c| c.snapshot()))
            .collect()
    }

    pub fn trade_window(&self, token_id: &str, minutes: i64, now_ms: i64) -> Vec<Trade> {
        let state = self.token(token_id);
        let s = state.lock();
        s.window.within(minutes, now_ms).cloned().collect()
    }

    pub fn trade_count(&self, token_id: &str, minutes: i64, now_ms: i64) -> usize {
        let state = self.token(token_id);
        let s = state.lock();
        s.window.count_within(minutes, now_ms)
    }

    pub fn window_notionals(&self, token_id: &str, minutes: i64, now_ms: i64) -> Vec<f64> {
        let state = self.token(token_id);
        let s = state.lock();
        s.window.notionals_within(minutes, now_ms)
    }

    pub fn inter_arrival_stats(&self, token_id: &str) -> InterArrivalStats {
        let state = self.token(token_id);
        let s = state.lock();
        let ts = s.window.sorted_timestamps();
        if ts.len() < 2 {
            return InterArrivalStats::default();
        }
        let gaps: Vec<f64> = ts.windows(2).map(|w| (w[1] - w[0]) as f64 / 1000.0).collect();
        let n = gaps.len() as f64;
        let mean = gaps.iter().sum::<f64>() / n;
        let var = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / n;
        InterArrivalStats {
            count: gaps.len(),
            mean_secs: mean,
            std_secs: var.sqrt(),
            min_secs: gaps.iter().cloned().fold(f64::INFINITY, f64::min),
            max_secs: gaps.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Export the persistable slice of a token's state. Best-effort; callers
    /// write it to the cache idempotently.
    pub fn export_state(&self, token_id: &str) -> Option<PersistedTokenState> {
        let map = self.tokens.read();
        let state = map.get(token_id)?;
        let s = state.lock();
        Some(PersistedTokenState {
            hawkes: s.hawkes.clone(),
            cusums: s.cusums.values().cloned().collect(),
            window: s.window.snapshot(),
        })
    }

    /// Restore whatever persisted pieces exist for a token; anything absent
    /// stays freshly initialized. The quantile sketch re-seeds from the
    /// restored window, so lifetime tail history beyond the window is lost
    /// across restarts (tolerated, last-writer-wins semantics).
    pub fn restore_state(
        &self,
        token_id: &str,
        hawkes: Option<HawkesState>,
        cusums: Option<Vec<PageHinkley>>,
        window: Option<Vec<Trade>>,
    ) {
        let state = self.token(token_id);
        let mut s = state.lock();
        if let Some(h) = hawkes {
            s.hawkes = h;
        }
        if let Some(detectors) = cusums {
            for c in detectors {
                let metric = c.snapshot().metric;
                s.cusums.insert(metric, c);
            }
        }
        if let Some(trades) = window {
            let latest = trades.iter().map(|t| t.timestamp_ms).max().unwrap_or(0);
            for t in trades {
                s.digest.insert(t.notional());
                s.window.push(t, latest);
            }
        }
    }
}

impl Default for RollingStateEngine {
    fn default() -> Self {
        Self::new(HawkesConfig::default(), CusumConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookLevel, Side};

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

    fn book(ts: i64, bid_size: f64, ask_size: f64) -> (BookSnapshot, BookMetrics) {
        let snap = BookSnapshot {
            token_id: "tok".into(),
            time_ms: ts,
            best_bid: 0.49,
            best_ask: 0.51,
            mid: 0.50,
            spread: 0.02,
            bids: vec![BookLevel {
                price: 0.49,
                size: bid_size,
            }],
            asks: vec![BookLevel {
                price: 0.51,
                size: ask_size,
            }],
        };
        let m = snap.metrics();
        (snap, m)
    }

    #[test]
    fn trades_feed_digest_and_window() {
        let engine = RollingStateEngine::default();
        let now = 3_600_000;
        for i in 0..100 {
            engine.record_trade("tok", &trade(now - i * 1_000, 100.0 + i as f64));
        }
        assert_eq!(engine.trade_count("tok", 60, now), 100);
        let p = engine.trade_size_percentile("tok", 1_000.0);
        assert!(p > 99.0);
        let q50 = engine.trade_size_quantile("tok", 50.0);
        assert!(q50 > 100.0 && q50 < 200.0);
    }

    #[test]
    fn books_update_current_state() {
        let engine = RollingStateEngine::default();
        let (snap, m) = book(1_000, 500.0, 500.0);
        engine.record_orderbook("tok", snap, m);
        assert!(engine.current_book("tok").is_some());
        assert!(engine.current_book("other").is_none());
    }

    #[test]
    fn distinct_tokens_are_isolated() {
        let engine = RollingStateEngine::default();
        engine.record_trade("a", &trade(1_000, 100.0));
        assert_eq!(engine.trade_count("a", 60, 1_000), 1);
        assert_eq!(engine.trade_count("b", 60, 1_000), 0);
    }

    #[test]
    fn export_and_restore_round_trip() {
        let engine = RollingStateEngine::default();
        for i in 0..50 {
            engine.record_trade("tok", &trade(i * 1_000, 500.0));
        }
        let persisted = engine.export_state("tok").unwrap();
        assert_eq!(persisted.window.len(), 50);

        let fresh = RollingStateEngine::default();
        fresh.restore_state(
            "tok",
            Some(persisted.hawkes),
            Some(persisted.cusums),
            Some(persisted.window),
        );
        let (intensity, _) = fresh.hawkes_intensity("tok", 50_000);
        assert!(intensity > fresh.hawkes_baseline("tok"));
        // Window and quantile sketch came back with the trades.
        assert_eq!(fresh.trade_count("tok", 60, 50_000), 50);
        assert!(fresh.trade_size_percentile("tok", 10_000.0) > 99.0);
    }

    #[test]
    fn restore_with_missing_pieces_stays_fresh() {
        let engine = RollingStateEngine::default();
        engine.restore_state("tok", None, None, None);
        assert_eq!(engine.trade_count("tok", 60, 1_000), 0);
        let (intensity, burst) = engine.hawkes_intensity("tok", 1_000);
        assert!((intensity - engine.hawkes_baseline("tok")).abs() < 1e-12);
        assert!(!burst);
    }

    #[test]
    fn inter_arrival_stats_over_window() {
        let engine = RollingStateEngine::default();
        for i in 0..10 {
            engine.record_trade("tok", &trade(i * 2_000, 100.0));
        }
        let stats = engine.inter_arrival_stats("tok");
        assert_eq!(stats.count, 9);
        assert!((stats.mean_secs - 2.0).abs() < 1e-9);
        assert!(stats.std_secs.abs() < 1e-9);
    }
}
