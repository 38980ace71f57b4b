//! Bounded trade window: the trailing 60 minutes, with 1- and 5-minute
//! sub-views. Entries older than the window cutoff are evicted lazily.

use crate::models::Trade;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const WINDOW_MINUTES: i64 = 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeWindow {
    /// Ordered by arrival; timestamps are near-sorted but not guaranteed.
    trades: VecDeque<Trade>,
}

impl TradeWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trade: Trade, now_ms: i64) {
        self.trades.push_back(trade);
        self.evict(now_ms);
    }

    /// Drop entries older than the 60-minute cutoff. Arrival order is
    /// near-chronological, so popping from the front until the head is fresh
    /// is sufficient; a stale entry hiding behind a fresh head ages out on a
    /// later call.
    pub fn evict(&mut self, now_ms: i64) {
        let cutoff = now_ms - WINDOW_MINUTES * 60_000;
        while let Some(front) = self.trades.front() {
            if front.timestamp_ms < cutoff {
                self.trades.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Trades within the trailing `minutes` as of `now_ms`.
    pub fn within(&self, minutes: i64, now_ms: i64) -> impl Iterator<Item = &Trade> {
        let cutoff = now_ms - minutes * 60_000;
        self.trades
            .iter()
            .filter(move |t| t.timestamp_ms >= cutoff && t.timestamp_ms <= now_ms)
    }

    pub fn count_within(&self, minutes: i64, now_ms: i64) -> usize {
        self.within(minutes, now_ms).count()
    }

    pub fn notionals_within(&self, minutes: i64, now_ms: i64) -> Vec<f64> {
        self.within(minutes, now_ms).map(|t| t.notional()).collect()
    }

    /// Largest trade by notional in the trailing hour.
    pub fn largest(&self, now_ms: i64) -> Option<&Trade> {
        self.within(WINDOW_MINUTES, now_ms)
            .max_by(|a, b| a.notional().partial_cmp(&b.notional()).unwrap())
    }

    /// Every trade currently held, in arrival order. Used for cache
    /// persistence.
    pub fn snapshot(&self) -> Vec<Trade> {
        self.trades.iter().cloned().collect()
    }

    /// Sorted timestamps for inter-arrival statistics.
    pub fn sorted_timestamps(&self) -> Vec<i64> {
        let mut ts: Vec<i64> = self.trades.iter().map(|t| t.timestamp_ms).collect();
        ts.sort_unstable();
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;

    fn trade(id: &str, ts: i64, notional: f64) -> Trade {
        Trade {
            trade_id: id.to_string(),
            token_id: "tok".into(),
            timestamp_ms: ts,
            taker_address: "0x1234567890abcdef1234567890abcdef12345678".into(),
            side: Side::Buy,
            price: 0.5,
            size: notional / 0.5,
            tx_hash: None,
        }
    }

    #[test]
    fn eviction_drops_old_entries() {
        let mut w = TradeWindow::new();
        let now = 100 * 60_000;
        w.push(trade("old", now - 61 * 60_000, 100.0), now);
        w.push(trade("fresh", now - 1_000, 100.0), now);
        assert_eq!(w.len(), 1);
        assert_eq!(w.count_within(60, now), 1);
    }

    #[test]
    fn subwindow_counts() {
        let mut w = TradeWindow::new();
        let now = 3_600_000 * 2;
        w.push(trade("a", now - 50 * 60_000, 10.0), now);
        w.push(trade("b", now - 4 * 60_000, 10.0), now);
        w.push(trade("c", now - 30_000, 10.0), now);
        assert_eq!(w.count_within(1, now), 1);
        assert_eq!(w.count_within(5, now), 2);
        assert_eq!(w.count_within(60, now), 3);
    }

    #[test]
    fn largest_picks_max_notional() {
        let mut w = TradeWindow::new();
        let now = 3_600_000;
        w.push(trade("small", now - 10_000, 100.0), now);
        w.push(trade("big", now - 20_000, 9_000.0), now);
        w.push(trade("mid", now - 5_000, 500.0), now);
        assert_eq!(w.largest(now).unwrap().trade_id, "big");
    }
}
