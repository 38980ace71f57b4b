//! P&L metrics over resolved contrarian events.
//!
//! A winning trade at price p pays `notional * (1 - p)`; a losing trade
//! burns `notional * p`. The break-even win rate is therefore the average
//! entry price.

use crate::research::events::ContrarianEvent;
use serde::{Deserialize, Serialize};

/// Profit factor stand-in when there are no losing trades.
const PROFIT_FACTOR_CAP: f64 = 10.0;
/// Below this sample count the metrics carry a small-sample warning.
const SMALL_SAMPLE: usize = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PnlMetrics {
    pub n: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_win_pnl: f64,
    pub total_loss_pnl: f64,
    pub pnl: f64,
    pub total_notional: f64,
    pub roi: f64,
    pub profit_factor: f64,
    pub avg_price: f64,
    /// Win rate above which the strategy earns non-negative P&L.
    pub break_even_rate: f64,
    /// `(win_rate - break_even_rate) * 100`, percentage points.
    pub edge_points: f64,
    pub kelly_fraction: f64,
    pub half_kelly: f64,
    pub is_profitable: bool,
    pub warnings: Vec<String>,
}

/// Kelly fraction `max(0, (p*b - q) / b)` with `b = (1 - price) / price`.
pub fn kelly_fraction(win_rate: f64, avg_price: f64) -> f64 {
    if !(0.0..1.0).contains(&avg_price) || avg_price <= 0.0 {
        return 0.0;
    }
    let b = (1.0 - avg_price) / avg_price;
    if b <= 0.0 {
        return 0.0;
    }
    let p = win_rate.clamp(0.0, 1.0);
    let q = 1.0 - p;
    ((p * b - q) / b).max(0.0)
}

pub fn compute_pnl(events: &[&ContrarianEvent]) -> PnlMetrics {
    let n = events.len();
    if n == 0 {
        return PnlMetrics {
            warnings: vec!["no resolved events".to_string()],
            ..Default::default()
        };
    }

    let mut wins = 0usize;
    let mut total_win_pnl = 0.0;
    let mut total_loss_pnl = 0.0;
    let mut total_notional = 0.0;
    let mut price_sum = 0.0;

    for e in events {
        total_notional += e.trade_notional;
        price_sum += e.trade_price;
        if e.outcome_won {
            wins += 1;
            total_win_pnl += e.trade_notional * (1.0 - e.trade_price);
        } else {
            total_loss_pnl -= e.trade_notional * e.trade_price;
        }
    }

    let losses = n - wins;
    let win_rate = wins as f64 / n as f64;
    let pnl = total_win_pnl + total_loss_pnl;
    let avg_price = price_sum / n as f64;
    let roi = if total_notional > 0.0 {
        pnl / total_notional
    } else {
        0.0
    };
    let profit_factor = if total_loss_pnl < 0.0 {
        total_win_pnl / total_loss_pnl.abs()
    } else if total_win_pnl > 0.0 {
        PROFIT_FACTOR_CAP
    } else {
        0.0
    };

    let break_even_rate = avg_price;
    let edge_points = (win_rate - break_even_rate) * 100.0;
    let kelly = kelly_fraction(win_rate, avg_price);

    let mut warnings = Vec::new();
    if n < SMALL_SAMPLE {
        warnings.push(format!("small sample: {} events", n));
    }
    if win_rate < break_even_rate {
        warnings.push(format!(
            "win rate {:.1}% below break-even {:.1}%",
            win_rate * 100.0,
            break_even_rate * 100.0
        ));
    }

    PnlMetrics {
        n,
        wins,
        losses,
        win_rate,
        total_win_pnl,
        total_loss_pnl,
        pnl,
        total_notional,
        roi,
        profit_factor,
        avg_price,
        break_even_rate,
        edge_points,
        kelly_fraction: kelly,
        half_kelly: 0.5 * kelly,
        is_profitable: pnl > 0.0,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, Side};

    fn event(price: f64, notional: f64, won: bool) -> ContrarianEvent {
        ContrarianEvent {
            id: None,
            condition_id: "c".into(),
            token_id: "t".into(),
            trade_timestamp: 0,
            minutes_before_close: 30.0,
            trade_side: Side::Buy,
            trade_price: price,
            trade_size: notional / price,
            trade_notional: notional,
            taker_address: "0xabc".into(),
            size_percentile: 50.0,
            size_z_score: 0.0,
            is_tail_trade: false,
            is_price_contrarian: price < 0.5,
            price_trend_30m: 0.0,
            is_against_trend: false,
            ofi_30m: 0.0,
            is_against_ofi: false,
            is_contrarian: false,
            book_imbalance: 0.0,
            thin_opposite_ratio: 1.0,
            spread_bps: 0.0,
            is_asymmetric_book: false,
            wallet_age_days: None,
            wallet_trade_count: None,
            is_new_wallet: false,
            traded_outcome: Outcome::Yes,
            outcome_won: won,
            drift_30m: None,
            drift_60m: None,
        }
    }

    #[test]
    fn coin_flip_at_ninety_cents_loses() {
        let events = [event(0.90, 100.0, true), event(0.90, 100.0, false)];
        let refs: Vec<&ContrarianEvent> = events.iter().collect();
        let m = compute_pnl(&refs);
        assert!((m.total_win_pnl - 10.0).abs() < 1e-9);
        assert!((m.total_loss_pnl - -90.0).abs() < 1e-9);
        assert!((m.pnl - -80.0).abs() < 1e-9);
        assert!((m.roi - -0.40).abs() < 1e-9);
        assert!((m.break_even_rate - 0.90).abs() < 1e-9);
        assert!((m.edge_points - -40.0).abs() < 1e-9);
        assert!(!m.is_profitable);
        assert!(m.warnings.iter().any(|w| w.contains("below break-even")));
    }

    #[test]
    fn coin_flip_at_thirty_five_cents_profits() {
        let events = [event(0.35, 100.0, true), event(0.35, 100.0, false)];
        let refs: Vec<&ContrarianEvent> = events.iter().collect();
        let m = compute_pnl(&refs);
        assert!((m.pnl - 30.0).abs() < 1e-9);
        assert!((m.roi - 0.15).abs() < 1e-9);
        assert!((m.edge_points - 15.0).abs() < 1e-9);
        assert!(m.kelly_fraction > 0.0);
        assert!(m.is_profitable);
        assert!(!m.warnings.iter().any(|w| w.contains("below break-even")));
    }

    #[test]
    fn empty_events_warn_and_zero() {
        let m = compute_pnl(&[]);
        assert_eq!(m.n, 0);
        assert_eq!(m.pnl, 0.0);
        assert!(m.warnings.iter().any(|w| w.contains("no resolved events")));
    }

    #[test]
    fn all_wins_cap_profit_factor() {
        let events = [event(0.4, 100.0, true), event(0.4, 100.0, true)];
        let refs: Vec<&ContrarianEvent> = events.iter().collect();
        let m = compute_pnl(&refs);
        assert_eq!(m.profit_factor, PROFIT_FACTOR_CAP);
        assert_eq!(m.losses, 0);
    }

    #[test]
    fn kelly_matches_formula() {
        // p = 0.5, price = 0.35 -> b = 1.857..., kelly ~ 0.2308.
        let k = kelly_fraction(0.5, 0.35);
        assert!((k - 0.230769).abs() < 1e-5);
        assert_eq!(kelly_fraction(0.2, 0.9), 0.0);
    }
}
