//! Factor breakdowns: win rate and lift by liquidity decile, time-to-close
//! bucket, category, or wallet freshness.

use crate::research::correlation::BASELINE_WIN_RATE;
use crate::research::events::EventRow;
use crate::research::stats::bootstrap_ci;
use serde::{Deserialize, Serialize};

/// Groups below this size are dropped.
const MIN_GROUP_EVENTS: usize = 3;
const BOOTSTRAP_SAMPLES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakdownFactor {
    Liquidity,
    TimeToClose,
    Category,
    NewWallet,
}

impl BreakdownFactor {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "liquidity" => Some(BreakdownFactor::Liquidity),
            "time_to_close" => Some(BreakdownFactor::TimeToClose),
            "category" => Some(BreakdownFactor::Category),
            "new_wallet" => Some(BreakdownFactor::NewWallet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownGroup {
    pub label: String,
    pub n: usize,
    pub win_rate: f64,
    /// Relative to the 50% coin-flip baseline.
    pub lift: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

fn group_label(factor: BreakdownFactor, row: &EventRow, spread_deciles: &[f64]) -> String {
    match factor {
        BreakdownFactor::Liquidity => {
            // Decile of spread: tighter spread = more liquid.
            let spread = row.event.spread_bps;
            let decile = spread_deciles
                .iter()
                .position(|&bound| spread <= bound)
                .unwrap_or(spread_deciles.len());
            format!("liquidity_d{}", decile + 1)
        }
        BreakdownFactor::TimeToClose => {
            let m = row.event.minutes_before_close;
            if m < 15.0 {
                "0-15m".to_string()
            } else if m < 30.0 {
                "15-30m".to_string()
            } else if m < 60.0 {
                "30-60m".to_string()
            } else {
                "60m+".to_string()
            }
        }
        BreakdownFactor::Category => row
            .category
            .clone()
            .unwrap_or_else(|| "uncategorized".to_string()),
        BreakdownFactor::NewWallet => {
            if row.event.is_new_wallet {
                "new_wallet".to_string()
            } else {
                "established_wallet".to_string()
            }
        }
    }
}

/// Break the event set into factor groups and rank them by lift.
pub fn compute_breakdown(rows: &[EventRow], factor: BreakdownFactor) -> Vec<BreakdownGroup> {
    if rows.is_empty() {
        return Vec::new();
    }

    // Decile boundaries from the observed spread distribution.
    let spread_deciles: Vec<f64> = {
        let mut spreads: Vec<f64> = rows.iter().map(|r| r.event.spread_bps).collect();
        spreads.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        (1..10)
            .map(|d| {
                let idx = (d * spreads.len()) / 10;
                spreads[idx.min(spreads.len() - 1)]
            })
            .collect()
    };

    let mut groups: std::collections::BTreeMap<String, Vec<&EventRow>> =
        std::collections::BTreeMap::new();
    for row in rows {
        groups
            .entry(group_label(factor, row, &spread_deciles))
            .or_default()
            .push(row);
    }

    let mut out: Vec<BreakdownGroup> = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= MIN_GROUP_EVENTS)
        .map(|(label, members)| {
            let outcomes: Vec<f64> = members
                .iter()
                .map(|r| if r.event.outcome_won { 1.0 } else { 0.0 })
                .collect();
            let win_rate = outcomes.iter().sum::<f64>() / outcomes.len() as f64;
            // Seed from the label so repeated queries return identical CIs.
            let seed = label
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            let (ci_lower, ci_upper) = bootstrap_ci(&outcomes, BOOTSTRAP_SAMPLES, seed);
            BreakdownGroup {
                label,
                n: members.len(),
                win_rate,
                lift: (win_rate - BASELINE_WIN_RATE) / BASELINE_WIN_RATE,
                ci_lower,
                ci_upper,
            }
        })
        .collect();

    out.sort_by(|a, b| b.lift.partial_cmp(&a.lift).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, Side};
    use crate::research::events::ContrarianEvent;

    fn row(minutes: f64, won: bool, new_wallet: bool, category: &str) -> EventRow {
        EventRow {
            event: ContrarianEvent {
                id: None,
                condition_id: "c".into(),
                token_id: "t".into(),
                trade_timestamp: 0,
                minutes_before_close: minutes,
                trade_side: Side::Buy,
                trade_price: 0.4,
                trade_size: 100.0,
                trade_notional: 40.0,
                taker_address: "0xabc".into(),
                size_percentile: 50.0,
                size_z_score: 0.0,
                is_tail_trade: false,
                is_price_contrarian: true,
                price_trend_30m: 0.0,
                is_against_trend: false,
                ofi_30m: 0.0,
                is_against_ofi: false,
                is_contrarian: false,
                book_imbalance: 0.0,
                thin_opposite_ratio: 1.0,
                spread_bps: minutes, // vary spread with minutes for decile tests
                is_asymmetric_book: false,
                wallet_age_days: None,
                wallet_trade_count: None,
                is_new_wallet: new_wallet,
                traded_outcome: Outcome::Yes,
                outcome_won: won,
                drift_30m: None,
                drift_60m: None,
            },
            category: Some(category.to_string()),
            question: None,
            event_slug: None,
            market_slug: None,
        }
    }

    #[test]
    fn time_buckets_partition_and_rank_by_lift() {
        let mut rows = Vec::new();
        // 0-15m group wins always; 60m+ group loses always.
        for _ in 0..5 {
            rows.push(row(5.0, true, false, "politics"));
            rows.push(row(90.0, false, false, "politics"));
        }
        let groups = compute_breakdown(&rows, BreakdownFactor::TimeToClose);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "0-15m");
        assert!(groups[0].lift > groups[1].lift);
        assert!((groups[0].win_rate - 1.0).abs() < 1e-12);
        assert!(groups[0].ci_lower <= groups[0].win_rate);
    }

    #[test]
    fn tiny_groups_are_dropped() {
        let rows = vec![row(5.0, true, false, "a"), row(5.0, true, false, "b")];
        let groups = compute_breakdown(&rows, BreakdownFactor::Category);
        assert!(groups.is_empty());
    }

    #[test]
    fn new_wallet_split() {
        let mut rows = Vec::new();
        for i in 0..10 {
            rows.push(row(20.0, i % 2 == 0, true, "x"));
            rows.push(row(20.0, false, false, "x"));
        }
        let groups = compute_breakdown(&rows, BreakdownFactor::NewWallet);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "new_wallet");
        assert!(groups[0].win_rate > groups[1].win_rate);
    }

    #[test]
    fn factor_parse_rejects_unknown() {
        assert_eq!(
            BreakdownFactor::parse("liquidity"),
            Some(BreakdownFactor::Liquidity)
        );
        assert!(BreakdownFactor::parse("volume").is_none());
    }
}
