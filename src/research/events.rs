//! Research data model: resolved markets, historical trades and the
//! contrarian event unit, plus the reusable analysis filter.

use crate::models::{Outcome, Side};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which opposition test makes a trade "contrarian".
///
/// Exhaustively matched everywhere; adding a mode without covering every
/// match arm is a compile error by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContrarianMode {
    PriceOnly,
    VsTrend,
    VsOfi,
    VsBoth,
}

impl ContrarianMode {
    pub const ALL: [ContrarianMode; 4] = [
        ContrarianMode::PriceOnly,
        ContrarianMode::VsTrend,
        ContrarianMode::VsOfi,
        ContrarianMode::VsBoth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContrarianMode::PriceOnly => "price_only",
            ContrarianMode::VsTrend => "vs_trend",
            ContrarianMode::VsOfi => "vs_ofi",
            ContrarianMode::VsBoth => "vs_both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "price_only" => Some(ContrarianMode::PriceOnly),
            "vs_trend" => Some(ContrarianMode::VsTrend),
            "vs_ofi" => Some(ContrarianMode::VsOfi),
            "vs_both" => Some(ContrarianMode::VsBoth),
            _ => None,
        }
    }

    /// Query-parameter parse; unrecognized values fall back to `vs_ofi`.
    pub fn parse_or_default(s: &str) -> Self {
        Self::parse(s).unwrap_or(ContrarianMode::VsOfi)
    }
}

/// Outcome-side filter for analysis queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeFilter {
    Yes,
    No,
    All,
}

impl OutcomeFilter {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "yes" => OutcomeFilter::Yes,
            "no" => OutcomeFilter::No,
            _ => OutcomeFilter::All,
        }
    }

    pub fn accepts(&self, outcome: Outcome) -> bool {
        match self {
            OutcomeFilter::Yes => outcome == Outcome::Yes,
            OutcomeFilter::No => outcome == Outcome::No,
            OutcomeFilter::All => true,
        }
    }
}

/// A market whose final prices settled to exactly [1,0] or [0,1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedMarket {
    pub condition_id: String,
    pub question: String,
    pub end_date_iso: Option<String>,
    pub end_date_ms: Option<i64>,
    pub category: Option<String>,
    pub winning_outcome: Option<Outcome>,
    pub final_yes_price: f64,
    pub final_no_price: f64,
}

/// Parse upstream `outcomePrices`, which arrives either as a JSON array or a
/// JSON-encoded string of one (`"[\"1\", \"0\"]"`). Only exact unit prices
/// resolve; fractional, missing or unparseable payloads are rejected.
pub fn parse_outcome_prices(raw: &Value) -> Option<(f64, f64)> {
    let arr: Vec<f64> = match raw {
        Value::String(s) => {
            let inner: Value = serde_json::from_str(s).ok()?;
            parse_price_array(&inner)?
        }
        other => parse_price_array(other)?,
    };
    if arr.len() != 2 {
        return None;
    }
    Some((arr[0], arr[1]))
}

fn parse_price_array(v: &Value) -> Option<Vec<f64>> {
    let items = v.as_array()?;
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        })
        .collect()
}

/// Winning outcome from final prices, if the market is cleanly resolved.
pub fn winning_outcome(yes_price: f64, no_price: f64) -> Option<Outcome> {
    match (yes_price, no_price) {
        (y, n) if y == 1.0 && n == 0.0 => Some(Outcome::Yes),
        (y, n) if y == 0.0 && n == 1.0 => Some(Outcome::No),
        _ => None,
    }
}

/// One historical taker trade attached to a resolved market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalTrade {
    pub condition_id: String,
    pub token_id: String,
    pub trade_id: String,
    pub timestamp_ms: i64,
    pub taker_address: String,
    pub maker_address: Option<String>,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    /// Token label ("Yes"/"No") when upstream provides it.
    pub outcome: Option<String>,
    pub tx_hash: Option<String>,
}

impl HistoricalTrade {
    #[inline]
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

/// A resolved historical trade augmented with contrarian flags and outcome.
/// Unique by `(condition_id, token_id, trade_timestamp)`; created during
/// backfill and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContrarianEvent {
    pub id: Option<i64>,
    pub condition_id: String,
    pub token_id: String,
    pub trade_timestamp: i64,
    pub minutes_before_close: f64,
    pub trade_side: Side,
    pub trade_price: f64,
    pub trade_size: f64,
    pub trade_notional: f64,
    pub taker_address: String,
    pub size_percentile: f64,
    pub size_z_score: f64,
    pub is_tail_trade: bool,
    pub is_price_contrarian: bool,
    pub price_trend_30m: f64,
    pub is_against_trend: bool,
    pub ofi_30m: f64,
    pub is_against_ofi: bool,
    /// `is_against_trend && is_against_ofi`.
    pub is_contrarian: bool,
    pub book_imbalance: f64,
    pub thin_opposite_ratio: f64,
    pub spread_bps: f64,
    pub is_asymmetric_book: bool,
    pub wallet_age_days: Option<f64>,
    pub wallet_trade_count: Option<i64>,
    pub is_new_wallet: bool,
    pub traded_outcome: Outcome,
    pub outcome_won: bool,
    pub drift_30m: Option<f64>,
    pub drift_60m: Option<f64>,
}

impl ContrarianEvent {
    /// The mode-selected predictor used across correlation and P&L.
    pub fn is_contrarian_by_mode(&self, mode: ContrarianMode) -> bool {
        match mode {
            ContrarianMode::PriceOnly => self.is_price_contrarian,
            ContrarianMode::VsTrend => self.is_against_trend,
            ContrarianMode::VsOfi => self.is_against_ofi,
            ContrarianMode::VsBoth => self.is_against_trend && self.is_against_ofi,
        }
    }

    /// Scalar ranking score: 0.25 per indicator (price / trend / ofi / tail).
    pub fn indicator_score(&self) -> f64 {
        let mut s = 0.0;
        if self.is_price_contrarian {
            s += 0.25;
        }
        if self.is_against_trend {
            s += 0.25;
        }
        if self.is_against_ofi {
            s += 0.25;
        }
        if self.is_tail_trade {
            s += 0.25;
        }
        s
    }
}

/// A contrarian event joined with its market row for enrichment and
/// category-aware filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    #[serde(flatten)]
    pub event: ContrarianEvent,
    pub category: Option<String>,
    pub question: Option<String>,
    pub event_slug: Option<String>,
    pub market_slug: Option<String>,
}

/// Reusable filter narrowing the research event set. Partial JSON bodies
/// fill in from the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub lookback_days: i64,
    pub min_size_usd: f64,
    /// Pre-close trade window considered during backfill.
    pub window_minutes: i64,
    pub contrarian_mode: ContrarianMode,
    pub require_asymmetric_book: bool,
    pub require_new_wallet: bool,
    pub max_wallet_age_days: Option<f64>,
    pub max_spread_bps: Option<f64>,
    pub min_depth_usd: Option<f64>,
    /// Empty means all categories.
    pub categories: Vec<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_minutes_to_close: Option<f64>,
    pub max_minutes_to_close: Option<f64>,
    pub outcome_filter: OutcomeFilter,
    pub min_size_z: Option<f64>,
    pub max_size_z: Option<f64>,
    /// Keep only events where the trend and OFI tests disagree.
    pub ofi_trend_disagree: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            min_size_usd: 0.0,
            window_minutes: 120,
            contrarian_mode: ContrarianMode::VsOfi,
            require_asymmetric_book: false,
            require_new_wallet: false,
            max_wallet_age_days: None,
            max_spread_bps: None,
            min_depth_usd: None,
            categories: Vec::new(),
            min_price: None,
            max_price: None,
            min_minutes_to_close: None,
            max_minutes_to_close: None,
            outcome_filter: OutcomeFilter::All,
            min_size_z: None,
            max_size_z: None,
            ofi_trend_disagree: false,
        }
    }
}

impl AnalysisConfig {
    /// In-memory filter applied after the SQL lookback/size prefilter.
    pub fn matches(&self, row: &EventRow) -> bool {
        let e = &row.event;
        if e.trade_notional < self.min_size_usd {
            return false;
        }
        if self.require_asymmetric_book && !e.is_asymmetric_book {
            return false;
        }
        if self.require_new_wallet && !e.is_new_wallet {
            return false;
        }
        if let Some(max_age) = self.max_wallet_age_days {
            match e.wallet_age_days {
                Some(age) if age <= max_age => {}
                _ => return false,
            }
        }
        if let Some(max_spread) = self.max_spread_bps {
            if e.spread_bps > max_spread {
                return false;
            }
        }
        if !self.categories.is_empty() {
            let Some(cat) = &row.category else {
                return false;
            };
            if !self
                .categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(cat))
            {
                return false;
            }
        }
        if let Some(min_p) = self.min_price {
            if e.trade_price < min_p {
                return false;
            }
        }
        if let Some(max_p) = self.max_price {
            if e.trade_price > max_p {
                return false;
            }
        }
        if let Some(min_m) = self.min_minutes_to_close {
            if e.minutes_before_close < min_m {
                return false;
            }
        }
        if let Some(max_m) = self.max_minutes_to_close {
            if e.minutes_before_close > max_m {
                return false;
            }
        }
        if !self.outcome_filter.accepts(e.traded_outcome) {
            return false;
        }
        if let Some(min_z) = self.min_size_z {
            if e.size_z_score < min_z {
                return false;
            }
        }
        if let Some(max_z) = self.max_size_z {
            if e.size_z_score > max_z {
                return false;
            }
        }
        if self.ofi_trend_disagree && e.is_against_ofi == e.is_against_trend {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outcome_prices_string_and_numeric_forms() {
        let yes = parse_outcome_prices(&json!("[\"1\", \"0\"]")).unwrap();
        assert_eq!(yes, (1.0, 0.0));
        assert_eq!(winning_outcome(yes.0, yes.1), Some(Outcome::Yes));

        let no = parse_outcome_prices(&json!([0, 1])).unwrap();
        assert_eq!(winning_outcome(no.0, no.1), Some(Outcome::No));
    }

    #[test]
    fn fractional_prices_are_rejected() {
        let p = parse_outcome_prices(&json!("[\"0.9\", \"0.1\"]")).unwrap();
        assert_eq!(winning_outcome(p.0, p.1), None);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(parse_outcome_prices(&json!("not valid json")).is_none());
        assert!(parse_outcome_prices(&json!(null)).is_none());
        assert!(parse_outcome_prices(&json!(["1"])).is_none());
        assert!(parse_outcome_prices(&json!([true, false])).is_none());
    }

    #[test]
    fn mode_parse_defaults_to_vs_ofi() {
        assert_eq!(
            ContrarianMode::parse_or_default("vs_trend"),
            ContrarianMode::VsTrend
        );
        assert_eq!(
            ContrarianMode::parse_or_default("bogus"),
            ContrarianMode::VsOfi
        );
    }

    fn event() -> EventRow {
        EventRow {
            event: ContrarianEvent {
                id: None,
                condition_id: "c".into(),
                token_id: "t".into(),
                trade_timestamp: 0,
                minutes_before_close: 25.0,
                trade_side: Side::Buy,
                trade_price: 0.35,
                trade_size: 1_000.0,
                trade_notional: 350.0,
                taker_address: "0xabc".into(),
                size_percentile: 97.0,
                size_z_score: 2.5,
                is_tail_trade: true,
                is_price_contrarian: true,
                price_trend_30m: 0.03,
                is_against_trend: true,
                ofi_30m: 0.4,
                is_against_ofi: false,
                is_contrarian: false,
                book_imbalance: 0.6,
                thin_opposite_ratio: 0.2,
                spread_bps: 120.0,
                is_asymmetric_book: true,
                wallet_age_days: Some(3.0),
                wallet_trade_count: Some(12),
                is_new_wallet: true,
                traded_outcome: Outcome::Yes,
                outcome_won: true,
                drift_30m: Some(0.02),
                drift_60m: Some(0.04),
            },
            category: Some("politics".into()),
            question: None,
            event_slug: None,
            market_slug: None,
        }
    }

    #[test]
    fn mode_predicates_disagree_where_expected() {
        let row = event();
        assert!(row.event.is_contrarian_by_mode(ContrarianMode::PriceOnly));
        assert!(row.event.is_contrarian_by_mode(ContrarianMode::VsTrend));
        assert!(!row.event.is_contrarian_by_mode(ContrarianMode::VsOfi));
        assert!(!row.event.is_contrarian_by_mode(ContrarianMode::VsBoth));
    }

    #[test]
    fn indicator_score_counts_quarters() {
        assert!((event().event.indicator_score() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn filter_narrowing() {
        let row = event();
        let mut cfg = AnalysisConfig::default();
        assert!(cfg.matches(&row));

        cfg.min_size_usd = 1_000.0;
        assert!(!cfg.matches(&row));
        cfg.min_size_usd = 0.0;

        cfg.categories = vec!["sports".into()];
        assert!(!cfg.matches(&row));
        cfg.categories = vec!["Politics".into()];
        assert!(cfg.matches(&row));

        cfg.max_wallet_age_days = Some(1.0);
        assert!(!cfg.matches(&row));
        cfg.max_wallet_age_days = Some(7.0);
        assert!(cfg.matches(&row));

        cfg.outcome_filter = OutcomeFilter::No;
        assert!(!cfg.matches(&row));
    }
}
