//! Wallet-risk features: account age, activity, and provenance.

use crate::models::{WalletEnrichment, WalletSource};
use serde::{Deserialize, Serialize};

/// Weighted mean for the combined risk score: freshness dominates, activity
/// second, unknown-provenance last.
const W_NEW: f64 = 0.5;
const W_ACTIVITY: f64 = 0.3;
const W_UNKNOWN: f64 = 0.2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletFeatures {
    pub address: String,
    pub age_days: Option<f64>,
    pub tx_count: Option<u64>,
    /// 1.0 under 7 days old, decaying to 0 by ~180 days.
    pub wallet_new_score: f64,
    /// Low transaction counts score high (suspicious).
    pub activity_score: f64,
    /// Weighted mean of new / activity / unknown-provenance subscores.
    pub wallet_risk_score: f64,
    pub is_new_account: bool,
    pub is_low_activity: bool,
    pub source: WalletSource,
}

/// Freshness score: 1.0 for age < 7 d, then linear decay hitting 0 at 180 d.
/// Monotone non-increasing. Unknown age sits at a neutral 0.5.
pub fn wallet_new_score(age_days: Option<f64>) -> f64 {
    match age_days {
        Some(age) if age < 7.0 => 1.0,
        Some(age) => (1.0 - (age - 7.0) / 173.0).clamp(0.0, 1.0),
        None => 0.5,
    }
}

/// Activity score by transaction count. Unknown counts score like fresh
/// wallets: nothing known is itself a flag.
pub fn activity_score(tx_count: Option<u64>) -> f64 {
    match tx_count {
        Some(n) if n < 10 => 0.9,
        Some(n) if n < 50 => 0.6,
        Some(n) if n < 100 => 0.3,
        Some(_) => 0.1,
        None => 0.9,
    }
}

pub fn compute(enrichment: &WalletEnrichment, now_ms: i64) -> WalletFeatures {
    let age_days = enrichment.age_days(now_ms);
    let new_score = wallet_new_score(age_days);
    let act_score = activity_score(enrichment.tx_count);
    let unknown_score = match enrichment.source {
        WalletSource::Fallback => 1.0,
        _ if enrichment.first_seen_ts.is_none() => 0.5,
        _ => 0.0,
    };

    let risk = W_NEW * new_score + W_ACTIVITY * act_score + W_UNKNOWN * unknown_score;

    WalletFeatures {
        address: enrichment.address.clone(),
        age_days,
        tx_count: enrichment.tx_count,
        wallet_new_score: new_score,
        activity_score: act_score,
        wallet_risk_score: risk.clamp(0.0, 1.0),
        is_new_account: age_days.map(|a| a < 7.0).unwrap_or(false),
        is_low_activity: enrichment.tx_count.map(|n| n < 50).unwrap_or(true),
        source: enrichment.source,
    }
}

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Parse a "May 2025"-style join date into (year, month 1-12).
pub fn parse_join_date(s: &str) -> Option<(i32, u32)> {
    let mut parts = s.split_whitespace();
    let month_name = parts.next()?;
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let month = MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month_name))? as u32
        + 1;
    Some((year, month))
}

/// Format (year, month) back into the "May 2025" display form.
pub fn format_join_date(year: i32, month: u32) -> Option<String> {
    if !(1..=12).contains(&month) {
        return None;
    }
    Some(format!("{} {}", MONTHS[(month - 1) as usize], year))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrichment(age_days: Option<f64>, tx_count: Option<u64>) -> WalletEnrichment {
        let now_ms = 1_700_000_000_000i64;
        WalletEnrichment {
            address: "0xabc".into(),
            first_seen_ts: age_days.map(|d| now_ms - (d * 86_400_000.0) as i64),
            first_seen_block: None,
            tx_count,
            enriched_at: now_ms,
            source: WalletSource::Upstream,
        }
    }

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn brand_new_wallet_maxes_new_score() {
        let f = compute(&enrichment(Some(1.0), Some(3)), NOW);
        assert_eq!(f.wallet_new_score, 1.0);
        assert!(f.is_new_account);
        assert!(f.is_low_activity);
        assert!(f.wallet_risk_score > 0.7);
    }

    #[test]
    fn new_score_monotone_non_increasing() {
        let mut last = 2.0;
        for age in [0.0, 6.9, 7.0, 30.0, 90.0, 179.0, 180.0, 400.0] {
            let s = wallet_new_score(Some(age));
            assert!(s <= last + 1e-12, "age {} score {} > {}", age, s, last);
            last = s;
        }
        assert_eq!(wallet_new_score(Some(400.0)), 0.0);
    }

    #[test]
    fn activity_brackets() {
        assert_eq!(activity_score(Some(5)), 0.9);
        assert_eq!(activity_score(Some(20)), 0.6);
        assert_eq!(activity_score(Some(75)), 0.3);
        assert_eq!(activity_score(Some(500)), 0.1);
        assert_eq!(activity_score(None), 0.9);
    }

    #[test]
    fn unknown_wallet_flags_low_activity() {
        let f = compute(&enrichment(None, None), NOW);
        assert!(!f.is_new_account);
        assert!(f.is_low_activity);
    }

    #[test]
    fn join_date_round_trip() {
        for (i, month) in MONTHS.iter().enumerate() {
            let s = format!("{} 2025", month);
            let (y, m) = parse_join_date(&s).unwrap();
            assert_eq!(y, 2025);
            assert_eq!(m as usize, i + 1);
            assert_eq!(format_join_date(y, m).unwrap(), s);
        }
    }

    #[test]
    fn join_date_rejects_garbage() {
        assert!(parse_join_date("Smarch 2025").is_none());
        assert!(parse_join_date("May").is_none());
        assert!(parse_join_date("May 2025 extra").is_none());
        assert!(format_join_date(2025, 13).is_none());
    }
}
