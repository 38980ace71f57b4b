//! Time-to-close features and the late-window ramp.

use crate::config::RampConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeFeatures {
    pub ttc_ms: i64,
    pub ttc_hours: f64,
    /// `min(max_multiplier, 1 + alpha * exp(-beta * ttc_hours))`.
    pub ramp_multiplier: f64,
    pub within_5m: bool,
    pub within_15m: bool,
    pub within_30m: bool,
    pub within_60m: bool,
    pub within_120m: bool,
    /// Inside the last 120 seconds no strategy jobs are emitted.
    pub in_no_trade_zone: bool,
}

/// Ramp multiplier alone; shared with the scoring path.
pub fn ramp_multiplier(ttc_hours: f64, cfg: &RampConfig) -> f64 {
    (1.0 + cfg.alpha * (-cfg.beta * ttc_hours.max(0.0)).exp()).min(cfg.max_multiplier)
}

/// Derive time features. A missing end date means a market without a known
/// close: the ramp stays at 1 and every bucket flag is false.
pub fn compute(
    end_date_ms: Option<i64>,
    now_ms: i64,
    cfg: &RampConfig,
    no_trade_zone_seconds: i64,
) -> TimeFeatures {
    let Some(end_ms) = end_date_ms else {
        return TimeFeatures {
            ttc_ms: i64::MAX,
            ttc_hours: f64::INFINITY,
            ramp_multiplier: 1.0,
            within_5m: false,
            within_15m: false,
            within_30m: false,
            within_60m: false,
            within_120m: false,
            in_no_trade_zone: false,
        };
    };

    let ttc_ms = (end_ms - now_ms).max(0);
    let ttc_hours = ttc_ms as f64 / 3_600_000.0;
    let ttc_minutes = ttc_ms as f64 / 60_000.0;
    let ttc_seconds = ttc_ms / 1_000;

    TimeFeatures {
        ttc_ms,
        ttc_hours,
        ramp_multiplier: ramp_multiplier(ttc_hours, cfg),
        within_5m: ttc_minutes <= 5.0,
        within_15m: ttc_minutes <= 15.0,
        within_30m: ttc_minutes <= 30.0,
        within_60m: ttc_minutes <= 60.0,
        within_120m: ttc_minutes <= 120.0,
        in_no_trade_zone: ttc_seconds <= no_trade_zone_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_at_zero_is_one_plus_alpha_capped() {
        let cfg = RampConfig::default();
        let r = ramp_multiplier(0.0, &cfg);
        assert!((r - (1.0 + cfg.alpha).min(cfg.max_multiplier)).abs() < 1e-12);
    }

    #[test]
    fn ramp_decays_to_one() {
        let cfg = RampConfig::default();
        assert!((ramp_multiplier(1_000.0, &cfg) - 1.0).abs() < 1e-9);
        // Monotone non-increasing in time to close.
        let mut last = f64::INFINITY;
        for h in [0.0, 0.5, 1.0, 2.0, 6.0, 24.0] {
            let r = ramp_multiplier(h, &cfg);
            assert!(r <= last + 1e-12);
            last = r;
        }
    }

    #[test]
    fn bucket_flags_nest() {
        let cfg = RampConfig::default();
        let now = 0;
        let end = 10 * 60_000; // 10 minutes out
        let t = compute(Some(end), now, &cfg, 120);
        assert!(!t.within_5m);
        assert!(t.within_15m && t.within_30m && t.within_60m && t.within_120m);
        assert!(!t.in_no_trade_zone);
    }

    #[test]
    fn no_trade_zone_at_two_minutes() {
        let cfg = RampConfig::default();
        let t = compute(Some(120_000), 0, &cfg, 120);
        assert!(t.in_no_trade_zone);
        let t = compute(Some(121_000), 0, &cfg, 120);
        assert!(!t.in_no_trade_zone);
    }

    #[test]
    fn missing_end_date_is_neutral() {
        let cfg = RampConfig::default();
        let t = compute(None, 0, &cfg, 120);
        assert_eq!(t.ramp_multiplier, 1.0);
        assert!(!t.within_120m && !t.in_no_trade_zone);
    }
}
