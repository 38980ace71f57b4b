//! Centralized runtime configuration.
//!
//! Every tunable that used to be sprinkled inline (ramp parameters, dollar
//! floors, no-trade-zone seconds, staleness thresholds, cache TTLs) lives
//! here so there is exactly one source of truth. Call sites receive these
//! values as arguments; nothing re-reads the environment mid-flight.

use serde::{Deserialize, Serialize};
use std::env;

/// Time-to-close ramp: `ramp = min(max_multiplier, 1 + alpha * exp(-beta * ttc_hours))`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RampConfig {
    pub alpha: f64,
    pub beta: f64,
    pub max_multiplier: f64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            alpha: 2.0,
            beta: 0.5,
            max_multiplier: 3.0,
        }
    }
}

/// Dollar floors applied to the raw size-tail score.
///
/// Below `zero` the multiplier is 0, then 0.5 / 0.75 / 1.0 at the next
/// brackets. Constants were hard-coded upstream; kept configurable with the
/// same defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DollarFloors {
    pub zero: f64,
    pub half: f64,
    pub three_quarter: f64,
}

impl Default for DollarFloors {
    fn default() -> Self {
        Self {
            zero: 5_000.0,
            half: 10_000.0,
            three_quarter: 25_000.0,
        }
    }
}

/// Triple-signal thresholds. All four legs must clear for the conjunction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TripleSignalThresholds {
    pub size_tail: f64,
    pub book_imbalance: f64,
    pub thin_opposite: f64,
    pub wallet_new: f64,
    pub wallet_activity: f64,
}

impl Default for TripleSignalThresholds {
    fn default() -> Self {
        Self {
            size_tail: 0.90,
            book_imbalance: 0.70,
            thin_opposite: 0.70,
            wallet_new: 0.80,
            wallet_activity: 0.70,
        }
    }
}

/// Hawkes intensity proxy parameters (events per second).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HawkesConfig {
    pub baseline_mu: f64,
    pub excitation_alpha: f64,
    pub decay_beta: f64,
}

impl Default for HawkesConfig {
    fn default() -> Self {
        Self {
            baseline_mu: 0.1,
            excitation_alpha: 0.5,
            decay_beta: 0.1,
        }
    }
}

/// Page-Hinkley CUSUM parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CusumConfig {
    /// Drift allowance k.
    pub drift_k: f64,
    /// Decision threshold h.
    pub threshold_h: f64,
}

impl Default for CusumConfig {
    fn default() -> Self {
        Self {
            drift_k: 0.5,
            threshold_h: 5.0,
        }
    }
}

/// Execution-score spread penalty bounds (bps).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpreadPenaltyConfig {
    pub min_acceptable_bps: f64,
    pub max_acceptable_bps: f64,
}

impl Default for SpreadPenaltyConfig {
    fn default() -> Self {
        Self {
            min_acceptable_bps: 50.0,
            max_acceptable_bps: 500.0,
        }
    }
}

/// Scoring thresholds and weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub ramp: RampConfig,
    pub floors: DollarFloors,
    pub triple: TripleSignalThresholds,
    pub spread_penalty: SpreadPenaltyConfig,
    /// Anomaly score at or above which a token is considered triggered.
    pub anomaly_trigger: f64,
    /// Composite weights (anomaly, execution, edge); normalized at use.
    pub composite_weights: (f64, f64, f64),
    /// Minimum notional for a trade to qualify as triggering.
    pub triggering_trade_floor_usd: f64,
    /// Display floor for the single highest trade in the last hour.
    pub highest_trade_display_floor_usd: f64,
    /// Seconds to close inside which no strategy jobs are emitted.
    pub no_trade_zone_seconds: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ramp: RampConfig::default(),
            floors: DollarFloors::default(),
            triple: TripleSignalThresholds::default(),
            spread_penalty: SpreadPenaltyConfig::default(),
            anomaly_trigger: 0.65,
            composite_weights: (0.5, 0.2, 0.3),
            triggering_trade_floor_usd: 5_000.0,
            highest_trade_display_floor_usd: 1_000.0,
            no_trade_zone_seconds: 120,
        }
    }
}

/// Cache TTLs, seconds. Wallet first-seen is immutable; its TTL is a
/// freshness hint, not a correctness requirement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheTtls {
    pub wallet_secs: i64,
    pub orderbook_state_secs: i64,
    pub score_secs: i64,
    pub feature_secs: i64,
    pub trade_window_secs: i64,
    /// Hawkes / change-point blobs live as long as a market plausibly does.
    pub rolling_state_secs: i64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            wallet_secs: 30 * 24 * 3600,
            orderbook_state_secs: 3600,
            score_secs: 600,
            feature_secs: 600,
            trade_window_secs: 2 * 3600,
            rolling_state_secs: 90 * 24 * 3600,
        }
    }
}

/// Application configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    /// Host for market links, e.g. `polymarket.com`.
    pub market_host: String,
    /// Host for transaction links, e.g. `polygonscan.com`.
    pub block_explorer_host: String,
    pub market_api_base: String,
    pub explorer_api_base: String,
    pub explorer_api_key: Option<String>,
    pub http_timeout_secs: u64,
    pub scoring: ScoringConfig,
    pub hawkes: HawkesConfig,
    pub cusum: CusumConfig,
    pub ttls: CacheTtls,
    /// Book snapshots older than this are treated as absent.
    pub book_staleness_secs: i64,
    /// Health-check cadence for monitored strategies.
    pub monitor_interval_minutes: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./sentinel.db".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let market_host =
            env::var("MARKET_HOST").unwrap_or_else(|_| "polymarket.com".to_string());

        let block_explorer_host =
            env::var("BLOCK_EXPLORER_HOST").unwrap_or_else(|_| "polygonscan.com".to_string());

        let market_api_base = env::var("MARKET_API_BASE")
            .unwrap_or_else(|_| "https://gamma-api.polymarket.com".to_string());

        let explorer_api_base = env::var("EXPLORER_API_BASE")
            .unwrap_or_else(|_| "https://api.polygonscan.com/api".to_string());

        let explorer_api_key = env::var("EXPLORER_API_KEY").ok();

        let http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v| (10..=30).contains(&v))
            .unwrap_or(15);

        let monitor_interval_minutes = env::var("MONITOR_INTERVAL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            database_path,
            port,
            market_host,
            block_explorer_host,
            market_api_base,
            explorer_api_base,
            explorer_api_key,
            http_timeout_secs,
            scoring: ScoringConfig::default(),
            hawkes: HawkesConfig::default(),
            cusum: CusumConfig::default(),
            ttls: CacheTtls::default(),
            book_staleness_secs: 300,
            monitor_interval_minutes,
        })
    }
}

/// Cache key namespaces. Per-token keys append `:{token_id}`; wallet keys
/// append `:{address}`.
pub mod cache_keys {
    pub const WALLET_CACHE: &str = "wallet_cache";
    pub const WALLET_PROFILE: &str = "wallet_profile";
    pub const WALLET_FIRST_SEEN: &str = "wallet_first_seen";
    pub const ORDERBOOK_STATE: &str = "orderbook_state";
    pub const SCORE_CACHE: &str = "score_cache";
    pub const FEATURE_CACHE: &str = "feature_cache";
    pub const TRADE_WINDOW: &str = "trade_window";
    pub const HAWKES_STATE: &str = "hawkes_state";
    pub const CPD_STATE: &str = "cpd_state";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_default_caps_at_max() {
        let r = RampConfig::default();
        // At zero hours to close the raw ramp is 1 + alpha, capped by max.
        let at_zero = (1.0 + r.alpha).min(r.max_multiplier);
        assert!(at_zero <= r.max_multiplier);
        assert!(at_zero > 1.0);
    }

    #[test]
    fn floors_are_ordered() {
        let f = DollarFloors::default();
        assert!(f.zero < f.half && f.half < f.three_quarter);
    }
}
