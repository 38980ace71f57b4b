//! Core domain types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade aggressor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Parse either casing; upstream mixes "BUY"/"buy".
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Binary market outcome. The research path stores "Yes"/"No"; upstream
/// decision paths shout "YES"/"NO". Normalized here, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "Yes",
            Outcome::No => "No",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Some(Outcome::Yes),
            "no" => Some(Outcome::No),
            _ => None,
        }
    }
}

/// Immutable market metadata for a condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMeta {
    pub condition_id: String,
    pub question: String,
    /// UTC close, RFC3339.
    pub end_date_iso: Option<String>,
    pub category: Option<String>,
    pub event_slug: Option<String>,
    pub market_slug: Option<String>,
    pub outcomes: Vec<String>,
}

impl MarketMeta {
    /// Market close in ms since epoch, if the ISO date parses.
    pub fn end_date_ms(&self) -> Option<i64> {
        let iso = self.end_date_iso.as_deref()?;
        DateTime::parse_from_rfc3339(iso)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
    }
}

/// A single taker trade. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub token_id: String,
    /// ms since epoch.
    pub timestamp_ms: i64,
    /// Lowercase 40-hex with 0x prefix.
    pub taker_address: String,
    pub side: Side,
    /// Probability-space price in [0, 1].
    pub price: f64,
    pub size: f64,
    pub tx_hash: Option<String>,
}

impl Trade {
    #[inline]
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }

    /// Schema-boundary validation. Rejected trades never enter rolling state.
    pub fn validate(&self) -> Result<(), TradeValidationError> {
        if !(0.0..=1.0).contains(&self.price) {
            return Err(TradeValidationError::PriceOutOfRange(self.price));
        }
        if self.size <= 0.0 || !self.size.is_finite() {
            return Err(TradeValidationError::NonPositiveSize(self.size));
        }
        if !is_hex_address(&self.taker_address) {
            return Err(TradeValidationError::MalformedAddress(
                self.taker_address.clone(),
            ));
        }
        if let Some(tx) = &self.tx_hash {
            if !is_hex_hash(tx) {
                return Err(TradeValidationError::MalformedTxHash(tx.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TradeValidationError {
    #[error("price {0} outside [0,1]")]
    PriceOutOfRange(f64),
    #[error("size {0} must be positive")]
    NonPositiveSize(f64),
    #[error("malformed taker address {0}")]
    MalformedAddress(String),
    #[error("malformed tx hash {0}")]
    MalformedTxHash(String),
}

fn is_hex_address(s: &str) -> bool {
    let body = s.strip_prefix("0x").unwrap_or(s);
    body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_hex_hash(s: &str) -> bool {
    let body = s.strip_prefix("0x").unwrap_or(s);
    body.len() == 64 && body.chars().all(|c| c.is_ascii_hexdigit())
}

/// One price level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Order book snapshot at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub token_id: String,
    pub time_ms: i64,
    pub best_bid: f64,
    pub best_ask: f64,
    pub mid: f64,
    pub spread: f64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Depth-bucket metrics derived from a snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookMetrics {
    pub mid: f64,
    pub bid_depth_5pct: f64,
    pub bid_depth_10pct: f64,
    pub ask_depth_5pct: f64,
    pub ask_depth_10pct: f64,
    /// (bid - ask) / (bid + ask) over the 10% buckets; 0 on empty books.
    pub imbalance: f64,
    pub spread_bps: f64,
}

impl BookSnapshot {
    /// Depth within `pct` of mid on each side, in notional USD.
    fn depth_within(&self, pct: f64) -> (f64, f64) {
        let lo = self.mid * (1.0 - pct);
        let hi = self.mid * (1.0 + pct);
        let bid: f64 = self
            .bids
            .iter()
            .filter(|l| l.price >= lo)
            .map(|l| l.price * l.size)
            .sum();
        let ask: f64 = self
            .asks
            .iter()
            .filter(|l| l.price <= hi)
            .map(|l| l.price * l.size)
            .sum();
        (bid, ask)
    }

    pub fn metrics(&self) -> BookMetrics {
        let (bid5, ask5) = self.depth_within(0.05);
        let (bid10, ask10) = self.depth_within(0.10);
        let total = bid10 + ask10;
        let imbalance = if total > 0.0 {
            (bid10 - ask10) / total
        } else {
            0.0
        };
        let spread_bps = if self.mid > 0.0 {
            self.spread / self.mid * 10_000.0
        } else {
            0.0
        };
        BookMetrics {
            mid: self.mid,
            bid_depth_5pct: bid5,
            bid_depth_10pct: bid10,
            ask_depth_5pct: ask5,
            ask_depth_10pct: ask10,
            imbalance,
            spread_bps,
        }
    }
}

/// Provenance of a wallet enrichment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletSource {
    Upstream,
    Cache,
    Fallback,
}

impl WalletSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletSource::Upstream => "upstream",
            WalletSource::Cache => "cache",
            WalletSource::Fallback => "fallback",
        }
    }
}

/// Wallet enrichment. `first_seen_ts` is monotone: once known it is never
/// moved later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletEnrichment {
    pub address: String,
    pub first_seen_ts: Option<i64>,
    pub first_seen_block: Option<u64>,
    pub tx_count: Option<u64>,
    pub enriched_at: i64,
    pub source: WalletSource,
}

impl WalletEnrichment {
    /// Age in days at `now_ms`, when first-seen is known.
    pub fn age_days(&self, now_ms: i64) -> Option<f64> {
        self.first_seen_ts
            .map(|ts| ((now_ms - ts).max(0)) as f64 / 86_400_000.0)
    }

    /// Degraded record used when upstream enrichment is exhausted.
    pub fn fallback(address: &str, now_ms: i64) -> Self {
        Self {
            address: address.to_lowercase(),
            first_seen_ts: None,
            first_seen_block: None,
            tx_count: None,
            enriched_at: now_ms,
            source: WalletSource::Fallback,
        }
    }
}

/// Signal strength buckets over the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStrength {
    None,
    Weak,
    Moderate,
    Strong,
    Extreme,
}

impl SignalStrength {
    /// Bucket thresholds 0.30 / 0.50 / 0.70 / 0.85, inclusive lower bounds.
    pub fn from_composite(composite: f64) -> Self {
        if composite >= 0.85 {
            SignalStrength::Extreme
        } else if composite >= 0.70 {
            SignalStrength::Strong
        } else if composite >= 0.50 {
            SignalStrength::Moderate
        } else if composite >= 0.30 {
            SignalStrength::Weak
        } else {
            SignalStrength::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStrength::None => "none",
            SignalStrength::Weak => "weak",
            SignalStrength::Moderate => "moderate",
            SignalStrength::Strong => "strong",
            SignalStrength::Extreme => "extreme",
        }
    }
}

/// A large trade surfaced alongside a score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggeringTrade {
    pub trade_id: String,
    pub timestamp_ms: i64,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub notional: f64,
    pub taker_address: String,
    pub wallet_age_days: Option<f64>,
    pub tx_hash: Option<String>,
}

/// Build a block-explorer transaction link.
pub fn tx_link(explorer_host: &str, tx_hash: &str) -> String {
    format!("https://{}/tx/{}", explorer_host, tx_hash)
}

/// Build a market link from event / market slugs.
pub fn market_link(market_host: &str, event_slug: &str, market_slug: Option<&str>) -> String {
    match market_slug {
        Some(m) => format!("https://{}/event/{}/{}", market_host, event_slug, m),
        None => format!("https://{}/event/{}", market_host, event_slug),
    }
}
