//! Market data API client: markets, historical trades, order books.
//!
//! Pagination loops stop cleanly on the first bad page; callers decide how
//! much partial data is acceptable.

use crate::clients::{classify_status, ClientError};
use crate::models::{BookLevel, BookSnapshot, MarketMeta, Side};
use crate::research::events::{
    parse_outcome_prices, winning_outcome, HistoricalTrade, ResolvedMarket,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;
/// Upstream page size cap.
pub const PAGE_LIMIT: usize = 500;

/// Raw market payload as the gamma-style API returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMarket {
    #[serde(alias = "conditionId")]
    pub condition_id: String,
    pub question: Option<String>,
    #[serde(alias = "endDateIso", alias = "endDate")]
    pub end_date_iso: Option<String>,
    pub category: Option<String>,
    #[serde(alias = "eventSlug")]
    pub event_slug: Option<String>,
    #[serde(alias = "slug")]
    pub market_slug: Option<String>,
    #[serde(alias = "outcomePrices")]
    pub outcome_prices: Option<Value>,
    pub outcomes: Option<Value>,
    #[serde(alias = "clobTokenIds")]
    pub clob_token_ids: Option<Value>,
}

impl RawMarket {
    pub fn to_meta(&self) -> MarketMeta {
        MarketMeta {
            condition_id: self.condition_id.clone(),
            question: self.question.clone().unwrap_or_default(),
            end_date_iso: self.end_date_iso.clone(),
            category: self.category.clone(),
            event_slug: self.event_slug.clone(),
            market_slug: self.market_slug.clone(),
            outcomes: parse_string_array(self.outcomes.as_ref()),
        }
    }

    /// A market qualifies as resolved only when its final prices parse to
    /// exactly [1,0] or [0,1].
    pub fn to_resolved(&self) -> Option<ResolvedMarket> {
        let raw = self.outcome_prices.as_ref()?;
        let (yes, no) = parse_outcome_prices(raw)?;
        let winner = winning_outcome(yes, no)?;
        let end_date_ms = self.end_date_iso.as_deref().and_then(|iso| {
            DateTime::parse_from_rfc3339(iso)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
        });
        Some(ResolvedMarket {
            condition_id: self.condition_id.clone(),
            question: self.question.clone().unwrap_or_default(),
            end_date_iso: self.end_date_iso.clone(),
            end_date_ms,
            category: self.category.clone(),
            winning_outcome: Some(winner),
            final_yes_price: yes,
            final_no_price: no,
        })
    }
}

fn parse_string_array(v: Option<&Value>) -> Vec<String> {
    let Some(v) = v else {
        return Vec::new();
    };
    // Either a JSON array or a JSON-encoded string of one.
    let arr = match v {
        Value::String(s) => serde_json::from_str::<Value>(s).ok(),
        other => Some(other.clone()),
    };
    arr.and_then(|a| {
        a.as_array().map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(|s| s.to_string()))
                .collect()
        })
    })
    .unwrap_or_default()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTrade {
    #[serde(alias = "id", alias = "tradeId")]
    pub trade_id: String,
    #[serde(alias = "conditionId")]
    pub condition_id: Option<String>,
    #[serde(alias = "asset", alias = "tokenId")]
    pub token_id: String,
    /// Seconds or milliseconds; normalized in `to_historical`.
    pub timestamp: i64,
    #[serde(alias = "proxyWallet", alias = "takerAddress")]
    pub taker_address: String,
    #[serde(alias = "makerAddress")]
    pub maker_address: Option<String>,
    pub side: String,
    pub price: f64,
    pub size: f64,
    pub outcome: Option<String>,
    #[serde(alias = "transactionHash")]
    pub tx_hash: Option<String>,
}

impl RawTrade {
    pub fn to_historical(&self, condition_id: &str) -> Option<HistoricalTrade> {
        let side = Side::parse(&self.side)?;
        // Upstream mixes epoch seconds and milliseconds.
        let timestamp_ms = if self.timestamp < 100_000_000_000 {
            self.timestamp * 1000
        } else {
            self.timestamp
        };
        if !(0.0..=1.0).contains(&self.price) || self.size <= 0.0 {
            return None;
        }
        Some(HistoricalTrade {
            condition_id: self
                .condition_id
                .clone()
                .unwrap_or_else(|| condition_id.to_string()),
            token_id: self.token_id.clone(),
            trade_id: self.trade_id.clone(),
            timestamp_ms,
            taker_address: self.taker_address.to_lowercase(),
            maker_address: self.maker_address.as_ref().map(|a| a.to_lowercase()),
            side,
            price: self.price,
            size: self.size,
            outcome: self.outcome.clone(),
            tx_hash: self.tx_hash.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawBookLevel {
    price: String,
    size: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBook {
    #[serde(default)]
    bids: Vec<RawBookLevel>,
    #[serde(default)]
    asks: Vec<RawBookLevel>,
}

#[derive(Clone)]
pub struct MarketApiClient {
    client: Client,
    base_url: String,
}

impl MarketApiClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.clamp(10, 30)))
            .user_agent("sentinel/0.1 (research pipeline)")
            .build()
            .map_err(|e| ClientError::TransientUpstream(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, ClientError> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut last_err: Option<ClientError> = None;

        for attempt in 0..MAX_RETRIES {
            match self.client.get(url).query(query).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    let err = classify_status(status, body);
                    if !err.is_transient() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(ClientError::TransientUpstream(e.to_string()));
                }
            }
            debug!(url, attempt, backoff_ms, "retrying upstream request");
            sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2;
        }
        Err(last_err
            .unwrap_or_else(|| ClientError::TransientUpstream("retries exhausted".into())))
    }

    /// One page of closed markets.
    pub async fn fetch_markets_page(
        &self,
        limit: usize,
        offset: usize,
        closed: bool,
    ) -> Result<Vec<RawMarket>, ClientError> {
        let url = format!("{}/markets", self.base_url);
        let query = [
            ("limit", limit.min(PAGE_LIMIT).to_string()),
            ("offset", offset.to_string()),
            ("closed", closed.to_string()),
        ];
        let resp = self.get_with_retry(&url, &query).await?;
        resp.json::<Vec<RawMarket>>()
            .await
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))
    }

    /// One page of historical trades for a market, newest first.
    pub async fn fetch_trades_page(
        &self,
        condition_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RawTrade>, ClientError> {
        let url = format!("{}/trades", self.base_url);
        let query = [
            ("market", condition_id.to_string()),
            ("limit", limit.min(PAGE_LIMIT).to_string()),
            ("offset", offset.to_string()),
        ];
        let resp = self.get_with_retry(&url, &query).await?;
        resp.json::<Vec<RawTrade>>()
            .await
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))
    }

    /// Current order book for a token.
    pub async fn fetch_book(&self, token_id: &str, now_ms: i64) -> Result<BookSnapshot, ClientError> {
        let url = format!("{}/book", self.base_url);
        let query = [("token_id", token_id.to_string())];
        let resp = self.get_with_retry(&url, &query).await?;
        let raw: RawBook = resp
            .json()
            .await
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))?;

        let parse_levels = |levels: &[RawBookLevel]| -> Vec<BookLevel> {
            levels
                .iter()
                .filter_map(|l| {
                    Some(BookLevel {
                        price: l.price.parse().ok()?,
                        size: l.size.parse().ok()?,
                    })
                })
                .collect()
        };
        let bids = parse_levels(&raw.bids);
        let asks = parse_levels(&raw.asks);

        let best_bid = bids.iter().map(|l| l.price).fold(0.0f64, f64::max);
        let best_ask = asks
            .iter()
            .map(|l| l.price)
            .fold(f64::INFINITY, f64::min);
        if best_bid <= 0.0 || !best_ask.is_finite() {
            warn!(token_id, "book missing a side");
            return Err(ClientError::InvalidPayload("one-sided book".into()));
        }

        Ok(BookSnapshot {
            token_id: token_id.to_string(),
            time_ms: now_ms,
            best_bid,
            best_ask,
            mid: (best_bid + best_ask) / 2.0,
            spread: best_ask - best_bid,
            bids,
            asks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_market_resolution_paths() {
        let mut m = RawMarket {
            condition_id: "c1".into(),
            question: Some("q".into()),
            end_date_iso: Some("2026-01-01T00:00:00Z".into()),
            category: Some("politics".into()),
            event_slug: None,
            market_slug: None,
            outcome_prices: Some(json!("[\"1\", \"0\"]")),
            outcomes: Some(json!("[\"Yes\", \"No\"]")),
            clob_token_ids: None,
        };
        let resolved = m.to_resolved().expect("clean resolution");
        assert_eq!(
            resolved.winning_outcome,
            Some(crate::models::Outcome::Yes)
        );
        assert!(resolved.end_date_ms.is_some());

        m.outcome_prices = Some(json!("[\"0.9\", \"0.1\"]"));
        assert!(m.to_resolved().is_none());

        m.outcome_prices = Some(json!("not valid json"));
        assert!(m.to_resolved().is_none());

        m.outcome_prices = None;
        assert!(m.to_resolved().is_none());
    }

    #[test]
    fn raw_market_outcomes_parse_from_encoded_string() {
        let m = RawMarket {
            condition_id: "c1".into(),
            question: None,
            end_date_iso: None,
            category: None,
            event_slug: None,
            market_slug: None,
            outcome_prices: None,
            outcomes: Some(json!("[\"Yes\", \"No\"]")),
            clob_token_ids: None,
        };
        assert_eq!(m.to_meta().outcomes, vec!["Yes", "No"]);
    }

    #[test]
    fn raw_trade_normalizes_seconds_and_rejects_garbage() {
        let mut t = RawTrade {
            trade_id: "t1".into(),
            condition_id: None,
            token_id: "tok".into(),
            timestamp: 1_700_000_000, // seconds
            taker_address: "0xABCDEF1234567890ABCDEF1234567890ABCDEF12".into(),
            maker_address: None,
            side: "buy".into(),
            price: 0.4,
            size: 10.0,
            outcome: Some("Yes".into()),
            tx_hash: None,
        };
        let h = t.to_historical("c1").unwrap();
        assert_eq!(h.timestamp_ms, 1_700_000_000_000);
        assert_eq!(h.condition_id, "c1");
        assert_eq!(h.taker_address, "0xabcdef1234567890abcdef1234567890abcdef12");

        t.price = 1.5;
        assert!(t.to_historical("c1").is_none());
    }
}
