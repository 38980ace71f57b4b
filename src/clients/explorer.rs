//! Block-explorer client for wallet telemetry: first-seen transaction and
//! lifetime transaction count.

use crate::clients::{classify_status, ClientError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 200;

/// Raw wallet telemetry as fetched upstream. Cached verbatim under the
/// `wallet_profile` key, separate from the derived enrichment record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WalletTelemetry {
    pub first_seen_ts_ms: Option<i64>,
    pub first_seen_block: Option<u64>,
    pub tx_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ExplorerEnvelope {
    status: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TxEntry {
    #[serde(alias = "timeStamp")]
    time_stamp: String,
    #[serde(alias = "blockNumber")]
    block_number: String,
}

#[derive(Clone)]
pub struct ExplorerClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ExplorerClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.clamp(10, 30)))
            .build()
            .map_err(|e| ClientError::TransientUpstream(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn query(&self, params: &[(&str, String)]) -> Result<ExplorerEnvelope, ClientError> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut last_err: Option<ClientError> = None;
        let mut full: Vec<(&str, String)> = params.to_vec();
        if let Some(key) = &self.api_key {
            full.push(("apikey", key.clone()));
        }

        for attempt in 0..MAX_RETRIES {
            match self.client.get(&self.base_url).query(&full).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<ExplorerEnvelope>()
                        .await
                        .map_err(|e| ClientError::InvalidPayload(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    let err = classify_status(status, body);
                    if !err.is_transient() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => last_err = Some(ClientError::TransientUpstream(e.to_string())),
            }
            debug!(attempt, backoff_ms, "explorer retry");
            sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2;
        }
        Err(last_err
            .unwrap_or_else(|| ClientError::TransientUpstream("retries exhausted".into())))
    }

    /// Earliest transaction for an address: first-seen timestamp and block.
    pub async fn first_transaction(
        &self,
        address: &str,
    ) -> Result<Option<(i64, u64)>, ClientError> {
        let envelope = self
            .query(&[
                ("module", "account".to_string()),
                ("action", "txlist".to_string()),
                ("address", address.to_lowercase()),
                ("startblock", "0".to_string()),
                ("page", "1".to_string()),
                ("offset", "1".to_string()),
                ("sort", "asc".to_string()),
            ])
            .await?;

        // status "0" with empty result means a never-seen address, not an error.
        if envelope.status != "1" {
            return Ok(None);
        }
        let entries: Vec<TxEntry> = serde_json::from_value(envelope.result)
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))?;
        let Some(first) = entries.first() else {
            return Ok(None);
        };
        let ts_secs: i64 = first
            .time_stamp
            .parse()
            .map_err(|_| ClientError::InvalidPayload("bad timeStamp".into()))?;
        let block: u64 = first
            .block_number
            .parse()
            .map_err(|_| ClientError::InvalidPayload("bad blockNumber".into()))?;
        Ok(Some((ts_secs * 1000, block)))
    }

    /// Lifetime outgoing transaction count.
    pub async fn transaction_count(&self, address: &str) -> Result<Option<u64>, ClientError> {
        let envelope = self
            .query(&[
                ("module", "proxy".to_string()),
                ("action", "eth_getTransactionCount".to_string()),
                ("address", address.to_lowercase()),
                ("tag", "latest".to_string()),
            ])
            .await?;
        let hex = envelope.result.as_str().unwrap_or("");
        let Some(stripped) = hex.strip_prefix("0x") else {
            return Ok(None);
        };
        Ok(u64::from_str_radix(stripped, 16).ok())
    }

    /// Full telemetry fetch. A transient failure on either leg degrades
    /// that field to `None` rather than failing the whole lookup; only when
    /// both legs fail transiently is the error surfaced so the caller can
    /// fall back to cached data.
    pub async fn wallet_telemetry(&self, address: &str) -> Result<WalletTelemetry, ClientError> {
        let first = match self.first_transaction(address).await {
            Ok(f) => Ok(f),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => return Err(e),
        };
        let count = match self.transaction_count(address).await {
            Ok(c) => Ok(c),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => return Err(e),
        };
        let (first, count) = match (first, count) {
            (Err(e), Err(_)) => return Err(e),
            (f, c) => (f.unwrap_or(None), c.unwrap_or(None)),
        };
        Ok(WalletTelemetry {
            first_seen_ts_ms: first.map(|(ts, _)| ts),
            first_seen_block: first.map(|(_, b)| b),
            tx_count: count,
        })
    }
}
