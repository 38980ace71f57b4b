//! Cache-then-fetch-then-fallback wallet enrichment.
//!
//! First-seen is immutable and monotone: once a wallet's earliest
//! transaction is known it is never moved later, whatever upstream says on a
//! refresh. The `source` field records provenance so drift investigations
//! can trace where a number came from.

use crate::clients::explorer::WalletTelemetry;
use crate::clients::ExplorerClient;
use crate::config::cache_keys;
use crate::models::{WalletEnrichment, WalletSource};
use crate::storage::cache::scoped_key;
use crate::storage::KvCache;
use anyhow::Result;
use tracing::{debug, warn};

pub struct WalletEnricher {
    cache: KvCache,
    explorer: Option<ExplorerClient>,
    ttl_secs: i64,
}

impl WalletEnricher {
    pub fn new(cache: KvCache, explorer: Option<ExplorerClient>, ttl_secs: i64) -> Self {
        Self {
            cache,
            explorer,
            ttl_secs,
        }
    }

    /// Cached wallet age in days, if an enrichment record exists. Used on
    /// the scoring hot path, so cache-only and non-blocking on upstream.
    pub fn cached_age_days(&self, address: &str, now_ms: i64) -> Option<f64> {
        let key = scoped_key(cache_keys::WALLET_CACHE, address);
        let (cached, _stale) = self
            .cache
            .get_json::<WalletEnrichment>(&key, self.ttl_secs, now_ms / 1000)
            .ok()??;
        cached.age_days(now_ms)
    }

    /// Rebuild a degraded record from the raw profile blob left behind by an
    /// earlier successful fetch. Better than a blank fallback.
    fn from_raw_profile(&self, address: &str, now_ms: i64) -> Option<WalletEnrichment> {
        let key = scoped_key(cache_keys::WALLET_PROFILE, address);
        let (profile, _stale) = self
            .cache
            .get_json::<WalletTelemetry>(&key, self.ttl_secs, now_ms / 1000)
            .ok()??;
        Some(WalletEnrichment {
            address: address.to_string(),
            first_seen_ts: profile.first_seen_ts_ms,
            first_seen_block: profile.first_seen_block,
            tx_count: profile.tx_count,
            enriched_at: now_ms,
            source: WalletSource::Cache,
        })
    }

    /// Resolve an enrichment record: fresh cache hit, else upstream fetch,
    /// else stale cache, else the raw profile blob, else an explicit
    /// fallback record.
    pub async fn enrich(&self, address: &str, now_ms: i64) -> Result<WalletEnrichment> {
        let address = address.to_lowercase();
        let key = scoped_key(cache_keys::WALLET_CACHE, &address);
        let now_secs = now_ms / 1000;

        let cached = self
            .cache
            .get_json::<WalletEnrichment>(&key, self.ttl_secs, now_secs)?;
        if let Some((mut hit, stale)) = cached.clone() {
            if !stale {
                hit.source = WalletSource::Cache;
                return Ok(hit);
            }
        }

        let Some(explorer) = &self.explorer else {
            // No explorer configured: stale cache beats nothing.
            if let Some((mut hit, _)) = cached {
                hit.source = WalletSource::Cache;
                return Ok(hit);
            }
            if let Some(degraded) = self.from_raw_profile(&address, now_ms) {
                return Ok(degraded);
            }
            return Ok(WalletEnrichment::fallback(&address, now_ms));
        };

        match explorer.wallet_telemetry(&address).await {
            Ok(telemetry) => {
                let prior_first_seen = cached.as_ref().and_then(|(c, _)| c.first_seen_ts);
                // Monotone merge: keep the earliest first-seen ever observed.
                let first_seen_ts = match (prior_first_seen, telemetry.first_seen_ts_ms) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                let enrichment = WalletEnrichment {
                    address: address.clone(),
                    first_seen_ts,
                    first_seen_block: telemetry.first_seen_block.or_else(|| {
                        cached.as_ref().and_then(|(c, _)| c.first_seen_block)
                    }),
                    tx_count: telemetry.tx_count,
                    enriched_at: now_ms,
                    source: WalletSource::Upstream,
                };
                if let Err(e) = self.cache.put_json(&key, &enrichment, now_secs) {
                    warn!(address, error = %e, "wallet cache write failed");
                }
                // The raw upstream payload is kept verbatim, separate from
                // the derived record, so degraded reruns can trace what the
                // explorer actually said.
                let profile_key = scoped_key(cache_keys::WALLET_PROFILE, &address);
                let _ = self.cache.put_json(&profile_key, &telemetry, now_secs);
                // First-seen is immutable; keep it under its own key so it
                // survives profile refreshes.
                if let Some(ts) = enrichment.first_seen_ts {
                    let fs_key = scoped_key(cache_keys::WALLET_FIRST_SEEN, &address);
                    let _ = self.cache.put_json(&fs_key, &ts, now_secs);
                }
                Ok(enrichment)
            }
            Err(e) => {
                debug!(address, error = %e, "wallet enrichment degraded");
                if let Some((mut hit, _)) = cached {
                    hit.source = WalletSource::Cache;
                    return Ok(hit);
                }
                if let Some(degraded) = self.from_raw_profile(&address, now_ms) {
                    return Ok(degraded);
                }
                Ok(WalletEnrichment::fallback(&address, now_ms))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Warehouse;

    fn enricher() -> WalletEnricher {
        let cache = KvCache::new(&Warehouse::in_memory().unwrap());
        WalletEnricher::new(cache, None, 30 * 24 * 3600)
    }

    #[tokio::test]
    async fn no_explorer_yields_fallback() {
        let e = enricher();
        let now = 1_700_000_000_000;
        let w = e.enrich("0xAbC", now).await.unwrap();
        assert_eq!(w.source, WalletSource::Fallback);
        assert_eq!(w.address, "0xabc");
        assert!(w.first_seen_ts.is_none());
    }

    #[tokio::test]
    async fn cached_record_is_served() {
        let cache = KvCache::new(&Warehouse::in_memory().unwrap());
        let now = 1_700_000_000_000i64;
        let key = scoped_key(cache_keys::WALLET_CACHE, "0xabc");
        let record = WalletEnrichment {
            address: "0xabc".into(),
            first_seen_ts: Some(now - 86_400_000),
            first_seen_block: Some(42),
            tx_count: Some(7),
            enriched_at: now,
            source: WalletSource::Upstream,
        };
        cache.put_json(&key, &record, now / 1000).unwrap();

        let e = WalletEnricher::new(cache, None, 30 * 24 * 3600);
        let w = e.enrich("0xABC", now).await.unwrap();
        assert_eq!(w.source, WalletSource::Cache);
        assert_eq!(w.first_seen_block, Some(42));
        assert!(e.cached_age_days("0xabc", now).unwrap() > 0.9);
    }

    #[tokio::test]
    async fn raw_profile_backs_degraded_lookup() {
        let cache = KvCache::new(&Warehouse::in_memory().unwrap());
        let now = 1_700_000_000_000i64;
        // Only the raw profile blob exists, no derived record.
        let profile = WalletTelemetry {
            first_seen_ts_ms: Some(now - 3 * 86_400_000),
            first_seen_block: Some(99),
            tx_count: Some(12),
        };
        let key = scoped_key(cache_keys::WALLET_PROFILE, "0xabc");
        cache.put_json(&key, &profile, now / 1000).unwrap();

        let e = WalletEnricher::new(cache, None, 30 * 24 * 3600);
        let w = e.enrich("0xABC", now).await.unwrap();
        assert_eq!(w.source, WalletSource::Cache);
        assert_eq!(w.first_seen_block, Some(99));
        assert_eq!(w.tx_count, Some(12));
    }
}
