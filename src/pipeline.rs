//! Streaming ingest wiring: rolling state -> features -> scores.
//!
//! Fan-out is by token: the rolling engine serializes a single token's
//! updates behind its per-token lock while different tokens proceed in
//! parallel. A bad event is logged and dropped; the token stream never
//! halts. Scores for one token are emitted in the order its events are
//! handled here, so callers feed a token's events from a single task.

use crate::config::{cache_keys, Config};
use crate::features::FeatureComputer;
use crate::models::{BookSnapshot, MarketMeta, Trade};
use crate::rolling::{HawkesState, PageHinkley, RollingStateEngine};
use crate::scoring::{Score, ScoreEngine};
use crate::storage::cache::scoped_key;
use crate::storage::KvCache;
use crate::wallet::WalletEnricher;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Job handed to the downstream strategy queue.
#[derive(Debug, Clone)]
pub struct StrategyJob {
    pub token_id: String,
    pub condition_id: String,
    pub score: Score,
}

pub struct IngestPipeline {
    rolling: Arc<RollingStateEngine>,
    features: Arc<FeatureComputer>,
    scoring: Arc<ScoreEngine>,
    enricher: Arc<WalletEnricher>,
    cache: Option<KvCache>,
    job_tx: mpsc::Sender<StrategyJob>,
    /// Token -> market metadata registry, filled at discovery time.
    markets: RwLock<HashMap<String, MarketMeta>>,
    /// Tokens whose persisted rolling state has already been restored.
    hydrated: Mutex<HashSet<String>>,
    target_size_usd: f64,
    book_staleness_ms: i64,
    rolling_state_ttl_secs: i64,
    trade_window_ttl_secs: i64,
}

impl IngestPipeline {
    pub fn new(
        config: &Config,
        rolling: Arc<RollingStateEngine>,
        enricher: Arc<WalletEnricher>,
        cache: Option<KvCache>,
        job_tx: mpsc::Sender<StrategyJob>,
    ) -> Self {
        let features = Arc::new(FeatureComputer::new(rolling.clone(), &config.scoring));
        let scoring = Arc::new(ScoreEngine::new(rolling.clone(), config.scoring.clone()));
        Self {
            rolling,
            features,
            scoring,
            enricher,
            cache,
            job_tx,
            markets: RwLock::new(HashMap::new()),
            hydrated: Mutex::new(HashSet::new()),
            target_size_usd: 100.0,
            book_staleness_ms: config.book_staleness_secs * 1000,
            rolling_state_ttl_secs: config.ttls.rolling_state_secs,
            trade_window_ttl_secs: config.ttls.trade_window_secs,
        }
    }

    /// Restore a token's persisted rolling state on first touch. Missing
    /// blobs leave the token freshly initialized; stale blobs still load
    /// (the TTLs are freshness hints, not correctness requirements).
    fn hydrate_token(&self, token_id: &str, now_ms: i64) {
        let Some(cache) = &self.cache else {
            return;
        };
        if !self.hydrated.lock().insert(token_id.to_string()) {
            return;
        }
        let now_secs = now_ms / 1000;
        let hawkes = cache
            .get_json::<HawkesState>(
                &scoped_key(cache_keys::HAWKES_STATE, token_id),
                self.rolling_state_ttl_secs,
                now_secs,
            )
            .ok()
            .flatten()
            .map(|(v, _)| v);
        let cusums = cache
            .get_json::<Vec<PageHinkley>>(
                &scoped_key(cache_keys::CPD_STATE, token_id),
                self.rolling_state_ttl_secs,
                now_secs,
            )
            .ok()
            .flatten()
            .map(|(v, _)| v);
        let window = cache
            .get_json::<Vec<Trade>>(
                &scoped_key(cache_keys::TRADE_WINDOW, token_id),
                self.trade_window_ttl_secs,
                now_secs,
            )
            .ok()
            .flatten()
            .map(|(v, _)| v);

        if hawkes.is_some() || cusums.is_some() || window.is_some() {
            debug!(token_id, "rolling state restored from cache");
            self.rolling.restore_state(token_id, hawkes, cusums, window);
        }
    }

    pub fn register_market(&self, token_id: &str, meta: MarketMeta) {
        self.markets.write().insert(token_id.to_string(), meta);
    }

    fn meta_for(&self, token_id: &str) -> Option<MarketMeta> {
        self.markets.read().get(token_id).cloned()
    }

    /// Ingest one book snapshot: rolling CUSUMs, current-state store, mid
    /// history for the impact proxy.
    pub fn handle_book(&self, snapshot: BookSnapshot) {
        let metrics = snapshot.metrics();
        let token_id = snapshot.token_id.clone();
        self.hydrate_token(&token_id, snapshot.time_ms);
        self.features
            .observe_mid(&token_id, snapshot.time_ms, snapshot.mid);
        if let Some(cache) = &self.cache {
            let key = scoped_key(cache_keys::ORDERBOOK_STATE, &token_id);
            if let Err(e) = cache.put_json(&key, &snapshot, snapshot.time_ms / 1000) {
                debug!(token_id, error = %e, "book cache write skipped");
            }
        }
        self.rolling.record_orderbook(&token_id, snapshot, metrics);
    }

    /// Ingest one trade end-to-end and return the score, if the event was
    /// valid. All collaborator I/O happens before the CPU-only feature and
    /// scoring path.
    pub async fn handle_trade(&self, trade: Trade) -> Option<Score> {
        if let Err(e) = trade.validate() {
            warn!(trade_id = trade.trade_id, error = %e, "trade rejected at boundary");
            return None;
        }

        let token_id = trade.token_id.clone();
        let now_ms = trade.timestamp_ms;
        self.hydrate_token(&token_id, now_ms);
        self.rolling.record_trade(&token_id, &trade);

        // Suspension point: wallet enrichment (cache-first).
        let wallet = match self.enricher.enrich(&trade.taker_address, now_ms).await {
            Ok(w) => Some(w),
            Err(e) => {
                debug!(error = %e, "wallet enrichment unavailable");
                None
            }
        };

        let meta = self.meta_for(&token_id);
        let condition_id = meta
            .as_ref()
            .map(|m| m.condition_id.clone())
            .unwrap_or_default();
        // A stale book is treated as absent; the features fall back to
        // their neutral defaults.
        let book = self
            .rolling
            .current_book(&token_id)
            .filter(|(snap, _)| now_ms - snap.time_ms <= self.book_staleness_ms);

        let features = self.features.compute_features(
            &token_id,
            &condition_id,
            now_ms,
            Some(&trade),
            book.as_ref().map(|(_, m)| m),
            meta.as_ref(),
            wallet.as_ref(),
        );

        let score = self.scoring.compute_scores(&features, self.target_size_usd, |addr| {
            self.enricher.cached_age_days(addr, now_ms)
        });

        if let Some(cache) = &self.cache {
            let fkey = scoped_key(cache_keys::FEATURE_CACHE, &token_id);
            let skey = scoped_key(cache_keys::SCORE_CACHE, &token_id);
            let now_secs = now_ms / 1000;
            if let Err(e) = cache
                .put_json(&fkey, &features, now_secs)
                .and_then(|_| cache.put_json(&skey, &score, now_secs))
            {
                debug!(token_id, error = %e, "score cache write skipped");
            }
            // Best-effort rolling-state persistence for restarts,
            // last-writer-wins per token. Read back by hydrate_token.
            if let Some(persisted) = self.rolling.export_state(&token_id) {
                let hkey = scoped_key(cache_keys::HAWKES_STATE, &token_id);
                let ckey = scoped_key(cache_keys::CPD_STATE, &token_id);
                let wkey = scoped_key(cache_keys::TRADE_WINDOW, &token_id);
                let _ = cache.put_json(&hkey, &persisted.hawkes, now_secs);
                let _ = cache.put_json(&ckey, &persisted.cusums, now_secs);
                let _ = cache.put_json(&wkey, &persisted.window, now_secs);
            }
        }

        if score.should_emit_job(features.time.in_no_trade_zone) {
            let job = StrategyJob {
                token_id: token_id.clone(),
                condition_id,
                score: score.clone(),
            };
            if let Err(e) = self.job_tx.try_send(job) {
                warn!(token_id, error = %e, "strategy queue full; job dropped");
            }
        }

        Some(score)
    }
}
