//! Backfill: join resolved markets with their late-window trades and emit
//! contrarian events.
//!
//! Idempotent on the event natural key, so re-running a window inserts
//! nothing new. Job rows are the source of truth for progress; a pagination
//! failure ends the current fetch loop without corrupting the job status.

use crate::clients::MarketApiClient;
use crate::models::Outcome;
use crate::research::events::{ContrarianEvent, HistoricalTrade, ResolvedMarket};
use crate::storage::Warehouse;
use crate::wallet::WalletEnricher;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Job lifecycle: pending -> running -> {completed, failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            _ => JobStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Warehouse row for one backfill run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillJob {
    pub id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub items_processed: i64,
    pub items_total: i64,
    pub error_message: Option<String>,
    pub config_json: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Lookback over resolved markets.
    pub days: i64,
    /// Pre-close trade window generating events.
    pub window_minutes: i64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            days: 30,
            window_minutes: 120,
        }
    }
}

/// Trend/OFI horizon.
const TREND_WINDOW_MS: i64 = 30 * 60_000;
/// Spread-proxy horizon.
const SPREAD_WINDOW_MS: i64 = 5 * 60_000;
const NEW_WALLET_AGE_DAYS: f64 = 7.0;

/// Derive contrarian events for one resolved market from its trade tape.
///
/// Size statistics come from the market's own pre-close distribution; trend,
/// OFI, spread and drift are computed per token from neighboring prints.
/// Book asymmetry is an order-flow proxy here: historical depth snapshots
/// are not retained, so `book_imbalance` carries the signed 30-minute OFI.
/// Wallet fields are left empty for the engine's enrichment pass.
pub fn build_events(
    market: &ResolvedMarket,
    trades: &[HistoricalTrade],
    window_minutes: i64,
) -> Vec<ContrarianEvent> {
    let Some(end_ms) = market.end_date_ms else {
        return Vec::new();
    };
    let Some(winner) = market.winning_outcome else {
        return Vec::new();
    };

    let pre_close: Vec<&HistoricalTrade> =
        trades.iter().filter(|t| t.timestamp_ms < end_ms).collect();
    if pre_close.is_empty() {
        return Vec::new();
    }

    // Market-wide pre-close size distribution.
    let mut notionals: Vec<f64> = pre_close.iter().map(|t| t.notional()).collect();
    notionals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let size_mean = notionals.iter().sum::<f64>() / notionals.len() as f64;
    let size_std = {
        let var = notionals
            .iter()
            .map(|x| (x - size_mean).powi(2))
            .sum::<f64>()
            / notionals.len() as f64;
        var.sqrt()
    };
    let percentile_of = |x: f64| -> f64 {
        let below = notionals.partition_point(|&v| v < x);
        below as f64 / notionals.len() as f64 * 100.0
    };

    let window_start = end_ms - window_minutes * 60_000;

    let mut events = Vec::new();
    for trade in pre_close.iter().filter(|t| t.timestamp_ms >= window_start) {
        let t_ms = trade.timestamp_ms;
        let same_token: Vec<&&HistoricalTrade> = pre_close
            .iter()
            .filter(|t| t.token_id == trade.token_id)
            .collect();

        // Price trend: last print now vs last print 30 minutes ago.
        let price_at = |at_ms: i64| -> Option<f64> {
            same_token
                .iter()
                .filter(|t| t.timestamp_ms <= at_ms)
                .max_by_key(|t| t.timestamp_ms)
                .map(|t| t.price)
        };
        let price_trend_30m = match (price_at(t_ms), price_at(t_ms - TREND_WINDOW_MS)) {
            (Some(now), Some(then)) => now - then,
            _ => 0.0,
        };

        // Signed order-flow imbalance over the prior 30 minutes.
        let flow: Vec<f64> = same_token
            .iter()
            .filter(|t| t.timestamp_ms > t_ms - TREND_WINDOW_MS && t.timestamp_ms <= t_ms)
            .map(|t| match t.side {
                crate::models::Side::Buy => t.notional(),
                crate::models::Side::Sell => -t.notional(),
            })
            .collect();
        let gross: f64 = flow.iter().map(|f| f.abs()).sum();
        let ofi_30m = if gross > 0.0 {
            flow.iter().sum::<f64>() / gross
        } else {
            0.0
        };

        // Spread proxy from recent print dispersion.
        let recent_prices: Vec<f64> = same_token
            .iter()
            .filter(|t| t.timestamp_ms > t_ms - SPREAD_WINDOW_MS && t.timestamp_ms <= t_ms)
            .map(|t| t.price)
            .collect();
        let spread_bps = if recent_prices.len() >= 2 && trade.price > 0.0 {
            let hi = recent_prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let lo = recent_prices.iter().cloned().fold(f64::INFINITY, f64::min);
            (hi - lo) / trade.price * 10_000.0
        } else {
            0.0
        };

        let is_buy = trade.side == crate::models::Side::Buy;
        let is_against_trend =
            (price_trend_30m > 0.0 && !is_buy) || (price_trend_30m < 0.0 && is_buy);
        let is_against_ofi = (ofi_30m > 0.0 && !is_buy) || (ofi_30m < 0.0 && is_buy);

        let thin_opposite_ratio = 1.0 - ofi_30m.abs();
        let is_asymmetric_book = ofi_30m.abs() > 0.5 && thin_opposite_ratio < 0.3;

        let notional = trade.notional();
        let size_percentile = percentile_of(notional);
        let size_z_score = if size_std > 0.0 {
            (notional - size_mean) / size_std
        } else {
            0.0
        };

        // Post-signal drift from later prints on the same token.
        let drift_after = |horizon_ms: i64| -> Option<f64> {
            same_token
                .iter()
                .filter(|t| t.timestamp_ms > t_ms && t.timestamp_ms <= t_ms + horizon_ms)
                .max_by_key(|t| t.timestamp_ms)
                .map(|t| t.price - trade.price)
        };

        let traded_outcome = trade
            .outcome
            .as_deref()
            .and_then(Outcome::parse)
            .unwrap_or(Outcome::Yes);

        events.push(ContrarianEvent {
            id: None,
            condition_id: market.condition_id.clone(),
            token_id: trade.token_id.clone(),
            trade_timestamp: t_ms,
            minutes_before_close: (end_ms - t_ms) as f64 / 60_000.0,
            trade_side: trade.side,
            trade_price: trade.price,
            trade_size: trade.size,
            trade_notional: notional,
            taker_address: trade.taker_address.clone(),
            size_percentile,
            size_z_score,
            is_tail_trade: size_percentile > 95.0,
            is_price_contrarian: trade.price < 0.50,
            price_trend_30m,
            is_against_trend,
            ofi_30m,
            is_against_ofi,
            is_contrarian: is_against_trend && is_against_ofi,
            book_imbalance: ofi_30m,
            thin_opposite_ratio,
            spread_bps,
            is_asymmetric_book,
            wallet_age_days: None,
            wallet_trade_count: None,
            is_new_wallet: false,
            traded_outcome,
            outcome_won: traded_outcome == winner,
            drift_30m: drift_after(TREND_WINDOW_MS),
            drift_60m: drift_after(2 * TREND_WINDOW_MS),
        });
    }
    events
}

pub struct BackfillEngine {
    warehouse: Warehouse,
    client: Option<MarketApiClient>,
    enricher: Option<Arc<WalletEnricher>>,
}

impl BackfillEngine {
    pub fn new(
        warehouse: Warehouse,
        client: Option<MarketApiClient>,
        enricher: Option<Arc<WalletEnricher>>,
    ) -> Self {
        Self {
            warehouse,
            client,
            enricher,
        }
    }

    /// Full backfill run. Creates a job row, syncs markets and trades,
    /// derives and stores events, and closes the job out. Errors flip the
    /// job to failed with the message recorded.
    pub async fn run(&self, cfg: BackfillConfig, now_ms: i64) -> Result<BackfillJob> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let mut job = BackfillJob {
            id: job_id.clone(),
            job_type: "contrarian_events".to_string(),
            status: JobStatus::Running,
            started_at: Some(now_ms),
            completed_at: None,
            items_processed: 0,
            items_total: 0,
            error_message: None,
            config_json: serde_json::to_string(&cfg)?,
        };
        self.warehouse
            .create_backfill_job(&job)
            .context("register backfill job")?;

        match self.run_inner(&mut job, cfg, now_ms).await {
            Ok(()) => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(now_ms);
                self.warehouse
                    .finish_backfill_job(&job.id, JobStatus::Completed, now_ms, None)?;
                info!(
                    job_id,
                    markets = job.items_processed,
                    "backfill completed"
                );
            }
            Err(e) => {
                let message = format!("{:#}", e);
                job.status = JobStatus::Failed;
                job.completed_at = Some(now_ms);
                job.error_message = Some(message.clone());
                self.warehouse.finish_backfill_job(
                    &job.id,
                    JobStatus::Failed,
                    now_ms,
                    Some(&message),
                )?;
                warn!(job_id, error = %message, "backfill failed");
            }
        }
        Ok(job)
    }

    async fn run_inner(
        &self,
        job: &mut BackfillJob,
        cfg: BackfillConfig,
        now_ms: i64,
    ) -> Result<()> {
        if let Some(client) = &self.client {
            self.sync_resolved_markets(client).await?;
        }

        let cutoff = now_ms - cfg.days * 86_400_000;
        let markets = self.warehouse.resolved_markets_since(cutoff)?;
        job.items_total = markets.len() as i64;
        self.warehouse
            .update_backfill_progress(&job.id, 0, job.items_total)?;

        for market in &markets {
            if let Some(client) = &self.client {
                self.sync_trades_for(client, market).await;
            }
            let trades = self.warehouse.historical_trades_for(&market.condition_id)?;
            let mut events = build_events(market, &trades, cfg.window_minutes);
            self.enrich_wallets(&mut events, now_ms).await;
            let inserted = self.warehouse.insert_contrarian_events(&events)?;
            debug!(
                condition_id = market.condition_id,
                derived = events.len(),
                inserted,
                "market backfilled"
            );

            job.items_processed += 1;
            self.warehouse.update_backfill_progress(
                &job.id,
                job.items_processed,
                job.items_total,
            )?;
        }
        Ok(())
    }

    /// Page closed markets from upstream; keep what resolves cleanly. A bad
    /// page ends the loop with what we have.
    async fn sync_resolved_markets(&self, client: &MarketApiClient) -> Result<()> {
        let mut offset = 0usize;
        let page_size = 100usize;
        loop {
            let page = match client.fetch_markets_page(page_size, offset, true).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(offset, error = %e, "market page fetch failed; stopping pagination");
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            for raw in &page {
                if let Some(resolved) = raw.to_resolved() {
                    self.warehouse.upsert_resolved_market(&resolved)?;
                }
            }
            if page.len() < page_size {
                break;
            }
            offset += page_size;
        }
        Ok(())
    }

    async fn sync_trades_for(&self, client: &MarketApiClient, market: &ResolvedMarket) {
        let mut offset = 0usize;
        let page_size = 250usize;
        loop {
            let page = match client
                .fetch_trades_page(&market.condition_id, page_size, offset)
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    warn!(
                        condition_id = market.condition_id,
                        offset,
                        error = %e,
                        "trade page fetch failed; stopping pagination"
                    );
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            let batch: Vec<HistoricalTrade> = page
                .iter()
                .filter_map(|raw| raw.to_historical(&market.condition_id))
                .collect();
            if let Err(e) = self.warehouse.insert_historical_trades(&batch) {
                warn!(condition_id = market.condition_id, error = %e, "trade insert failed");
                break;
            }
            if page.len() < page_size {
                break;
            }
            offset += page_size;
        }
    }

    /// Attach wallet age and activity to events. Degraded enrichment leaves
    /// the wallet fields empty rather than failing the backfill.
    async fn enrich_wallets(&self, events: &mut [ContrarianEvent], now_ms: i64) {
        let Some(enricher) = &self.enricher else {
            return;
        };
        for event in events.iter_mut() {
            match enricher.enrich(&event.taker_address, now_ms).await {
                Ok(info) => {
                    // Age as of the trade, not as of now.
                    event.wallet_age_days = info
                        .first_seen_ts
                        .map(|ts| ((event.trade_timestamp - ts).max(0)) as f64 / 86_400_000.0);
                    event.wallet_trade_count = info.tx_count.map(|c| c as i64);
                    event.is_new_wallet = event
                        .wallet_age_days
                        .map(|age| age < NEW_WALLET_AGE_DAYS)
                        .unwrap_or(false);
                }
                Err(e) => {
                    debug!(address = event.taker_address, error = %e, "wallet enrich skipped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;

    fn market(end_ms: i64) -> ResolvedMarket {
        ResolvedMarket {
            condition_id: "cond".into(),
            question: "q".into(),
            end_date_iso: None,
            end_date_ms: Some(end_ms),
            category: Some("politics".into()),
            winning_outcome: Some(Outcome::Yes),
            final_yes_price: 1.0,
            final_no_price: 0.0,
        }
    }

    fn trade(id: &str, ts: i64, side: Side, price: f64, size: f64) -> HistoricalTrade {
        HistoricalTrade {
            condition_id: "cond".into(),
            token_id: "tok-yes".into(),
            trade_id: id.into(),
            timestamp_ms: ts,
            taker_address: "0x1234567890abcdef1234567890abcdef12345678".into(),
            maker_address: None,
            side,
            price,
            size,
            outcome: Some("Yes".into()),
            tx_hash: None,
        }
    }

    #[test]
    fn events_only_from_the_window() {
        let end = 10 * 3_600_000i64;
        let trades = vec![
            trade("early", end - 5 * 3_600_000, Side::Buy, 0.4, 100.0),
            trade("late", end - 30 * 60_000, Side::Buy, 0.4, 100.0),
        ];
        let events = build_events(&market(end), &trades, 120);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trade_timestamp, end - 30 * 60_000);
        assert!((events[0].minutes_before_close - 30.0).abs() < 1e-9);
    }

    #[test]
    fn contrarian_flags_from_tape() {
        let end = 10 * 3_600_000i64;
        let t0 = end - 60 * 60_000;
        // Rising prices with buy pressure, then one large sell: against
        // trend and against OFI.
        let mut trades: Vec<HistoricalTrade> = (0..20)
            .map(|i| {
                trade(
                    &format!("b{}", i),
                    t0 + i * 60_000,
                    Side::Buy,
                    0.40 + i as f64 * 0.005,
                    50.0,
                )
            })
            .collect();
        trades.push(trade("sell", t0 + 21 * 60_000, Side::Sell, 0.50, 5_000.0));

        let events = build_events(&market(end), &trades, 120);
        let sell_event = events
            .iter()
            .find(|e| e.trade_timestamp == t0 + 21 * 60_000)
            .unwrap();
        assert!(sell_event.price_trend_30m > 0.0);
        assert!(sell_event.is_against_trend);
        assert!(sell_event.ofi_30m > 0.0);
        assert!(sell_event.is_against_ofi);
        assert!(sell_event.is_contrarian);
        assert!(sell_event.is_tail_trade);
        assert!(sell_event.size_z_score > 2.0);
        assert!(sell_event.outcome_won);
    }

    #[test]
    fn price_contrarian_is_sub_fifty() {
        let end = 3_600_000i64;
        let trades = vec![
            trade("a", end - 10 * 60_000, Side::Buy, 0.30, 100.0),
            trade("b", end - 9 * 60_000, Side::Buy, 0.70, 100.0),
        ];
        let events = build_events(&market(end), &trades, 120);
        assert!(events.iter().any(|e| e.is_price_contrarian));
        assert!(events.iter().any(|e| !e.is_price_contrarian));
    }

    #[test]
    fn drift_looks_forward_on_the_same_token() {
        let end = 4 * 3_600_000i64;
        let t0 = end - 100 * 60_000;
        let trades = vec![
            trade("sig", t0, Side::Buy, 0.40, 100.0),
            trade("later", t0 + 20 * 60_000, Side::Buy, 0.46, 100.0),
            trade("after", t0 + 50 * 60_000, Side::Buy, 0.52, 100.0),
        ];
        let events = build_events(&market(end), &trades, 120);
        let sig = events.iter().find(|e| e.trade_timestamp == t0).unwrap();
        assert!((sig.drift_30m.unwrap() - 0.06).abs() < 1e-9);
        assert!((sig.drift_60m.unwrap() - 0.12).abs() < 1e-9);
    }

    #[test]
    fn unresolved_or_endless_markets_yield_nothing() {
        let trades = vec![trade("a", 1_000, Side::Buy, 0.4, 100.0)];
        let mut m = market(3_600_000);
        m.winning_outcome = None;
        assert!(build_events(&m, &trades, 120).is_empty());

        let mut m = market(3_600_000);
        m.end_date_ms = None;
        assert!(build_events(&m, &trades, 120).is_empty());
    }

    #[tokio::test]
    async fn engine_is_idempotent_over_reruns() {
        let warehouse = Warehouse::in_memory().unwrap();
        let end = 10 * 3_600_000i64;
        warehouse.upsert_resolved_market(&market(end)).unwrap();
        let trades: Vec<HistoricalTrade> = (0..10)
            .map(|i| trade(&format!("t{}", i), end - (i + 1) * 60_000, Side::Buy, 0.4, 100.0))
            .collect();
        warehouse.insert_historical_trades(&trades).unwrap();

        let engine = BackfillEngine::new(warehouse.clone(), None, None);
        let now = end + 86_400_000;
        let job1 = engine.run(BackfillConfig::default(), now).await.unwrap();
        assert_eq!(job1.status, JobStatus::Completed);
        let count_after_first = warehouse.event_count().unwrap();
        assert!(count_after_first > 0);

        let job2 = engine.run(BackfillConfig::default(), now).await.unwrap();
        assert_eq!(job2.status, JobStatus::Completed);
        assert_eq!(warehouse.event_count().unwrap(), count_after_first);
    }

    #[tokio::test]
    async fn job_rows_track_progress() {
        let warehouse = Warehouse::in_memory().unwrap();
        let engine = BackfillEngine::new(warehouse.clone(), None, None);
        let job = engine
            .run(BackfillConfig::default(), 1_700_000_000_000)
            .await
            .unwrap();
        let latest = warehouse.latest_backfill_job().unwrap().unwrap();
        assert_eq!(latest.id, job.id);
        assert_eq!(latest.status, JobStatus::Completed);
        assert!(latest.status.is_terminal());
    }
}
