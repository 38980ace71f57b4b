//! Research warehouse on SQLite.
//!
//! WAL mode for concurrent reads during writes, covering indexes for the hot
//! query paths, batch upserts inside transactions. Callers share one
//! connection behind a parking_lot mutex; statement preparation is cheap
//! enough at research volumes.

use crate::models::{Outcome, Side};
use crate::monitor::strategy::{DriftAlert, MonitoredStrategy};
use crate::research::backfill::{BackfillJob, JobStatus};
use crate::research::events::{
    AnalysisConfig, ContrarianEvent, EventRow, HistoricalTrade, ResolvedMarket,
};
use crate::research::optimize::{OptimizationJob, OptimizationResult};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::sync::Arc;
use tracing::{info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS resolved_markets (
    condition_id TEXT PRIMARY KEY,
    question TEXT NOT NULL,
    end_date TEXT,
    end_date_ms INTEGER,
    category TEXT,
    event_slug TEXT,
    market_slug TEXT,
    winning_outcome TEXT,
    final_yes_price REAL,
    final_no_price REAL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_resolved_markets_end
    ON resolved_markets(end_date_ms DESC);

CREATE TABLE IF NOT EXISTS historical_trades (
    condition_id TEXT NOT NULL,
    token_id TEXT NOT NULL,
    trade_id TEXT NOT NULL,
    trade_timestamp INTEGER NOT NULL,
    taker_address TEXT NOT NULL,
    maker_address TEXT,
    side TEXT NOT NULL,
    price REAL NOT NULL,
    size REAL NOT NULL,
    notional REAL NOT NULL,
    outcome TEXT,
    transaction_hash TEXT,
    UNIQUE(condition_id, trade_id)
);

CREATE INDEX IF NOT EXISTS idx_historical_trades_token_ts
    ON historical_trades(condition_id, token_id, trade_timestamp);

CREATE TABLE IF NOT EXISTS contrarian_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    condition_id TEXT NOT NULL,
    token_id TEXT NOT NULL,
    trade_timestamp INTEGER NOT NULL,
    minutes_before_close REAL NOT NULL,
    trade_side TEXT NOT NULL,
    trade_price REAL NOT NULL,
    trade_size REAL NOT NULL,
    trade_notional REAL NOT NULL,
    taker_address TEXT NOT NULL,
    size_percentile REAL NOT NULL,
    size_z_score REAL NOT NULL,
    is_tail_trade INTEGER NOT NULL,
    is_price_contrarian INTEGER NOT NULL,
    price_trend_30m REAL NOT NULL,
    is_against_trend INTEGER NOT NULL,
    ofi_30m REAL NOT NULL,
    is_against_ofi INTEGER NOT NULL,
    is_contrarian INTEGER NOT NULL,
    book_imbalance REAL NOT NULL,
    thin_opposite_ratio REAL NOT NULL,
    spread_bps REAL NOT NULL,
    is_asymmetric_book INTEGER NOT NULL,
    wallet_age_days REAL,
    wallet_trade_count INTEGER,
    is_new_wallet INTEGER NOT NULL,
    traded_outcome TEXT NOT NULL,
    outcome_won INTEGER NOT NULL,
    drift_30m REAL,
    drift_60m REAL,
    UNIQUE(condition_id, token_id, trade_timestamp)
);

CREATE INDEX IF NOT EXISTS idx_contrarian_events_ts
    ON contrarian_events(trade_timestamp DESC);

CREATE INDEX IF NOT EXISTS idx_contrarian_events_notional
    ON contrarian_events(trade_notional DESC, trade_timestamp DESC);

CREATE TABLE IF NOT EXISTS backfill_jobs (
    id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at INTEGER,
    completed_at INTEGER,
    items_processed INTEGER NOT NULL DEFAULT 0,
    items_total INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    config TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS optimization_jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    config TEXT NOT NULL,
    total_configs INTEGER NOT NULL DEFAULT 0,
    processed_configs INTEGER NOT NULL DEFAULT 0,
    valid_configs INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER,
    completed_at INTEGER,
    execution_time_ms INTEGER,
    error_message TEXT
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS optimization_results (
    job_id TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    config TEXT NOT NULL,
    sample_size INTEGER NOT NULL,
    win_rate REAL NOT NULL,
    total_pnl REAL NOT NULL,
    roi REAL NOT NULL,
    profit_factor REAL NOT NULL,
    edge_points REAL NOT NULL,
    sharpe_ratio REAL NOT NULL,
    kelly_fraction REAL NOT NULL,
    information_ratio REAL NOT NULL,
    avg_price REAL NOT NULL,
    p_value REAL NOT NULL,
    adjusted_p_value REAL NOT NULL,
    ci_lower REAL NOT NULL,
    ci_upper REAL NOT NULL,
    is_significant INTEGER NOT NULL,
    is_pareto_optimal INTEGER NOT NULL,
    rank_roi INTEGER,
    rank_win_rate INTEGER,
    rank_sharpe INTEGER,
    rank_profit_factor INTEGER,
    rank_edge_points INTEGER,
    rank_information_ratio INTEGER,
    PRIMARY KEY(job_id, config_hash)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS monitored_strategies (
    strategy_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    config TEXT NOT NULL,
    baseline_win_rate REAL NOT NULL,
    baseline_roi REAL NOT NULL,
    baseline_edge_points REAL NOT NULL,
    baseline_kelly REAL NOT NULL,
    baseline_sample_size INTEGER NOT NULL,
    baseline_date INTEGER NOT NULL,
    current_win_rate REAL,
    current_roi REAL,
    current_edge_points REAL,
    current_kelly REAL,
    current_sample_size INTEGER,
    recommended_kelly REAL,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_healthy INTEGER NOT NULL DEFAULT 1,
    last_check_at INTEGER,
    check_interval_minutes INTEGER NOT NULL DEFAULT 60
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS drift_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy_id TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    metric TEXT NOT NULL,
    expected_value REAL NOT NULL,
    observed_value REAL NOT NULL,
    deviation_sigma REAL NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    recommendation TEXT,
    acknowledged INTEGER NOT NULL DEFAULT 0,
    acknowledged_at INTEGER,
    acknowledged_by TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_drift_alerts_created
    ON drift_alerts(created_at DESC);

CREATE INDEX IF NOT EXISTS idx_drift_alerts_strategy
    ON drift_alerts(strategy_id, created_at DESC);

CREATE TABLE IF NOT EXISTS kv_cache (
    cache_key TEXT PRIMARY KEY,
    cache_json TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_kv_cache_fetched
    ON kv_cache(fetched_at DESC);
"#;

/// Shared warehouse handle.
#[derive(Clone)]
pub struct Warehouse {
    conn: Arc<Mutex<Connection>>,
}

impl Warehouse {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("open database at {}", db_path))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("initialize warehouse schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let events: i64 = conn
            .query_row("SELECT COUNT(*) FROM contrarian_events", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);
        info!(db_path, events, "warehouse ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, test use.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("initialize warehouse schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn raw(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    // ------------------------------------------------------------------
    // Resolved markets
    // ------------------------------------------------------------------

    pub fn upsert_resolved_market(&self, m: &ResolvedMarket) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO resolved_markets
                (condition_id, question, end_date, end_date_ms, category,
                 event_slug, market_slug, winning_outcome, final_yes_price, final_no_price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(condition_id) DO UPDATE SET
                question = excluded.question,
                end_date = excluded.end_date,
                end_date_ms = excluded.end_date_ms,
                category = excluded.category,
                event_slug = excluded.event_slug,
                market_slug = excluded.market_slug,
                winning_outcome = excluded.winning_outcome,
                final_yes_price = excluded.final_yes_price,
                final_no_price = excluded.final_no_price",
            params![
                m.condition_id,
                m.question,
                m.end_date_iso,
                m.end_date_ms,
                m.category,
                None::<String>,
                None::<String>,
                m.winning_outcome.map(|o| o.as_str()),
                m.final_yes_price,
                m.final_no_price,
            ],
        )
        .context("upsert resolved market")?;
        Ok(())
    }

    pub fn resolved_markets_since(&self, cutoff_ms: i64) -> Result<Vec<ResolvedMarket>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT condition_id, question, end_date, end_date_ms, category,
                    winning_outcome, final_yes_price, final_no_price
             FROM resolved_markets
             WHERE end_date_ms IS NOT NULL AND end_date_ms >= ?1
             ORDER BY end_date_ms DESC",
        )?;
        let rows = stmt
            .query_map(params![cutoff_ms], |row| {
                Ok(ResolvedMarket {
                    condition_id: row.get(0)?,
                    question: row.get(1)?,
                    end_date_iso: row.get(2)?,
                    end_date_ms: row.get(3)?,
                    category: row.get(4)?,
                    winning_outcome: row
                        .get::<_, Option<String>>(5)?
                        .as_deref()
                        .and_then(Outcome::parse),
                    final_yes_price: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                    final_no_price: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Historical trades
    // ------------------------------------------------------------------

    pub fn insert_historical_trades(&self, trades: &[HistoricalTrade]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO historical_trades
                    (condition_id, token_id, trade_id, trade_timestamp, taker_address,
                     maker_address, side, price, size, notional, outcome, transaction_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for t in trades {
                inserted += stmt.execute(params![
                    t.condition_id,
                    t.token_id,
                    t.trade_id,
                    t.timestamp_ms,
                    t.taker_address,
                    t.maker_address,
                    t.side.as_str(),
                    t.price,
                    t.size,
                    t.notional(),
                    t.outcome,
                    t.tx_hash,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn historical_trades_for(&self, condition_id: &str) -> Result<Vec<HistoricalTrade>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT condition_id, token_id, trade_id, trade_timestamp, taker_address,
                    maker_address, side, price, size, outcome, transaction_hash
             FROM historical_trades
             WHERE condition_id = ?1
             ORDER BY trade_timestamp ASC",
        )?;
        let rows = stmt
            .query_map(params![condition_id], |row| {
                Ok(HistoricalTrade {
                    condition_id: row.get(0)?,
                    token_id: row.get(1)?,
                    trade_id: row.get(2)?,
                    timestamp_ms: row.get(3)?,
                    taker_address: row.get(4)?,
                    maker_address: row.get(5)?,
                    side: Side::parse(&row.get::<_, String>(6)?).unwrap_or(Side::Buy),
                    price: row.get(7)?,
                    size: row.get(8)?,
                    outcome: row.get(9)?,
                    tx_hash: row.get(10)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Contrarian events
    // ------------------------------------------------------------------

    /// Idempotent on the natural key: re-backfilling the same window inserts
    /// zero new rows. Returns the number actually inserted.
    pub fn insert_contrarian_events(&self, events: &[ContrarianEvent]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO contrarian_events
                    (condition_id, token_id, trade_timestamp, minutes_before_close,
                     trade_side, trade_price, trade_size, trade_notional, taker_address,
                     size_percentile, size_z_score, is_tail_trade, is_price_contrarian,
                     price_trend_30m, is_against_trend, ofi_30m, is_against_ofi,
                     is_contrarian, book_imbalance, thin_opposite_ratio, spread_bps,
                     is_asymmetric_book, wallet_age_days, wallet_trade_count,
                     is_new_wallet, traded_outcome, outcome_won, drift_30m, drift_60m)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                         ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
                         ?27, ?28, ?29)",
            )?;
            for e in events {
                inserted += stmt.execute(params![
                    e.condition_id,
                    e.token_id,
                    e.trade_timestamp,
                    e.minutes_before_close,
                    e.trade_side.as_str(),
                    e.trade_price,
                    e.trade_size,
                    e.trade_notional,
                    e.taker_address,
                    e.size_percentile,
                    e.size_z_score,
                    e.is_tail_trade as i64,
                    e.is_price_contrarian as i64,
                    e.price_trend_30m,
                    e.is_against_trend as i64,
                    e.ofi_30m,
                    e.is_against_ofi as i64,
                    e.is_contrarian as i64,
                    e.book_imbalance,
                    e.thin_opposite_ratio,
                    e.spread_bps,
                    e.is_asymmetric_book as i64,
                    e.wallet_age_days,
                    e.wallet_trade_count,
                    e.is_new_wallet as i64,
                    e.traded_outcome.as_str(),
                    e.outcome_won as i64,
                    e.drift_30m,
                    e.drift_60m,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn event_count(&self) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM contrarian_events", [], |row| {
            row.get(0)
        })?)
    }

    /// Events inside the lookback, joined with their market rows; the
    /// in-memory `AnalysisConfig::matches` pass applies the rest.
    pub fn query_events(&self, cfg: &AnalysisConfig, now_ms: i64) -> Result<Vec<EventRow>> {
        let cutoff = now_ms - cfg.lookback_days * 86_400_000;
        let rows = self.select_event_rows(
            "WHERE e.trade_timestamp >= ?1 AND e.trade_notional >= ?2
             ORDER BY e.trade_timestamp ASC",
            params![cutoff, cfg.min_size_usd],
        )?;
        Ok(rows.into_iter().filter(|r| cfg.matches(r)).collect())
    }

    /// Recent events page for the API, newest first.
    pub fn recent_events(&self, limit: usize, offset: usize) -> Result<(Vec<EventRow>, i64)> {
        let total = self.event_count()?;
        let rows = self.select_event_rows(
            "ORDER BY e.trade_timestamp DESC LIMIT ?1 OFFSET ?2",
            params![limit as i64, offset as i64],
        )?;
        Ok((rows, total))
    }

    fn select_event_rows(
        &self,
        tail: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<EventRow>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT e.id, e.condition_id, e.token_id, e.trade_timestamp,
                    e.minutes_before_close, e.trade_side, e.trade_price, e.trade_size,
                    e.trade_notional, e.taker_address, e.size_percentile, e.size_z_score,
                    e.is_tail_trade, e.is_price_contrarian, e.price_trend_30m,
                    e.is_against_trend, e.ofi_30m, e.is_against_ofi, e.is_contrarian,
                    e.book_imbalance, e.thin_opposite_ratio, e.spread_bps,
                    e.is_asymmetric_book, e.wallet_age_days, e.wallet_trade_count,
                    e.is_new_wallet, e.traded_outcome, e.outcome_won, e.drift_30m,
                    e.drift_60m, m.category, m.question, m.event_slug, m.market_slug
             FROM contrarian_events e
             LEFT JOIN resolved_markets m ON m.condition_id = e.condition_id
             {}",
            tail
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(EventRow {
                    event: ContrarianEvent {
                        id: row.get(0)?,
                        condition_id: row.get(1)?,
                        token_id: row.get(2)?,
                        trade_timestamp: row.get(3)?,
                        minutes_before_close: row.get(4)?,
                        trade_side: Side::parse(&row.get::<_, String>(5)?)
                            .unwrap_or(Side::Buy),
                        trade_price: row.get(6)?,
                        trade_size: row.get(7)?,
                        trade_notional: row.get(8)?,
                        taker_address: row.get(9)?,
                        size_percentile: row.get(10)?,
                        size_z_score: row.get(11)?,
                        is_tail_trade: row.get::<_, i64>(12)? != 0,
                        is_price_contrarian: row.get::<_, i64>(13)? != 0,
                        price_trend_30m: row.get(14)?,
                        is_against_trend: row.get::<_, i64>(15)? != 0,
                        ofi_30m: row.get(16)?,
                        is_against_ofi: row.get::<_, i64>(17)? != 0,
                        is_contrarian: row.get::<_, i64>(18)? != 0,
                        book_imbalance: row.get(19)?,
                        thin_opposite_ratio: row.get(20)?,
                        spread_bps: row.get(21)?,
                        is_asymmetric_book: row.get::<_, i64>(22)? != 0,
                        wallet_age_days: row.get(23)?,
                        wallet_trade_count: row.get(24)?,
                        is_new_wallet: row.get::<_, i64>(25)? != 0,
                        traded_outcome: Outcome::parse(&row.get::<_, String>(26)?)
                            .unwrap_or(Outcome::Yes),
                        outcome_won: row.get::<_, i64>(27)? != 0,
                        drift_30m: row.get(28)?,
                        drift_60m: row.get(29)?,
                    },
                    category: row.get(30)?,
                    question: row.get(31)?,
                    event_slug: row.get(32)?,
                    market_slug: row.get(33)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Backfill jobs
    // ------------------------------------------------------------------

    /// CAS-like creation: insert and return the id. Caller policy prevents
    /// duplicate concurrent full backfills.
    pub fn create_backfill_job(&self, job: &BackfillJob) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO backfill_jobs
                (id, job_type, status, started_at, completed_at,
                 items_processed, items_total, error_message, config)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job.id,
                job.job_type,
                job.status.as_str(),
                job.started_at,
                job.completed_at,
                job.items_processed,
                job.items_total,
                job.error_message,
                job.config_json,
            ],
        )
        .context("create backfill job")?;
        Ok(())
    }

    pub fn update_backfill_progress(
        &self,
        job_id: &str,
        processed: i64,
        total: i64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE backfill_jobs SET items_processed = ?2, items_total = ?3 WHERE id = ?1",
            params![job_id, processed, total],
        )?;
        Ok(())
    }

    pub fn finish_backfill_job(
        &self,
        job_id: &str,
        status: JobStatus,
        completed_at: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE backfill_jobs
             SET status = ?2, completed_at = ?3, error_message = ?4
             WHERE id = ?1",
            params![job_id, status.as_str(), completed_at, error_message],
        )?;
        Ok(())
    }

    pub fn latest_backfill_job(&self) -> Result<Option<BackfillJob>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, job_type, status, started_at, completed_at,
                    items_processed, items_total, error_message, config
             FROM backfill_jobs
             ORDER BY started_at DESC LIMIT 1",
            [],
            |row| {
                Ok(BackfillJob {
                    id: row.get(0)?,
                    job_type: row.get(1)?,
                    status: JobStatus::parse(&row.get::<_, String>(2)?),
                    started_at: row.get(3)?,
                    completed_at: row.get(4)?,
                    items_processed: row.get(5)?,
                    items_total: row.get(6)?,
                    error_message: row.get(7)?,
                    config_json: row.get(8)?,
                })
            },
        )
        .optional()
        .context("latest backfill job")
    }

    // ------------------------------------------------------------------
    // Optimization jobs and results
    // ------------------------------------------------------------------

    pub fn create_optimization_job(&self, job: &OptimizationJob) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO optimization_jobs
                (id, status, config, total_configs, processed_configs, valid_configs,
                 started_at, completed_at, execution_time_ms, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.id,
                job.status.as_str(),
                job.config_json,
                job.total_configs,
                job.processed_configs,
                job.valid_configs,
                job.started_at,
                job.completed_at,
                job.execution_time_ms,
                job.error_message,
            ],
        )
        .context("create optimization job")?;
        Ok(())
    }

    /// Cooperative progress checkpoint.
    pub fn update_optimization_progress(
        &self,
        job_id: &str,
        processed: i64,
        valid: i64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE optimization_jobs
             SET processed_configs = ?2, valid_configs = ?3
             WHERE id = ?1",
            params![job_id, processed, valid],
        )?;
        Ok(())
    }

    pub fn finish_optimization_job(
        &self,
        job_id: &str,
        status: JobStatus,
        completed_at: i64,
        execution_time_ms: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE optimization_jobs
             SET status = ?2, completed_at = ?3, execution_time_ms = ?4, error_message = ?5
             WHERE id = ?1",
            params![
                job_id,
                status.as_str(),
                completed_at,
                execution_time_ms,
                error_message
            ],
        )?;
        Ok(())
    }

    pub fn optimization_job(&self, job_id: &str) -> Result<Option<OptimizationJob>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, status, config, total_configs, processed_configs, valid_configs,
                    started_at, completed_at, execution_time_ms, error_message
             FROM optimization_jobs WHERE id = ?1",
            params![job_id],
            Self::map_optimization_job,
        )
        .optional()
        .context("optimization job by id")
    }

    pub fn latest_optimization_job(&self) -> Result<Option<OptimizationJob>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, status, config, total_configs, processed_configs, valid_configs,
                    started_at, completed_at, execution_time_ms, error_message
             FROM optimization_jobs ORDER BY started_at DESC LIMIT 1",
            [],
            Self::map_optimization_job,
        )
        .optional()
        .context("latest optimization job")
    }

    fn map_optimization_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<OptimizationJob> {
        Ok(OptimizationJob {
            id: row.get(0)?,
            status: JobStatus::parse(&row.get::<_, String>(1)?),
            config_json: row.get(2)?,
            total_configs: row.get(3)?,
            processed_configs: row.get(4)?,
            valid_configs: row.get(5)?,
            started_at: row.get(6)?,
            completed_at: row.get(7)?,
            execution_time_ms: row.get(8)?,
            error_message: row.get(9)?,
        })
    }

    /// One transaction per job; re-runs update in place.
    pub fn upsert_optimization_results(
        &self,
        job_id: &str,
        results: &[OptimizationResult],
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO optimization_results
                    (job_id, config_hash, config, sample_size, win_rate, total_pnl, roi,
                     profit_factor, edge_points, sharpe_ratio, kelly_fraction,
                     information_ratio, avg_price, p_value, adjusted_p_value,
                     ci_lower, ci_upper, is_significant, is_pareto_optimal,
                     rank_roi, rank_win_rate, rank_sharpe, rank_profit_factor,
                     rank_edge_points, rank_information_ratio)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                         ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
                 ON CONFLICT(job_id, config_hash) DO UPDATE SET
                    config = excluded.config,
                    sample_size = excluded.sample_size,
                    win_rate = excluded.win_rate,
                    total_pnl = excluded.total_pnl,
                    roi = excluded.roi,
                    profit_factor = excluded.profit_factor,
                    edge_points = excluded.edge_points,
                    sharpe_ratio = excluded.sharpe_ratio,
                    kelly_fraction = excluded.kelly_fraction,
                    information_ratio = excluded.information_ratio,
                    avg_price = excluded.avg_price,
                    p_value = excluded.p_value,
                    adjusted_p_value = excluded.adjusted_p_value,
                    ci_lower = excluded.ci_lower,
                    ci_upper = excluded.ci_upper,
                    is_significant = excluded.is_significant,
                    is_pareto_optimal = excluded.is_pareto_optimal,
                    rank_roi = excluded.rank_roi,
                    rank_win_rate = excluded.rank_win_rate,
                    rank_sharpe = excluded.rank_sharpe,
                    rank_profit_factor = excluded.rank_profit_factor,
                    rank_edge_points = excluded.rank_edge_points,
                    rank_information_ratio = excluded.rank_information_ratio",
            )?;
            for r in results {
                stmt.execute(params![
                    job_id,
                    r.config_id,
                    serde_json::to_string(&r.config)?,
                    r.metrics.n as i64,
                    r.metrics.win_rate,
                    r.metrics.pnl,
                    r.metrics.roi,
                    r.metrics.profit_factor,
                    r.metrics.edge_points,
                    r.metrics.sharpe_ratio,
                    r.metrics.kelly_fraction,
                    r.metrics.information_ratio,
                    r.metrics.avg_price,
                    r.metrics.p_value,
                    r.metrics.adjusted_p_value,
                    r.metrics.ci_lower,
                    r.metrics.ci_upper,
                    r.is_statistically_significant as i64,
                    r.is_pareto_optimal as i64,
                    r.ranks.roi.map(|v| v as i64),
                    r.ranks.win_rate.map(|v| v as i64),
                    r.ranks.sharpe.map(|v| v as i64),
                    r.ranks.profit_factor.map(|v| v as i64),
                    r.ranks.edge_points.map(|v| v as i64),
                    r.ranks.information_ratio.map(|v| v as i64),
                ])?;
            }
        }
        tx.commit().context("commit optimization results")?;
        Ok(())
    }

    /// Results for a job (or the latest job when `job_id` is None), best
    /// first by the requested sort column.
    pub fn optimization_results(
        &self,
        job_id: Option<&str>,
        sort_by: &str,
        limit: usize,
        significant_only: bool,
    ) -> Result<Vec<OptimizationResult>> {
        let resolved_job = match job_id {
            Some(id) => Some(id.to_string()),
            None => self.latest_optimization_job()?.map(|j| j.id),
        };
        let Some(job) = resolved_job else {
            return Ok(Vec::new());
        };

        let sort_col = match sort_by {
            "win_rate" => "win_rate",
            "sharpe" | "sharpe_ratio" => "sharpe_ratio",
            "profit_factor" => "profit_factor",
            "edge_points" => "edge_points",
            "information_ratio" => "information_ratio",
            "pnl" => "total_pnl",
            _ => "roi",
        };

        let conn = self.conn.lock();
        let sql = format!(
            "SELECT config_hash, config, sample_size, win_rate, total_pnl, roi,
                    profit_factor, edge_points, sharpe_ratio, kelly_fraction,
                    information_ratio, avg_price, p_value, adjusted_p_value,
                    ci_lower, ci_upper, is_significant, is_pareto_optimal,
                    rank_roi, rank_win_rate, rank_sharpe, rank_profit_factor,
                    rank_edge_points, rank_information_ratio
             FROM optimization_results
             WHERE job_id = ?1 {}
             ORDER BY {} DESC
             LIMIT ?2",
            if significant_only {
                "AND is_significant = 1"
            } else {
                ""
            },
            sort_col
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![job, limit as i64], |row| {
                use crate::research::optimize::{ObjectiveRanks, OptimizationMetrics};
                Ok(OptimizationResult {
                    config_id: row.get(0)?,
                    config: serde_json::from_str(&row.get::<_, String>(1)?)
                        .unwrap_or_default(),
                    metrics: OptimizationMetrics {
                        n: row.get::<_, i64>(2)? as usize,
                        win_rate: row.get(3)?,
                        pnl: row.get(4)?,
                        roi: row.get(5)?,
                        profit_factor: row.get(6)?,
                        edge_points: row.get(7)?,
                        sharpe_ratio: row.get(8)?,
                        kelly_fraction: row.get(9)?,
                        information_ratio: row.get(10)?,
                        avg_price: row.get(11)?,
                        p_value: row.get(12)?,
                        adjusted_p_value: row.get(13)?,
                        ci_lower: row.get(14)?,
                        ci_upper: row.get(15)?,
                    },
                    is_statistically_significant: row.get::<_, i64>(16)? != 0,
                    is_pareto_optimal: row.get::<_, i64>(17)? != 0,
                    ranks: ObjectiveRanks {
                        roi: row.get::<_, Option<i64>>(18)?.map(|v| v as usize),
                        win_rate: row.get::<_, Option<i64>>(19)?.map(|v| v as usize),
                        sharpe: row.get::<_, Option<i64>>(20)?.map(|v| v as usize),
                        profit_factor: row.get::<_, Option<i64>>(21)?.map(|v| v as usize),
                        edge_points: row.get::<_, Option<i64>>(22)?.map(|v| v as usize),
                        information_ratio: row.get::<_, Option<i64>>(23)?.map(|v| v as usize),
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Monitored strategies and drift alerts
    // ------------------------------------------------------------------

    pub fn upsert_strategy(&self, s: &MonitoredStrategy) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO monitored_strategies
                (strategy_id, name, description, config,
                 baseline_win_rate, baseline_roi, baseline_edge_points, baseline_kelly,
                 baseline_sample_size, baseline_date,
                 current_win_rate, current_roi, current_edge_points, current_kelly,
                 current_sample_size, recommended_kelly, is_active, is_healthy,
                 last_check_at, check_interval_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                     ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
             ON CONFLICT(strategy_id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                config = excluded.config,
                current_win_rate = excluded.current_win_rate,
                current_roi = excluded.current_roi,
                current_edge_points = excluded.current_edge_points,
                current_kelly = excluded.current_kelly,
                current_sample_size = excluded.current_sample_size,
                recommended_kelly = excluded.recommended_kelly,
                is_active = excluded.is_active,
                is_healthy = excluded.is_healthy,
                last_check_at = excluded.last_check_at,
                check_interval_minutes = excluded.check_interval_minutes",
            params![
                s.strategy_id,
                s.name,
                s.description,
                s.config_json,
                s.baseline.win_rate,
                s.baseline.roi,
                s.baseline.edge_points,
                s.baseline.kelly,
                s.baseline.sample_size as i64,
                s.baseline_date,
                s.current.as_ref().map(|c| c.win_rate),
                s.current.as_ref().map(|c| c.roi),
                s.current.as_ref().map(|c| c.edge_points),
                s.current.as_ref().map(|c| c.kelly),
                s.current.as_ref().map(|c| c.sample_size as i64),
                s.recommended_kelly,
                s.is_active as i64,
                s.is_healthy as i64,
                s.last_check_at,
                s.check_interval_minutes,
            ],
        )
        .context("upsert strategy")?;
        Ok(())
    }

    pub fn strategies(&self, active_only: bool) -> Result<Vec<MonitoredStrategy>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT strategy_id, name, description, config,
                    baseline_win_rate, baseline_roi, baseline_edge_points, baseline_kelly,
                    baseline_sample_size, baseline_date,
                    current_win_rate, current_roi, current_edge_points, current_kelly,
                    current_sample_size, recommended_kelly, is_active, is_healthy,
                    last_check_at, check_interval_minutes
             FROM monitored_strategies {}
             ORDER BY baseline_date DESC",
            if active_only {
                "WHERE is_active = 1"
            } else {
                ""
            }
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                use crate::monitor::strategy::StrategyMetrics;
                let current_win: Option<f64> = row.get(10)?;
                Ok(MonitoredStrategy {
                    strategy_id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    config_json: row.get(3)?,
                    baseline: StrategyMetrics {
                        win_rate: row.get(4)?,
                        roi: row.get(5)?,
                        edge_points: row.get(6)?,
                        kelly: row.get(7)?,
                        sample_size: row.get::<_, i64>(8)? as usize,
                    },
                    baseline_date: row.get(9)?,
                    current: match current_win {
                        Some(win_rate) => Some(StrategyMetrics {
                            win_rate,
                            roi: row.get::<_, Option<f64>>(11)?.unwrap_or(0.0),
                            edge_points: row.get::<_, Option<f64>>(12)?.unwrap_or(0.0),
                            kelly: row.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
                            sample_size: row.get::<_, Option<i64>>(14)?.unwrap_or(0) as usize,
                        }),
                        None => None,
                    },
                    recommended_kelly: row.get(15)?,
                    is_active: row.get::<_, i64>(16)? != 0,
                    is_healthy: row.get::<_, i64>(17)? != 0,
                    last_check_at: row.get(18)?,
                    check_interval_minutes: row.get(19)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Alerts are append-only; acknowledgement is the only mutation.
    pub fn insert_alert(&self, a: &DriftAlert) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO drift_alerts
                (strategy_id, alert_type, metric, expected_value, observed_value,
                 deviation_sigma, severity, message, recommendation, acknowledged,
                 created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
            params![
                a.strategy_id,
                a.alert_type.as_str(),
                a.metric,
                a.expected_value,
                a.observed_value,
                a.deviation_sigma,
                a.severity.as_str(),
                a.message,
                a.recommendation,
                a.created_at,
            ],
        )
        .context("insert drift alert")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn alerts(
        &self,
        severity: Option<&str>,
        unacknowledged_only: bool,
        limit: usize,
    ) -> Result<Vec<DriftAlert>> {
        use crate::monitor::strategy::{AlertSeverity, AlertType};
        let conn = self.conn.lock();
        let mut clauses: Vec<String> = Vec::new();
        if severity.is_some() {
            clauses.push("severity = ?1".to_string());
        }
        if unacknowledged_only {
            clauses.push("acknowledged = 0".to_string());
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT id, strategy_id, alert_type, metric, expected_value, observed_value,
                    deviation_sigma, severity, message, recommendation, acknowledged,
                    created_at
             FROM drift_alerts {}
             ORDER BY created_at DESC LIMIT {}",
            where_clause, limit as i64
        );
        let mut stmt = conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<DriftAlert> {
            Ok(DriftAlert {
                id: row.get(0)?,
                strategy_id: row.get(1)?,
                alert_type: AlertType::parse(&row.get::<_, String>(2)?),
                metric: row.get(3)?,
                expected_value: row.get(4)?,
                observed_value: row.get(5)?,
                deviation_sigma: row.get(6)?,
                severity: AlertSeverity::parse(&row.get::<_, String>(7)?),
                message: row.get(8)?,
                recommendation: row.get(9)?,
                acknowledged: row.get::<_, i64>(10)? != 0,
                created_at: row.get(11)?,
            })
        };
        let rows = match severity {
            Some(sev) => stmt
                .query_map(params![sev], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    pub fn acknowledge_alert(&self, alert_id: i64, by: &str, at_ms: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE drift_alerts
             SET acknowledged = 1, acknowledged_at = ?2, acknowledged_by = ?3
             WHERE id = ?1 AND acknowledged = 0",
            params![alert_id, at_ms, by],
        )?;
        Ok(n > 0)
    }

    /// True when any unacknowledged warning/critical alert exists for the
    /// strategy.
    pub fn has_open_alerts(&self, strategy_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM drift_alerts
             WHERE strategy_id = ?1 AND acknowledged = 0
               AND severity IN ('warning', 'critical')",
            params![strategy_id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }
}
