//! Strategy registration and periodic health checks.
//!
//! A deployed strategy is snapshotted at registration time; every check
//! recomputes the same metrics over the trailing week, z-scores them
//! against the baseline with a binomial SE, and persists alerts
//! append-only. The periodic loop is a select between the interval tick
//! and a stop signal; stop is idempotent and lets an in-flight check run
//! to completion.

use crate::monitor::drift::{binomial_z, recalibrate_kelly, win_rate_change_points};
use crate::research::events::AnalysisConfig;
use crate::research::pnl::compute_pnl;
use crate::storage::Warehouse;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Drift,
    Performance,
    SampleSize,
    Kelly,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Drift => "drift",
            AlertType::Performance => "performance",
            AlertType::SampleSize => "sample_size",
            AlertType::Kelly => "kelly",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "drift" => AlertType::Drift,
            "sample_size" => AlertType::SampleSize,
            "kelly" => AlertType::Kelly,
            _ => AlertType::Performance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "critical" => AlertSeverity::Critical,
            "warning" => AlertSeverity::Warning,
            _ => AlertSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftAlert {
    pub id: Option<i64>,
    pub strategy_id: String,
    pub alert_type: AlertType,
    pub metric: String,
    pub expected_value: f64,
    pub observed_value: f64,
    /// Signed sigma deviation.
    pub deviation_sigma: f64,
    pub severity: AlertSeverity,
    pub message: String,
    pub recommendation: Option<String>,
    pub acknowledged: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StrategyMetrics {
    pub win_rate: f64,
    pub roi: f64,
    pub edge_points: f64,
    pub kelly: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredStrategy {
    pub strategy_id: String,
    pub name: String,
    pub description: Option<String>,
    pub config_json: String,
    pub baseline: StrategyMetrics,
    pub baseline_date: i64,
    pub current: Option<StrategyMetrics>,
    pub recommended_kelly: Option<f64>,
    pub is_active: bool,
    pub is_healthy: bool,
    pub last_check_at: Option<i64>,
    pub check_interval_minutes: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub check_interval_minutes: u64,
    /// Below this current sample size, alerts degrade to a sample_size
    /// warning and Kelly recalibration returns the baseline.
    pub min_sample_size_for_alert: usize,
    pub max_kelly_adjustment: f64,
    pub warning_sigma: f64,
    pub critical_sigma: f64,
    /// Rolling win-rate CUSUM window, trades.
    pub cusum_window: usize,
    /// History span scanned for win-rate change points.
    pub cusum_lookback_days: i64,
    /// Span for the current-metrics recomputation.
    pub current_window_days: i64,
    /// Span for the baseline snapshot.
    pub baseline_lookback_days: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 60,
            min_sample_size_for_alert: 20,
            max_kelly_adjustment: 0.5,
            warning_sigma: 1.5,
            critical_sigma: 2.5,
            cusum_window: 10,
            cusum_lookback_days: 60,
            current_window_days: 7,
            baseline_lookback_days: 30,
        }
    }
}

/// Deterministic strategy id from the config payload.
pub fn strategy_id_for(config_json: &str) -> String {
    let digest = Sha256::digest(config_json.as_bytes());
    format!("strat_{}", hex::encode(&digest[..8]))
}

pub struct StrategyMonitor {
    warehouse: Warehouse,
    cfg: MonitorConfig,
}

impl StrategyMonitor {
    pub fn new(warehouse: Warehouse, cfg: MonitorConfig) -> Self {
        Self { warehouse, cfg }
    }

    fn metrics_over(
        &self,
        config: &AnalysisConfig,
        lookback_days: i64,
        now_ms: i64,
    ) -> Result<StrategyMetrics> {
        let mut scoped = config.clone();
        scoped.lookback_days = lookback_days;
        let rows = self.warehouse.query_events(&scoped, now_ms)?;
        let selected: Vec<&crate::research::events::ContrarianEvent> = rows
            .iter()
            .map(|r| &r.event)
            .filter(|e| e.is_contrarian_by_mode(config.contrarian_mode))
            .collect();
        let pnl = compute_pnl(&selected);
        Ok(StrategyMetrics {
            win_rate: pnl.win_rate,
            roi: pnl.roi,
            edge_points: pnl.edge_points,
            kelly: pnl.kelly_fraction,
            sample_size: pnl.n,
        })
    }

    /// Register a strategy: snapshot the baseline and persist it active.
    pub fn start_monitoring(
        &self,
        config: &AnalysisConfig,
        name: &str,
        now_ms: i64,
    ) -> Result<MonitoredStrategy> {
        let config_json = serde_json::to_string(config).context("serialize strategy config")?;
        let strategy_id = strategy_id_for(&config_json);
        let baseline = self.metrics_over(config, self.cfg.baseline_lookback_days, now_ms)?;

        let strategy = MonitoredStrategy {
            strategy_id: strategy_id.clone(),
            name: name.to_string(),
            description: None,
            config_json,
            baseline,
            baseline_date: now_ms,
            current: None,
            recommended_kelly: None,
            is_active: true,
            is_healthy: true,
            last_check_at: None,
            check_interval_minutes: self.cfg.check_interval_minutes as i64,
        };
        self.warehouse.upsert_strategy(&strategy)?;
        info!(strategy_id, name, n = baseline.sample_size, "strategy registered");
        Ok(strategy)
    }

    fn severity_for(&self, z_abs: f64) -> Option<AlertSeverity> {
        if z_abs >= self.cfg.critical_sigma {
            Some(AlertSeverity::Critical)
        } else if z_abs >= self.cfg.warning_sigma {
            Some(AlertSeverity::Warning)
        } else {
            None
        }
    }

    /// One health check for one strategy; persists alerts and the updated
    /// strategy row, and returns the alerts it raised.
    pub fn check_strategy(
        &self,
        strategy: &MonitoredStrategy,
        now_ms: i64,
    ) -> Result<Vec<DriftAlert>> {
        let config: AnalysisConfig =
            serde_json::from_str(&strategy.config_json).context("strategy config")?;
        let current = self.metrics_over(&config, self.cfg.current_window_days, now_ms)?;
        let mut alerts: Vec<DriftAlert> = Vec::new();

        if current.sample_size < self.cfg.min_sample_size_for_alert {
            alerts.push(DriftAlert {
                id: None,
                strategy_id: strategy.strategy_id.clone(),
                alert_type: AlertType::SampleSize,
                metric: "sample_size".to_string(),
                expected_value: self.cfg.min_sample_size_for_alert as f64,
                observed_value: current.sample_size as f64,
                deviation_sigma: 0.0,
                severity: AlertSeverity::Warning,
                message: format!(
                    "only {} events in the last {} days",
                    current.sample_size, self.cfg.current_window_days
                ),
                recommendation: Some("widen the window or pause sizing".to_string()),
                acknowledged: false,
                created_at: now_ms,
            });
        } else {
            // Win-rate family metrics share the binomial SE; edge points are
            // the same rate scaled into percentage points.
            let n = current.sample_size;
            let checks: [(&str, f64, f64, f64); 2] = [
                (
                    "win_rate",
                    strategy.baseline.win_rate,
                    current.win_rate,
                    binomial_z(current.win_rate, strategy.baseline.win_rate, n),
                ),
                (
                    "edge_points",
                    strategy.baseline.edge_points,
                    current.edge_points,
                    binomial_z(
                        current.edge_points / 100.0 + strategy.baseline.win_rate
                            - strategy.baseline.edge_points / 100.0,
                        strategy.baseline.win_rate,
                        n,
                    ),
                ),
            ];
            for (metric, expected, observed, z) in checks {
                if let Some(severity) = self.severity_for(z.abs()) {
                    alerts.push(DriftAlert {
                        id: None,
                        strategy_id: strategy.strategy_id.clone(),
                        alert_type: AlertType::Performance,
                        metric: metric.to_string(),
                        expected_value: expected,
                        observed_value: observed,
                        deviation_sigma: z,
                        severity,
                        message: format!(
                            "{} moved {:+.2} sigma from baseline ({:.3} -> {:.3})",
                            metric, z, expected, observed
                        ),
                        recommendation: Some(if z < 0.0 {
                            "reduce size until the drift resolves".to_string()
                        } else {
                            "performance above baseline; recheck for regime change".to_string()
                        }),
                        acknowledged: false,
                        created_at: now_ms,
                    });
                }
            }
        }

        // Win-rate change points over the long lookback.
        let outcomes = self.outcome_series(&config, now_ms)?;
        let change_points = win_rate_change_points(&outcomes, self.cfg.cusum_window, 0.5, 5.0);
        if let Some(cp) = change_points.last() {
            alerts.push(DriftAlert {
                id: None,
                strategy_id: strategy.strategy_id.clone(),
                alert_type: AlertType::Drift,
                metric: "rolling_win_rate".to_string(),
                expected_value: strategy.baseline.win_rate,
                observed_value: current.win_rate,
                deviation_sigma: if cp.upward { cp.statistic } else { -cp.statistic },
                severity: AlertSeverity::Warning,
                message: format!(
                    "win-rate change point at trade {} ({})",
                    cp.index,
                    if cp.upward { "upward" } else { "downward" }
                ),
                recommendation: Some("re-baseline the strategy".to_string()),
                acknowledged: false,
                created_at: now_ms,
            });
        }

        let recommended = recalibrate_kelly(
            strategy.baseline.kelly,
            current.win_rate,
            current.sample_size,
            self.cfg.min_sample_size_for_alert,
            self.cfg.max_kelly_adjustment,
        );

        for alert in &alerts {
            self.warehouse.insert_alert(alert)?;
        }

        let unhealthy = alerts.iter().any(|a| {
            matches!(a.severity, AlertSeverity::Warning | AlertSeverity::Critical)
        });
        let mut updated = strategy.clone();
        updated.current = Some(current);
        updated.recommended_kelly = Some(recommended);
        updated.is_healthy = !unhealthy;
        updated.last_check_at = Some(now_ms);
        self.warehouse.upsert_strategy(&updated)?;

        Ok(alerts)
    }

    fn outcome_series(&self, config: &AnalysisConfig, now_ms: i64) -> Result<Vec<bool>> {
        let mut scoped = config.clone();
        scoped.lookback_days = self.cfg.cusum_lookback_days;
        let rows = self.warehouse.query_events(&scoped, now_ms)?;
        let mut events: Vec<&crate::research::events::ContrarianEvent> = rows
            .iter()
            .map(|r| &r.event)
            .filter(|e| e.is_contrarian_by_mode(config.contrarian_mode))
            .collect();
        events.sort_by_key(|e| e.trade_timestamp);
        Ok(events.iter().map(|e| e.outcome_won).collect())
    }

    /// Check every active strategy once.
    pub fn check_all(&self, now_ms: i64) -> Result<usize> {
        let strategies = self.warehouse.strategies(true)?;
        let mut alert_count = 0;
        for strategy in &strategies {
            match self.check_strategy(strategy, now_ms) {
                Ok(alerts) => alert_count += alerts.len(),
                Err(e) => warn!(
                    strategy_id = strategy.strategy_id,
                    error = %e,
                    "strategy check failed"
                ),
            }
        }
        Ok(alert_count)
    }
}

/// Handle for the periodic loop. Dropping it does not stop the loop; call
/// `stop`, which is idempotent.
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        // send_replace on an already-true value is the no-op second stop.
        let _ = self.stop_tx.send_replace(true);
    }
}

/// Spawn the periodic monitoring loop. The in-flight check completes before
/// the loop observes a stop.
pub fn start_periodic_monitoring(monitor: Arc<StrategyMonitor>) -> MonitorHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let interval_minutes = monitor.cfg.check_interval_minutes.max(1);

    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_minutes * 60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately; skip it so registration settles.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    match monitor.check_all(now_ms) {
                        Ok(alerts) => info!(alerts, "periodic strategy check done"),
                        Err(e) => warn!(error = %e, "periodic strategy check failed"),
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        info!("periodic monitoring stopped");
                        break;
                    }
                }
            }
        }
    });

    MonitorHandle { stop_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Outcome, Side};
    use crate::research::events::{ContrarianEvent, ContrarianMode};

    fn seed_events(warehouse: &Warehouse, now_ms: i64, recent_win_rate_pct: usize) {
        // 60 days of history: old events win 70%, the last week wins at the
        // given rate.
        let mut events = Vec::new();
        for i in 0..120 {
            let age_days = i as i64 / 2;
            let ts = now_ms - age_days * 86_400_000 - (i as i64 % 2) * 3_600_000;
            let won = if age_days < 7 {
                (i * 37) % 100 < recent_win_rate_pct
            } else {
                (i * 37) % 100 < 70
            };
            events.push(ContrarianEvent {
                id: None,
                condition_id: format!("c{}", i),
                token_id: "t".into(),
                trade_timestamp: ts,
                minutes_before_close: 30.0,
                trade_side: Side::Buy,
                trade_price: 0.4,
                trade_size: 100.0,
                trade_notional: 40.0,
                taker_address: "0xabc".into(),
                size_percentile: 50.0,
                size_z_score: 0.0,
                is_tail_trade: false,
                is_price_contrarian: true,
                price_trend_30m: 0.0,
                is_against_trend: true,
                ofi_30m: 0.0,
                is_against_ofi: true,
                is_contrarian: true,
                book_imbalance: 0.0,
                thin_opposite_ratio: 1.0,
                spread_bps: 50.0,
                is_asymmetric_book: false,
                wallet_age_days: None,
                wallet_trade_count: None,
                is_new_wallet: false,
                traded_outcome: Outcome::Yes,
                outcome_won: won,
                drift_30m: None,
                drift_60m: None,
            });
        }
        warehouse.insert_contrarian_events(&events).unwrap();
    }

    fn monitor_with(now_ms: i64, recent_win_rate_pct: usize) -> (StrategyMonitor, Warehouse) {
        let warehouse = Warehouse::in_memory().unwrap();
        seed_events(&warehouse, now_ms, recent_win_rate_pct);
        let cfg = MonitorConfig {
            baseline_lookback_days: 60,
            ..MonitorConfig::default()
        };
        (StrategyMonitor::new(warehouse.clone(), cfg), warehouse)
    }

    fn analysis_config() -> AnalysisConfig {
        AnalysisConfig {
            contrarian_mode: ContrarianMode::VsBoth,
            lookback_days: 60,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn strategy_id_is_deterministic() {
        let a = strategy_id_for("{\"x\":1}");
        let b = strategy_id_for("{\"x\":1}");
        let c = strategy_id_for("{\"x\":2}");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("strat_"));
    }

    #[test]
    fn registration_snapshots_baseline() {
        let now = 1_700_000_000_000;
        let (monitor, warehouse) = monitor_with(now, 70);
        let s = monitor
            .start_monitoring(&analysis_config(), "contrarian-v1", now)
            .unwrap();
        assert!(s.is_active && s.is_healthy);
        assert!(s.baseline.sample_size > 50);
        assert!(s.baseline.win_rate > 0.5);

        let stored = warehouse.strategies(true).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].strategy_id, s.strategy_id);
    }

    #[test]
    fn healthy_strategy_raises_no_performance_alerts() {
        let now = 1_700_000_000_000;
        let (monitor, _) = monitor_with(now, 70);
        let s = monitor
            .start_monitoring(&analysis_config(), "steady", now)
            .unwrap();
        let alerts = monitor.check_strategy(&s, now).unwrap();
        assert!(alerts
            .iter()
            .all(|a| a.alert_type != AlertType::Performance));
    }

    #[test]
    fn collapsed_week_raises_and_marks_unhealthy() {
        let now = 1_700_000_000_000;
        let (monitor, warehouse) = monitor_with(now, 10);
        let s = monitor
            .start_monitoring(&analysis_config(), "degrading", now)
            .unwrap();
        let alerts = monitor.check_strategy(&s, now).unwrap();
        assert!(alerts.iter().any(|a| a.severity == AlertSeverity::Critical
            || a.severity == AlertSeverity::Warning));

        let stored = &warehouse.strategies(true).unwrap()[0];
        assert!(!stored.is_healthy);
        assert!(stored.recommended_kelly.is_some());
        assert!(stored.current.is_some());
        assert!(warehouse.has_open_alerts(&s.strategy_id).unwrap());
    }

    #[tokio::test]
    async fn periodic_stop_is_idempotent() {
        let now = 1_700_000_000_000;
        let (monitor, _) = monitor_with(now, 70);
        let handle = start_periodic_monitoring(Arc::new(monitor));
        handle.stop();
        handle.stop();
    }
}
