//! Deployed-strategy monitoring: baseline snapshots, periodic drift checks,
//! win-rate change-point detection and Kelly recalibration.

pub mod drift;
pub mod strategy;

pub use drift::{recalibrate_kelly, win_rate_change_points, WinRateChangePoint};
pub use strategy::{
    AlertSeverity, AlertType, DriftAlert, MonitorConfig, MonitoredStrategy, StrategyMetrics,
    StrategyMonitor,
};
