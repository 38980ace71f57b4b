//! Sentinel backend library.
//!
//! Streaming anomaly detection for prediction markets: per-token rolling
//! statistics, feature derivation, multi-component scoring, and the
//! research/optimization/monitoring layers behind the analysis API.

pub mod api;
pub mod clients;
pub mod config;
pub mod features;
pub mod models;
pub mod monitor;
pub mod pipeline;
pub mod research;
pub mod rolling;
pub mod scoring;
pub mod storage;
pub mod wallet;

pub use config::Config;
pub use pipeline::{IngestPipeline, StrategyJob};
