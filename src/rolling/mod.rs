//! Per-token rolling state: streaming quantiles, robust location/scale,
//! self-exciting intensity, change-point detection and bounded trade windows.
//!
//! Everything in this module is CPU-only and never suspends. One owner per
//! token; see [`engine::RollingStateEngine`].

pub mod cusum;
pub mod engine;
pub mod hawkes;
pub mod robust;
pub mod tdigest;
pub mod window;

pub use cusum::{CusumMetric, CusumSnapshot, PageHinkley};
pub use engine::{InterArrivalStats, RollingStateEngine};
pub use hawkes::HawkesState;
pub use robust::{mad, median, robust_z};
pub use tdigest::TDigest;
pub use window::TradeWindow;
