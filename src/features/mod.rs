//! Feature derivation: one (trade, book, market-meta, wallet) event in, one
//! feature vector out.
//!
//! Subgroups whose source data can be absent (`trade_size`, `wallet`,
//! `impact`) are `Option`s, not sentinel values; consumers branch on
//! presence.

pub mod burst;
pub mod change_point;
pub mod compute;
pub mod impact;
pub mod orderbook;
pub mod time_to_close;
pub mod trade_size;
pub mod wallet;

pub use burst::BurstFeatures;
pub use change_point::{ChangePointFeatures, RegimeShift};
pub use compute::{FeatureComputer, FeatureVector};
pub use impact::{ImpactFeatures, MidHistory};
pub use orderbook::BookFeatures;
pub use time_to_close::TimeFeatures;
pub use trade_size::TradeSizeFeatures;
pub use wallet::WalletFeatures;
