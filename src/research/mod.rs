//! Research layer: contrarian-event backfill over resolved markets,
//! correlation and P&L metrics, factor breakdowns, a regularized logistic
//! model report, and grid-search optimization with FDR correction and Pareto
//! frontier extraction.

pub mod backfill;
pub mod breakdown;
pub mod correlation;
pub mod events;
pub mod model;
pub mod optimize;
pub mod pnl;
pub mod stats;

pub use events::{
    AnalysisConfig, ContrarianEvent, ContrarianMode, HistoricalTrade, OutcomeFilter,
    ResolvedMarket,
};
pub use optimize::{GridSearchConfig, OptimizationResult};
