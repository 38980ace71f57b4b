//! Wallet enrichment service.

pub mod enrichment;

pub use enrichment::WalletEnricher;
