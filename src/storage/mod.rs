//! Persistence: the relational research warehouse and the TTL'd KV cache.

pub mod cache;
pub mod warehouse;

pub use cache::KvCache;
pub use warehouse::Warehouse;
