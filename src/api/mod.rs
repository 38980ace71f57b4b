//! HTTP/JSON research and monitoring API.

pub mod analysis;
pub mod routes;

pub use routes::{build_router, ApiState};
