//! Typed HTTP clients for the external collaborators: the market data API
//! and the block-explorer wallet API. Interface-only from the core's point
//! of view; every call has a bounded timeout and a typed error.

pub mod explorer;
pub mod market;

pub use explorer::ExplorerClient;
pub use market::MarketApiClient;

/// Error kinds the clients surface. Transient errors are retried locally
/// with bounded backoff; exhausted retries degrade to fallback data.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),
    #[error("invalid upstream payload: {0}")]
    InvalidPayload(String),
    #[error("upstream rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::TransientUpstream(_))
    }
}

pub(crate) fn classify_status(status: reqwest::StatusCode, body: String) -> ClientError {
    if status.is_server_error() || status.as_u16() == 429 {
        ClientError::TransientUpstream(format!("{}: {}", status, body))
    } else {
        ClientError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}
