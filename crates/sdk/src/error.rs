use std::time::Duration;

use crate::types::SwapId;

/// Errors returned by swap queries, state reads and live views.
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    /// Malformed ID, hash, address or query shape. Caller bug, never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Query variant the backend can not serve.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Node communication failure, does not affect reconciled state.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Settlements with no matching offer after a full historical pass.
    #[error("dangling settlement of swaps: {}", format_ids(.0))]
    DanglingSettlement(Vec<SwapId>),

    /// Malformed chain payload.
    #[error("failed to decode chain payload: {0}")]
    Decode(String),
}

impl SwapError {
    /// Whether repeating the failed operation may succeed.
    ///
    /// Decode errors are retryable: they usually indicate a node serving
    /// unexpected data, not a permanent condition.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwapError::Transport(_) | SwapError::Decode(_))
    }
}

/// Node communication failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("RPC transport error: {0}")]
    Rpc(#[from] alloy::transports::TransportError),

    /// Error object returned by the node.
    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Subscription ended unexpectedly.
    #[error("subscription closed")]
    Closed,
}

impl From<alloy::transports::TransportError> for SwapError {
    fn from(value: alloy::transports::TransportError) -> Self {
        SwapError::Transport(TransportError::Rpc(value))
    }
}

impl From<alloy::contract::Error> for SwapError {
    fn from(value: alloy::contract::Error) -> Self {
        match value {
            alloy::contract::Error::TransportError(err) => err.into(),
            other => SwapError::Decode(other.to_string()),
        }
    }
}

impl From<alloy::sol_types::Error> for SwapError {
    fn from(value: alloy::sol_types::Error) -> Self { SwapError::Decode(value.to_string()) }
}

impl From<serde_json::Error> for SwapError {
    fn from(value: serde_json::Error) -> Self { SwapError::Decode(value.to_string()) }
}

fn format_ids(ids: &[SwapId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
