//! Chain access errors.

use thiserror::Error;

/// Errors raised by the chain layer.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A single read could not be served (missing historical state, revert,
    /// transport error). Callers may treat it as transient.
    #[error("{call} failed at block {block}: {message}")]
    Query {
        call: &'static str,
        block: String,
        message: String,
    },

    #[error("{call} timed out after {secs}s at block {block}")]
    Timeout {
        call: &'static str,
        block: String,
        secs: u64,
    },

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("block {block} has out-of-range timestamp {timestamp}")]
    InvalidTimestamp { block: u64, timestamp: u64 },

    #[error("unsupported chain id {0}")]
    UnsupportedChain(u64),

    #[error("RPC endpoint reports chain id {actual}, expected {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("invalid RPC url {0}")]
    InvalidUrl(String),
}

impl ChainError {
    /// Whether the error came from a single read rather than from setup.
    pub fn is_query_failure(&self) -> bool {
        matches!(
            self,
            ChainError::Query { .. } | ChainError::Timeout { .. } | ChainError::BlockNotFound(_)
        )
    }
}
