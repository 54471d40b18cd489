use thiserror::Error;

/// Errors raised by the analysis store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row from the indexer table could not be decoded into a typed event.
    #[error("invalid {field} in event {id}: {reason}")]
    InvalidRow {
        id: String,
        field: &'static str,
        reason: String,
    },

    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("unknown analysis status {0:?}")]
    UnknownStatus(String),
}
