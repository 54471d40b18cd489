use thiserror::Error;

use timeline_chain::ChainError;

/// Per-event failure. Recorded as FAILED with this message.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{context}: {source}")]
    Chain {
        context: &'static str,
        source: ChainError,
    },
}

impl AnalysisError {
    pub(crate) fn chain(context: &'static str) -> impl FnOnce(ChainError) -> Self {
        move |source| Self::Chain { context, source }
    }
}
