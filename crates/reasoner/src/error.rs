use llm_provider::GenerationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("no usable samples: all {attempted} voting runs failed")]
    NoUsableSamples { attempted: usize },
    #[error("invalid reasoning settings: {0}")]
    InvalidSettings(String),
}

impl ReasoningError {
    /// Whether a failed sample may be dropped instead of ending the strategy.
    pub(crate) fn is_excludable(error: &GenerationError) -> bool {
        matches!(
            error,
            GenerationError::Transport(_) | GenerationError::Protocol(_)
        )
    }
}
