use thiserror::Error;

/// Fatal failure of a single generation call.
///
/// Timeouts and cancellations are reported through
/// [`crate::GenerationStatus`] instead, so partial output is never lost.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("message {index} is invalid: {reason}")]
    InvalidMessage { index: usize, reason: String },

    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("failed to launch generator '{program}': {source}")]
    ProcessLaunchFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("generator transport failed: {0}")]
    Transport(String),

    #[error("generator protocol error: {0}")]
    Protocol(String),
}

impl GenerationError {
    #[must_use]
    pub fn invalid_message(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            index,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn launch(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::ProcessLaunchFailure {
            program: program.into(),
            source,
        }
    }
}
