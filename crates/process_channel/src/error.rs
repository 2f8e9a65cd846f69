use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while {operation} for '{program}': {source}")]
    Io {
        operation: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ChannelError {
    #[must_use]
    pub fn io(operation: &'static str, program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            program: program.into(),
            source,
        }
    }

    /// Program name attached to the failure.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::Launch { program, .. } | Self::Io { program, .. } => program,
        }
    }
}
