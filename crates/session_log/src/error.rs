use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionLogError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to format timestamp as RFC3339: {0}")]
    ClockFormat(#[from] time::error::Format),
}

impl SessionLogError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
