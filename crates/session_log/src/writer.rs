use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::SessionLogError;
use crate::paths::{query_file_name, transcript_file_name};
use crate::record::{QueryRecord, Transcript};

/// Writes session logs as new files under one directory.
///
/// Every log gets a fresh file; nothing is ever reopened or rewritten.
#[derive(Debug, Clone)]
pub struct SessionLogWriter {
    dir: PathBuf,
}

impl SessionLogWriter {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_query(&self, record: &QueryRecord) -> Result<PathBuf, SessionLogError> {
        let name = query_file_name(&file_stamp(record.timestamp)?, &short_id());
        self.write_new(&name, &record.render()?)
    }

    pub fn write_transcript(&self, transcript: &Transcript) -> Result<PathBuf, SessionLogError> {
        let name = transcript_file_name(&file_stamp(transcript.started_at)?, &short_id());
        self.write_new(&name, &transcript.render()?)
    }

    fn write_new(&self, name: &str, body: &str) -> Result<PathBuf, SessionLogError> {
        fs::create_dir_all(&self.dir)
            .map_err(|source| SessionLogError::io("creating log directory", &self.dir, source))?;

        let path = self.dir.join(name);
        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|source| SessionLogError::io("creating log file", &path, source))?;
        file.write_all(body.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| SessionLogError::io("writing log file", &path, source))?;

        debug!(path = %path.display(), bytes = body.len(), "wrote session log");
        Ok(path)
    }
}

fn file_stamp(timestamp: OffsetDateTime) -> Result<String, SessionLogError> {
    let whole_seconds = timestamp.replace_nanosecond(0).unwrap_or(timestamp);
    Ok(whole_seconds.format(&Rfc3339)?)
}

fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
