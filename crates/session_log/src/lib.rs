//! Flat, append-only text logs of queries and interactive sessions.

mod error;
mod paths;
mod record;
mod writer;

pub use error::SessionLogError;
pub use paths::{
    query_file_name, sanitize_timestamp_for_filename, session_dir, transcript_file_name,
    DEFAULT_SESSION_DIR,
};
pub use record::{QueryRecord, Transcript};
pub use writer::SessionLogWriter;
