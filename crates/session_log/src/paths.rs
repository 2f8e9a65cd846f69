use std::path::{Path, PathBuf};

pub const DEFAULT_SESSION_DIR: &str = "logs";

/// Resolves a configured log directory against `cwd` when it is relative.
#[must_use]
pub fn session_dir(cwd: &Path, configured: Option<&Path>) -> PathBuf {
    let dir = configured.unwrap_or_else(|| Path::new(DEFAULT_SESSION_DIR));
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        cwd.join(dir)
    }
}

#[must_use]
pub fn sanitize_timestamp_for_filename(timestamp: &str) -> String {
    timestamp
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '-',
            _ => c,
        })
        .collect()
}

#[must_use]
pub fn query_file_name(created_at: &str, short_id: &str) -> String {
    format!(
        "query_{}_{}.txt",
        sanitize_timestamp_for_filename(created_at),
        short_id
    )
}

#[must_use]
pub fn transcript_file_name(created_at: &str, short_id: &str) -> String {
    format!(
        "session_{}_{}.txt",
        sanitize_timestamp_for_filename(created_at),
        short_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_filesystem_safe() {
        assert_eq!(
            query_file_name("2026-10-16T09:30:00Z", "ab12cd34"),
            "query_2026-10-16T09-30-00Z_ab12cd34.txt"
        );
        assert_eq!(
            transcript_file_name("2026-10-16T09:30:00Z", "ab12cd34"),
            "session_2026-10-16T09-30-00Z_ab12cd34.txt"
        );
    }

    #[test]
    fn relative_dirs_resolve_against_cwd() {
        let cwd = Path::new("/work");
        assert_eq!(session_dir(cwd, None), PathBuf::from("/work/logs"));
        assert_eq!(
            session_dir(cwd, Some(Path::new("/var/orin"))),
            PathBuf::from("/var/orin")
        );
    }
}
