//! Diagnostic log setup.
//!
//! Stdout belongs to the conversation, so logs go to stderr or, when a log
//! file is configured, to that file without ANSI colors.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV_VAR: &str = "ORIN_LOG";
pub const DEFAULT_LOG_LEVEL: &str = "warn";
const VERBOSE_LOG_LEVEL: &str = "debug";

/// Filter directive: `--verbose`, then `ORIN_LOG`, then the config level,
/// then `warn`.
#[must_use]
pub fn resolve_filter(from_env: Option<String>, config_level: &str, verbose: bool) -> String {
    if verbose {
        return VERBOSE_LOG_LEVEL.to_string();
    }
    if let Some(directive) = from_env.filter(|value| !value.trim().is_empty()) {
        return directive;
    }
    if config_level.trim().is_empty() {
        DEFAULT_LOG_LEVEL.to_string()
    } else {
        config_level.trim().to_string()
    }
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init_logging(config_level: &str, file: Option<&Path>, verbose: bool) -> Result<()> {
    let directive = resolve_filter(std::env::var(LOG_ENV_VAR).ok(), config_level, verbose);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("invalid log filter '{directive}'"))?;

    let installed = match file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("global subscriber already installed");
    }
    Ok(())
}
