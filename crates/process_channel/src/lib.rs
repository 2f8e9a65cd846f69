//! Line-oriented channel over an external generator process.
//!
//! A process is spawned with stdin closed and stdout captured. Output is
//! consumed either as a live sequence of lines ([`stream_lines`]) or collected
//! once the process ends ([`run_batch`]). Both paths honor a deadline and a
//! cooperative cancel flag, terminate the process gracefully then forcefully,
//! and reap it on every exit path.

use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

mod batch;
mod command;
mod error;
mod guard;
mod stream;

pub use batch::{run_batch, BatchOutput};
pub use command::{CommandSpec, StderrMode};
pub use error::ChannelError;
pub use stream::stream_lines;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Timing limits applied to one process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Wall-clock limit for the whole run.
    pub timeout: Duration,
    /// How long a terminated process may take to exit before it is killed.
    pub grace_period: Duration,
    /// Upper bound on how long a cancel request can go unnoticed.
    pub poll_interval: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ChannelOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }
}

/// How a process run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// The deadline fired and the process was terminated.
    TimedOut,
    /// The cancel flag was raised and the process was terminated.
    Cancelled,
}

impl Completion {
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            Self::Exited(status) => Some(*status),
            Self::TimedOut | Self::Cancelled => None,
        }
    }
}

fn is_cancelled(cancel: &AtomicBool) -> bool {
    cancel.load(Ordering::Acquire)
}
