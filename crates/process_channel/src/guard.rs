use std::io;
use std::process::{Child, ExitStatus};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::{ChannelError, CommandSpec};

/// Owns a running child and reaps it on drop if nobody else did.
pub(crate) struct ChildGuard {
    child: Child,
    program: String,
    grace_period: Duration,
    reaped: bool,
}

impl ChildGuard {
    pub(crate) fn spawn(spec: &CommandSpec, grace_period: Duration) -> Result<Self, ChannelError> {
        let program = spec.program_name();
        let child = spec
            .to_command()
            .spawn()
            .map_err(|source| ChannelError::Launch {
                program: program.clone(),
                source,
            })?;
        debug!(
            program = %program,
            pid = child.id(),
            args = spec.arg_list().len(),
            "spawned generator process"
        );
        Ok(Self {
            child,
            program,
            grace_period,
            reaped: false,
        })
    }

    pub(crate) fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    pub(crate) fn program(&self) -> &str {
        &self.program
    }

    pub(crate) fn wait(&mut self) -> Result<ExitStatus, ChannelError> {
        let status = self
            .child
            .wait()
            .map_err(|source| ChannelError::io("waiting for exit", self.program.clone(), source))?;
        self.reaped = true;
        Ok(status)
    }

    pub(crate) fn wait_for(&mut self, limit: Duration) -> Result<Option<ExitStatus>, ChannelError> {
        let status = self.child.wait_timeout(limit).map_err(|source| {
            ChannelError::io("waiting for exit", self.program.clone(), source)
        })?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    /// Terminates and reaps the child. Failures are logged, never returned,
    /// since the caller is already on a cutoff path.
    pub(crate) fn terminate(&mut self) {
        if self.reaped {
            return;
        }
        match terminate_gracefully(&mut self.child, self.grace_period) {
            Ok(status) => {
                debug!(program = %self.program, ?status, "generator process terminated");
            }
            Err(error) => {
                warn!(program = %self.program, %error, "failed to terminate generator process");
            }
        }
        self.reaped = true;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Asks the process to stop, waits up to `grace_period`, then kills it.
pub(crate) fn terminate_gracefully(
    child: &mut Child,
    grace_period: Duration,
) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    if send_terminate(child) {
        if let Some(status) = child.wait_timeout(grace_period)? {
            return Ok(status);
        }
    }

    match child.kill() {
        Ok(()) => {}
        // Already exited between the last poll and the kill.
        Err(error) if error.kind() == io::ErrorKind::InvalidInput => {}
        Err(error) => return Err(error),
    }
    child.wait()
}

#[cfg(unix)]
fn send_terminate(child: &Child) -> bool {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return false;
    };
    // SAFETY: `pid` belongs to a child we own and have not reaped yet.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn send_terminate(_child: &Child) -> bool {
    false
}
