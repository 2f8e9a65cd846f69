use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::guard::ChildGuard;
use crate::{is_cancelled, ChannelError, ChannelOptions, CommandSpec, Completion};

/// Runs `spec` and hands each output line to `on_line` as soon as it arrives.
///
/// Lines keep their trailing newline; the last line may lack one. Blocks until
/// the output closes, the deadline passes, or `cancel` is raised. Lines
/// delivered before a cutoff stay delivered.
pub fn stream_lines(
    spec: &CommandSpec,
    options: &ChannelOptions,
    cancel: &AtomicBool,
    on_line: &mut dyn FnMut(&str),
) -> Result<Completion, ChannelError> {
    if is_cancelled(cancel) {
        return Ok(Completion::Cancelled);
    }

    let mut guard = ChildGuard::spawn(spec, options.grace_period)?;
    let (tx, rx) = mpsc::channel::<String>();
    if let Some(stdout) = guard.child_mut().stdout.take() {
        spawn_line_reader(stdout, tx.clone());
    }
    if let Some(stderr) = guard.child_mut().stderr.take() {
        spawn_line_reader(stderr, tx.clone());
    }
    drop(tx);

    let started = Instant::now();
    let deadline = started + options.timeout;
    let mut lines = 0usize;

    loop {
        if is_cancelled(cancel) {
            info!(program = guard.program(), lines, "generator cancelled");
            guard.terminate();
            return Ok(Completion::Cancelled);
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                program = guard.program(),
                lines,
                timeout_ms = options.timeout.as_millis() as u64,
                "generator timed out"
            );
            guard.terminate();
            return Ok(Completion::TimedOut);
        }

        match rx.recv_timeout(options.poll_interval.min(deadline - now)) {
            Ok(line) => {
                lines += 1;
                on_line(&line);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                let status = guard.wait()?;
                debug!(
                    program = guard.program(),
                    lines,
                    ?status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generator output closed"
                );
                return Ok(Completion::Exited(status));
            }
        }
    }
}

fn spawn_line_reader(pipe: impl Read + Send + 'static, tx: Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer).into_owned();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
    });
}
