use std::io::Read;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::guard::ChildGuard;
use crate::{is_cancelled, ChannelError, ChannelOptions, CommandSpec, Completion};

/// Everything a batch run printed, plus how it ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutput {
    pub text: String,
    pub completion: Completion,
}

impl BatchOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self.completion, Completion::Exited(status) if status.success())
    }
}

/// Runs `spec` to completion and returns its buffered output.
///
/// On timeout or cancel the process is terminated and whatever it printed
/// before the cutoff is still returned. Merged stderr follows stdout.
pub fn run_batch(
    spec: &CommandSpec,
    options: &ChannelOptions,
    cancel: &AtomicBool,
) -> Result<BatchOutput, ChannelError> {
    if is_cancelled(cancel) {
        return Ok(BatchOutput {
            text: String::new(),
            completion: Completion::Cancelled,
        });
    }

    let mut guard = ChildGuard::spawn(spec, options.grace_period)?;
    let (tx, rx) = mpsc::channel::<(usize, Vec<u8>)>();
    let mut readers = 0;
    if let Some(stdout) = guard.child_mut().stdout.take() {
        spawn_pipe_collector(0, stdout, tx.clone());
        readers += 1;
    }
    if let Some(stderr) = guard.child_mut().stderr.take() {
        spawn_pipe_collector(1, stderr, tx.clone());
        readers += 1;
    }
    drop(tx);

    let started = Instant::now();
    let deadline = started + options.timeout;

    let completion = loop {
        if is_cancelled(cancel) {
            info!(program = guard.program(), "batch generator cancelled");
            guard.terminate();
            break Completion::Cancelled;
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                program = guard.program(),
                timeout_ms = options.timeout.as_millis() as u64,
                "batch generator timed out"
            );
            guard.terminate();
            break Completion::TimedOut;
        }

        if let Some(status) = guard.wait_for(options.poll_interval.min(deadline - now))? {
            break Completion::Exited(status);
        }
    };

    // A grandchild holding the pipe open must not hang the caller.
    let mut slots: [Vec<u8>; 2] = [Vec::new(), Vec::new()];
    for _ in 0..readers {
        match rx.recv_timeout(options.grace_period) {
            Ok((index, bytes)) => slots[index] = bytes,
            Err(_) => break,
        }
    }
    let [stdout, stderr] = slots;
    let mut text = String::from_utf8_lossy(&stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&stderr));

    debug!(
        program = guard.program(),
        bytes = text.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        ?completion,
        "batch generator finished"
    );

    Ok(BatchOutput { text, completion })
}

fn spawn_pipe_collector(index: usize, mut pipe: impl Read + Send + 'static, tx: Sender<(usize, Vec<u8>)>) {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        let _ = tx.send((index, bytes));
    });
}
