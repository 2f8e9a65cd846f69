//! Progress indicator shown while a generation has produced nothing visible.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::terminal::ansi::CLEAR_LINE;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK: Duration = Duration::from_millis(80);
pub const DEFAULT_MESSAGE: &str = "Thinking...";

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Spinner thread. The only state shared with the caller is the stop flag
/// and the output handle it draws on.
pub struct Spinner {
    message: String,
    out: SharedWriter,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Starts drawing on stderr.
    #[must_use]
    pub fn start(message: impl Into<String>) -> Self {
        Self::start_with_writer(message, Box::new(io::stderr()))
    }

    #[must_use]
    pub fn start_with_writer(message: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        let mut spinner = Self {
            message: message.into(),
            out: Arc::new(Mutex::new(out)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
        };
        spinner.spawn();
        spinner
    }

    fn spawn(&mut self) {
        let stop_flag = Arc::clone(&self.stop_flag);
        let out = Arc::clone(&self.out);
        let message = self.message.clone();

        self.thread = Some(thread::spawn(move || {
            let mut frame = 0usize;
            while !stop_flag.load(Ordering::SeqCst) {
                {
                    let mut out = lock_unpoisoned(&out);
                    let symbol = SPINNER_FRAMES[frame % SPINNER_FRAMES.len()];
                    let _ = write!(out, "\r{symbol} {message}");
                    let _ = out.flush();
                }
                frame = frame.wrapping_add(1);
                thread::sleep(TICK);
            }
        }));
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stops the thread and erases its line. Idempotent.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            let mut out = lock_unpoisoned(&self.out);
            let _ = write!(out, "{CLEAR_LINE}");
            let _ = out.flush();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop();
    }
}
