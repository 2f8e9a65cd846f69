//! Ctrl-C handling for in-flight generations.
//!
//! The first SIGINT raises the shared cancel flag so the running generation
//! stops and returns its partial answer. A second SIGINT before the flag is
//! reset, or any SIGTERM, exits the process.

use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

use llm_provider::{cancel_signal, CancelSignal};

pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Owns the cancel flag and, on unix, the signal listener thread.
pub struct InterruptGuard {
    cancel: CancelSignal,
    #[cfg(unix)]
    handle: Option<signal_hook::iterator::Handle>,
    thread: Option<JoinHandle<()>>,
}

impl InterruptGuard {
    /// A guard with no signal listener, for tests and non-unix targets.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            cancel: cancel_signal(),
            #[cfg(unix)]
            handle: None,
            thread: None,
        }
    }

    #[must_use]
    pub fn cancel(&self) -> &CancelSignal {
        &self.cancel
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Clears the flag before the next generation.
    pub fn reset(&self) {
        self.cancel.store(false, Ordering::Release);
    }
}

/// Installs SIGINT/SIGTERM handling that drives the cancel flag.
#[cfg(unix)]
pub fn install_interrupt_handler() -> std::io::Result<InterruptGuard> {
    use libc::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::sync::Arc;
    use std::thread;

    let cancel = cancel_signal();
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    let flag = Arc::clone(&cancel);

    let thread = thread::spawn(move || {
        for signal in signals.forever() {
            if signal == SIGTERM || flag.swap(true, Ordering::AcqRel) {
                eprintln!();
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            tracing::info!("interrupt received; cancelling generation");
        }
    });

    Ok(InterruptGuard {
        cancel,
        handle: Some(handle),
        thread: Some(thread),
    })
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() -> std::io::Result<InterruptGuard> {
    Ok(InterruptGuard::detached())
}

impl InterruptGuard {
    #[cfg(unix)]
    fn close_listener(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
    }

    #[cfg(not(unix))]
    fn close_listener(&mut self) {}
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.close_listener();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
