//! ANSI styling for the conversation surface.

/// ANSI escape codes
pub mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const ITALIC: &str = "\x1b[3m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    /// Carriage return plus erase-line.
    pub const CLEAR_LINE: &str = "\r\x1b[2K";
}

use ansi::*;

#[cfg(unix)]
fn is_terminal(fd: libc::c_int) -> bool {
    // SAFETY: isatty only inspects the descriptor.
    unsafe { libc::isatty(fd) == 1 }
}

#[cfg(not(unix))]
fn is_terminal(_fd: i32) -> bool {
    false
}

#[must_use]
pub fn stdout_is_terminal() -> bool {
    is_terminal(1)
}

#[must_use]
pub fn stderr_is_terminal() -> bool {
    is_terminal(2)
}

/// Wraps text in escape codes when enabled, and passes it through otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    enabled: bool,
}

impl Style {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Colors only when stdout is a terminal and `NO_COLOR` is unset.
    #[must_use]
    pub fn detect() -> Self {
        Self::new(stdout_is_terminal() && std::env::var_os("NO_COLOR").is_none())
    }

    #[must_use]
    pub fn plain() -> Self {
        Self::new(false)
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn paint(&self, codes: &str, text: &str) -> String {
        if self.enabled {
            format!("{codes}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    /// Raw escape prefix for text streamed in pieces.
    #[must_use]
    pub fn open_thinking(&self) -> &'static str {
        if self.enabled {
            "\x1b[2m\x1b[3m"
        } else {
            ""
        }
    }

    #[must_use]
    pub fn reset(&self) -> &'static str {
        if self.enabled {
            RESET
        } else {
            ""
        }
    }

    /// Thinking text (dim italic)
    #[must_use]
    pub fn thinking(&self, text: &str) -> String {
        self.paint(&format!("{DIM}{ITALIC}"), text)
    }

    #[must_use]
    pub fn header(&self, text: &str) -> String {
        self.paint(&format!("{BOLD}{CYAN}"), text)
    }

    #[must_use]
    pub fn status(&self, text: &str) -> String {
        self.paint(GRAY, text)
    }

    #[must_use]
    pub fn success(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    #[must_use]
    pub fn warning(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    #[must_use]
    pub fn error(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    #[must_use]
    pub fn prompt(&self) -> String {
        if self.enabled {
            format!("{BOLD}{CYAN}You:{RESET} ")
        } else {
            "You: ".to_string()
        }
    }

    #[must_use]
    pub fn continuation_prompt(&self) -> String {
        self.paint(GRAY, "... ")
    }
}
