//! User-facing status lines on stderr.

use std::io::{IsTerminal, Write};

const SUCCESS_ICON: &str = "✓";
const WARNING_ICON: &str = "!";
const FAILURE_ICON: &str = "X";
const CLEAR_LINE: &str = "\r\x1b[2K";

/// Prints status lines on stderr. Icons and progress lines only appear on a terminal.
#[derive(Debug, Clone, Copy)]
pub struct Status {
    tty: bool,
}

impl Status {
    pub fn stderr() -> Self {
        Self {
            tty: std::io::stderr().is_terminal(),
        }
    }

    #[cfg(test)]
    pub fn quiet() -> Self {
        Self { tty: false }
    }

    fn line(&self, icon: &str, message: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = if self.tty {
            writeln!(stderr, "{icon} {message}")
        } else {
            writeln!(stderr, "{message}")
        };
    }

    pub fn success(&self, message: &str) {
        self.line(SUCCESS_ICON, message);
    }

    pub fn warning(&self, message: &str) {
        self.line(WARNING_ICON, message);
    }

    pub fn failure(&self, message: &str) {
        self.line(FAILURE_ICON, message);
    }

    pub fn info(&self, message: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{message}");
    }

    /// Transient progress, skipped when stderr is not a terminal.
    pub fn progress(&self, message: &str) {
        if self.tty {
            self.info(message);
        }
    }

    /// Rewrites the current terminal line in place.
    pub fn counter(&self, message: &str) {
        if self.tty {
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "{CLEAR_LINE}{message}");
            let _ = stderr.flush();
        }
    }

    pub fn clear_counter(&self) {
        if self.tty {
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, "{CLEAR_LINE}");
            let _ = stderr.flush();
        }
    }
}
