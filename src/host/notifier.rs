//! Notification surface: log output, user warnings, and the status indicator.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::supervisor::ServerState;

/// Lines kept for "show output".
const DEFAULT_OUTPUT_CAPACITY: usize = 500;

/// Severity of a supervisor log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything the supervisor reports to the outside world goes through here.
pub trait Notifier: Send + Sync {
    /// Append a line to the log output.
    fn log(&self, level: LogLevel, message: &str);

    /// Prompt the user with a warning that needs their attention.
    fn warn_user(&self, message: &str);

    /// Reflect the current server state in the status indicator.
    fn set_status(&self, state: ServerState);

    /// Reveal the log output.
    fn show_output(&self);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Bounded buffer of recent output lines.
#[derive(Debug)]
pub struct OutputBuffer {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_CAPACITY)
    }
}

/// Notifier for terminal use.
///
/// Log lines go to `tracing` and, when at or above the configured
/// [`LogLevel`], into an [`OutputBuffer`]. Warnings and status changes are
/// written to stderr.
pub struct TracingNotifier {
    output: OutputBuffer,
    level: RwLock<LogLevel>,
    hide_status_when_running: AtomicBool,
}

impl TracingNotifier {
    pub fn new(level: LogLevel) -> Self {
        Self {
            output: OutputBuffer::default(),
            level: RwLock::new(level),
            hide_status_when_running: AtomicBool::new(false),
        }
    }

    /// Change the output threshold (settings reload).
    pub fn set_output_level(&self, level: LogLevel) {
        *self.level.write() = level;
    }

    pub fn set_hide_status_when_running(&self, hide: bool) {
        self.hide_status_when_running.store(hide, Ordering::Relaxed);
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    fn status_text(&self, state: ServerState) -> Option<String> {
        if state == ServerState::Running && self.hide_status_when_running.load(Ordering::Relaxed) {
            return None;
        }
        Some(format!("Psalm: {}", state.label()))
    }
}

impl Default for TracingNotifier {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl Notifier for TracingNotifier {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "psalm", "{message}"),
            LogLevel::Info => tracing::info!(target: "psalm", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "psalm", "{message}"),
            LogLevel::Error => tracing::error!(target: "psalm", "{message}"),
        }

        if level >= *self.level.read() {
            let stamp = chrono::Local::now().format("%H:%M:%S%.3f");
            self.output.push(format!("[{stamp}] {level} {message}"));
        }
    }

    fn warn_user(&self, message: &str) {
        tracing::warn!(target: "psalm", "{message}");
        eprintln!("Warning: {message}");
    }

    fn set_status(&self, state: ServerState) {
        crate::debug_event!("status", "changed", "{}", state.label());
        if let Some(text) = self.status_text(state) {
            eprintln!("{text}");
        }
    }

    fn show_output(&self) {
        let lines = self.output.lines();
        if lines.is_empty() {
            eprintln!("(no output yet)");
            return;
        }
        for line in lines {
            eprintln!("{line}");
        }
    }
}
