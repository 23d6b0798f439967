//! Debouncing for config file change events.
//!
//! Editors often write a file several times per save (temp file, rename,
//! touch). Only the last event in a quiet period is forwarded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::WatchEventKind;

/// Debounces change events by path.
///
/// Records change timestamps and returns paths that have been stable
/// for the configured duration.
#[derive(Debug)]
pub struct Debouncer {
    /// Pending changes: path -> (last change, kind to report).
    pending: HashMap<PathBuf, (Instant, WatchEventKind)>,
    duration: Duration,
}

impl Debouncer {
    pub fn new(duration: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            duration,
        }
    }

    /// Record an event and restart the quiet period for its path.
    ///
    /// A pending `Created` is not downgraded by a later `Changed`.
    pub fn record(&mut self, path: PathBuf, kind: WatchEventKind) {
        let kind = match self.pending.get(&path) {
            Some((_, WatchEventKind::Created)) if kind == WatchEventKind::Changed => {
                WatchEventKind::Created
            }
            _ => kind,
        };
        self.pending.insert(path, (Instant::now(), kind));
    }

    /// Drop a pending event (the file was deleted).
    pub fn remove(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Take every event that has been quiet for the debounce duration.
    pub fn take_ready(&mut self) -> Vec<(PathBuf, WatchEventKind)> {
        let now = Instant::now();
        let mut ready = Vec::new();

        self.pending.retain(|path, (last_change, kind)| {
            if now.duration_since(*last_change) >= self.duration {
                ready.push((path.clone(), *kind));
                false
            } else {
                true
            }
        });

        ready
    }

    /// When the earliest pending event becomes ready.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|(last_change, _)| *last_change + self.duration)
            .min()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
