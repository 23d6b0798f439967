//! `notify`-backed implementation of the file-watch surface.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::debouncer::Debouncer;
use super::error::WatchError;
use super::handle::{FileWatcher, WatchEvent, WatchEventKind, WatchHandle};

/// Watches single files and forwards their events to one channel.
///
/// Each handle watches the file's parent directory non-recursively, so a
/// file that is deleted and recreated keeps being observed.
#[derive(Debug, Clone)]
pub struct NotifyFileWatcher {
    events: mpsc::UnboundedSender<WatchEvent>,
    debounce: Duration,
}

impl NotifyFileWatcher {
    pub fn new(events: mpsc::UnboundedSender<WatchEvent>, debounce: Duration) -> Self {
        Self { events, debounce }
    }
}

impl FileWatcher for NotifyFileWatcher {
    fn watch(&self, path: &Path) -> Result<Box<dyn WatchHandle>, WatchError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| WatchError::InitFailed {
                reason: e.to_string(),
            })?;

        let file_name = path
            .file_name()
            .ok_or_else(|| WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: "path has no file name".to_string(),
            })?
            .to_os_string();

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = raw_tx.send(res);
        })?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: parent.clone(),
                reason: e.to_string(),
            })?;

        let forwarder = Forwarder {
            target: path.to_path_buf(),
            file_name,
            sink: self.events.clone(),
            debouncer: Debouncer::new(self.debounce),
        };
        let task = runtime.spawn(forwarder.run(raw_rx));

        crate::debug_event!("watcher", "watching", "{}", parent.display());

        Ok(Box::new(NotifyWatchHandle {
            path: path.to_path_buf(),
            watcher: Some(watcher),
            task: Some(task),
        }))
    }
}

struct NotifyWatchHandle {
    path: PathBuf,
    watcher: Option<notify::RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle for NotifyWatchHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dispose(&mut self) {
        // Dropping the watcher closes the raw channel; abort covers a pending debounce
        self.watcher.take();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for NotifyWatchHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct Forwarder {
    target: PathBuf,
    file_name: std::ffi::OsString,
    sink: mpsc::UnboundedSender<WatchEvent>,
    debouncer: Debouncer,
}

impl Forwarder {
    async fn run(mut self, mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>) {
        loop {
            let deadline = self.debouncer.next_deadline();

            tokio::select! {
                res = raw_rx.recv() => {
                    match res {
                        Some(Ok(event)) => {
                            if !self.handle_event(event) {
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            let err = WatchError::EventError { details: e.to_string() };
                            tracing::warn!("[watcher] {err}");
                        }
                        None => return,
                    }
                }

                _ = wait_until(deadline) => {
                    for (path, kind) in self.debouncer.take_ready() {
                        // Rename-over can surface as a modify of a file that is gone
                        let kind = if path.exists() { kind } else { WatchEventKind::Deleted };
                        if !self.send(kind) {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Returns false once nobody is listening.
    fn handle_event(&mut self, event: Event) -> bool {
        let ours = event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(self.file_name.as_os_str()));
        if !ours {
            return true;
        }

        match event.kind {
            EventKind::Create(_) => {
                self.debouncer.record(self.target.clone(), WatchEventKind::Created);
                true
            }
            EventKind::Modify(_) => {
                self.debouncer.record(self.target.clone(), WatchEventKind::Changed);
                true
            }
            EventKind::Remove(_) => {
                self.debouncer.remove(&self.target);
                self.send(WatchEventKind::Deleted)
            }
            _ => true,
        }
    }

    fn send(&self, kind: WatchEventKind) -> bool {
        crate::debug_event!("watcher", kind, "{}", self.target.display());
        self.sink
            .send(WatchEvent::new(kind, self.target.clone()))
            .is_ok()
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
