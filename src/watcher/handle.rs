//! File-watch surface: watchers, handles, and bindings.

use std::fmt;
use std::path::{Path, PathBuf};

use super::WatchError;

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Changed,
    Created,
    Deleted,
}

impl fmt::Display for WatchEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WatchEventKind::Changed => "changed",
            WatchEventKind::Created => "created",
            WatchEventKind::Deleted => "deleted",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// A live subscription to one path. Dropping it disposes it.
pub trait WatchHandle: Send {
    fn path(&self) -> &Path;

    /// Stop delivering events. Calling it again does nothing.
    fn dispose(&mut self);
}

/// Creates watch handles. Events go wherever the implementation was told to send them.
pub trait FileWatcher: Send + Sync {
    fn watch(&self, path: &Path) -> Result<Box<dyn WatchHandle>, WatchError>;
}

/// The single active watch, tied to the path it was created for.
pub struct WatchBinding {
    path: PathBuf,
    handle: Box<dyn WatchHandle>,
}

impl WatchBinding {
    /// Watch `path` through `watcher`.
    pub fn bind(watcher: &dyn FileWatcher, path: &Path) -> Result<Self, WatchError> {
        let handle = watcher.watch(path)?;
        crate::debug_event!("watcher", "bound", "{}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            handle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the handle. Completes before returning.
    pub fn dispose(mut self) {
        self.handle.dispose();
        crate::debug_event!("watcher", "disposed", "{}", self.path.display());
    }
}

impl fmt::Debug for WatchBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchBinding")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    struct TestHandle {
        path: PathBuf,
        log: Arc<Log>,
        disposed: bool,
    }

    impl WatchHandle for TestHandle {
        fn path(&self) -> &Path {
            &self.path
        }

        fn dispose(&mut self) {
            if !self.disposed {
                self.disposed = true;
                self.log.0.lock().push(format!("dispose {}", self.path.display()));
            }
        }
    }

    struct TestWatcher(Arc<Log>);

    impl FileWatcher for TestWatcher {
        fn watch(&self, path: &Path) -> Result<Box<dyn WatchHandle>, WatchError> {
            self.0.lock_push(format!("watch {}", path.display()));
            Ok(Box::new(TestHandle {
                path: path.to_path_buf(),
                log: self.0.clone(),
                disposed: false,
            }))
        }
    }

    impl Log {
        fn lock_push(&self, entry: String) {
            self.0.lock().push(entry);
        }
    }

    #[test]
    fn test_rebinding_disposes_before_watching() {
        let log = Arc::new(Log::default());
        let watcher = TestWatcher(log.clone());

        let first = WatchBinding::bind(&watcher, Path::new("/a/psalm.xml")).unwrap();
        assert_eq!(first.path(), Path::new("/a/psalm.xml"));
        first.dispose();
        let second = WatchBinding::bind(&watcher, Path::new("/b/psalm.xml")).unwrap();
        assert_eq!(second.path(), Path::new("/b/psalm.xml"));

        assert_eq!(
            *log.0.lock(),
            vec![
                "watch /a/psalm.xml".to_string(),
                "dispose /a/psalm.xml".to_string(),
                "watch /b/psalm.xml".to_string(),
            ]
        );
    }

    #[test]
    fn test_event_kind_display() {
        let event = WatchEvent::new(WatchEventKind::Deleted, "/a/psalm.xml");
        assert_eq!(event.kind.to_string(), "deleted");
        assert_eq!(event.path, PathBuf::from("/a/psalm.xml"));
    }
}
