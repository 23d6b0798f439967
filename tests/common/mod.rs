//! Recording fakes for driving the supervisor and router without real processes.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use psalm_supervisor::config::SupervisorConfig;
use psalm_supervisor::host::{LogLevel, Notifier};
use psalm_supervisor::server::{ExitNotifier, ServerLauncher, ServerProcess, SpawnError};
use psalm_supervisor::supervisor::{ServerState, ServerSupervisor, SupervisorHandle};
use psalm_supervisor::watcher::{FileWatcher, WatchError, WatchHandle};
use globset::GlobSet;
use psalm_supervisor::workspace::{ConfigCandidateSet, Workspace, WorkspaceContext};

/// Notifier that keeps everything it is told.
#[derive(Default)]
pub struct RecordingNotifier {
    pub logs: Mutex<Vec<(LogLevel, String)>>,
    pub warnings: Mutex<Vec<String>>,
    pub statuses: Mutex<Vec<ServerState>>,
    pub output_shown: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn count(&self, level: LogLevel) -> usize {
        self.logs.lock().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.logs
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Everything except debug lines.
    pub fn visible(&self) -> usize {
        self.logs
            .lock()
            .iter()
            .filter(|(l, _)| *l != LogLevel::Debug)
            .count()
            + self.warnings.lock().len()
    }
}

impl Notifier for RecordingNotifier {
    fn log(&self, level: LogLevel, message: &str) {
        self.logs.lock().push((level, message.to_string()));
    }

    fn warn_user(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }

    fn set_status(&self, state: ServerState) {
        self.statuses.lock().push(state);
    }

    fn show_output(&self) {
        *self.output_shown.lock() += 1;
    }
}

/// Process fake. Shared flags record what the supervisor did to it.
pub struct FakeProcess {
    pub shutdown_requested: Arc<AtomicBool>,
    pub terminated: Arc<AtomicBool>,
}

#[async_trait]
impl ServerProcess for FakeProcess {
    async fn wait_ready(&mut self) -> Result<(), SpawnError> {
        Ok(())
    }

    async fn request_shutdown(&mut self) -> anyhow::Result<()> {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn force_terminate(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

/// One spawn as seen by the launcher.
pub struct Spawned {
    pub workspace_root: PathBuf,
    pub config_path: PathBuf,
    pub exits: ExitNotifier,
    pub shutdown_requested: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct RecordingLauncher {
    pub spawned: Mutex<Vec<Spawned>>,
}

impl RecordingLauncher {
    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().len()
    }

    pub fn configs(&self) -> Vec<PathBuf> {
        self.spawned
            .lock()
            .iter()
            .map(|s| s.config_path.clone())
            .collect()
    }

    /// Processes spawned and not yet asked to shut down.
    pub fn live(&self) -> usize {
        self.spawned
            .lock()
            .iter()
            .filter(|s| !s.shutdown_requested.load(Ordering::SeqCst))
            .count()
    }

    pub fn last_exits(&self) -> Option<ExitNotifier> {
        self.spawned.lock().last().map(|s| s.exits.clone())
    }
}

#[async_trait]
impl ServerLauncher for RecordingLauncher {
    async fn spawn(
        &self,
        workspace_root: &Path,
        config_path: &Path,
        exits: ExitNotifier,
    ) -> Result<Box<dyn ServerProcess>, SpawnError> {
        let shutdown_requested = Arc::new(AtomicBool::new(false));
        self.spawned.lock().push(Spawned {
            workspace_root: workspace_root.to_path_buf(),
            config_path: config_path.to_path_buf(),
            exits,
            shutdown_requested: shutdown_requested.clone(),
        });
        Ok(Box::new(FakeProcess {
            shutdown_requested,
            terminated: Arc::new(AtomicBool::new(false)),
        }))
    }
}

/// Watcher that tracks which paths are currently watched.
#[derive(Default)]
pub struct RecordingWatcher {
    active: Arc<Mutex<Vec<PathBuf>>>,
    pub created: Mutex<Vec<PathBuf>>,
}

impl RecordingWatcher {
    pub fn active(&self) -> Vec<PathBuf> {
        self.active.lock().clone()
    }
}

struct RecordingHandle {
    path: PathBuf,
    active: Arc<Mutex<Vec<PathBuf>>>,
    disposed: bool,
}

impl WatchHandle for RecordingHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        let mut active = self.active.lock();
        if let Some(i) = active.iter().position(|p| *p == self.path) {
            active.remove(i);
        }
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl FileWatcher for RecordingWatcher {
    fn watch(&self, path: &Path) -> Result<Box<dyn WatchHandle>, WatchError> {
        self.active.lock().push(path.to_path_buf());
        self.created.lock().push(path.to_path_buf());
        Ok(Box::new(RecordingHandle {
            path: path.to_path_buf(),
            active: self.active.clone(),
            disposed: false,
        }))
    }
}

pub struct Harness {
    pub handle: SupervisorHandle,
    pub notifier: Arc<RecordingNotifier>,
    pub launcher: Arc<RecordingLauncher>,
    pub watcher: Arc<RecordingWatcher>,
}

pub fn harness() -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    let launcher = Arc::new(RecordingLauncher::default());
    let watcher = Arc::new(RecordingWatcher::default());
    let timing = SupervisorConfig {
        shutdown_timeout_ms: 100,
        start_timeout_ms: 1_000,
        ..SupervisorConfig::default()
    };
    let (handle, _task) =
        ServerSupervisor::spawn(launcher.clone(), watcher.clone(), notifier.clone(), timing);
    Harness {
        handle,
        notifier,
        launcher,
        watcher,
    }
}

/// Context for `root` with the default patterns, selecting `selected`.
pub fn resolved(root: &str, selected: Option<&str>) -> (WorkspaceContext, ConfigCandidateSet) {
    let patterns = vec!["psalm.xml".to_string(), "psalm.xml.dist".to_string()];
    let context = WorkspaceContext::new(root, patterns.clone());
    let candidates = ConfigCandidateSet {
        patterns,
        matches: selected.iter().map(PathBuf::from).collect(),
        selected: selected.map(PathBuf::from),
    };
    (context, candidates)
}

/// In-memory workspace: fixed roots and a fixed file list.
pub struct FakeWorkspace {
    pub roots: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

impl FakeWorkspace {
    pub fn new(roots: &[&str], files: &[&str]) -> Self {
        Self {
            roots: roots.iter().map(PathBuf::from).collect(),
            files: files.iter().map(PathBuf::from).collect(),
        }
    }
}

impl Workspace for FakeWorkspace {
    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    fn root_for(&self, document: &Path) -> Option<PathBuf> {
        self.roots
            .iter()
            .filter(|root| document.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
    }

    fn find_files(&self, matcher: &GlobSet) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|file| {
                self.roots.iter().any(|root| {
                    file.strip_prefix(root)
                        .is_ok_and(|relative| matcher.is_match(relative))
                })
            })
            .cloned()
            .collect()
    }
}
