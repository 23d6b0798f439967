//! Server lifecycle supervisor.
//!
//! One [`ServerSupervisor`] task owns everything that describes the server:
//! workspace root, config path, run state, process handle, and the config
//! file watch. Callers talk to it through a cloneable [`SupervisorHandle`];
//! requests are applied strictly one after another.
//!
//! ```text
//! Stopped ─start─> Starting ─ready─> Running ─stop─> Stopping ─> Stopped
//!                                    Running ─restart─> Restarting ─> Starting ─> Running
//! ```

mod error;
mod state;

pub use error::{ConfigurationError, SupervisorError};
pub use state::ServerState;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::SupervisorConfig;
use crate::host::Notifier;
use crate::server::{ExitNotice, ExitNotifier, ServerLauncher, ServerProcess, SpawnError};
use crate::watcher::{FileWatcher, WatchBinding};
use crate::workspace::{ConfigCandidateSet, WorkspaceContext};

type Reply = oneshot::Sender<Result<(), SupervisorError>>;

enum Request {
    Start,
    Stop,
    Restart,
    SetWorkspacePath(PathBuf),
    SetConfigPath(Option<PathBuf>),
    Rebind {
        context: WorkspaceContext,
        candidates: ConfigCandidateSet,
        restart: bool,
    },
    /// Applies nothing; its reply means every earlier request is done.
    Flush,
    Shutdown,
}

struct Envelope {
    request: Request,
    reply: Option<Reply>,
}

impl Envelope {
    fn respond(self, result: Result<(), SupervisorError>) {
        if let Some(reply) = self.reply {
            let _ = reply.send(result);
        }
    }
}

/// Point-in-time view of the supervisor's fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorSnapshot {
    pub state: ServerState,
    pub workspace_root: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub watched_path: Option<PathBuf>,
    pub patterns: Vec<String>,
}

/// Owns the server process and applies lifecycle requests in order.
pub struct ServerSupervisor {
    launcher: Arc<dyn ServerLauncher>,
    watcher: Arc<dyn FileWatcher>,
    notifier: Arc<dyn Notifier>,
    timing: SupervisorConfig,

    workspace_root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    patterns: Vec<String>,
    state: ServerState,
    process: Option<Box<dyn ServerProcess>>,
    binding: Option<WatchBinding>,
    /// Bumped on every spawn and teardown; exit notices from older values are stale.
    generation: u64,

    requests: mpsc::UnboundedReceiver<Envelope>,
    backlog: VecDeque<Envelope>,
    exits_tx: mpsc::UnboundedSender<ExitNotice>,
    exits_rx: mpsc::UnboundedReceiver<ExitNotice>,
    state_tx: watch::Sender<ServerState>,
    snapshot_tx: watch::Sender<SupervisorSnapshot>,
}

impl ServerSupervisor {
    /// Start the supervisor task. It runs until [`SupervisorHandle::shutdown`]
    /// or until every handle is dropped.
    pub fn spawn(
        launcher: Arc<dyn ServerLauncher>,
        watcher: Arc<dyn FileWatcher>,
        notifier: Arc<dyn Notifier>,
        timing: SupervisorConfig,
    ) -> (SupervisorHandle, JoinHandle<()>) {
        let (tx, requests) = mpsc::unbounded_channel();
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ServerState::Stopped);
        let (snapshot_tx, snapshot_rx) = watch::channel(SupervisorSnapshot::default());

        let supervisor = Self {
            launcher,
            watcher,
            notifier,
            timing,
            workspace_root: None,
            config_path: None,
            patterns: Vec::new(),
            state: ServerState::Stopped,
            process: None,
            binding: None,
            generation: 0,
            requests,
            backlog: VecDeque::new(),
            exits_tx,
            exits_rx,
            state_tx,
            snapshot_tx,
        };

        let task = tokio::spawn(supervisor.run());
        let handle = SupervisorHandle {
            tx,
            state: state_rx,
            snapshot: snapshot_rx,
        };
        (handle, task)
    }

    async fn run(mut self) {
        crate::debug_event!("supervisor", "started");

        loop {
            // A queued request must not act on a process that has already exited
            while let Ok(notice) = self.exits_rx.try_recv() {
                self.on_exit(notice);
            }

            let envelope = match self.backlog.pop_front() {
                Some(envelope) => envelope,
                None => {
                    tokio::select! {
                        biased;
                        Some(notice) = self.exits_rx.recv() => {
                            self.on_exit(notice);
                            continue;
                        }
                        next = self.requests.recv() => match next {
                            Some(envelope) => envelope,
                            None => break,
                        },
                    }
                }
            };

            if matches!(envelope.request, Request::Shutdown) {
                self.stop().await;
                if let Some(binding) = self.binding.take() {
                    binding.dispose();
                }
                self.publish();
                envelope.respond(Ok(()));
                crate::debug_event!("supervisor", "shut down");
                return;
            }

            self.handle(envelope).await;
        }

        // Every handle dropped
        self.stop().await;
        if let Some(binding) = self.binding.take() {
            binding.dispose();
        }
        crate::debug_event!("supervisor", "closed");
    }

    async fn handle(&mut self, envelope: Envelope) {
        let Envelope { request, reply } = envelope;

        let result = match request {
            Request::Start => self.start().await,
            Request::Stop => {
                self.stop().await;
                Ok(())
            }
            Request::Restart => self.restart().await,
            Request::SetWorkspacePath(path) => {
                self.workspace_root = Some(path);
                Ok(())
            }
            Request::SetConfigPath(path) => {
                self.config_path = path;
                Ok(())
            }
            Request::Rebind {
                context,
                candidates,
                restart,
            } => {
                self.rebind(context, candidates);
                if restart {
                    self.restart().await
                } else {
                    Ok(())
                }
            }
            Request::Flush | Request::Shutdown => Ok(()),
        };

        self.publish();
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    async fn start(&mut self) -> Result<(), SupervisorError> {
        if self.state.is_active() {
            crate::debug_event!("supervisor", "start ignored", "already {}", self.state);
            return Ok(());
        }
        self.launch().await
    }

    /// Tear down any running process. Silent when already stopped.
    async fn stop(&mut self) {
        if self.state == ServerState::Stopped && self.process.is_none() {
            return;
        }
        self.set_state(ServerState::Stopping);
        self.teardown().await;
        self.set_state(ServerState::Stopped);
    }

    async fn restart(&mut self) -> Result<(), SupervisorError> {
        self.set_state(ServerState::Restarting);
        self.teardown().await;

        // A newer restart already queued will do the start; skip ours
        while let Ok(envelope) = self.requests.try_recv() {
            self.backlog.push_back(envelope);
        }
        if self
            .backlog
            .iter()
            .any(|queued| matches!(queued.request, Request::Restart | Request::Rebind { restart: true, .. }))
        {
            crate::debug_event!("supervisor", "restart superseded");
            return Ok(());
        }

        self.launch().await
    }

    /// Spawn a process against the current workspace and config, and wait for readiness.
    async fn launch(&mut self) -> Result<(), SupervisorError> {
        let (workspace_root, config_path) = match self.launch_target() {
            Ok(target) => target,
            Err(e) => {
                let message = e.to_string();
                self.notifier.error(&message);
                self.notifier.warn_user(&message);
                self.set_state(ServerState::Stopped);
                return Err(e.into());
            }
        };

        self.set_state(ServerState::Starting);
        self.generation += 1;
        let exits = ExitNotifier::new(self.generation, self.exits_tx.clone());

        self.notifier.debug(&format!(
            "Starting language server in {} with {}",
            workspace_root.display(),
            config_path.display()
        ));

        let mut process = match self
            .launcher
            .spawn(&workspace_root, &config_path, exits)
            .await
        {
            Ok(process) => process,
            Err(e) => return Err(self.start_failed(e)),
        };

        let ready = tokio::time::timeout(self.timing.start_timeout(), process.wait_ready()).await;
        let ready = match ready {
            Ok(result) => result,
            Err(_) => Err(SpawnError::ReadyTimeout(self.timing.start_timeout())),
        };

        if let Err(e) = ready {
            process.force_terminate().await;
            return Err(self.start_failed(e));
        }

        self.process = Some(process);
        self.set_state(ServerState::Running);
        self.notifier.info("Psalm language server started");
        crate::log_event!("supervisor", "running", "{}", config_path.display());
        Ok(())
    }

    fn launch_target(&self) -> Result<(PathBuf, PathBuf), ConfigurationError> {
        let workspace_root = self
            .workspace_root
            .clone()
            .ok_or(ConfigurationError::NoWorkspaceRoot)?;

        let config_path = match &self.config_path {
            Some(path) => path.clone(),
            None if self.patterns.is_empty() => {
                return Err(ConfigurationError::NoPatternsConfigured);
            }
            None => {
                return Err(ConfigurationError::NoConfigFile {
                    patterns: self.patterns.clone(),
                });
            }
        };

        Ok((workspace_root, config_path))
    }

    fn start_failed(&mut self, e: SpawnError) -> SupervisorError {
        let err = SupervisorError::Spawn(e);
        self.notifier.error(&err.to_string());
        self.set_state(ServerState::Stopped);
        err
    }

    /// Stop the current process: graceful request, then kill after the timeout.
    async fn teardown(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        // Its exit notice is expected from here on
        self.generation += 1;

        let limit = self.timing.shutdown_timeout();
        match tokio::time::timeout(limit, process.request_shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.notifier
                    .warn(&format!("Graceful shutdown failed ({e:#}); terminating"));
                process.force_terminate().await;
            }
            Err(_) => {
                self.notifier
                    .warn(&SupervisorError::ShutdownTimeout(limit).to_string());
                process.force_terminate().await;
            }
        }

        self.notifier.info("Psalm language server stopped");
    }

    fn rebind(&mut self, context: WorkspaceContext, candidates: ConfigCandidateSet) {
        // The old watch is gone before the new one exists
        if let Some(binding) = self.binding.take() {
            binding.dispose();
        }

        self.workspace_root = Some(context.workspace_root);
        self.patterns = context.config_search_patterns;
        self.config_path = candidates.selected;

        if let Some(path) = &self.config_path {
            match WatchBinding::bind(self.watcher.as_ref(), path) {
                Ok(binding) => self.binding = Some(binding),
                Err(e) => self
                    .notifier
                    .warn(&format!("Cannot watch {}: {e}", path.display())),
            }
        }
    }

    fn on_exit(&mut self, notice: ExitNotice) {
        if notice.generation != self.generation || self.process.is_none() {
            crate::debug_event!("supervisor", "stale exit", "generation {}", notice.generation);
            return;
        }

        self.process = None;
        self.generation += 1;
        self.notifier.error(&format!(
            "Psalm language server {}. Use the restart command to start it again",
            notice.exit
        ));
        self.set_state(ServerState::Stopped);
        self.publish();
    }

    fn set_state(&mut self, state: ServerState) {
        if self.state == state {
            return;
        }
        crate::debug_event!("supervisor", "state", "{} -> {}", self.state, state);
        self.state = state;
        self.state_tx.send_replace(state);
        self.notifier.set_status(state);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SupervisorSnapshot {
            state: self.state,
            workspace_root: self.workspace_root.clone(),
            config_path: self.config_path.clone(),
            watched_path: self.binding.as_ref().map(|b| b.path().to_path_buf()),
            patterns: self.patterns.clone(),
        });
    }
}

/// Cloneable front end to a running [`ServerSupervisor`].
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<Envelope>,
    state: watch::Receiver<ServerState>,
    snapshot: watch::Receiver<SupervisorSnapshot>,
}

impl SupervisorHandle {
    async fn call(&self, request: Request) -> Result<(), SupervisorError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                reply: Some(reply),
            })
            .map_err(|_| SupervisorError::Closed)?;
        response.await.map_err(|_| SupervisorError::Closed)?
    }

    /// Queue a request without waiting for it to be applied.
    fn post(&self, request: Request) -> Result<(), SupervisorError> {
        self.tx
            .send(Envelope {
                request,
                reply: None,
            })
            .map_err(|_| SupervisorError::Closed)
    }

    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.call(Request::Start).await
    }

    pub async fn stop(&self) -> Result<(), SupervisorError> {
        self.call(Request::Stop).await
    }

    pub async fn restart(&self) -> Result<(), SupervisorError> {
        self.call(Request::Restart).await
    }

    /// Queue a restart and return immediately.
    pub fn request_restart(&self) -> Result<(), SupervisorError> {
        self.post(Request::Restart)
    }

    /// Update the workspace root. Does not restart.
    pub async fn set_workspace_path(&self, path: PathBuf) -> Result<(), SupervisorError> {
        self.call(Request::SetWorkspacePath(path)).await
    }

    /// Update the config path. Does not restart.
    pub async fn set_config_path(&self, path: Option<PathBuf>) -> Result<(), SupervisorError> {
        self.call(Request::SetConfigPath(path)).await
    }

    /// Adopt a workspace context and its candidates, rebinding the config watch.
    pub async fn bind(
        &self,
        context: WorkspaceContext,
        candidates: ConfigCandidateSet,
    ) -> Result<(), SupervisorError> {
        self.call(Request::Rebind {
            context,
            candidates,
            restart: false,
        })
        .await
    }

    /// [`bind`](Self::bind) followed by a restart, as one transition.
    pub async fn reconfigure(
        &self,
        context: WorkspaceContext,
        candidates: ConfigCandidateSet,
    ) -> Result<(), SupervisorError> {
        self.call(Request::Rebind {
            context,
            candidates,
            restart: true,
        })
        .await
    }

    /// Resolves once every request queued before this one has been applied.
    pub async fn flush(&self) -> Result<(), SupervisorError> {
        self.call(Request::Flush).await
    }

    /// Stop the server, drop the watch, and end the supervisor task.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        self.call(Request::Shutdown).await
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.clone()
    }

    /// Fields as of the last applied request.
    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
