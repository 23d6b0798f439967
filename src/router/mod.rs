//! Turns host events into supervisor operations.
//!
//! [`EventRouter::route`] is the decision: it maps one [`HostEvent`] to at most
//! one [`Operation`] and filters out events that must not cause any action.
//! [`EventRouter::dispatch`] applies an operation to a [`SupervisorHandle`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SettingsStore;
use crate::host::{HostCommand, Notifier};
use crate::supervisor::{ConfigurationError, SupervisorError, SupervisorHandle};
use crate::watcher::{WatchEvent, WatchEventKind};
use crate::workspace::{
    ConfigCandidateSet, ConfigResolver, Workspace, WorkspaceContext, active_root,
    glob_alternation,
};

/// Settings namespace that concerns the server.
pub const SETTINGS_SECTION: &str = "psalm";

/// Cosmetic setting whose changes never trigger anything.
pub const COSMETIC_SETTING: &str = "psalm.hide_status_message_when_running";

pub const RELOAD_REQUIRED_MESSAGE: &str =
    "You will need to reload this window for the new configuration to take effect";

/// Something that happened in the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Focus moved to another document, or to none.
    ActiveEditorChanged { document: Option<PathBuf> },
    /// Settings changed; `keys` are the dotted keys that differ.
    SettingsChanged { keys: Vec<String> },
    Watch(WatchEvent),
    Command(HostCommand),
}

/// What the supervisor (or the output surface) should do.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Start,
    Stop,
    Restart,
    ShowOutput,
    /// Switch to another workspace: rebind the watch, set both paths, restart.
    Reconfigure {
        context: WorkspaceContext,
        candidates: ConfigCandidateSet,
    },
    /// Tell the user a reload is needed and re-read settings.
    ReloadSettings,
}

impl From<HostCommand> for Operation {
    fn from(command: HostCommand) -> Self {
        match command {
            HostCommand::RestartServer => Operation::Restart,
            HostCommand::StartServer => Operation::Start,
            HostCommand::StopServer => Operation::Stop,
            HostCommand::ShowOutput => Operation::ShowOutput,
        }
    }
}

/// True when `keys` should lead to a settings reload.
pub fn settings_change_applies(keys: &[String]) -> bool {
    let in_section = keys.iter().any(|key| {
        key == SETTINGS_SECTION
            || key
                .strip_prefix(SETTINGS_SECTION)
                .is_some_and(|rest| rest.starts_with('.'))
    });
    in_section && !keys.iter().any(|key| key == COSMETIC_SETTING)
}

pub struct EventRouter {
    resolver: ConfigResolver,
    settings: Arc<SettingsStore>,
    notifier: Arc<dyn Notifier>,
    /// Root the supervisor was last pointed at.
    workspace_root: Option<PathBuf>,
    /// Config path the watch is bound to.
    config_path: Option<PathBuf>,
}

impl EventRouter {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        settings: Arc<SettingsStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            resolver: ConfigResolver::new(workspace),
            settings,
            notifier,
            workspace_root: None,
            config_path: None,
        }
    }

    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Resolve the initial workspace and config for the focused `document`.
    ///
    /// An empty candidate set is returned as-is; starting against it fails later
    /// and that refusal is the one error the user sees.
    pub fn initialize(
        &mut self,
        document: Option<&Path>,
    ) -> Result<(WorkspaceContext, ConfigCandidateSet), ConfigurationError> {
        let root = active_root(self.resolver.workspace().as_ref(), document)
            .ok_or(ConfigurationError::NoWorkspaceRoot)?;
        let (context, candidates) = self.resolve_for(root)?;

        if candidates.matches.is_empty() {
            // Reported once, by the supervisor refusing to start
            self.notifier.debug(&format!(
                "No Psalm XML config matches {}",
                glob_alternation(&context.config_search_patterns)
            ));
        } else {
            self.notifier.debug(&format!(
                "Found the following Psalm XML configs: {}",
                join_paths(&candidates.matches)
            ));
        }
        if let Some(selected) = &candidates.selected {
            self.notifier
                .debug(&format!("Selecting config file: {}", selected.display()));
        }

        self.workspace_root = Some(context.workspace_root.clone());
        self.config_path = candidates.selected.clone();
        Ok((context, candidates))
    }

    /// Decide what `event` means. `None` means the event is filtered out.
    pub fn route(&mut self, event: HostEvent) -> Option<Operation> {
        match event {
            HostEvent::Command(command) => Some(command.into()),

            HostEvent::Watch(WatchEvent { kind, path }) => {
                if self.config_path.as_deref() != Some(path.as_path()) {
                    crate::debug_event!("router", "unbound path", "{}", path.display());
                    return None;
                }
                match kind {
                    WatchEventKind::Changed | WatchEventKind::Created => {
                        self.notifier
                            .info(&format!("Config file {kind}: {}", path.display()));
                        Some(Operation::Restart)
                    }
                    WatchEventKind::Deleted => {
                        self.notifier
                            .info(&format!("Config file deleted: {}", path.display()));
                        Some(Operation::Stop)
                    }
                }
            }

            HostEvent::SettingsChanged { keys } => {
                if !settings_change_applies(&keys) {
                    crate::debug_event!("router", "settings ignored", "{}", keys.join(","));
                    return None;
                }
                Some(Operation::ReloadSettings)
            }

            HostEvent::ActiveEditorChanged { document } => {
                let document = document?;
                let root = active_root(self.resolver.workspace().as_ref(), Some(&document))?;

                // Focus churn inside one workspace must not restart anything
                if self.workspace_root.as_deref() == Some(root.as_path()) {
                    return None;
                }

                match self.resolve_for(root) {
                    Ok((context, candidates)) => {
                        self.workspace_root = Some(context.workspace_root.clone());
                        self.config_path = candidates.selected.clone();
                        Some(Operation::Reconfigure {
                            context,
                            candidates,
                        })
                    }
                    Err(e) => {
                        self.notifier.error(&e.to_string());
                        None
                    }
                }
            }
        }
    }

    /// Apply `operation`. Only a closed supervisor is reported as an error;
    /// start and configuration failures have already been logged by the supervisor.
    ///
    /// Restarts return once queued; use [`SupervisorHandle::flush`] to wait for them.
    pub async fn dispatch(
        &self,
        operation: Operation,
        supervisor: &SupervisorHandle,
    ) -> Result<(), SupervisorError> {
        let result = match operation {
            Operation::Start => supervisor.start().await,
            Operation::Stop => supervisor.stop().await,
            // Queued without waiting: restarts that pile up behind an in-flight one
            // are coalesced by the supervisor
            Operation::Restart => supervisor.request_restart(),
            Operation::ShowOutput => {
                self.notifier.show_output();
                Ok(())
            }
            Operation::Reconfigure {
                context,
                candidates,
            } => {
                self.notifier.info(&format!(
                    "Workspace changed: {}",
                    context.workspace_root.display()
                ));
                supervisor.reconfigure(context, candidates).await
            }
            Operation::ReloadSettings => {
                self.notifier.debug("Configuration changed");
                self.notifier.warn_user(RELOAD_REQUIRED_MESSAGE);
                if let Err(e) = self.settings.reinit() {
                    self.notifier
                        .error(&format!("Failed to reload settings: {e}"));
                }
                Ok(())
            }
        };

        match result {
            Err(SupervisorError::Closed) => Err(SupervisorError::Closed),
            _ => Ok(()),
        }
    }

    /// [`route`](Self::route) then [`dispatch`](Self::dispatch).
    pub async fn handle(
        &mut self,
        event: HostEvent,
        supervisor: &SupervisorHandle,
    ) -> Result<(), SupervisorError> {
        match self.route(event) {
            Some(operation) => self.dispatch(operation, supervisor).await,
            None => Ok(()),
        }
    }

    fn resolve_for(
        &self,
        root: PathBuf,
    ) -> Result<(WorkspaceContext, ConfigCandidateSet), ConfigurationError> {
        let patterns: Vec<String> = self
            .settings
            .get("psalm.config_paths")
            .unwrap_or_else(|_| self.settings.snapshot().psalm.config_paths.clone());

        let context = WorkspaceContext::new(root, patterns);
        let candidates = self.resolver.resolve(&context)?;
        Ok((context, candidates))
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
