//! Run command - supervise the language server from the terminal.
//!
//! The terminal stands in for the editor: stdin lines are commands or
//! `open <file>` focus changes, the settings file is watched for changes, and
//! Ctrl+C or `quit` shuts everything down.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::config::SettingsStore;
use crate::host::{HostCommand, Notifier, TracingNotifier};
use crate::router::{EventRouter, HostEvent};
use crate::server::PsalmServerLauncher;
use crate::supervisor::{ServerSupervisor, SupervisorError};
use crate::watcher::{FileWatcher, NotifyFileWatcher, WatchHandle};
use crate::workspace::FsWorkspace;

/// One line typed on the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(HostCommand),
    /// Focus moved to this document.
    Open(PathBuf),
    Quit,
    Empty,
    Unknown(String),
}

/// Parse a console line. Relative `open` paths are resolved against `cwd`;
/// `file://` URIs are accepted.
pub fn parse_console_line(line: &str, cwd: &Path) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Empty;
    }
    if matches!(line, "quit" | "exit" | "q") {
        return ConsoleInput::Quit;
    }
    if let Some(command) = HostCommand::parse(line) {
        return ConsoleInput::Command(command);
    }

    if let Some(target) = line.strip_prefix("open ").map(str::trim) {
        if target.starts_with("file://") {
            return match url::Url::parse(target).ok().and_then(|u| u.to_file_path().ok()) {
                Some(path) => ConsoleInput::Open(path),
                None => ConsoleInput::Unknown(line.to_string()),
            };
        }
        if !target.is_empty() {
            let path = Path::new(target);
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                cwd.join(path)
            };
            return ConsoleInput::Open(path);
        }
    }

    ConsoleInput::Unknown(line.to_string())
}

/// Run the supervisor until quit, end of input, or Ctrl+C.
pub async fn run(store: Arc<SettingsStore>, roots: Vec<PathBuf>) -> anyhow::Result<()> {
    let settings = store.snapshot();
    let cwd = std::env::current_dir().context("Failed to read current directory")?;

    let tracing_notifier = Arc::new(TracingNotifier::new(settings.psalm.log_level));
    tracing_notifier.set_hide_status_when_running(settings.psalm.hide_status_message_when_running);
    let notifier: Arc<dyn Notifier> = tracing_notifier.clone();

    let workspace = Arc::new(FsWorkspace::new(roots));
    let mut router = EventRouter::new(workspace, store.clone(), notifier.clone());

    let (context, candidates) = match router.initialize(None) {
        Ok(resolved) => resolved,
        Err(e) => {
            notifier.error(&e.to_string());
            return Err(e.into());
        }
    };

    let debounce = std::time::Duration::from_millis(settings.supervisor.debounce_ms);
    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel();
    let config_watcher: Arc<dyn FileWatcher> = Arc::new(NotifyFileWatcher::new(watch_tx, debounce));

    let launcher = Arc::new(PsalmServerLauncher::new(
        settings.psalm.clone(),
        notifier.clone(),
    ));
    let (handle, task) = ServerSupervisor::spawn(
        launcher,
        config_watcher,
        notifier.clone(),
        settings.supervisor.clone(),
    );

    handle.bind(context, candidates).await?;
    // Start failures are logged by the supervisor; keep running for commands
    let _ = handle.start().await;

    let (settings_tx, mut settings_rx) = mpsc::unbounded_channel();
    let settings_watcher = NotifyFileWatcher::new(settings_tx, debounce);
    let mut settings_watch: Option<Box<dyn WatchHandle>> = match store.path().parent() {
        Some(parent) if parent.is_dir() => match settings_watcher.watch(store.path()) {
            Ok(watch) => Some(watch),
            Err(e) => {
                notifier.warn(&format!("Not watching settings file: {e}"));
                None
            }
        },
        _ => None,
    };

    eprintln!("Type a command and press enter (restart, start, stop, output, open <file>, quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let outcome: Result<(), SupervisorError> = loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Received shutdown signal");
                break Ok(());
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_console_line(&line, &cwd) {
                    ConsoleInput::Command(command) => HostEvent::Command(command),
                    ConsoleInput::Open(path) => HostEvent::ActiveEditorChanged { document: Some(path) },
                    ConsoleInput::Quit => break Ok(()),
                    ConsoleInput::Empty => continue,
                    ConsoleInput::Unknown(text) => {
                        eprintln!("Unknown command: {text}");
                        continue;
                    }
                },
                Ok(None) => break Ok(()),
                Err(e) => {
                    notifier.warn(&format!("Failed to read console input: {e}"));
                    stdin_open = false;
                    continue;
                }
            },
            Some(event) = watch_rx.recv() => HostEvent::Watch(event),
            Some(_) = settings_rx.recv() => match store.reinit() {
                Ok(keys) => {
                    let current = store.snapshot();
                    tracing_notifier.set_hide_status_when_running(
                        current.psalm.hide_status_message_when_running,
                    );
                    tracing_notifier.set_output_level(current.psalm.log_level);
                    HostEvent::SettingsChanged { keys }
                }
                Err(e) => {
                    notifier.error(&format!("Failed to reload settings: {e}"));
                    continue;
                }
            },
        };

        // Start, stop and workspace switches wait for their transition; stay
        // responsive to Ctrl+C meanwhile
        let dispatched = tokio::select! {
            result = router.handle(event, &handle) => result,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Received shutdown signal");
                break Ok(());
            }
        };
        if let Err(e) = dispatched {
            break Err(e);
        }
    };

    if let Some(mut watch) = settings_watch.take() {
        watch.dispose();
    }

    let shutdown = handle.shutdown().await;
    if let Err(e) = task.await {
        tracing::error!("Supervisor task failed: {e}");
    }

    outcome?;
    match shutdown {
        Ok(()) | Err(SupervisorError::Closed) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
