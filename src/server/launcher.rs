//! Running the Psalm language server as a child process.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};

use super::codec::{FrameReader, FrameWriter};
use super::protocol::{self, Incoming};
use super::{ExitNotifier, ProcessExit, ServerLauncher, ServerProcess, SpawnError};
use crate::config::PsalmConfig;
use crate::host::Notifier;

const WRITER_QUEUE: usize = 64;

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Fully resolved command line for one server launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: PathBuf,
    pub script: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: PathBuf,
}

impl ServerCommand {
    /// `php [php args] <script> [script args] -c <config> [--verbose] [--use-ini-defaults]`
    pub fn build(config: &PsalmConfig, workspace_root: &Path, config_path: &Path) -> Self {
        let script = if config.psalm_script_path.is_absolute() {
            config.psalm_script_path.clone()
        } else {
            workspace_root.join(&config.psalm_script_path)
        };

        let mut args: Vec<OsString> = config
            .php_executable_args
            .iter()
            .map(OsString::from)
            .collect();
        args.push(script.clone().into_os_string());
        args.extend(config.psalm_script_args.iter().map(OsString::from));
        args.push("-c".into());
        args.push(config_path.as_os_str().to_owned());
        if config.enable_verbose {
            args.push("--verbose".into());
        }
        if config.enable_use_ini_defaults {
            args.push("--use-ini-defaults".into());
        }

        Self {
            program: PathBuf::from(&config.php_executable_path),
            script,
            args,
            current_dir: workspace_root.to_path_buf(),
        }
    }
}

impl fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Launches `psalm-language-server` through PHP.
pub struct PsalmServerLauncher {
    config: PsalmConfig,
    notifier: Arc<dyn Notifier>,
}

impl PsalmServerLauncher {
    pub fn new(config: PsalmConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }
}

#[async_trait]
impl ServerLauncher for PsalmServerLauncher {
    async fn spawn(
        &self,
        workspace_root: &Path,
        config_path: &Path,
        exits: ExitNotifier,
    ) -> Result<Box<dyn ServerProcess>, SpawnError> {
        let command = ServerCommand::build(&self.config, workspace_root, config_path);

        let program =
            which::which(&command.program).map_err(|e| SpawnError::ExecutableNotFound {
                program: command.program.display().to_string(),
                reason: e.to_string(),
            })?;

        if !command.script.is_file() {
            return Err(SpawnError::ExecutableNotFound {
                program: command.script.display().to_string(),
                reason: "file does not exist".to_string(),
            });
        }

        self.notifier
            .debug(&format!("Starting language server: {command}"));

        let child = Command::new(&program)
            .args(&command.args)
            .current_dir(&command.current_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpawnError::io(format!("spawn {}", program.display()), e))?;

        let process =
            LanguageServerProcess::attach(child, workspace_root, exits, self.notifier.clone())?;
        Ok(Box::new(process))
    }
}

/// An LSP server child with its I/O tasks.
///
/// Dropping it kills the process.
pub struct LanguageServerProcess {
    workspace_root: PathBuf,
    pid: Option<u32>,
    writer_tx: mpsc::Sender<Value>,
    pending: PendingReplies,
    next_id: u64,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<Option<ProcessExit>>,
}

impl LanguageServerProcess {
    /// Take over a spawned child whose stdio is piped.
    pub fn attach(
        mut child: Child,
        workspace_root: &Path,
        exits: ExitNotifier,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, SpawnError> {
        let stdin = child.stdin.take().ok_or_else(|| not_piped("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| not_piped("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| not_piped("stderr"))?;
        let pid = child.id();

        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let (writer_tx, writer_rx) = mpsc::channel(WRITER_QUEUE);
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(None);

        tokio::spawn(write_frames(stdin, writer_rx));
        tokio::spawn(read_frames(
            stdout,
            pending.clone(),
            writer_tx.clone(),
            notifier.clone(),
        ));
        tokio::spawn(forward_stderr(stderr, notifier));
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let exit = match status {
                Ok(status) => ProcessExit::Exited {
                    code: status.code(),
                },
                Err(e) => ProcessExit::Failed(e.to_string()),
            };
            crate::debug_event!("server", "exit", "generation {}: {exit}", exits.generation());
            let _ = exited_tx.send(Some(exit.clone()));
            exits.notify(exit);
        });

        Ok(Self {
            workspace_root: workspace_root.to_path_buf(),
            pid,
            writer_tx,
            pending,
            next_id: 1,
            kill_tx: Some(kill_tx),
            exited: exited_rx,
        })
    }

    fn exit_status(&self) -> Option<ProcessExit> {
        self.exited.borrow().clone()
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if self
            .writer_tx
            .send(protocol::request(id, method, params))
            .await
            .is_err()
        {
            self.pending.lock().remove(&id);
            bail!("server input closed");
        }

        let mut exited = self.exited.clone();
        tokio::select! {
            reply = rx => reply.map_err(|_| anyhow!("no reply to {method}")),
            exit = wait_for_exit(&mut exited) => {
                self.pending.lock().remove(&id);
                Err(anyhow!("server {exit} before replying to {method}"))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.writer_tx
            .send(protocol::notification(method, params))
            .await
            .map_err(|_| anyhow!("server input closed"))
    }
}

#[async_trait]
impl ServerProcess for LanguageServerProcess {
    async fn wait_ready(&mut self) -> Result<(), SpawnError> {
        let params = protocol::initialize_params(&self.workspace_root).ok_or_else(|| {
            SpawnError::Handshake(format!(
                "workspace root {} is not an absolute path",
                self.workspace_root.display()
            ))
        })?;

        let reply = match self.request("initialize", Some(params)).await {
            Ok(reply) => reply,
            Err(e) => {
                return Err(match self.exit_status() {
                    Some(exit) => exited_early(&exit),
                    None => SpawnError::Handshake(format!("{e:#}")),
                });
            }
        };

        if let Some(message) = protocol::response_error(&reply) {
            return Err(SpawnError::Handshake(message));
        }

        self.notify("initialized", Some(json!({})))
            .await
            .map_err(|e| SpawnError::Handshake(e.to_string()))
    }

    async fn request_shutdown(&mut self) -> Result<()> {
        if self.exit_status().is_some() {
            return Ok(());
        }

        let reply = self.request("shutdown", None).await?;
        if let Some(message) = protocol::response_error(&reply) {
            bail!("shutdown refused: {message}");
        }
        self.notify("exit", None).await?;

        let mut exited = self.exited.clone();
        wait_for_exit(&mut exited).await;
        Ok(())
    }

    async fn force_terminate(&mut self) {
        if let Some(kill) = self.kill_tx.take() {
            let _ = kill.send(());
        }
        let mut exited = self.exited.clone();
        wait_for_exit(&mut exited).await;
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

fn not_piped(stream: &str) -> SpawnError {
    SpawnError::io(
        format!("capture server {stream}"),
        std::io::Error::other(format!("{stream} was not piped")),
    )
}

fn exited_early(exit: &ProcessExit) -> SpawnError {
    let code = match exit {
        ProcessExit::Exited { code } => *code,
        ProcessExit::Failed(_) => None,
    };
    SpawnError::ExitedEarly { code }
}

async fn wait_for_exit(exited: &mut watch::Receiver<Option<ProcessExit>>) -> ProcessExit {
    match exited.wait_for(Option::is_some).await {
        Ok(exit) => exit
            .clone()
            .unwrap_or_else(|| ProcessExit::Failed("exit status unavailable".to_string())),
        Err(_) => ProcessExit::Failed("exit watcher dropped".to_string()),
    }
}

async fn write_frames(stdin: ChildStdin, mut queue: mpsc::Receiver<Value>) {
    let mut writer = FrameWriter::new(stdin);
    while let Some(message) = queue.recv().await {
        if let Err(e) = writer.send(&message).await {
            crate::debug_event!("server", "write failed", "{e:#}");
            break;
        }
    }
}

async fn read_frames(
    stdout: ChildStdout,
    pending: PendingReplies,
    writer_tx: mpsc::Sender<Value>,
    notifier: Arc<dyn Notifier>,
) {
    let mut reader = FrameReader::new(stdout);
    loop {
        match reader.next_message().await {
            Ok(Some(message)) => dispatch(&message, &pending, &writer_tx, notifier.as_ref()).await,
            Ok(None) => {
                crate::debug_event!("server", "stdout closed");
                break;
            }
            Err(e) => {
                tracing::warn!("[server] unreadable output: {e:#}");
                break;
            }
        }
    }
}

async fn dispatch(
    message: &Value,
    pending: &PendingReplies,
    writer_tx: &mpsc::Sender<Value>,
    notifier: &dyn Notifier,
) {
    let Some(incoming) = Incoming::classify(message) else {
        tracing::trace!("[server] ignoring malformed message");
        return;
    };

    match incoming {
        Incoming::Response { id, body } => {
            let waiter = pending.lock().remove(&id);
            if let Some(waiter) = waiter {
                let _ = waiter.send(body);
            }
        }
        Incoming::Request { id, method } => {
            // Unanswered server requests can stall the server
            crate::debug_event!("server", "refusing request", "{method}");
            let _ = writer_tx
                .send(protocol::method_not_found(id, &method))
                .await;
        }
        Incoming::Notification { method, params } => {
            let text = params
                .as_ref()
                .and_then(|p| p.get("message"))
                .and_then(Value::as_str);
            match (method.as_str(), text) {
                ("window/logMessage", Some(text)) => notifier.debug(text),
                ("window/showMessage", Some(text)) => {
                    let is_error = params
                        .as_ref()
                        .and_then(|p| p.get("type"))
                        .and_then(Value::as_u64)
                        == Some(1);
                    if is_error {
                        notifier.error(text);
                    } else {
                        notifier.info(text);
                    }
                }
                _ => tracing::trace!("[server] ignoring notification {method}"),
            }
        }
    }
}

async fn forward_stderr(stderr: ChildStderr, notifier: Arc<dyn Notifier>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        notifier.debug(&line);
    }
}
