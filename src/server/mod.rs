//! Process control surface for the analysis server.
//!
//! The supervisor only ever sees [`ServerLauncher`] and [`ServerProcess`].
//! [`PsalmServerLauncher`] is the production implementation: it runs the
//! Psalm language server under PHP and drives the LSP lifecycle handshake.

mod codec;
mod error;
mod launcher;
pub mod protocol;

pub use codec::{FrameReader, FrameWriter};
pub use error::SpawnError;
pub use launcher::{LanguageServerProcess, PsalmServerLauncher, ServerCommand};

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tokio::sync::mpsc;

/// How a server process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    Exited { code: Option<i32> },
    Failed(String),
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessExit::Exited { code: Some(code) } => write!(f, "exited with code {code}"),
            ProcessExit::Exited { code: None } => f.write_str("terminated by signal"),
            ProcessExit::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// An exit observed for the process spawned in `generation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitNotice {
    pub generation: u64,
    pub exit: ProcessExit,
}

/// Reports the exit of one spawned process back to its supervisor.
#[derive(Debug, Clone)]
pub struct ExitNotifier {
    generation: u64,
    tx: mpsc::UnboundedSender<ExitNotice>,
}

impl ExitNotifier {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<ExitNotice>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self, exit: ProcessExit) {
        let _ = self.tx.send(ExitNotice {
            generation: self.generation,
            exit,
        });
    }
}

/// Starts server processes.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    /// Launch a server for `workspace_root` configured by `config_path`.
    ///
    /// Returns once the process exists; readiness is awaited separately.
    async fn spawn(
        &self,
        workspace_root: &Path,
        config_path: &Path,
        exits: ExitNotifier,
    ) -> Result<Box<dyn ServerProcess>, SpawnError>;
}

/// A running server process.
#[async_trait]
pub trait ServerProcess: Send {
    /// Resolves when the server can accept work.
    async fn wait_ready(&mut self) -> Result<(), SpawnError>;

    /// Ask the server to shut down and wait for it to exit.
    ///
    /// Callers bound this with a timeout and escalate to [`force_terminate`].
    ///
    /// [`force_terminate`]: ServerProcess::force_terminate
    async fn request_shutdown(&mut self) -> anyhow::Result<()>;

    /// Kill the process and wait for it to be reaped.
    async fn force_terminate(&mut self);

    /// OS process id, if known.
    fn pid(&self) -> Option<u32> {
        None
    }
}
