pub mod cli;
pub mod config;
pub mod host;
pub mod logging;
pub mod router;
pub mod server;
pub mod supervisor;
pub mod watcher;
pub mod workspace;

pub use config::{Settings, SettingsStore};
pub use host::{HostCommand, LogLevel, Notifier, TracingNotifier};
pub use router::{EventRouter, HostEvent, Operation};
pub use server::{PsalmServerLauncher, ServerLauncher, ServerProcess};
pub use supervisor::{
    ConfigurationError, ServerState, ServerSupervisor, SupervisorError, SupervisorHandle,
};
pub use watcher::{FileWatcher, NotifyFileWatcher, WatchEvent, WatchEventKind};
pub use workspace::{ConfigCandidateSet, ConfigResolver, FsWorkspace, Workspace, WorkspaceContext};
