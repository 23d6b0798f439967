use std::fmt;

/// Lifecycle state of the supervised server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ServerState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Restarting,
}

impl ServerState {
    pub fn label(self) -> &'static str {
        match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Restarting => "restarting",
        }
    }

    /// A start request in this state has nothing to do.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ServerState::Starting | ServerState::Running | ServerState::Restarting
        )
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
