//! Named actions the host can invoke.

/// Commands exposed to the host. Each maps to exactly one router operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCommand {
    RestartServer,
    StartServer,
    StopServer,
    ShowOutput,
}

impl HostCommand {
    pub const ALL: [HostCommand; 4] = [
        HostCommand::RestartServer,
        HostCommand::StartServer,
        HostCommand::StopServer,
        HostCommand::ShowOutput,
    ];

    /// Stable identifier used by editor integrations.
    pub fn id(self) -> &'static str {
        match self {
            HostCommand::RestartServer => "psalm.restartPsalmServer",
            HostCommand::StartServer => "psalm.startPsalmServer",
            HostCommand::StopServer => "psalm.stopPsalmServer",
            HostCommand::ShowOutput => "psalm.showOutput",
        }
    }

    /// Short name typed on the interactive console.
    pub fn short_name(self) -> &'static str {
        match self {
            HostCommand::RestartServer => "restart",
            HostCommand::StartServer => "start",
            HostCommand::StopServer => "stop",
            HostCommand::ShowOutput => "output",
        }
    }

    /// Parse either the identifier or the short name.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.id() == name || cmd.short_name() == name)
    }
}
