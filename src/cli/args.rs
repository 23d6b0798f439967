//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const AFTER_HELP: &str = "Quick Start:
  $ psalm-supervisor init               # Write .psalm-supervisor/settings.toml
  $ psalm-supervisor resolve            # Show which psalm.xml would be used
  $ psalm-supervisor run                # Supervise the language server

While running, type a command and press enter:
  restart | start | stop | output | open <file> | quit";

/// Lifecycle supervisor for the Psalm language server
#[derive(Parser, Debug)]
#[command(
    name = "psalm-supervisor",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep a Psalm language server running against the right psalm.xml",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "PSALM_SUPERVISOR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Set up .psalm-supervisor directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Show config candidates and the one that would be selected
    Resolve {
        /// Workspace root to search (repeatable; the first is active)
        #[arg(short, long = "root", value_name = "DIR")]
        roots: Vec<PathBuf>,

        /// Treat this file as the focused document when picking the active root
        #[arg(long, value_name = "FILE")]
        active: Option<PathBuf>,
    },

    /// Start the language server and keep it in sync with config changes
    Run {
        /// Workspace root (repeatable; the first is active)
        #[arg(short, long = "root", value_name = "DIR")]
        roots: Vec<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_roots() {
        let cli = Cli::try_parse_from([
            "psalm-supervisor",
            "run",
            "--root",
            "/a",
            "-r",
            "/b",
            "--config",
            "/etc/s.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/s.toml")));
        assert_eq!(
            cli.command,
            Commands::Run {
                roots: vec![PathBuf::from("/a"), PathBuf::from("/b")]
            }
        );
    }

    #[test]
    fn test_parse_init_force() {
        let cli = Cli::try_parse_from(["psalm-supervisor", "init", "-f"]).unwrap();
        assert_eq!(cli.command, Commands::Init { force: true });
    }
}
