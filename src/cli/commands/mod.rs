//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod init;
pub mod resolve;
pub mod run;

use std::path::{Path, PathBuf};

use crate::config::Settings;

/// Workspace roots for a command, first match wins:
/// `--root` arguments, `workspace_roots` from settings, the directory holding
/// `.psalm-supervisor`, the current directory.
///
/// Relative roots are made absolute against `cwd`.
pub fn workspace_roots(settings: &Settings, cli_roots: &[PathBuf], cwd: &Path) -> Vec<PathBuf> {
    let roots: Vec<PathBuf> = if !cli_roots.is_empty() {
        cli_roots.to_vec()
    } else if !settings.workspace_roots.is_empty() {
        settings.workspace_roots.clone()
    } else {
        vec![Settings::workspace_root().unwrap_or_else(|| cwd.to_path_buf())]
    };

    roots
        .into_iter()
        .map(|root| if root.is_absolute() { root } else { cwd.join(root) })
        .collect()
}
