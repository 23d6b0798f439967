//! Resolve command - show which Psalm config the supervisor would pick.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::supervisor::ConfigurationError;
use crate::workspace::{
    ConfigCandidateSet, ConfigResolver, FsWorkspace, WorkspaceContext, active_root,
    glob_alternation,
};

/// Resolve candidates for `roots`, treating `active` as the focused document.
pub fn resolve_for(
    settings: &Settings,
    roots: Vec<PathBuf>,
    active: Option<&Path>,
) -> Result<(WorkspaceContext, ConfigCandidateSet), ConfigurationError> {
    let workspace = Arc::new(FsWorkspace::new(roots));
    let root =
        active_root(workspace.as_ref(), active).ok_or(ConfigurationError::NoWorkspaceRoot)?;

    let context = WorkspaceContext::new(root, settings.psalm.config_paths.clone());
    let candidates = ConfigResolver::new(workspace).resolve(&context)?;
    Ok((context, candidates))
}

/// Run resolve command. Returns the process exit code.
pub fn run(settings: &Settings, roots: Vec<PathBuf>, active: Option<&Path>) -> i32 {
    let (context, candidates) = match resolve_for(settings, roots, active) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    println!(
        "{} {}",
        style("Workspace:").cyan().bold(),
        context.workspace_root.display()
    );
    println!(
        "{} {}",
        style("Patterns:").cyan().bold(),
        glob_alternation(&context.config_search_patterns)
    );

    println!("{}", style("Matches:").cyan().bold());
    if candidates.matches.is_empty() {
        println!("  {}", style("(none)").dim());
    }
    for path in &candidates.matches {
        let marker = if candidates.selected.as_ref() == Some(path) {
            style("*").green().bold()
        } else {
            style(" ")
        };
        println!("  {marker} {}", path.display());
    }

    match &candidates.selected {
        Some(selected) => {
            println!(
                "{} {}",
                style("Selected:").cyan().bold(),
                selected.display()
            );
            0
        }
        None => {
            let error = ConfigurationError::NoConfigFile {
                patterns: context.config_search_patterns,
            };
            eprintln!("Error: {error}");
            1
        }
    }
}
