use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use psalm_supervisor::SettingsStore;
use psalm_supervisor::cli::commands::{self, init, resolve};
use psalm_supervisor::cli::{Cli, Commands};
use psalm_supervisor::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: failed to read current directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Init writes the settings file, so it must not require one to load
    if let Commands::Init { force } = cli.command {
        return exit_code(init::run_init(&cwd, force));
    }

    let store = match SettingsStore::load(cli.config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let settings = store.snapshot();

    logging::init_with_config(&logging::with_output_level(
        &settings.logging,
        settings.psalm.log_level,
    ));

    match cli.command {
        Commands::Init { .. } => ExitCode::SUCCESS,
        Commands::Config => {
            init::run_config(&settings, store.path());
            ExitCode::SUCCESS
        }
        Commands::Resolve { roots, active } => {
            let roots = commands::workspace_roots(&settings, &roots, &cwd);
            let active = active.map(|p| if p.is_absolute() { p } else { cwd.join(p) });
            exit_code(resolve::run(&settings, roots, active.as_deref()))
        }
        Commands::Run { roots } => {
            let roots = commands::workspace_roots(&settings, &roots, &cwd);
            match commands::run::run(store, roots).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
