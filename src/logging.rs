//! Tracing setup for the supervisor binary.
//!
//! Output is compact and timestamped, with per-target level overrides taken
//! from the `[logging]` section. `RUST_LOG` wins over the file when set.
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! supervisor = "debug"
//! psalm = "info"
//! ```
//!
//! ```bash
//! RUST_LOG=debug psalm-supervisor run
//! RUST_LOG=psalm_supervisor::server=trace psalm-supervisor run
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::host::LogLevel;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Filter directive string for a logging section, e.g. `warn,supervisor=debug`.
///
/// Module overrides are emitted in sorted order so the result is stable.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();

    let mut directives = config.default.clone();
    for (module, level) in modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// `config` with the `psalm` target (server and supervisor log lines) at `level`,
/// unless the file already sets it.
pub fn with_output_level(config: &LoggingConfig, level: LogLevel) -> LoggingConfig {
    let mut config = config.clone();
    config
        .modules
        .entry("psalm".to_string())
        .or_insert_with(|| level.label().to_lowercase());
    config
}

/// Install the global subscriber. Only the first call has any effect.
///
/// Writes to stderr: stdout is reserved for command output.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Install the subscriber with `LoggingConfig::default()` (quiet).
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log a lifecycle event with component context.
///
/// ```ignore
/// log_event!("supervisor", "started", "{}", config_path.display());
/// log_event!("watcher", "disposed");
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-level variant of [`log_event!`].
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}
