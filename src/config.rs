//! Layered configuration for the supervisor.
//!
//! Settings are assembled from, lowest to highest precedence:
//! - compiled defaults
//! - `.psalm-supervisor/settings.toml` (or an explicit `--config` file)
//! - environment variables
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PSALM_SUPERVISOR_` and use double
//! underscores to separate nested levels:
//! - `PSALM_SUPERVISOR_PSALM__LOG_LEVEL=debug` sets `psalm.log_level`
//! - `PSALM_SUPERVISOR_SUPERVISOR__SHUTDOWN_TIMEOUT_MS=500` sets `supervisor.shutdown_timeout_ms`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::host::LogLevel;

/// Directory holding the settings file.
pub const CONFIG_DIR: &str = ".psalm-supervisor";

/// Settings file name inside [`CONFIG_DIR`].
pub const SETTINGS_FILE: &str = "settings.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "PSALM_SUPERVISOR_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace roots, in priority order. Empty means "detect".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspace_roots: Vec<PathBuf>,

    /// Language server settings. Changes here ask for a reload.
    #[serde(default)]
    pub psalm: PsalmConfig,

    /// Lifecycle timing
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Tracing output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PsalmConfig {
    /// Globs searched (as one alternation) to find the Psalm XML config
    #[serde(default = "default_config_paths")]
    pub config_paths: Vec<String>,

    /// Minimum level shown in the output buffer
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cosmetic: hide the status message while the server is running
    #[serde(default)]
    pub hide_status_message_when_running: bool,

    /// PHP binary used to run the language server
    #[serde(default = "default_php_executable")]
    pub php_executable_path: String,

    #[serde(default)]
    pub php_executable_args: Vec<String>,

    /// Language server entry point, relative to the workspace root unless absolute
    #[serde(default = "default_psalm_script")]
    pub psalm_script_path: PathBuf,

    #[serde(default)]
    pub psalm_script_args: Vec<String>,

    /// Pass `--verbose` to the language server
    #[serde(default)]
    pub enable_verbose: bool,

    /// Pass `--use-ini-defaults` to the language server
    #[serde(default)]
    pub enable_use_ini_defaults: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// How long `start` waits for the initialize handshake
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,

    /// How long `stop` waits for a graceful exit before killing
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Quiet period for config file change events
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter level for all targets
    #[serde(default = "default_log_filter")]
    pub default: String,

    /// Per-target overrides, e.g. `supervisor = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_config_paths() -> Vec<String> {
    vec!["psalm.xml".to_string(), "psalm.xml.dist".to_string()]
}
fn default_php_executable() -> String {
    "php".to_string()
}
fn default_psalm_script() -> PathBuf {
    PathBuf::from("vendor/vimeo/psalm/psalm-language-server")
}
fn default_start_timeout_ms() -> u64 {
    30_000
}
fn default_shutdown_timeout_ms() -> u64 {
    2_000
}
fn default_debounce_ms() -> u64 {
    250
}
fn default_log_filter() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_roots: Vec::new(),
            psalm: PsalmConfig::default(),
            supervisor: SupervisorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PsalmConfig {
    fn default() -> Self {
        Self {
            config_paths: default_config_paths(),
            log_level: LogLevel::default(),
            hide_status_message_when_running: false,
            php_executable_path: default_php_executable(),
            php_executable_args: Vec::new(),
            psalm_script_path: default_psalm_script(),
            psalm_script_args: Vec::new(),
            enable_verbose: false,
            enable_use_ini_defaults: false,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: default_start_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_filter(),
            modules: HashMap::new(),
        }
    }
}

impl SupervisorConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Settings {
    /// Build the layered figment for a settings file.
    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore becomes a dot; single underscores stay in field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Load configuration from the discovered workspace settings file.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(Self::default_settings_path())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    /// Settings file in the nearest ancestor holding [`CONFIG_DIR`], else `./.psalm-supervisor`.
    pub fn default_settings_path() -> PathBuf {
        Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Find the settings file by walking up from the current directory.
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Directory that contains [`CONFIG_DIR`], searching upwards from the current directory.
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Write a default settings file under `dir`.
    pub fn init_config_file(
        dir: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = dir.join(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

/// Dotted keys whose values differ between two settings snapshots.
///
/// Keys are leaf paths such as `psalm.config_paths`; a section that appears or
/// disappears is reported through its leaves.
pub fn changed_keys(old: &Settings, new: &Settings) -> Vec<String> {
    let (Ok(old), Ok(new)) = (serde_json::to_value(old), serde_json::to_value(new)) else {
        return Vec::new();
    };

    let mut old_leaves = HashMap::new();
    let mut new_leaves = HashMap::new();
    flatten("", &old, &mut old_leaves);
    flatten("", &new, &mut new_leaves);

    let mut keys: Vec<String> = old_leaves
        .keys()
        .chain(new_leaves.keys())
        .filter(|key| old_leaves.get(*key) != new_leaves.get(*key))
        .cloned()
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut HashMap<String, serde_json::Value>) {
    match value {
        serde_json::Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, child, out);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}

/// Process-wide configuration state.
///
/// Holds the current snapshot plus the figment it was extracted from, so
/// callers can read typed values by dotted key. [`SettingsStore::reinit`]
/// re-reads every layer and swaps the snapshot in one step.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    inner: RwLock<(Figment, Arc<Settings>)>,
}

impl SettingsStore {
    /// Load settings from `path`, or from the discovered settings file.
    pub fn load(path: Option<PathBuf>) -> Result<Self, Box<figment::Error>> {
        let path = path.unwrap_or_else(Settings::default_settings_path);
        let figment = Settings::figment(&path);
        let settings: Settings = figment.extract().map_err(Box::new)?;

        Ok(Self {
            path,
            inner: RwLock::new((figment, Arc::new(settings))),
        })
    }

    /// Settings file backing this store (it may not exist).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings snapshot.
    pub fn snapshot(&self) -> Arc<Settings> {
        self.inner.read().1.clone()
    }

    /// Read a typed value by dotted key, e.g. `psalm.config_paths`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, Box<figment::Error>> {
        self.inner.read().0.extract_inner(key).map_err(Box::new)
    }

    /// Re-read all layers. Returns the keys whose values changed.
    ///
    /// On a parse error the previous snapshot stays in place.
    pub fn reinit(&self) -> Result<Vec<String>, Box<figment::Error>> {
        let figment = Settings::figment(&self.path);
        let settings: Settings = figment.extract().map_err(Box::new)?;

        let mut guard = self.inner.write();
        let changed = changed_keys(&guard.1, &settings);
        *guard = (figment, Arc::new(settings));
        Ok(changed)
    }
}
