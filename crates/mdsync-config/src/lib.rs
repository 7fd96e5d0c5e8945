//! Configuration management for mdsync.
//!
//! Parses `mdsync.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `sync.root_dir`
//! - `store.path`
//! - `plantuml.server_url`
//! - `plantuml.public_url`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the sync root directory.
    pub root_dir: Option<PathBuf>,
    /// Override the polling interval in milliseconds.
    pub interval_ms: Option<u64>,
    /// Override the automatic sync loop flag.
    pub sync_enabled: Option<bool>,
    /// Override the database file.
    pub database: Option<PathBuf>,
    /// Override the `PlantUML` server URL.
    pub plantuml_server_url: Option<String>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "mdsync.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Sync configuration (paths are relative strings from TOML).
    sync: SyncConfigRaw,
    /// Store configuration (paths are relative strings from TOML).
    store: StoreConfigRaw,
    /// `PlantUML` configuration.
    pub plantuml: PlantUmlConfig,

    /// Resolved sync configuration (set after loading).
    #[serde(skip)]
    pub sync_resolved: SyncConfig,
    /// Resolved store configuration (set after loading).
    #[serde(skip)]
    pub store_resolved: StoreConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
        }
    }
}

/// What happens to tracked state for entries whose reconciliation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the new scan regardless; a failing entry is retried at most once.
    #[default]
    Forget,
    /// Keep the previous tracked value for failed entries so every cycle retries them.
    Retry,
}

/// Raw sync configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SyncConfigRaw {
    root_dir: Option<String>,
    enabled: Option<bool>,
    interval_ms: Option<u64>,
    extensions: Option<Vec<String>>,
    namespace: Option<String>,
    root_collection: Option<String>,
    store_timeout_ms: Option<u64>,
    subscriber_capacity: Option<usize>,
    failure_policy: Option<FailurePolicy>,
    prune_on_start: Option<bool>,
}

/// Resolved sync configuration with absolute paths.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory mirrored into the store.
    pub root_dir: PathBuf,
    /// Whether the periodic sync loop runs.
    pub enabled: bool,
    /// Delay between two scheduled cycles.
    pub interval: Duration,
    /// Eligible file extensions, lowercase, without the dot.
    pub extensions: Vec<String>,
    /// Prefix of every sync-sourced collection name.
    pub namespace: String,
    /// Collection for files directly under the root.
    pub root_collection: String,
    /// Upper bound for a single store call.
    pub store_timeout: Duration,
    /// Buffer size of each live-reload subscriber.
    pub subscriber_capacity: usize,
    /// Tracked-state handling after partial failures.
    pub failure_policy: FailurePolicy,
    /// Remove orphaned documents on the first cycle.
    pub prune_on_start: bool,
}

impl SyncConfig {
    /// Defaults with the root directory set to `<base>/content`.
    #[must_use]
    pub fn with_root(root_dir: PathBuf) -> Self {
        Self {
            root_dir,
            enabled: true,
            interval: Duration::from_secs(3),
            extensions: vec!["md".to_owned()],
            namespace: "content".to_owned(),
            root_collection: "root".to_owned(),
            store_timeout: Duration::from_secs(5),
            subscriber_capacity: 16,
            failure_policy: FailurePolicy::Forget,
            prune_on_start: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::with_root(PathBuf::from("content"))
    }
}

/// Raw store configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StoreConfigRaw {
    path: Option<String>,
}

/// Resolved store configuration.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// `SQLite` database file.
    pub path: PathBuf,
}

/// `PlantUML` configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlantUmlConfig {
    /// Server the `/plantuml` proxy forwards to.
    pub server_url: String,
    /// Prefix used for diagram image links embedded in documents.
    pub public_url: String,
    /// Proxy request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PlantUmlConfig {
    fn default() -> Self {
        Self {
            server_url: "http://plantuml:8080".to_owned(),
            public_url: "/plantuml".to_owned(),
            timeout_ms: 10_000,
        }
    }
}

impl PlantUmlConfig {
    /// Proxy request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`plantuml.server_url`").
        field: String,
        /// Error message (e.g., "${`PLANTUML_SERVER`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

/// Require a name that is usable as a single collection segment.
fn require_segment(value: &str, field: &str) -> Result<(), ConfigError> {
    require_non_empty(value, field)?;
    if value.contains('/') || value.contains('\\') {
        return Err(ConfigError::Validation(format!(
            "{field} cannot contain path separators"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `mdsync.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails, or
    /// the final configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root_dir) = &settings.root_dir {
            self.sync_resolved.root_dir.clone_from(root_dir);
        }
        if let Some(interval_ms) = settings.interval_ms {
            self.sync_resolved.interval = Duration::from_millis(interval_ms);
        }
        if let Some(enabled) = settings.sync_enabled {
            self.sync_resolved.enabled = enabled;
        }
        if let Some(database) = &settings.database {
            self.store_resolved.path.clone_from(database);
        }
        if let Some(url) = &settings.plantuml_server_url {
            self.plantuml.server_url.clone_from(url);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            sync: SyncConfigRaw::default(),
            store: StoreConfigRaw::default(),
            plantuml: PlantUmlConfig::default(),
            sync_resolved: SyncConfig::with_root(base.join("content")),
            store_resolved: StoreConfig {
                path: base.join(".mdsync").join("posts.db"),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file and after CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_sync()?;
        self.validate_plantuml()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate sync configuration.
    fn validate_sync(&self) -> Result<(), ConfigError> {
        let sync = &self.sync_resolved;

        if sync.interval.is_zero() {
            return Err(ConfigError::Validation(
                "sync.interval_ms must be greater than 0".to_owned(),
            ));
        }
        if sync.store_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "sync.store_timeout_ms must be greater than 0".to_owned(),
            ));
        }
        if sync.subscriber_capacity == 0 {
            return Err(ConfigError::Validation(
                "sync.subscriber_capacity must be at least 1".to_owned(),
            ));
        }
        if sync.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "sync.extensions cannot be empty".to_owned(),
            ));
        }
        for ext in &sync.extensions {
            require_non_empty(ext, "sync.extensions")?;
        }
        require_segment(&sync.namespace, "sync.namespace")?;
        require_segment(&sync.root_collection, "sync.root_collection")?;

        Ok(())
    }

    /// Validate `PlantUML` configuration.
    fn validate_plantuml(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.plantuml.server_url, "plantuml.server_url")?;
        require_http_url(&self.plantuml.server_url, "plantuml.server_url")?;
        require_non_empty(&self.plantuml.public_url, "plantuml.public_url")?;

        if self.plantuml.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "plantuml.timeout_ms must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        self.sync.root_dir = expand::expand_opt(self.sync.root_dir.as_deref(), "sync.root_dir")?;
        self.store.path = expand::expand_opt(self.store.path.as_deref(), "store.path")?;
        self.plantuml.server_url =
            expand::expand_env(&self.plantuml.server_url, "plantuml.server_url")?;
        self.plantuml.public_url =
            expand::expand_env(&self.plantuml.public_url, "plantuml.public_url")?;
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));
        let defaults = SyncConfig::with_root(PathBuf::new());
        let raw = &self.sync;

        self.sync_resolved = SyncConfig {
            root_dir: resolve(raw.root_dir.as_deref(), "content"),
            enabled: raw.enabled.unwrap_or(defaults.enabled),
            interval: raw
                .interval_ms
                .map_or(defaults.interval, Duration::from_millis),
            extensions: raw.extensions.as_ref().map_or(defaults.extensions, |exts| {
                exts.iter()
                    .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                    .collect()
            }),
            namespace: raw
                .namespace
                .clone()
                .unwrap_or(defaults.namespace),
            root_collection: raw
                .root_collection
                .clone()
                .unwrap_or(defaults.root_collection),
            store_timeout: raw
                .store_timeout_ms
                .map_or(defaults.store_timeout, Duration::from_millis),
            subscriber_capacity: raw
                .subscriber_capacity
                .unwrap_or(defaults.subscriber_capacity),
            failure_policy: raw.failure_policy.unwrap_or(defaults.failure_policy),
            prune_on_start: raw.prune_on_start.unwrap_or(defaults.prune_on_start),
        };

        self.store_resolved = StoreConfig {
            path: resolve(self.store.path.as_deref(), ".mdsync/posts.db"),
        };
    }
}
