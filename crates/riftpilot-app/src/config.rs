// Configuration loading, validation and persistence (riftpilot.toml).

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use riftpilot_core::locator::LeagueClientLocator;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const CONFIG_FILE: &str = "riftpilot.toml";

/// Longest request timeout accepted; anything above would let one dead
/// socket stall the polling loop for too long.
const MAX_REQUEST_TIMEOUT_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },

    #[error("failed to write config file {path}: {message}")]
    WriteError { path: PathBuf, message: String },
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Fully loaded configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub automation: AutomationSettings,
    pub league_client: LeagueClientConfig,
    pub riot_client: RiotClientConfig,
    pub network: NetworkConfig,
    pub catalog: CatalogConfig,
    pub presence: PresenceConfig,
    /// File the config was loaded from; automation edits are written back
    /// here.
    pub path: PathBuf,
}

/// Raw deserialization target for the whole file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    automation: AutomationSettings,
    #[serde(default)]
    league_client: LeagueClientConfig,
    #[serde(default)]
    riot_client: RiotClientConfig,
    #[serde(default)]
    network: NetworkConfig,
    #[serde(default)]
    catalog: CatalogConfig,
    #[serde(default)]
    presence: PresenceConfig,
}

/// The user-editable automation toggles and champion choices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationSettings {
    pub auto_accept: bool,
    pub auto_pick: bool,
    pub auto_ban: bool,
    pub primary_pick: String,
    pub secondary_pick: String,
    pub ban: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueClientConfig {
    #[serde(default = "LeagueClientLocator::default_lockfile_paths")]
    pub lockfile_paths: Vec<PathBuf>,
    /// Process scanned for `--app-port`/`--remoting-auth-token` when no
    /// lockfile is usable. Omit to disable the fallback.
    #[serde(default)]
    pub process_name: Option<String>,
}

impl Default for LeagueClientConfig {
    fn default() -> Self {
        Self {
            lockfile_paths: LeagueClientLocator::default_lockfile_paths(),
            process_name: Some("LeagueClientUx.exe".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiotClientConfig {
    /// Overrides the per-user default lockfile location.
    #[serde(default)]
    pub lockfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 4000,
            poll_interval_ms: 1000,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub locale: String,
    /// Dataset version used when the version list cannot be fetched.
    pub fallback_version: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ddragon.leagueoflegends.com".to_string(),
            locale: "en_US".to_string(),
            fallback_version: "14.23.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Chat host advertised to the launcher while presence is suppressed.
    pub offline_chat_url: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            offline_chat_url: "https://us-1.chat.si.riotgames.com".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Live settings handle
// ---------------------------------------------------------------------------

/// Shared, mutable automation settings. The engine takes a snapshot at the
/// start of every tick, so edits apply on the next tick without a restart.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle(Arc<RwLock<AutomationSettings>>);

impl SettingsHandle {
    pub fn new(settings: AutomationSettings) -> Self {
        Self(Arc::new(RwLock::new(settings)))
    }

    pub fn snapshot(&self) -> AutomationSettings {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Apply `edit` and return the updated settings.
    pub fn update(&self, edit: impl FnOnce(&mut AutomationSettings)) -> AutomationSettings {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        edit(&mut guard);
        guard.clone()
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/riftpilot.toml` relative to `base_dir`.
///
/// This does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let config = Config {
        automation: file.automation,
        league_client: file.league_client,
        riot_client: file.riot_client,
        network: file.network,
        catalog: file.catalog,
        presence: file.presence,
        path,
    };

    validate(&config)?;

    Ok(config)
}

/// Seed `config/riftpilot.toml` from the shipped template on first run.
/// Returns the path written, or `None` when a config file already exists.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }

    let template = base_dir.join("defaults").join(CONFIG_FILE);
    if !template.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no {} and no template at {}",
                target.display(),
                template.display()
            ),
        });
    }

    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", dir.display()),
        })?;
    }
    std::fs::copy(&template, &target).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {}: {e}", template.display()),
    })?;
    info!(path = %target.display(), "Created config from template");
    Ok(Some(target))
}

/// Load config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_file(&cwd)?;
    load_config_from(&cwd)
}

/// Rewrite the `[automation]` table of the config file at `path`, keeping
/// every other table as it was. Comments are not preserved.
pub fn save_automation(path: &Path, settings: &AutomationSettings) -> Result<(), ConfigError> {
    let text = read_file(path)?;
    let mut table: toml::Table = text.parse().map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let value = toml::Value::try_from(settings).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    table.insert("automation".to_string(), value);

    let rendered = toml::to_string(&table).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    std::fs::write(path, rendered).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let net = &config.network;
    if net.request_timeout_ms == 0 {
        return Err(invalid("network.request_timeout_ms", "must be greater than 0"));
    }
    if net.request_timeout_ms > MAX_REQUEST_TIMEOUT_MS {
        return Err(invalid(
            "network.request_timeout_ms",
            format!(
                "must be at most {MAX_REQUEST_TIMEOUT_MS}, got {}",
                net.request_timeout_ms
            ),
        ));
    }
    if net.poll_interval_ms == 0 {
        return Err(invalid("network.poll_interval_ms", "must be greater than 0"));
    }

    let league = &config.league_client;
    let has_process = league
        .process_name
        .as_deref()
        .is_some_and(|n| !n.trim().is_empty());
    if league.lockfile_paths.is_empty() && !has_process {
        return Err(invalid(
            "league_client",
            "needs at least one lockfile path or a process name",
        ));
    }

    if config.catalog.locale.trim().is_empty() {
        return Err(invalid("catalog.locale", "must not be empty"));
    }
    if !config.catalog.base_url.starts_with("http") {
        return Err(invalid(
            "catalog.base_url",
            format!("must be an http(s) URL, got `{}`", config.catalog.base_url),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
