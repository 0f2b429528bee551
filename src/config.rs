use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::AuthOptions;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST API (e.g., "http://localhost:8000/api")
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sync before reads and after writes when the server is reachable (default: true)
    pub auto_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { auto_sync: true }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Log out after this many minutes without activity
    pub idle_timeout_minutes: u64,
    /// Re-fetch the user profile after every token refresh
    pub refetch_profile_on_refresh: bool,
    /// Share one refresh between concurrent requests that hit a 401
    pub coalesce_refresh: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: 30,
            refetch_profile_on_refresh: true,
            coalesce_refresh: true,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_minutes.saturating_mul(60))
    }

    pub fn auth_options(&self) -> AuthOptions {
        AuthOptions {
            refetch_profile_on_refresh: self.refetch_profile_on_refresh,
            coalesce_refresh: self.coalesce_refresh,
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Directory holding the session file
    pub data_dir: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub session: SessionConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    api: Option<ApiConfig>,
    sync: Option<SyncConfig>,
    session: Option<SessionConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_data_dir = Self::default_data_dir();

        // Start with defaults
        let mut database_path = ConfigValue::new(
            default_data_dir.join("chelal.db"),
            ConfigSource::Default,
        );
        let mut data_dir = ConfigValue::new(default_data_dir, ConfigSource::Default);
        let mut config_file = None;
        let mut api = ApiConfig::default();
        let mut sync = SyncConfig::default();
        let mut session = SessionConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            // Relative paths are resolved against the config file's directory
            let resolve = |p: PathBuf| -> PathBuf {
                if p.is_relative() {
                    path.parent().map(|dir| dir.join(&p)).unwrap_or(p)
                } else {
                    p
                }
            };

            if let Some(dir) = file_config.data_dir {
                data_dir = ConfigValue::new(resolve(dir), ConfigSource::File);
            }
            if let Some(db_path) = file_config.database_path {
                database_path = ConfigValue::new(resolve(db_path), ConfigSource::File);
            }
            if let Some(api_config) = file_config.api {
                api = api_config;
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
            if let Some(session_config) = file_config.session {
                session = session_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(dir) = std::env::var("CHELAL_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(db_path) = std::env::var("CHELAL_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("CHELAL_API_URL") {
            api.base_url = url;
        }
        if let Ok(value) = std::env::var("CHELAL_AUTO_SYNC") {
            sync.auto_sync = parse_bool(&value)
                .ok_or_else(|| ConfigError::InvalidValue("CHELAL_AUTO_SYNC".to_string(), value))?;
        }
        if let Ok(value) = std::env::var("CHELAL_IDLE_TIMEOUT_MINUTES") {
            session.idle_timeout_minutes = value.parse().map_err(|_| {
                ConfigError::InvalidValue("CHELAL_IDLE_TIMEOUT_MINUTES".to_string(), value)
            })?;
        }

        Ok(Self {
            database_path,
            data_dir,
            config_file,
            api,
            sync,
            session,
        })
    }

    /// Session file holding the persisted tokens
    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.value.join("credentials.yaml")
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/chelal/
    /// - macOS: ~/Library/Application Support/chelal/
    /// - Windows: %APPDATA%/chelal/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chelal")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/chelal/
    /// - macOS: ~/Library/Application Support/chelal/
    /// - Windows: %APPDATA%/chelal/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chelal")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value '{}' for {}", value, name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
