//! Configuration loading and resolution
//!
//! Bootstrap settings are resolved per key in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is not an error: a warning is logged and the
//! compiled defaults are used.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const ENV_CONFIG_FILE: &str = "ALUMNOS_CONFIG";
/// Environment variable overriding the database path
pub const ENV_DATABASE_PATH: &str = "ALUMNOS_DATABASE_PATH";
/// Environment variable overriding the bind host
pub const ENV_HOST: &str = "ALUMNOS_HOST";
/// Environment variable overriding the bind port
pub const ENV_PORT: &str = "ALUMNOS_PORT";
/// Environment variable overriding the log level
pub const ENV_LOG_LEVEL: &str = "ALUMNOS_LOG_LEVEL";

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional in the file; absent fields fall back to
/// [`CompiledDefaults`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP bind address
    #[serde(default)]
    pub host: Option<String>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Session lifetime in seconds
    #[serde(default)]
    pub session_ttl_secs: Option<u64>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

/// Built-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub host: String,
    pub port: u16,
    pub session_ttl_secs: u64,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            host: "127.0.0.1".to_string(),
            port: 5780,
            session_ttl_secs: 8 * 60 * 60,
            log_level: "info".to_string(),
        }
    }

    /// Default database file inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("alumnos.db")
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

/// Where the TOML layer of a resolved configuration came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// No config file was named or found in the user config dir
    #[default]
    Defaults,
    /// Loaded from this file
    File(PathBuf),
    /// This file was named but does not exist
    MissingFile(PathBuf),
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub database_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub session_ttl: Duration,
    pub log_level: String,
    pub source: ConfigSource,
}

impl AdminConfig {
    /// Resolve configuration from CLI, environment, TOML and defaults
    ///
    /// Resolution runs before logging is set up, so nothing is logged here;
    /// call [`AdminConfig::log_source`] once the subscriber exists.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();
        let (toml_config, source) = match config_file_path(cli) {
            Some(path) if path.exists() => (load_toml_config(&path)?, ConfigSource::File(path)),
            Some(path) => (TomlConfig::default(), ConfigSource::MissingFile(path)),
            None => (TomlConfig::default(), ConfigSource::Defaults),
        };

        let mut config = Self::merge(cli, &toml_config, &defaults)?;
        config.source = source;
        Ok(config)
    }

    /// Report where the configuration came from
    pub fn log_source(&self) {
        match &self.source {
            ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigSource::MissingFile(path) => warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            ),
            ConfigSource::Defaults => info!("No config file, using built-in defaults"),
        }
    }

    /// Merge the layers without touching the filesystem
    pub fn merge(cli: &CliOverrides, file: &TomlConfig, defaults: &CompiledDefaults) -> Result<Self> {
        let database_path = cli
            .database_path
            .clone()
            .or_else(|| std::env::var(ENV_DATABASE_PATH).ok().map(PathBuf::from))
            .or_else(|| file.database_path.clone())
            .unwrap_or_else(|| defaults.database_path());

        let host = cli
            .host
            .clone()
            .or_else(|| std::env::var(ENV_HOST).ok())
            .or_else(|| file.host.clone())
            .unwrap_or_else(|| defaults.host.clone());

        let port = match cli.port {
            Some(port) => port,
            None => match std::env::var(ENV_PORT) {
                Ok(value) => value.parse::<u16>().map_err(|e| {
                    Error::Config(format!("{} is not a valid port: {} ({})", ENV_PORT, value, e))
                })?,
                Err(_) => file.port.unwrap_or(defaults.port),
            },
        };

        let session_ttl_secs = file.session_ttl_secs.unwrap_or(defaults.session_ttl_secs);
        if session_ttl_secs == 0 {
            return Err(Error::Config("session_ttl_secs must be greater than 0".to_string()));
        }

        let log_level = cli
            .log_level
            .clone()
            .or_else(|| std::env::var(ENV_LOG_LEVEL).ok())
            .or_else(|| file.logging.level.clone())
            .unwrap_or_else(|| defaults.log_level.clone());

        Ok(Self {
            database_path,
            host,
            port,
            session_ttl: Duration::from_secs(session_ttl_secs),
            log_level,
            source: ConfigSource::Defaults,
        })
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
}

/// Locate the config file: CLI, then environment, then the user config dir
fn config_file_path(cli: &CliOverrides) -> Option<PathBuf> {
    if let Some(path) = &cli.config_file {
        return Some(path.clone());
    }
    if let Ok(path) = std::env::var(ENV_CONFIG_FILE) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|d| d.join("alumnos").join("config.toml"))
        .filter(|p| p.exists())
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("alumnos"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/alumnos"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("alumnos"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/alumnos"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("alumnos"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\alumnos"))
    } else {
        PathBuf::from("./alumnos_data")
    }
}
