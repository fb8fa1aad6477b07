//! Configuration management
//!
//! This module handles loading, saving, and migrating the statcache
//! configuration file. The file is TOML, stored at
//! `~/.config/statcache/config.toml` unless `STATCACHE_CONFIG_DIR` points
//! elsewhere.
//!
//! Changes to schema_version require migration support.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::KeyConvention;
use crate::report::DEFAULT_LIMIT;

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "STATCACHE_CONFIG_DIR";

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "STATCACHE_CACHE_DIR";

/// Application directory name under the platform config/cache dirs
const APP_DIR: &str = "statcache";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Remote store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Local cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Key naming convention
    #[serde(default)]
    pub keys: KeyConvention,

    /// Selection diagnostics
    #[serde(default)]
    pub report: ReportConfig,
}

/// Remote store settings
///
/// Credentials are not configured here; the AWS default provider chain
/// supplies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Default bucket for commands that take a bare prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Collection root prepended to every selection prefix
    #[serde(default)]
    pub initial_prefix: String,

    /// AWS region; falls back to the provider chain when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Endpoint override for S3-compatible services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing
    #[serde(default)]
    pub force_path_style: bool,

    /// Maximum attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_read_timeout() -> u64 {
    30000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            initial_prefix: String::new(),
            region: None,
            endpoint: None,
            force_path_style: false,
            max_attempts: default_max_attempts(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

/// Local cache settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory; defaults to the platform cache dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl CacheConfig {
    /// Resolve the cache directory
    ///
    /// `STATCACHE_CACHE_DIR` wins over the configured root, which wins over
    /// `<platform cache dir>/statcache`.
    pub fn resolve_root(&self) -> Result<PathBuf> {
        self.root_with_override(std::env::var_os(CACHE_DIR_ENV).map(PathBuf::from))
    }

    fn root_with_override(&self, env: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(dir) = env.filter(|d| !d.as_os_str().is_empty()) {
            return Ok(dir);
        }
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        dirs::cache_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| Error::Config("Could not determine cache directory".into()))
    }
}

/// Selection diagnostics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Maximum number of selected objects printed in verbose mode
    #[serde(default = "default_report_limit")]
    pub limit: usize,
}

fn default_report_limit() -> usize {
    DEFAULT_LIMIT
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            limit: default_report_limit(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            keys: KeyConvention::default(),
            report: ReportConfig::default(),
        }
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join(APP_DIR),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// If the schema version doesn't match, attempts migration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config = self.migrate(config)?;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade statcache.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// Migrate configuration from older schema version
    fn migrate(&self, config: Config) -> Result<Config> {
        let mut config = config;
        tracing::info!(
            from = config.schema_version,
            to = SCHEMA_VERSION,
            "migrating configuration"
        );
        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}
