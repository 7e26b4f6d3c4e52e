//! Configuration loading
//!
//! Bootstrap settings come from, in priority order:
//! 1. Command-line arguments / environment variables (applied by the binary)
//! 2. TOML configuration file
//! 3. Built-in defaults
//!
//! Nothing here can change while the service runs.

use crate::pagination::DEFAULT_PAGE_SIZE;
use crate::reconcile::EmptySelection;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Standard HTTP port of the music school web service
pub const DEFAULT_PORT: u16 = 5780;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Page size when the client does not pick one
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,

    /// What an edit form submitted with no selections does to existing links
    #[serde(default)]
    pub empty_selection: EmptySelection,

    /// User created with every role when the users table is empty
    #[serde(default = "default_bootstrap_user")]
    pub bootstrap_user: String,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            host: default_host(),
            port: default_port(),
            default_page_size: default_page_size(),
            empty_selection: EmptySelection::default(),
            bootstrap_user: default_bootstrap_user(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

fn default_bootstrap_user() -> String {
    "admin".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_path() -> PathBuf {
    default_data_folder().join("music.db")
}

/// OS-dependent data folder
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("music-school"))
        .unwrap_or_else(|| PathBuf::from("./music_school_data"))
}

/// Default configuration file path for the platform, if one exists
pub fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("music-school").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/music-school/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the platform config file, else defaults
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match default_config_file() {
                Some(found) => Self::load(&found),
                None => {
                    info!("No configuration file found, using built-in defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.default_page_size < 1 {
            return Err(Error::Config(format!(
                "default_page_size must be positive, got {}",
                self.default_page_size
            )));
        }
        if self.bootstrap_user.trim().is_empty() {
            return Err(Error::Config("bootstrap_user cannot be blank".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.empty_selection, EmptySelection::ClearAll);
        assert_eq!(config.bootstrap_user, "admin");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_toml() {
        let config = TomlConfig::from_toml_str(
            r#"
            database_path = "/tmp/music.db"
            port = 8080
            default_page_size = 20
            empty_selection = "ignore"
            bootstrap_user = "registrar"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/music.db"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.empty_selection, EmptySelection::Ignore);
        assert_eq!(config.bootstrap_user, "registrar");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            TomlConfig::from_toml_str("port = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            TomlConfig::from_toml_str("empty_selection = \"sometimes\""),
            Err(Error::Config(_))
        ));
    }
}
