//! Configuration loading and root folder resolution
//!
//! Every setting resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: the service logs a warning and
//! starts on defaults. A TOML file that exists but does not parse is.

use crate::business_time::BusinessTz;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "RENTDESK_ROOT_FOLDER";

/// Environment variable naming an explicit config file
pub const CONFIG_FILE_ENV: &str = "RENTDESK_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "rentdesk.db";

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5740;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;
pub const DEFAULT_REQUEST_MAX_SKEW_MS: i64 = 300_000;

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub business_utc_offset_hours: Option<i32>,
    pub request_max_skew_ms: Option<i64>,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Load from a path. A missing file yields the empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        info!("Loaded config file {}", path.display());
        Ok(config)
    }
}

/// Values supplied on the command line (or through clap's `env` fallbacks)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    pub business_tz: BusinessTz,
    pub request_max_skew_ms: i64,
}

impl ServiceConfig {
    /// Resolve configuration from CLI overrides, environment and TOML
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let config_path = cli
            .config_file
            .clone()
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from))
            .or_else(default_config_file);

        let toml_config = match config_path {
            Some(path) => TomlConfig::load(&path)?,
            None => {
                warn!("No config file found, using defaults");
                TomlConfig::default()
            }
        };

        Self::from_sources(cli, &toml_config)
    }

    /// Merge explicit sources; split out from `resolve` so tests need no filesystem
    pub fn from_sources(cli: &CliOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let root_folder = resolve_root_folder(cli.root_folder.as_deref(), toml_config);

        let offset = toml_config
            .business_utc_offset_hours
            .unwrap_or(DEFAULT_UTC_OFFSET_HOURS);
        let business_tz = BusinessTz::new(offset)?;

        let request_max_skew_ms = toml_config
            .request_max_skew_ms
            .unwrap_or(DEFAULT_REQUEST_MAX_SKEW_MS);
        if request_max_skew_ms <= 0 {
            return Err(Error::Config(format!(
                "request_max_skew_ms must be positive, got {}",
                request_max_skew_ms
            )));
        }

        Ok(Self {
            root_folder,
            bind_address: cli
                .bind_address
                .clone()
                .or_else(|| toml_config.bind_address.clone())
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            port: cli.port.or(toml_config.port).unwrap_or(DEFAULT_PORT),
            log_level: cli
                .log_level
                .clone()
                .or_else(|| toml_config.log_level.clone())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            business_tz,
            request_max_skew_ms,
        })
    }

    /// Path of the SQLite database inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    /// Create the root folder if it does not exist yet
    pub fn ensure_root_folder(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder {}", self.root_folder.display());
        }
        Ok(())
    }
}

/// Root folder: CLI > `RENTDESK_ROOT_FOLDER` > TOML `root_folder` > OS default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// First existing config file among the per-user and system-wide locations
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("rentdesk").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/rentdesk/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rentdesk"))
        .unwrap_or_else(|| PathBuf::from("./rentdesk_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_parse_all_keys() {
        let config = TomlConfig::parse(
            r#"
            root_folder = "/srv/rentdesk"
            bind_address = "0.0.0.0"
            port = 8080
            log_level = "debug"
            business_utc_offset_hours = 9
            request_max_skew_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/rentdesk")));
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.business_utc_offset_hours, Some(9));
    }

    #[test]
    fn test_toml_parse_rejects_wrong_types() {
        let result = TomlConfig::parse("port = \"eighty\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cli_beats_toml() {
        let cli = CliOverrides {
            root_folder: Some(PathBuf::from("/cli")),
            port: Some(9000),
            ..Default::default()
        };
        let toml_config = TomlConfig {
            root_folder: Some(PathBuf::from("/toml")),
            port: Some(8000),
            ..Default::default()
        };

        let config = ServiceConfig::from_sources(&cli, &toml_config).unwrap();
        assert_eq!(config.root_folder, PathBuf::from("/cli"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_path(), PathBuf::from("/cli/rentdesk.db"));
    }

    #[test]
    fn test_defaults_applied() {
        let cli = CliOverrides {
            root_folder: Some(PathBuf::from("/tmp/x")),
            ..Default::default()
        };
        let config = ServiceConfig::from_sources(&cli, &TomlConfig::default()).unwrap();
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.business_tz.offset_hours(), 8);
        assert_eq!(config.request_max_skew_ms, DEFAULT_REQUEST_MAX_SKEW_MS);
    }

    #[test]
    fn test_invalid_offset_rejected() {
        let cli = CliOverrides {
            root_folder: Some(PathBuf::from("/tmp/x")),
            ..Default::default()
        };
        let toml_config = TomlConfig {
            business_utc_offset_hours: Some(15),
            ..Default::default()
        };
        assert!(ServiceConfig::from_sources(&cli, &toml_config).is_err());
    }

    #[test]
    fn test_non_positive_skew_rejected() {
        let cli = CliOverrides {
            root_folder: Some(PathBuf::from("/tmp/x")),
            ..Default::default()
        };
        let toml_config = TomlConfig {
            request_max_skew_ms: Some(0),
            ..Default::default()
        };
        assert!(ServiceConfig::from_sources(&cli, &toml_config).is_err());
    }
}
