//! Bootstrap configuration for the import tooling
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (`--database`, `--chunk-size`, ...)
//! 2. Environment variables (`ZLV_DATABASE`)
//! 3. TOML configuration file (`--config`, `ZLV_CONFIG`, or the per-user default)
//! 4. Built-in defaults (code constants)
//!
//! A missing TOML file is not an error: a warning is logged and defaults apply.

use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Environment variable overriding the database path
pub const DATABASE_ENV_VAR: &str = "ZLV_DATABASE";

/// Environment variable pointing at the TOML file
pub const CONFIG_ENV_VAR: &str = "ZLV_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Import pipeline tuning
    #[serde(default)]
    pub import: ImportSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full EnvFilter directive
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

/// Import pipeline settings
#[derive(Debug, Clone, Deserialize)]
pub struct ImportSettings {
    /// Records per persistence call for batch writers (buildings)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum total wait when SQLite reports `database is locked`
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,

    /// Log a progress line every N records
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Failures kept in memory for the final report
    #[serde(default = "default_max_captured_failures")]
    pub max_captured_failures: usize,

    /// User recorded as author of events written by the import
    #[serde(default = "default_admin_actor_id")]
    pub admin_actor_id: Uuid,

    /// Start of the window in which synthetic "owner changed" events were written
    #[serde(default = "default_remediation_window_start")]
    pub remediation_window_start: DateTime<Utc>,

    /// End of that window (exclusive)
    #[serde(default = "default_remediation_window_end")]
    pub remediation_window_end: DateTime<Utc>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
            progress_interval: default_progress_interval(),
            max_captured_failures: default_max_captured_failures(),
            admin_actor_id: default_admin_actor_id(),
            remediation_window_start: default_remediation_window_start(),
            remediation_window_end: default_remediation_window_end(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_progress_interval() -> u64 {
    10_000
}

fn default_max_captured_failures() -> usize {
    1000
}

fn default_admin_actor_id() -> Uuid {
    Uuid::nil()
}

fn default_remediation_window_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn default_remediation_window_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl TomlConfig {
    /// Parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        config.import.validate()?;
        Ok(config)
    }

    /// Load the configuration, falling back to defaults when no file exists
    ///
    /// An explicitly requested file (argument or `ZLV_CONFIG`) that is missing
    /// is an error; a missing per-user default file is not.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

        if let Some(path) = explicit {
            info!("Loading configuration from {}", path.display());
            return Self::load(&path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)
            }
            _ => {
                warn!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Resolve the database path: CLI → ENV → TOML → default
    pub fn resolve_database_path(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.database_path {
            return path.clone();
        }

        default_database_path()
    }
}

impl ImportSettings {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("import.chunk_size must be at least 1".to_string()));
        }
        if self.remediation_window_start >= self.remediation_window_end {
            return Err(Error::Config(
                "import.remediation_window_start must precede remediation_window_end".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-user configuration file (`~/.config/zlv/config.toml` on Linux)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("zlv").join("config.toml"))
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("zlv").join("zlv.db"))
        .unwrap_or_else(|| PathBuf::from("./zlv_data/zlv.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_usable() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.import.chunk_size, 1000);
        assert!(config.import.validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_path = "/tmp/zlv-test.db"

[import]
chunk_size = 250
remediation_window_start = "2024-09-08T00:00:00Z"
remediation_window_end = "2024-09-10T00:00:00Z"
"#
        )
        .unwrap();

        let config = TomlConfig::load(file.path()).unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/zlv-test.db")));
        assert_eq!(config.import.chunk_size, 250);
        assert_eq!(config.import.max_lock_wait_ms, 5000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[import]\nchunk_size = 0").unwrap();

        let err = TomlConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = TomlConfig::load_or_default(Some(Path::new("/nonexistent/zlv.toml")));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_database_path_priority() {
        let config = TomlConfig {
            database_path: Some(PathBuf::from("/from/toml.db")),
            ..Default::default()
        };

        std::env::remove_var(DATABASE_ENV_VAR);
        assert_eq!(config.resolve_database_path(None), PathBuf::from("/from/toml.db"));

        std::env::set_var(DATABASE_ENV_VAR, "/from/env.db");
        assert_eq!(config.resolve_database_path(None), PathBuf::from("/from/env.db"));

        let cli = PathBuf::from("/from/cli.db");
        assert_eq!(config.resolve_database_path(Some(&cli)), cli);

        std::env::remove_var(DATABASE_ENV_VAR);
    }
}
