//! Configuration management for salesnote.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use chrono::Duration;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "salesnote";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "salesnote.db";

/// Default backup directory name (under the data directory).
const BACKUP_DIR_NAME: &str = "backups";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SALESNOTE_`, sections split on `__`)
/// 2. TOML config file at `~/.config/salesnote/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Funnel reporting configuration.
    pub funnel: FunnelConfig,
    /// Customer grading configuration.
    pub grading: GradingConfig,
    /// Backup configuration.
    pub backup: BackupConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/salesnote/salesnote.db`
    pub database_path: Option<PathBuf>,
}

/// Funnel reporting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunnelConfig {
    /// Number of opportunities parked in one stage that marks it a bottleneck.
    pub bottleneck_count_threshold: usize,
    /// Months covered by the revenue forecast.
    pub forecast_months: u32,
    /// Rows shown by the top-opportunities report.
    pub top_limit: usize,
    /// Days a new quote stays valid when no date is given.
    pub quote_valid_days: u32,
}

/// Customer grading configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingConfig {
    /// Window for "recent" activity, in days.
    pub activity_window_days: u32,
    /// A grade older than this is recomputed even without new activity.
    pub regrade_after_days: u32,
    /// External command used for AI grading (prompt on stdin, JSON on stdout).
    pub ai_command: Option<String>,
    /// Arguments passed to `ai_command`.
    pub ai_args: Vec<String>,
}

/// Backup configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory for backup files.
    /// Defaults to `~/.local/share/salesnote/backups`
    pub directory: Option<PathBuf>,
    /// Number of most recent backups kept by `prune`.
    pub keep: usize,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            bottleneck_count_threshold: 10,
            forecast_months: 3,
            top_limit: 10,
            quote_valid_days: 30,
        }
    }
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            activity_window_days: 180,
            regrade_after_days: 30,
            ai_command: None,
            ai_args: Vec::new(),
        }
    }
}

impl GradingConfig {
    /// Age after which a grade is recomputed.
    #[must_use]
    pub fn regrade_after(&self) -> Duration {
        Duration::days(i64::from(self.regrade_after_days))
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: None, // Will be resolved to default at runtime
            keep: 14,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SALESNOTE_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.grading.activity_window_days == 0 {
            return Err(Error::ConfigValidation {
                message: "grading.activity_window_days must be greater than 0".to_string(),
            });
        }

        if self.grading.regrade_after_days == 0 {
            return Err(Error::ConfigValidation {
                message: "grading.regrade_after_days must be greater than 0".to_string(),
            });
        }

        if self.funnel.forecast_months == 0 || self.funnel.forecast_months > 24 {
            return Err(Error::ConfigValidation {
                message: format!(
                    "funnel.forecast_months ({}) must be between 1 and 24",
                    self.funnel.forecast_months
                ),
            });
        }

        if self.funnel.quote_valid_days == 0 {
            return Err(Error::ConfigValidation {
                message: "funnel.quote_valid_days must be greater than 0".to_string(),
            });
        }

        if self.backup.keep == 0 {
            return Err(Error::ConfigValidation {
                message: "backup.keep must be greater than 0".to_string(),
            });
        }

        if let Some(command) = &self.grading.ai_command {
            if command.trim().is_empty() {
                return Err(Error::ConfigValidation {
                    message: "grading.ai_command cannot be blank".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the backup directory, resolving defaults if not set.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.backup
            .directory
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(BACKUP_DIR_NAME))
    }

    /// Get the grading activity window as a Duration.
    #[must_use]
    pub fn activity_window(&self) -> Duration {
        Duration::days(i64::from(self.grading.activity_window_days))
    }

    /// Get the regrade interval as a Duration.
    #[must_use]
    pub fn regrade_after(&self) -> Duration {
        self.grading.regrade_after()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert_eq!(config.funnel.bottleneck_count_threshold, 10);
        assert_eq!(config.funnel.forecast_months, 3);
        assert_eq!(config.funnel.quote_valid_days, 30);
        assert_eq!(config.grading.activity_window_days, 180);
        assert_eq!(config.grading.regrade_after_days, 30);
        assert!(config.grading.ai_command.is_none());
        assert_eq!(config.backup.keep, 14);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_window() {
        let mut config = Config::default();
        config.grading.activity_window_days = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("activity_window_days"));
    }

    #[test]
    fn test_validate_zero_regrade() {
        let mut config = Config::default();
        config.grading.regrade_after_days = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("regrade_after_days"));
    }

    #[test]
    fn test_validate_forecast_months_range() {
        let mut config = Config::default();
        config.funnel.forecast_months = 0;
        assert!(config.validate().is_err());

        config.funnel.forecast_months = 25;
        assert!(config.validate().is_err());

        config.funnel.forecast_months = 12;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_quote_validity() {
        let mut config = Config::default();
        config.funnel.quote_valid_days = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("quote_valid_days"));
    }

    #[test]
    fn test_validate_zero_keep() {
        let mut config = Config::default();
        config.backup.keep = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("backup.keep"));
    }

    #[test]
    fn test_validate_blank_ai_command() {
        let mut config = Config::default();
        config.grading.ai_command = Some("   ".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("ai_command"));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();

        assert!(path.to_string_lossy().contains("salesnote.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/crm.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/crm.sqlite")
        );
    }

    #[test]
    fn test_backup_dir_default() {
        let config = Config::default();
        assert!(config.backup_dir().to_string_lossy().contains("backups"));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.activity_window(), Duration::days(180));
        assert_eq!(config.regrade_after(), Duration::days(30));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("salesnote"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "salesnote_config_test_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[funnel]\ntop_limit = 25\n\n[backup]\nkeep = 3\n",
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(config.funnel.top_limit, 25);
        assert_eq!(config.backup.keep, 3);
        // Untouched sections keep their defaults
        assert_eq!(config.grading.activity_window_days, 180);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_grading_config_deserialize() {
        let json = r#"{"activity_window_days": 90, "ai_command": "llm"}"#;
        let grading: GradingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(grading.activity_window_days, 90);
        assert_eq!(grading.regrade_after_days, 30);
        assert_eq!(grading.ai_command.as_deref(), Some("llm"));
    }
}
