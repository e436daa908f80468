//! Configuration Management Module
//!
//! File-based configuration (TOML or JSON) with defaults for every field and
//! `AUTOML_*` environment variable overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{AutoMlError, Result};

/// Configuration file format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    Json,
    #[default]
    Toml,
}

impl ConfigFormat {
    fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
        }
    }

    /// `config.<extension>`, the file name looked up in the user config dir.
    pub fn file_name(&self) -> String {
        format!("config.{}", self.extension())
    }

    /// Format implied by a file extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl std::str::FromStr for ConfigFormat {
    type Err = AutoMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ConfigFormat::Json),
            "toml" => Ok(ConfigFormat::Toml),
            _ => Err(AutoMlError::validation(format!(
                "Unsupported config format: {}",
                s
            ))),
        }
    }
}

/// Where artifacts live on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory of the artifact store
    pub root: PathBuf,
    /// Blob sub-directory
    pub objects_dir: String,
    /// Metadata sub-directory
    pub metadata_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./assets"),
            objects_dir: "objects".to_string(),
            metadata_dir: "dbo".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn objects_path(&self) -> PathBuf {
        self.root.join(&self.objects_dir)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(&self.metadata_dir)
    }
}

/// Defaults applied to training runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of rows used for training
    pub split: f64,
    /// Seed for randomized models
    pub seed: u64,
    pub classification_metrics: Vec<String>,
    pub regression_metrics: Vec<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            split: 0.8,
            seed: 42,
            classification_metrics: vec![
                "accuracy".to_string(),
                "precision".to_string(),
                "recall".to_string(),
            ],
            regression_metrics: vec![
                "mean_squared_error".to_string(),
                "root_mean_squared_error".to_string(),
                "r_squared".to_string(),
            ],
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human readable text
    pub json: bool,
    /// Also append logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.as_os_str().is_empty() {
            return Err(AutoMlError::validation("Storage root must not be empty"));
        }
        for (label, dir) in [
            ("objects_dir", &self.storage.objects_dir),
            ("metadata_dir", &self.storage.metadata_dir),
        ] {
            if dir.trim().is_empty() {
                return Err(AutoMlError::validation(format!("Storage {} must not be empty", label)));
            }
        }
        if self.storage.objects_dir == self.storage.metadata_dir {
            return Err(AutoMlError::validation(
                "Blob and metadata directories must differ",
            ));
        }
        if !(self.training.split > 0.0 && self.training.split <= 1.0) {
            return Err(AutoMlError::validation(format!(
                "Training split must be in (0, 1], got: {}",
                self.training.split
            )));
        }
        Ok(())
    }
}

/// Loads, saves and overrides an [`AppConfig`]
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
    config_format: ConfigFormat,
    config: AppConfig,
}

impl ConfigManager {
    /// Manager for the default location `<config dir>/automl/config.toml`.
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?
            .join("automl")
            .join(ConfigFormat::default().file_name());
        Self::with_path(config_path)
    }

    /// Manager for an explicit file; the format follows the extension and
    /// defaults to TOML. A missing file yields the default configuration.
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref().to_path_buf();
        let config_format = ConfigFormat::from_path(&config_path).unwrap_or_default();

        let mut manager = Self {
            config_path,
            config_format,
            config: AppConfig::default(),
        };

        if manager.config_exists() {
            manager.load_config()?;
        } else {
            debug!(
                "No configuration at {:?}, using defaults",
                manager.config_path
            );
        }

        manager.apply_env_overrides()?;
        manager.config.validate()?;
        Ok(manager)
    }

    fn get_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| AutoMlError::not_found("user configuration directory"))
    }

    pub fn config_exists(&self) -> bool {
        self.config_path.exists()
    }

    pub fn load_config(&mut self) -> Result<()> {
        let content = fs::read_to_string(&self.config_path)?;

        self.config = match self.config_format {
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| {
                AutoMlError::validation(format!("Failed to parse TOML config: {}", e))
            })?,
            ConfigFormat::Json => serde_json::from_str(&content)?,
        };

        info!("Loaded configuration from {:?}", self.config_path);
        Ok(())
    }

    pub fn save_config(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = match self.config_format {
            ConfigFormat::Toml => toml::to_string_pretty(&self.config).map_err(|e| {
                AutoMlError::validation(format!("Failed to serialize TOML config: {}", e))
            })?,
            ConfigFormat::Json => serde_json::to_string_pretty(&self.config)?,
        };

        fs::write(&self.config_path, content)?;
        info!("Saved configuration to {:?}", self.config_path);
        Ok(())
    }

    /// Apply `AUTOML_ROOT`, `AUTOML_LOG_LEVEL`, `AUTOML_SPLIT` and
    /// `AUTOML_SEED` when set. Unparsable numbers are a validation error.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var("AUTOML_ROOT") {
            self.config.storage.root = PathBuf::from(root);
            debug!("Applied env override for storage root");
        }

        if let Ok(level) = std::env::var("AUTOML_LOG_LEVEL") {
            self.config.logging.level = level;
            debug!("Applied env override for log level");
        }

        if let Ok(split) = std::env::var("AUTOML_SPLIT") {
            self.config.training.split = split.parse().map_err(|_| {
                AutoMlError::validation(format!("AUTOML_SPLIT is not a number: {}", split))
            })?;
            debug!("Applied env override for split");
        }

        if let Ok(seed) = std::env::var("AUTOML_SEED") {
            self.config.training.seed = seed.parse().map_err(|_| {
                AutoMlError::validation(format!("AUTOML_SEED is not an integer: {}", seed))
            })?;
            debug!("Applied env override for seed");
        }

        Ok(())
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_config_format(&self) -> ConfigFormat {
        self.config_format
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.training.split, 0.8);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.storage.objects_path(), PathBuf::from("./assets/objects"));
        assert_eq!(config.storage.metadata_path(), PathBuf::from("./assets/dbo"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_format_from_str() {
        assert_eq!("json".parse::<ConfigFormat>().unwrap(), ConfigFormat::Json);
        assert_eq!("TOML".parse::<ConfigFormat>().unwrap(), ConfigFormat::Toml);
        assert!("yaml".parse::<ConfigFormat>().is_err());
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/b.json")),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("a/b")), None);
    }

    #[test]
    fn test_config_file_name_matches_format() {
        assert_eq!(ConfigFormat::default().file_name(), "config.toml");
        for format in [ConfigFormat::Toml, ConfigFormat::Json] {
            let name = format.file_name();
            assert_eq!(ConfigFormat::from_path(Path::new(&name)), Some(format));
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.training.split = 0.0;
        assert!(config.validate().is_err());
        config.training.split = 1.0;
        assert!(config.validate().is_ok());
        config.training.split = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.storage.metadata_dir = "objects".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = tempdir().unwrap();
        for format in [ConfigFormat::Toml, ConfigFormat::Json] {
            let path = temp_dir.path().join(format.file_name());
            let mut manager = ConfigManager::with_path(&path).unwrap();
            assert!(!manager.config_exists());

            manager.get_config_mut().training.split = 0.6;
            manager.get_config_mut().logging.json = true;
            manager.save_config().unwrap();

            let reloaded = ConfigManager::with_path(&path).unwrap();
            assert_eq!(reloaded.get_config().training.split, 0.6);
            assert!(reloaded.get_config().logging.json);
        }
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("partial.toml");
        fs::write(&path, "[training]\nseed = 7\n").unwrap();

        let manager = ConfigManager::with_path(&path).unwrap();
        assert_eq!(manager.get_config().training.seed, 7);
        assert_eq!(manager.get_config().training.split, 0.8);
        assert_eq!(manager.get_config().storage, StorageConfig::default());
    }
}
