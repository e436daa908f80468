//! Configuration resolution
//!
//! Resolution priority for the configuration file:
//! 1. --config <file> flag (highest priority)
//! 2. $AUTOML_CONFIG env var
//! 3. `<user config dir>/automl/config.toml` (default)
//!
//! `--root` then overrides the storage root of whatever was loaded.

use std::path::{Path, PathBuf};

use automl_core::{AppConfig, ConfigManager};

use crate::cli::Error;

/// Resolve the configuration file to read, `None` meaning the default
/// location.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>, Error> {
    if let Some(path) = explicit {
        // An explicitly named file must exist
        if !path.exists() {
            return Err(Error::InvalidArgs(format!(
                "config file '{}' does not exist",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    match std::env::var_os("AUTOML_CONFIG") {
        Some(path) if !path.is_empty() => Ok(Some(PathBuf::from(path))),
        _ => Ok(None),
    }
}

/// Load the effective configuration for one invocation.
pub fn load_config(explicit: Option<&Path>, root: Option<&Path>) -> anyhow::Result<AppConfig> {
    let manager = match resolve_config_path(explicit)? {
        Some(path) => ConfigManager::with_path(path)?,
        None => ConfigManager::new()?,
    };
    let mut config = manager.into_config();
    if let Some(root) = root {
        config.storage.root = root.to_path_buf();
    }
    config.validate()?;
    Ok(config)
}
