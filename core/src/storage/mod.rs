//! Blob and metadata storage
//!
//! [`Storage`] is a flat key/value blob store addressed by `/`-separated
//! relative keys. [`LocalStorage`] keeps each blob as a file under a base
//! directory. The metadata [`Database`] is layered on top of any blob store.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::artifact::validate_asset_path;
use crate::error::{AutoMlError, Result};

pub mod database;

pub use database::{Database, MetadataStore};

/// Blob store contract
pub trait Storage: Send {
    /// Write `data` under `key`, replacing any previous blob.
    fn save(&self, data: &[u8], key: &str) -> Result<()>;

    /// Read the blob at `key`; NotFound when absent.
    fn load(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove the blob at `key`; NotFound when absent.
    fn delete(&self, key: &str) -> Result<()>;

    /// Every blob key under `prefix`, recursively, sorted. An empty prefix
    /// lists the whole store. NotFound when the prefix does not exist.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Filesystem-backed blob store
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Open (and create if needed) a store rooted at `base_path`.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        debug!("Opened local storage at {:?}", base_path);
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn join_key(&self, key: &str) -> Result<PathBuf> {
        validate_asset_path(key)?;
        Ok(self.base_path.join(key))
    }

    fn join_prefix(&self, prefix: &str) -> Result<PathBuf> {
        let trimmed = prefix.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(self.base_path.clone());
        }
        self.join_key(trimmed)
    }

    fn assert_exists(path: &Path, key: &str) -> Result<()> {
        if !path.exists() {
            return Err(AutoMlError::not_found(format!("path '{}'", key)));
        }
        Ok(())
    }

    /// Store key of a file below the base directory.
    fn key_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Option<Vec<&str>> = relative
            .components()
            .map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();
        parts.map(|p| p.join("/"))
    }
}

impl Storage for LocalStorage {
    fn save(&self, data: &[u8], key: &str) -> Result<()> {
        let path = self.join_key(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        debug!("Saved {} bytes to '{}'", data.len(), key);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.join_key(key)?;
        Self::assert_exists(&path, key)?;
        Ok(fs::read(&path)?)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.join_key(key)?;
        Self::assert_exists(&path, key)?;
        fs::remove_file(&path)?;
        debug!("Deleted '{}'", key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.join_prefix(prefix)?;
        Self::assert_exists(&root, prefix)?;

        let root_str = root.to_str().ok_or_else(|| {
            AutoMlError::validation(format!("Storage path {:?} is not valid UTF-8", root))
        })?;
        let pattern = format!("{}/**/*", glob::Pattern::escape(root_str));
        let paths = glob::glob(&pattern)
            .map_err(|e| AutoMlError::validation(format!("Invalid listing pattern: {}", e)))?;

        let mut keys = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| AutoMlError::Io(e.into()))?;
            if path.is_file() {
                if let Some(key) = self.key_of(&path) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
