//! JSON document store over a blob store
//!
//! Documents are grouped in collections and stored one blob per document at
//! `<collection>/<id>.json`. The in-memory view is written through on every
//! change and rebuilt from the blobs by [`MetadataStore::refresh`].

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use super::Storage;
use crate::error::{AutoMlError, Result};

const DOCUMENT_EXTENSION: &str = ".json";

/// Key/value document store contract
pub trait MetadataStore {
    /// Insert or replace a document.
    fn set(&mut self, collection: &str, id: &str, entry: Value) -> Result<()>;

    /// `None` when the document is absent.
    fn get(&self, collection: &str, id: &str) -> Option<Value>;

    /// Remove a document; NotFound when absent.
    fn delete(&mut self, collection: &str, id: &str) -> Result<()>;

    /// `(id, document)` pairs of a collection, ordered by id.
    fn list(&self, collection: &str) -> Vec<(String, Value)>;

    /// Reload every document from storage.
    fn refresh(&mut self) -> Result<()>;
}

/// Write-through document store backed by a [`Storage`]
#[derive(Debug)]
pub struct Database<S: Storage> {
    storage: S,
    data: BTreeMap<String, BTreeMap<String, Value>>,
}

impl<S: Storage> Database<S> {
    /// Open the store and load every document already persisted.
    pub fn new(storage: S) -> Result<Self> {
        let mut database = Self {
            storage,
            data: BTreeMap::new(),
        };
        database.refresh()?;
        Ok(database)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn document_key(collection: &str, id: &str) -> Result<String> {
        for (label, part) in [("collection", collection), ("id", id)] {
            if part.is_empty() || part.contains('/') || part == "." || part == ".." {
                return Err(AutoMlError::validation(format!(
                    "Document {} '{}' must be a non empty name without '/'",
                    label, part
                )));
            }
        }
        Ok(format!("{}/{}{}", collection, id, DOCUMENT_EXTENSION))
    }
}

impl<S: Storage> MetadataStore for Database<S> {
    fn set(&mut self, collection: &str, id: &str, entry: Value) -> Result<()> {
        let key = Self::document_key(collection, id)?;
        self.storage.save(&serde_json::to_vec(&entry)?, &key)?;
        self.data
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), entry);
        debug!("Stored document '{}' in '{}'", id, collection);
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Option<Value> {
        self.data.get(collection)?.get(id).cloned()
    }

    fn delete(&mut self, collection: &str, id: &str) -> Result<()> {
        let key = Self::document_key(collection, id)?;
        let removed = self
            .data
            .get_mut(collection)
            .and_then(|documents| documents.remove(id));
        if removed.is_none() {
            return Err(AutoMlError::not_found(format!(
                "document '{}' in collection '{}'",
                id, collection
            )));
        }
        self.storage.delete(&key)?;
        debug!("Deleted document '{}' from '{}'", id, collection);
        Ok(())
    }

    fn list(&self, collection: &str) -> Vec<(String, Value)> {
        self.data
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, entry)| (id.clone(), entry.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn refresh(&mut self) -> Result<()> {
        let mut data: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for key in self.storage.list("")? {
            let Some((collection, file)) = key.split_once('/') else {
                continue;
            };
            let Some(id) = file.strip_suffix(DOCUMENT_EXTENSION) else {
                continue;
            };
            if id.contains('/') {
                warn!("Skipping nested document key '{}'", key);
                continue;
            }
            let entry: Value = serde_json::from_slice(&self.storage.load(&key)?)?;
            data.entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), entry);
        }
        self.data = data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use serde_json::json;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Database<LocalStorage> {
        Database::new(LocalStorage::new(dir.path().join("dbo")).unwrap()).unwrap()
    }

    #[test]
    fn test_set_get_list() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir);

        db.set("artifacts", "b@1.0.0", json!({"n": 2})).unwrap();
        db.set("artifacts", "a@1.0.0", json!({"n": 1})).unwrap();

        assert_eq!(db.get("artifacts", "a@1.0.0"), Some(json!({"n": 1})));
        assert_eq!(db.get("artifacts", "zzz"), None);
        assert_eq!(db.get("other", "a@1.0.0"), None);

        let ids: Vec<String> = db.list("artifacts").into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a@1.0.0", "b@1.0.0"]);
        assert!(db.list("empty").is_empty());
    }

    #[test]
    fn test_documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut db = open(&dir);
            db.set("artifacts", "a@1.0.0", json!({"kind": "dataset"})).unwrap();
        }
        let db = open(&dir);
        assert_eq!(db.get("artifacts", "a@1.0.0"), Some(json!({"kind": "dataset"})));
    }

    #[test]
    fn test_refresh_sees_other_writers() {
        let dir = TempDir::new().unwrap();
        let mut reader = open(&dir);
        let mut writer = open(&dir);

        writer.set("artifacts", "x@0.1.0", json!(true)).unwrap();
        assert_eq!(reader.get("artifacts", "x@0.1.0"), None);
        reader.refresh().unwrap();
        assert_eq!(reader.get("artifacts", "x@0.1.0"), Some(json!(true)));
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut db = open(&dir);
        db.set("artifacts", "a@1.0.0", json!(1)).unwrap();
        db.delete("artifacts", "a@1.0.0").unwrap();
        assert!(db.delete("artifacts", "a@1.0.0").unwrap_err().is_not_found());
        assert!(db.list("artifacts").is_empty());
    }
}
