//! Artifact Registry
//!
//! Central registry for persisted artifacts. A registration is two writes:
//! the payload goes to the blob store at the artifact's asset path, then a
//! metadata record goes to the `artifacts` collection keyed by
//! `name@version`. The writes are not transactional; a failure between them
//! leaves an orphaned blob behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifact::{Artifact, ArtifactId, ArtifactKind, ArtifactMetadata};
use crate::config::StorageConfig;
use crate::error::{AutoMlError, Result};
use crate::storage::{Database, LocalStorage, MetadataStore, Storage};

/// Metadata collection holding artifact records
pub const ARTIFACT_COLLECTION: &str = "artifacts";

/// Metadata record of a registered artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactRecord {
    pub name: String,
    pub version: String,
    pub asset_path: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: ArtifactMetadata,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub registered_at: DateTime<Utc>,
}

impl ArtifactRecord {
    fn describe(artifact: &Artifact) -> Self {
        Self {
            name: artifact.name().to_string(),
            version: artifact.version().to_string(),
            asset_path: artifact.asset_path().to_string(),
            tags: artifact.tags().to_vec(),
            metadata: artifact.metadata().clone(),
            kind: artifact.kind(),
            registered_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Result<ArtifactId> {
        ArtifactId::new(self.name.clone(), self.version.clone())
    }

    /// Rebuild the artifact around its loaded payload.
    pub fn into_artifact(self, data: Vec<u8>) -> Result<Artifact> {
        Ok(Artifact::new(self.name, self.version, self.kind, data)?
            .with_asset_path(self.asset_path)?
            .with_tags(self.tags)
            .with_metadata(self.metadata))
    }
}

/// Facade over a metadata store and a blob store
pub struct ArtifactRegistry {
    database: Box<dyn MetadataStore + Send>,
    storage: Box<dyn Storage>,
}

impl std::fmt::Debug for ArtifactRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactRegistry").finish_non_exhaustive()
    }
}

impl ArtifactRegistry {
    pub fn new(database: Box<dyn MetadataStore + Send>, storage: Box<dyn Storage>) -> Self {
        Self { database, storage }
    }

    /// Persist an artifact, replacing any earlier one with the same id. A
    /// replaced payload stored under another path is removed.
    pub fn register(&mut self, artifact: &Artifact) -> Result<()> {
        let id = artifact.id().to_string();
        let previous_path = match self.record(artifact.id()) {
            Ok(previous) => Some(previous.asset_path),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        self.storage.save(artifact.data(), artifact.asset_path())?;
        let record = ArtifactRecord::describe(artifact);
        self.database
            .set(ARTIFACT_COLLECTION, &id, serde_json::to_value(&record)?)?;

        if let Some(stale) = previous_path.filter(|path| path != artifact.asset_path()) {
            match self.storage.delete(&stale) {
                Ok(()) => debug!("Removed replaced payload of {} at '{}'", id, stale),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        info!(
            "Registered {} artifact {} ({} bytes at '{}')",
            artifact.kind(),
            id,
            artifact.data().len(),
            artifact.asset_path()
        );
        Ok(())
    }

    /// Metadata records, optionally filtered by kind, ordered by
    /// `(name, version)`. Payloads are not loaded.
    pub fn records(&mut self, kind: Option<ArtifactKind>) -> Result<Vec<ArtifactRecord>> {
        self.database.refresh()?;
        let mut records = self
            .database
            .list(ARTIFACT_COLLECTION)
            .into_iter()
            .map(|(_, entry)| serde_json::from_value::<ArtifactRecord>(entry))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        records.retain(|record| kind.map_or(true, |k| record.kind == k));
        records.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        Ok(records)
    }

    /// Every registered artifact with its payload.
    pub fn list(&mut self, kind: Option<ArtifactKind>) -> Result<Vec<Artifact>> {
        let records = self.records(kind)?;
        debug!("Loading {} artifact payload(s)", records.len());
        records
            .into_iter()
            .map(|record| {
                let data = self.storage.load(&record.asset_path)?;
                record.into_artifact(data)
            })
            .collect()
    }

    /// Metadata record of one artifact.
    pub fn record(&mut self, id: &ArtifactId) -> Result<ArtifactRecord> {
        self.database.refresh()?;
        let entry = self
            .database
            .get(ARTIFACT_COLLECTION, &id.to_string())
            .ok_or_else(|| AutoMlError::not_found(format!("artifact {}", id)))?;
        Ok(serde_json::from_value(entry)?)
    }

    pub fn get(&mut self, id: &ArtifactId) -> Result<Artifact> {
        let record = self.record(id)?;
        let data = self.storage.load(&record.asset_path).map_err(|e| {
            if e.is_not_found() {
                AutoMlError::not_found(format!(
                    "payload of artifact {} at '{}'",
                    id, record.asset_path
                ))
            } else {
                e
            }
        })?;
        record.into_artifact(data)
    }

    pub fn contains(&mut self, id: &ArtifactId) -> Result<bool> {
        self.database.refresh()?;
        Ok(self
            .database
            .get(ARTIFACT_COLLECTION, &id.to_string())
            .is_some())
    }

    /// Remove the payload, then the metadata record.
    pub fn delete(&mut self, id: &ArtifactId) -> Result<()> {
        let record = self.record(id)?;
        self.storage.delete(&record.asset_path)?;
        self.database.delete(ARTIFACT_COLLECTION, &id.to_string())?;
        info!("Deleted artifact {}", id);
        Ok(())
    }
}

/// Process context owning the registry and its stores
#[derive(Debug)]
pub struct AutoMlSystem {
    registry: ArtifactRegistry,
}

impl AutoMlSystem {
    /// Open the blob store at `<root>/<objects_dir>` and the metadata store
    /// at `<root>/<metadata_dir>`.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let storage = LocalStorage::new(config.objects_path())?;
        let database = Database::new(LocalStorage::new(config.metadata_path())?)?;
        info!("Opened artifact store at {:?}", config.root);
        Ok(Self {
            registry: ArtifactRegistry::new(Box::new(database), Box::new(storage)),
        })
    }

    pub fn registry(&mut self) -> &mut ArtifactRegistry {
        &mut self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn system(dir: &TempDir) -> AutoMlSystem {
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        AutoMlSystem::open(&config).unwrap()
    }

    fn artifact(name: &str, version: &str, kind: ArtifactKind) -> Artifact {
        Artifact::new(name, version, kind, format!("{}-{}", name, version).into_bytes())
            .unwrap()
            .with_tags(["t1"])
    }

    #[test]
    fn test_register_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut system = system(&dir);
        let original = artifact("iris", "1.0.0", ArtifactKind::Dataset)
            .with_metadata_entry("rows", serde_json::json!(150));

        system.registry().register(&original).unwrap();
        let loaded = system.registry().get(original.id()).unwrap();
        assert_eq!(loaded, original);

        let record = system.registry().record(original.id()).unwrap();
        assert_eq!(record.asset_path, "datasets/iris_1.0.0.csv");
        assert_eq!(record.kind, ArtifactKind::Dataset);
    }

    #[test]
    fn test_register_same_identity_overwrites() {
        let dir = TempDir::new().unwrap();
        let mut system = system(&dir);
        let first = artifact("m", "1.0.0", ArtifactKind::Model);
        let second = Artifact::new("m", "1.0.0", ArtifactKind::Model, b"newer".to_vec()).unwrap();

        system.registry().register(&first).unwrap();
        system.registry().register(&second).unwrap();

        assert_eq!(system.registry().list(None).unwrap().len(), 1);
        assert_eq!(system.registry().get(first.id()).unwrap().data(), b"newer");
    }

    #[test]
    fn test_register_under_new_path_drops_old_blob() {
        let dir = TempDir::new().unwrap();
        let mut system = system(&dir);
        let first = artifact("moved", "1.0.0", ArtifactKind::Model);
        let second = artifact("moved", "1.0.0", ArtifactKind::Model)
            .with_asset_path("models/elsewhere/moved.json")
            .unwrap();

        system.registry().register(&first).unwrap();
        let old_blob = dir.path().join("objects").join(first.asset_path());
        assert!(old_blob.exists());

        system.registry().register(&second).unwrap();
        assert!(!old_blob.exists());
        assert!(dir.path().join("objects/models/elsewhere/moved.json").exists());
        let record = system.registry().record(second.id()).unwrap();
        assert_eq!(record.asset_path, "models/elsewhere/moved.json");

        // The old blob being gone already is fine
        std::fs::remove_file(dir.path().join("objects/models/elsewhere/moved.json")).unwrap();
        system.registry().register(&first).unwrap();
        assert!(old_blob.exists());
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let mut system = system(&dir);
        for (name, version, kind) in [
            ("b", "1.0.0", ArtifactKind::Model),
            ("a", "2.0.0", ArtifactKind::Dataset),
            ("a", "1.0.0", ArtifactKind::Dataset),
        ] {
            system.registry().register(&artifact(name, version, kind)).unwrap();
        }

        let ids: Vec<String> = system
            .registry()
            .list(None)
            .unwrap()
            .iter()
            .map(|a| a.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a@1.0.0", "a@2.0.0", "b@1.0.0"]);

        let datasets = system.registry().list(Some(ArtifactKind::Dataset)).unwrap();
        assert_eq!(datasets.len(), 2);
        assert!(system.registry().list(Some(ArtifactKind::Scaler)).unwrap().is_empty());
    }

    #[test]
    fn test_get_and_delete_missing() {
        let dir = TempDir::new().unwrap();
        let mut system = system(&dir);
        let id = ArtifactId::new("ghost", "0.0.1").unwrap();
        assert!(system.registry().get(&id).unwrap_err().is_not_found());
        assert!(system.registry().delete(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_removes_blob_and_record() {
        let dir = TempDir::new().unwrap();
        let mut system = system(&dir);
        let a = artifact("gone", "1.0.0", ArtifactKind::Encoder);
        system.registry().register(&a).unwrap();
        system.registry().delete(a.id()).unwrap();

        assert!(!system.registry().contains(a.id()).unwrap());
        assert!(!dir.path().join("objects/encoders/gone_1.0.0.json").exists());
        assert!(system.registry().delete(a.id()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_missing_blob_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut system = system(&dir);
        let a = artifact("orphan", "1.0.0", ArtifactKind::Model);
        system.registry().register(&a).unwrap();
        std::fs::remove_file(dir.path().join("objects").join(a.asset_path())).unwrap();

        assert!(system.registry().get(a.id()).unwrap_err().is_not_found());
        assert!(system.registry().delete(a.id()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_second_system_sees_registrations() {
        let dir = TempDir::new().unwrap();
        let mut writer = system(&dir);
        let mut reader = system(&dir);
        let a = artifact("shared", "1.0.0", ArtifactKind::Pipeline);

        writer.registry().register(&a).unwrap();
        assert_eq!(reader.registry().get(a.id()).unwrap(), a);
    }
}
