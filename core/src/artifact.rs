//! Artifacts
//!
//! An artifact is the unit of persistence: a versioned, typed binary
//! payload plus free-form tags and metadata. Its identity is the plain
//! composite key `(name, version)`, so re-registering the same logical
//! artifact at the same version overwrites instead of duplicating.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{AutoMlError, Result};

/// Free-form artifact metadata
pub type ArtifactMetadata = BTreeMap<String, serde_json::Value>;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("static regex"))
}

/// Identity of an artifact: name + semantic version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId {
    name: String,
    version: String,
}

impl ArtifactId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let version = version.into();
        validate_name(&name)?;
        if !version_pattern().is_match(&version) {
            return Err(AutoMlError::validation(format!(
                "Artifact version must look like MAJOR.MINOR.PATCH, received '{}'",
                version
            )));
        }
        Ok(Self { name, version })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl FromStr for ArtifactId {
    type Err = AutoMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.rsplit_once('@') {
            Some((name, version)) => ArtifactId::new(name, version),
            None => Err(AutoMlError::validation(format!(
                "Artifact id must look like name@version, received '{}'",
                s
            ))),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AutoMlError::validation("Artifact name must be a non empty string"));
    }
    if name.contains(['/', '\\', '@']) || name.chars().any(char::is_control) {
        return Err(AutoMlError::validation(format!(
            "Artifact name '{}' must not contain '/', '\\', '@' or control characters",
            name
        )));
    }
    if name.starts_with('.') || name.contains("..") {
        return Err(AutoMlError::validation(format!(
            "Artifact name '{}' must not start with '.' or contain '..'",
            name
        )));
    }
    Ok(())
}

/// Relative, `/`-separated key that stays inside the blob store root.
pub(crate) fn validate_asset_path(path: &str) -> Result<()> {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(AutoMlError::validation(format!(
            "Asset path '{}' must be a non empty relative path",
            path
        )));
    }
    if path.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(AutoMlError::validation(format!(
            "Asset path '{}' must not contain empty, '.' or '..' segments",
            path
        )));
    }
    Ok(())
}

/// Kind tag of an artifact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Dataset,
    Model,
    Pipeline,
    Encoder,
    Scaler,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Dataset => "dataset",
            ArtifactKind::Model => "model",
            ArtifactKind::Pipeline => "pipeline",
            ArtifactKind::Encoder => "encoder",
            ArtifactKind::Scaler => "scaler",
        }
    }

    fn default_extension(&self) -> &'static str {
        match self {
            ArtifactKind::Dataset => "csv",
            _ => "json",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = AutoMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dataset" => Ok(ArtifactKind::Dataset),
            "model" => Ok(ArtifactKind::Model),
            "pipeline" => Ok(ArtifactKind::Pipeline),
            "encoder" => Ok(ArtifactKind::Encoder),
            "scaler" => Ok(ArtifactKind::Scaler),
            other => Err(AutoMlError::validation(format!(
                "Unknown artifact type '{}'",
                other
            ))),
        }
    }
}

/// A versioned, typed binary payload with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    id: ArtifactId,
    kind: ArtifactKind,
    asset_path: String,
    data: Vec<u8>,
    tags: Vec<String>,
    metadata: ArtifactMetadata,
}

impl Artifact {
    /// Create an artifact stored under the default asset path
    /// `<kind>s/<name>_<version>.<ext>`.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        kind: ArtifactKind,
        data: Vec<u8>,
    ) -> Result<Self> {
        let id = ArtifactId::new(name, version)?;
        let asset_path = format!(
            "{}s/{}_{}.{}",
            kind.as_str(),
            id.name(),
            id.version(),
            kind.default_extension()
        );
        Ok(Self {
            id,
            kind,
            asset_path,
            data,
            tags: Vec::new(),
            metadata: ArtifactMetadata::new(),
        })
    }

    pub fn with_asset_path(mut self, asset_path: impl Into<String>) -> Result<Self> {
        let asset_path = asset_path.into();
        validate_asset_path(&asset_path)?;
        self.asset_path = asset_path;
        Ok(self)
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: ArtifactMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    pub fn version(&self) -> &str {
        self.id.version()
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn asset_path(&self) -> &str {
        &self.asset_path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// Fail unless the artifact carries the expected kind tag.
    pub fn expect_kind(&self, kind: ArtifactKind) -> Result<()> {
        if self.kind != kind {
            return Err(AutoMlError::validation(format!(
                "Artifact {} is a {}, expected a {}",
                self.id, self.kind, kind
            )));
        }
        Ok(())
    }
}
