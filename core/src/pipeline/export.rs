//! Persisting trained pipelines and loading them back for inference

use ndarray::Array1;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use super::{ArtifactRole, Pipeline, PipelineConfig, MODEL_ARTIFACT};
use crate::artifact::{Artifact, ArtifactId, ArtifactKind};
use crate::dataset::Dataset;
use crate::error::{AutoMlError, Result};
use crate::feature::Feature;
use crate::model::{model_from_artifact, Model, TaskType};
use crate::operations::NDArrayOperations;
use crate::preprocessing::{FeatureEncoding, OneHotEncoder};
use crate::registry::ArtifactRegistry;

const MEMBERS_KEY: &str = "members";
const MODEL_KEY: &str = "model";
const PREPROCESSORS_KEY: &str = "preprocessors";
const TARGET_ENCODER_KEY: &str = "target_encoder";

/// Registry name of a feature's encoder or scaler,
/// `<pipeline>.feature.<feature>`, with characters that are not allowed in
/// artifact names replaced by `_`.
fn feature_member_name(pipeline: &str, feature: &str) -> String {
    let cleaned: String = feature
        .chars()
        .map(|c| match c {
            '/' | '\\' | '@' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.replace("..", "__");
    format!("{}.feature.{}", pipeline, cleaned.trim_start_matches('.'))
}

impl Pipeline {
    /// Turn [`Pipeline::artifacts`] into registry artifacts stored under
    /// `pipelines/<name>/<version>/`. Members come first and the pipeline
    /// artifact, whose metadata lists every member id, comes last.
    pub fn export(&self, name: &str, version: &str) -> Result<Vec<Artifact>> {
        let pipeline_id = ArtifactId::new(name, version)?;
        let directory = format!("pipelines/{}/{}", name, version);

        let mut members = Vec::new();
        let mut config_payload = None;
        let mut model_id = None;
        let mut preprocessors = BTreeMap::new();
        let mut member_names = HashSet::new();

        for artifact in self.artifacts()? {
            let member = match artifact.role {
                ArtifactRole::Config => {
                    config_payload = Some((artifact.payload, artifact.tags));
                    continue;
                }
                ArtifactRole::Model => format!("{}.{}", name, MODEL_ARTIFACT),
                ArtifactRole::Input | ArtifactRole::Target => {
                    feature_member_name(name, &artifact.name)
                }
            };
            if !member_names.insert(member.clone()) {
                return Err(AutoMlError::validation(format!(
                    "Feature '{}' of pipeline {} maps to member {} which is already taken; rename the column",
                    artifact.name, pipeline_id, member
                )));
            }

            let exported = Artifact::new(&member, version, artifact.kind, artifact.payload)?
                .with_asset_path(format!("{}/{}.json", directory, member))?
                .with_tags(artifact.tags)
                .with_metadata_entry("pipeline", json!(pipeline_id.to_string()));

            match artifact.role {
                ArtifactRole::Model => model_id = Some(exported.id().to_string()),
                _ => {
                    preprocessors.insert(artifact.name, exported.id().to_string());
                }
            }
            members.push(exported);
        }

        let (payload, tags) = config_payload.ok_or_else(|| {
            AutoMlError::validation("Pipeline produced no configuration artifact")
        })?;
        let model_id = model_id
            .ok_or_else(|| AutoMlError::validation("Pipeline produced no model artifact"))?;

        let target_encoder = match self.target_encoder {
            Some(_) => preprocessors.get(self.target_feature.name()).cloned(),
            None => None,
        };
        let member_ids: Vec<String> = members.iter().map(|a| a.id().to_string()).collect();
        let mut pipeline = Artifact::new(name, version, ArtifactKind::Pipeline, payload)?
            .with_asset_path(format!("{}/{}.json", directory, name))?
            .with_tags(tags)
            .with_metadata_entry(MEMBERS_KEY, json!(member_ids))
            .with_metadata_entry(MODEL_KEY, json!(model_id))
            .with_metadata_entry(PREPROCESSORS_KEY, json!(preprocessors))
            .with_metadata_entry("dataset", json!(self.dataset.id().to_string()));
        if let Some(encoder_id) = target_encoder {
            pipeline = pipeline.with_metadata_entry(TARGET_ENCODER_KEY, json!(encoder_id));
        }
        if let Some(report) = &self.report {
            pipeline = pipeline.with_metadata_entry("metrics", json!(report.formatted_metrics()));
        }

        members.push(pipeline);
        debug!("Exported pipeline {} as {} artifact(s)", pipeline_id, members.len());
        Ok(members)
    }

    /// Export and register every artifact; returns the pipeline's id.
    pub fn save(&self, registry: &mut ArtifactRegistry, name: &str, version: &str) -> Result<ArtifactId> {
        let artifacts = self.export(name, version)?;
        for artifact in &artifacts {
            registry.register(artifact)?;
        }
        let id = ArtifactId::new(name, version)?;
        info!("Saved pipeline {} ({} artifacts)", id, artifacts.len());
        Ok(id)
    }
}

/// A trained pipeline reloaded from the registry for batch prediction
#[derive(Debug)]
pub struct SavedPipeline {
    id: ArtifactId,
    config: PipelineConfig,
    preprocessors: Vec<(Feature, FeatureEncoding)>,
    target_encoder: Option<OneHotEncoder>,
    model: Box<dyn Model>,
}

fn metadata_id(artifact: &Artifact, key: &str) -> Result<Option<ArtifactId>> {
    match artifact.metadata().get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.parse()?)),
        Some(other) => Err(AutoMlError::validation(format!(
            "Pipeline {} has a malformed '{}' entry: {}",
            artifact.id(),
            key,
            other
        ))),
    }
}

impl SavedPipeline {
    /// Load the pipeline artifact `id` and every member it references.
    pub fn load(registry: &mut ArtifactRegistry, id: &ArtifactId) -> Result<Self> {
        let artifact = registry.get(id)?;
        artifact.expect_kind(ArtifactKind::Pipeline)?;
        let config: PipelineConfig = serde_json::from_slice(artifact.data())?;

        let model_id = metadata_id(&artifact, MODEL_KEY)?
            .ok_or_else(|| AutoMlError::not_found(format!("model of pipeline {}", id)))?;
        let model = model_from_artifact(&registry.get(&model_id)?)?;
        if model.task_type() != config.task_type {
            return Err(AutoMlError::validation(format!(
                "Pipeline {} expects a {} model but {} is {}",
                id,
                config.task_type,
                model_id,
                model.task_type()
            )));
        }

        let references: BTreeMap<String, String> = match artifact.metadata().get(PREPROCESSORS_KEY) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => BTreeMap::new(),
        };
        let mut preprocessors = Vec::with_capacity(config.input_features.len());
        for feature in &config.input_features {
            let member = references.get(feature.name()).ok_or_else(|| {
                AutoMlError::not_found(format!(
                    "preprocessor for feature '{}' of pipeline {}",
                    feature.name(),
                    id
                ))
            })?;
            let encoding = FeatureEncoding::from_bytes(registry.get(&member.parse()?)?.data())?;
            preprocessors.push((feature.clone(), encoding));
        }

        let target_encoder = match metadata_id(&artifact, TARGET_ENCODER_KEY)? {
            Some(encoder_id) => match FeatureEncoding::from_bytes(registry.get(&encoder_id)?.data())? {
                FeatureEncoding::OneHot(encoder) => Some(encoder),
                FeatureEncoding::Standard(_) => {
                    return Err(AutoMlError::validation(format!(
                        "Target encoder {} of pipeline {} is a scaler",
                        encoder_id, id
                    )))
                }
            },
            None => None,
        };

        info!("Loaded pipeline {} ({})", id, config.model);
        Ok(Self {
            id: id.clone(),
            config,
            preprocessors,
            target_encoder,
            model,
        })
    }

    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Encode `dataset` with the saved preprocessors, in training order, and
    /// run the model. Missing input columns are a validation error.
    pub fn predict(&self, dataset: &Dataset) -> Result<Array1<f64>> {
        let table = dataset.read()?;
        let missing: Vec<&str> = self
            .config
            .input_features
            .iter()
            .map(Feature::name)
            .filter(|name| !table.has_column(name))
            .collect();
        if !missing.is_empty() {
            return Err(AutoMlError::validation(format!(
                "Dataset {} is missing input column(s): {}",
                dataset.id(),
                missing.join(", ")
            )));
        }

        let blocks = self
            .preprocessors
            .iter()
            .map(|(feature, encoding)| encoding.transform(feature.name(), &table))
            .collect::<Result<Vec<_>>>()?;
        let observations = NDArrayOperations::concatenate_columns(&blocks)?;
        self.model.predict(&observations)
    }

    /// Predictions as text: category names for classification, numbers for
    /// regression.
    pub fn predict_labels(&self, dataset: &Dataset) -> Result<Vec<String>> {
        let predictions = self.predict(dataset)?;
        match (self.config.task_type, &self.target_encoder) {
            (TaskType::Classification, Some(encoder)) => predictions
                .iter()
                .map(|&p| {
                    encoder
                        .category(p as usize)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            AutoMlError::validation(format!(
                                "Predicted class {} has no label in pipeline {}",
                                p, self.id
                            ))
                        })
                })
                .collect(),
            _ => Ok(predictions.iter().map(|p| p.to_string()).collect()),
        }
    }
}
