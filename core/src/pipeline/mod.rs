//! Training pipeline
//!
//! A [`Pipeline`] ties a dataset, a model, the input and target features, a
//! split ratio and a metric list together. [`Pipeline::execute`] walks the
//! state machine `Constructed → Preprocessed → Split → Trained → Evaluated`
//! in one call; running it again starts over from preprocessing.
//!
//! The split is positional: rows `[0, floor(split * n))` train the model and
//! the rest evaluate it. Rows are never shuffled, so callers that want a
//! random split must shuffle the dataset first.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::artifact::ArtifactKind;
use crate::dataset::Dataset;
use crate::error::{AutoMlError, Result};
use crate::feature::Feature;
use crate::metric::Metric;
use crate::model::{model_payload, Model, TaskType};
use crate::operations::NDArrayOperations;
use crate::preprocessing::{encode_target, preprocess_features, FeatureEncoding, OneHotEncoder};

mod export;

pub use export::SavedPipeline;

/// Name of the configuration entry in [`Pipeline::artifacts`]
pub const CONFIG_ARTIFACT: &str = "pipeline_config";
/// Name of the fitted model entry in [`Pipeline::artifacts`]
pub const MODEL_ARTIFACT: &str = "model";

/// Lifecycle of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Constructed,
    Preprocessed,
    Split,
    Trained,
    Evaluated,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Constructed => "constructed",
            PipelineState::Preprocessed => "preprocessed",
            PipelineState::Split => "split",
            PipelineState::Trained => "trained",
            PipelineState::Evaluated => "evaluated",
        };
        f.write_str(name)
    }
}

/// Everything needed to replay the pipeline's encoding at inference time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Input features in design-matrix column order
    pub input_features: Vec<Feature>,
    pub target_feature: Feature,
    pub split: f64,
    pub model: String,
    pub task_type: TaskType,
    pub metrics: Vec<String>,
}

/// Value of one metric on the test partition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricResult {
    pub name: String,
    pub value: f64,
}

impl fmt::Display for MetricResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Outcome of [`Pipeline::execute`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// One result per configured metric, in configuration order. Empty when
    /// the split leaves no test rows.
    pub metrics: Vec<MetricResult>,
    /// Predictions on the test partition
    pub predictions: Array1<f64>,
}

impl ExecutionReport {
    /// `"<MetricName>: <value>"` lines.
    pub fn formatted_metrics(&self) -> Vec<String> {
        self.metrics.iter().map(ToString::to_string).collect()
    }
}

/// What a [`PipelineArtifact`] is used for when the pipeline is reloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRole {
    /// Encoder or scaler of an input feature
    Input,
    /// Encoder of a categorical target that is not also an input
    Target,
    Config,
    Model,
}

/// A serializable output of a trained pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineArtifact {
    /// Feature name for encoders and scalers, [`CONFIG_ARTIFACT`] or
    /// [`MODEL_ARTIFACT`] otherwise. Only `role` tells them apart, since a
    /// feature may carry either reserved name.
    pub name: String,
    pub role: ArtifactRole,
    pub kind: ArtifactKind,
    pub payload: Vec<u8>,
    pub tags: Vec<String>,
}

/// Encoded data held between the steps of one run
#[derive(Debug, Default)]
struct RunData {
    blocks: Vec<Array2<f64>>,
    target: Array1<f64>,
    split_index: usize,
}

pub struct Pipeline {
    metrics: Vec<Box<dyn Metric>>,
    dataset: Dataset,
    model: Box<dyn Model>,
    input_features: Vec<Feature>,
    target_feature: Feature,
    split: f64,
    state: PipelineState,
    encodings: Vec<(Feature, FeatureEncoding)>,
    target_encoder: Option<OneHotEncoder>,
    run: RunData,
    report: Option<ExecutionReport>,
}

impl Pipeline {
    /// Build a pipeline, checking that the model's task type matches the
    /// target feature (categorical → classification, numerical →
    /// regression) and that the split ratio lies in `(0, 1]`.
    pub fn new(
        metrics: Vec<Box<dyn Metric>>,
        dataset: Dataset,
        model: Box<dyn Model>,
        input_features: Vec<Feature>,
        target_feature: Feature,
        split: f64,
    ) -> Result<Self> {
        let required = target_feature.feature_type().task_type();
        if model.task_type() != required {
            return Err(AutoMlError::validation(format!(
                "Model type must be {} for {} target feature '{}', but '{}' is a {} model",
                required,
                target_feature.feature_type(),
                target_feature.name(),
                model.name(),
                model.task_type()
            )));
        }
        if !(split > 0.0 && split <= 1.0) {
            return Err(AutoMlError::validation(format!(
                "Split ratio must be in (0, 1], got {}",
                split
            )));
        }

        Ok(Self {
            metrics,
            dataset,
            model,
            input_features,
            target_feature,
            split,
            state: PipelineState::Constructed,
            encodings: Vec::new(),
            target_encoder: None,
            run: RunData::default(),
            report: None,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn input_features(&self) -> &[Feature] {
        &self.input_features
    }

    pub fn target_feature(&self) -> &Feature {
        &self.target_feature
    }

    pub fn split(&self) -> f64 {
        self.split
    }

    pub fn task_type(&self) -> TaskType {
        self.model.task_type()
    }

    /// Result of the most recent successful run.
    pub fn report(&self) -> Option<&ExecutionReport> {
        self.report.as_ref()
    }

    /// `(train rows, test rows)` once the data has been split.
    pub fn split_sizes(&self) -> Option<(usize, usize)> {
        if self.state < PipelineState::Split {
            return None;
        }
        Some((self.run.split_index, self.run.target.len() - self.run.split_index))
    }

    /// Encoders kept for a categorical target.
    pub fn target_encoder(&self) -> Option<&OneHotEncoder> {
        self.target_encoder.as_ref()
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            input_features: self.input_features.clone(),
            target_feature: self.target_feature.clone(),
            split: self.split,
            model: self.model.name().to_string(),
            task_type: self.model.task_type(),
            metrics: self.metrics.iter().map(|m| m.key().to_string()).collect(),
        }
    }

    /// Run preprocessing, split, training and evaluation.
    pub fn execute(&mut self) -> Result<ExecutionReport> {
        self.state = PipelineState::Constructed;
        self.report = None;

        self.preprocess_features()?;
        self.split_data()?;
        self.train()?;
        let report = self.evaluate()?;

        info!(
            "Pipeline executed: {} on {} with {} metric result(s)",
            self.model.name(),
            self.dataset.id(),
            report.metrics.len()
        );
        self.report = Some(report.clone());
        Ok(report)
    }

    fn preprocess_features(&mut self) -> Result<()> {
        let table = self.dataset.read()?;
        if table.n_rows() == 0 {
            return Err(AutoMlError::shape(format!(
                "Dataset {} has no rows",
                self.dataset.id()
            )));
        }

        let target = encode_target(&self.target_feature, &table)?;
        let inputs = preprocess_features(&self.input_features, &self.dataset)?;

        self.target_encoder = target.encoder;
        self.run = RunData {
            blocks: inputs.iter().map(|p| p.data.clone()).collect(),
            target: target.values,
            split_index: 0,
        };
        self.encodings = inputs
            .into_iter()
            .map(|p| (p.feature, p.encoding))
            .collect();

        self.state = PipelineState::Preprocessed;
        debug!(
            "Preprocessed {} input feature(s) over {} rows",
            self.encodings.len(),
            self.run.target.len()
        );
        Ok(())
    }

    fn split_data(&mut self) -> Result<()> {
        let n = self.run.target.len();
        let split_index = (self.split * n as f64).floor() as usize;
        if split_index == 0 {
            return Err(AutoMlError::shape(format!(
                "Split {} of {} rows leaves no training data",
                self.split, n
            )));
        }
        self.run.split_index = split_index.min(n);
        self.state = PipelineState::Split;
        debug!("Split {} rows into {} train / {} test", n, split_index, n - split_index);
        Ok(())
    }

    fn compact_vectors(&self, start: usize, end: usize) -> Result<Array2<f64>> {
        let slices: Vec<Array2<f64>> = self
            .run
            .blocks
            .iter()
            .map(|block| NDArrayOperations::rows(block, start, end))
            .collect();
        NDArrayOperations::concatenate_columns(&slices)
    }

    fn train(&mut self) -> Result<()> {
        let end = self.run.split_index;
        let observations = self.compact_vectors(0, end)?;
        let ground_truth = self.run.target.slice(ndarray::s![..end]).to_owned();
        self.model.fit(&observations, &ground_truth)?;
        self.state = PipelineState::Trained;
        Ok(())
    }

    fn evaluate(&mut self) -> Result<ExecutionReport> {
        let (start, n) = (self.run.split_index, self.run.target.len());
        if start == n {
            debug!("No test rows; skipping evaluation");
            self.state = PipelineState::Evaluated;
            return Ok(ExecutionReport {
                metrics: Vec::new(),
                predictions: Array1::zeros(0),
            });
        }

        let observations = self.compact_vectors(start, n)?;
        let ground_truth = self.run.target.slice(ndarray::s![start..]).to_owned();
        let predictions = self.model.predict(&observations)?;

        let metrics = self
            .metrics
            .iter()
            .map(|metric| {
                Ok(MetricResult {
                    name: metric.name().to_string(),
                    value: metric.evaluate(&predictions, &ground_truth)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.state = PipelineState::Evaluated;
        Ok(ExecutionReport {
            metrics,
            predictions,
        })
    }

    /// Serializable outputs of the last run: one encoder or scaler per input
    /// feature in order, the target encoder for categorical targets, the
    /// pipeline configuration and the fitted model.
    pub fn artifacts(&self) -> Result<Vec<PipelineArtifact>> {
        if self.state < PipelineState::Trained {
            return Err(AutoMlError::NotFitted(format!(
                "pipeline is {}; execute it before exporting artifacts",
                self.state
            )));
        }

        let mut artifacts = Vec::with_capacity(self.encodings.len() + 3);
        for (feature, encoding) in &self.encodings {
            artifacts.push(PipelineArtifact {
                name: feature.name().to_string(),
                role: ArtifactRole::Input,
                kind: encoding.kind(),
                payload: encoding.to_bytes()?,
                tags: vec![feature.feature_type().to_string()],
            });
        }

        // A categorical target that is also an input shares its encoder.
        if let Some(encoder) = &self.target_encoder {
            let already_encoded = self
                .encodings
                .iter()
                .any(|(feature, _)| feature.name() == self.target_feature.name());
            if !already_encoded {
                artifacts.push(PipelineArtifact {
                    name: self.target_feature.name().to_string(),
                    role: ArtifactRole::Target,
                    kind: ArtifactKind::Encoder,
                    payload: FeatureEncoding::OneHot(encoder.clone()).to_bytes()?,
                    tags: vec!["target".to_string()],
                });
            }
        }

        artifacts.push(PipelineArtifact {
            name: CONFIG_ARTIFACT.to_string(),
            role: ArtifactRole::Config,
            kind: ArtifactKind::Pipeline,
            payload: serde_json::to_vec(&self.config())?,
            tags: vec![self.task_type().to_string()],
        });
        artifacts.push(PipelineArtifact {
            name: MODEL_ARTIFACT.to_string(),
            role: ArtifactRole::Model,
            kind: ArtifactKind::Model,
            payload: model_payload(self.model.as_ref())?,
            tags: vec![self.task_type().to_string(), self.model.name().to_string()],
        });
        Ok(artifacts)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("model", &self.model.name())
            .field("dataset", &self.dataset.id().to_string())
            .field("state", &self.state)
            .field("split", &self.split)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self.input_features.iter().map(ToString::to_string).collect();
        let metrics: Vec<&str> = self.metrics.iter().map(|m| m.name()).collect();
        writeln!(f, "Pipeline(")?;
        writeln!(f, "    model={} ({}),", self.model.name(), self.model.task_type())?;
        writeln!(f, "    input_features=[{}],", inputs.join(", "))?;
        writeln!(f, "    target_feature={},", self.target_feature)?;
        writeln!(f, "    split={},", self.split)?;
        writeln!(f, "    metrics=[{}],", metrics.join(", "))?;
        write!(f, ")")
    }
}
