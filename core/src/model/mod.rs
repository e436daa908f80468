//! Models
//!
//! Every algorithm sits behind the same [`Model`] contract so the pipeline
//! can treat them uniformly:
//! - `fit` takes an `(n_samples, n_features)` matrix and an `(n_samples,)`
//!   target vector
//! - `predict` maps `(n_samples, n_features)` to `(n_samples,)`
//! - `parameters` is a read-only snapshot of the learned state
//!
//! Classification targets are class indices stored as `f64`.
//! Predicting with an unfitted model fails with [`AutoMlError::NotFitted`].

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::artifact::{Artifact, ArtifactKind};
use crate::error::{AutoMlError, Result};

pub mod knn;
pub mod lasso;
pub mod linear_regression;
pub mod logistic_regression;
pub mod tree;

pub use knn::KNearestNeighbors;
pub use lasso::Lasso;
pub use linear_regression::MultipleLinearRegression;
pub use logistic_regression::LogisticRegression;
pub use tree::{DecisionTree, RandomForest};

/// Hyperparameters, fixed at construction
pub type Hyperparameters = HashMap<String, serde_json::Value>;

/// Names accepted by [`get_model`] for regression targets
pub const REGRESSION_MODELS: [&str; 2] = ["multiple_linear_regression", "lasso"];

/// Names accepted by [`get_model`] for classification targets
pub const CLASSIFICATION_MODELS: [&str; 4] =
    ["logistic_regression", "knn", "decision_tree", "random_forest"];

/// Learning task, decided by the target feature type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Classification,
    Regression,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Regression => "regression",
        }
    }

    /// Model names available for this task.
    pub fn models(&self) -> &'static [&'static str] {
        match self {
            TaskType::Classification => &CLASSIFICATION_MODELS,
            TaskType::Regression => &REGRESSION_MODELS,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = AutoMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "classification" => Ok(TaskType::Classification),
            "regression" => Ok(TaskType::Regression),
            other => Err(AutoMlError::validation(format!(
                "Unsupported task type '{}'. Choose either 'classification' or 'regression'",
                other
            ))),
        }
    }
}

/// Uniform predictor contract
pub trait Model: fmt::Debug + Send {
    /// Catalog name, e.g. `knn`
    fn name(&self) -> &'static str;

    fn task_type(&self) -> TaskType;

    fn hyperparameters(&self) -> &Hyperparameters;

    fn is_fitted(&self) -> bool;

    fn fit(&mut self, observations: &Array2<f64>, ground_truth: &Array1<f64>) -> Result<()>;

    fn predict(&self, observations: &Array2<f64>) -> Result<Array1<f64>>;

    /// Snapshot of the learned state.
    fn parameters(&self) -> Result<serde_json::Value>;

    /// Reinstate learned state captured by [`Model::parameters`].
    fn restore(&mut self, parameters: serde_json::Value) -> Result<()>;
}

/// Build an unfitted model by catalog name.
pub fn get_model(name: &str, hyperparameters: Hyperparameters) -> Result<Box<dyn Model>> {
    debug!("Creating model '{}' with {:?}", name, hyperparameters);
    match name.to_lowercase().as_str() {
        "multiple_linear_regression" | "linear_regression" => {
            Ok(Box::new(MultipleLinearRegression::new(hyperparameters)?))
        }
        "lasso" => Ok(Box::new(Lasso::new(hyperparameters)?)),
        "logistic_regression" => Ok(Box::new(LogisticRegression::new(hyperparameters)?)),
        "knn" | "k_nearest_neighbors" => Ok(Box::new(KNearestNeighbors::new(hyperparameters)?)),
        "decision_tree" => Ok(Box::new(DecisionTree::new(hyperparameters)?)),
        "random_forest" => Ok(Box::new(RandomForest::new(hyperparameters)?)),
        _ => Err(AutoMlError::validation(format!(
            "Model '{}' is not supported. Available regression models: {}; classification models: {}",
            name,
            REGRESSION_MODELS.join(", "),
            CLASSIFICATION_MODELS.join(", ")
        ))),
    }
}

/// On-disk form of a fitted model
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelRecord {
    model: String,
    task_type: TaskType,
    hyperparameters: Hyperparameters,
    parameters: serde_json::Value,
}

/// Serialize a fitted model into a model artifact tagged with its task type.
pub fn model_to_artifact(model: &dyn Model, name: &str, version: &str) -> Result<Artifact> {
    let payload = model_payload(model)?;
    Ok(Artifact::new(name, version, ArtifactKind::Model, payload)?
        .with_tags([model.task_type().as_str(), model.name()]))
}

pub(crate) fn model_payload(model: &dyn Model) -> Result<Vec<u8>> {
    let record = ModelRecord {
        model: model.name().to_string(),
        task_type: model.task_type(),
        hyperparameters: model.hyperparameters().clone(),
        parameters: model.parameters()?,
    };
    Ok(serde_json::to_vec(&record)?)
}

/// Rebuild a fitted model from a model artifact.
pub fn model_from_artifact(artifact: &Artifact) -> Result<Box<dyn Model>> {
    artifact.expect_kind(ArtifactKind::Model)?;
    let record: ModelRecord = serde_json::from_slice(artifact.data())?;

    let mut model = get_model(&record.model, record.hyperparameters)?;
    if model.task_type() != record.task_type {
        return Err(AutoMlError::validation(format!(
            "Model artifact {} declares task type {} but '{}' is a {} model",
            artifact.id(),
            record.task_type,
            record.model,
            model.task_type()
        )));
    }
    model.restore(record.parameters)?;
    Ok(model)
}

/// Input checks shared by every `fit`.
pub(crate) fn check_training_data(
    model: &str,
    observations: &Array2<f64>,
    ground_truth: &Array1<f64>,
) -> Result<()> {
    if observations.nrows() != ground_truth.len() {
        return Err(AutoMlError::shape(format!(
            "{}: observations and ground truth must have the same number of samples: {} vs {}",
            model,
            observations.nrows(),
            ground_truth.len()
        )));
    }
    if observations.is_empty() || ground_truth.is_empty() {
        return Err(AutoMlError::shape(format!(
            "{}: observations and ground truth cannot be empty",
            model
        )));
    }
    Ok(())
}

/// Width check shared by every `predict`.
pub(crate) fn check_prediction_width(
    model: &str,
    observations: &Array2<f64>,
    expected: usize,
) -> Result<()> {
    if observations.ncols() != expected {
        return Err(AutoMlError::shape(format!(
            "{}: expected {} features per observation, received {}",
            model,
            expected,
            observations.ncols()
        )));
    }
    Ok(())
}

/// Class labels must be non-negative integers.
pub(crate) fn class_labels(model: &str, ground_truth: &Array1<f64>) -> Result<Array1<usize>> {
    ground_truth
        .iter()
        .map(|&y| {
            if y >= 0.0 && y.fract() == 0.0 && y.is_finite() {
                Ok(y as usize)
            } else {
                Err(AutoMlError::validation(format!(
                    "{}: class labels must be non-negative integers, received {}",
                    model, y
                )))
            }
        })
        .collect()
}

pub(crate) fn not_fitted(model: &str) -> AutoMlError {
    AutoMlError::NotFitted(format!("{} has not been fitted yet", model))
}

pub(crate) fn hyper_f64(
    hyperparameters: &Hyperparameters,
    key: &str,
    default: f64,
) -> Result<f64> {
    match hyperparameters.get(key) {
        None => Ok(default),
        Some(value) => value.as_f64().ok_or_else(|| {
            AutoMlError::validation(format!("Hyperparameter '{}' must be a number", key))
        }),
    }
}

pub(crate) fn hyper_usize(
    hyperparameters: &Hyperparameters,
    key: &str,
    default: usize,
) -> Result<usize> {
    match hyperparameters.get(key) {
        None => Ok(default),
        Some(value) => value.as_u64().map(|v| v as usize).ok_or_else(|| {
            AutoMlError::validation(format!(
                "Hyperparameter '{}' must be a non-negative integer",
                key
            ))
        }),
    }
}

/// Optional integer hyperparameter; JSON `null` counts as absent.
pub(crate) fn hyper_opt_usize(hyperparameters: &Hyperparameters, key: &str) -> Result<Option<usize>> {
    match hyperparameters.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(_) => hyper_usize(hyperparameters, key, 0).map(Some),
    }
}
