//! AutoML Core Module
//!
//! The core library behind the AutoML tool: versioned artifacts and their
//! registry, datasets and feature descriptors, the model and metric
//! catalogs, and the training pipeline that turns a dataset plus a
//! model/feature/metric selection into a trained, evaluated and persisted
//! unit that can be reloaded for batch prediction.
//!
//! Everything runs synchronously on the caller's thread.

pub mod artifact;
pub mod config;
pub mod dataset;
pub mod error;
pub mod feature;
pub mod metric;
pub mod model;
pub mod operations;
pub mod pipeline;
pub mod preprocessing;
pub mod registry;
pub mod storage;

pub use artifact::{Artifact, ArtifactId, ArtifactKind, ArtifactMetadata};
pub use config::{AppConfig, ConfigFormat, ConfigManager, LoggingConfig, StorageConfig, TrainingConfig};
pub use dataset::{Dataset, Table};
pub use error::{AutoMlError, Result};
pub use feature::{detect_feature_types, Feature, FeatureType};
pub use metric::{default_metrics, get_metric, Metric, METRICS};
pub use model::{
    get_model, model_from_artifact, model_to_artifact, Hyperparameters, Model, TaskType,
    CLASSIFICATION_MODELS, REGRESSION_MODELS,
};
pub use pipeline::{
    ArtifactRole, ExecutionReport, MetricResult, Pipeline, PipelineArtifact, PipelineConfig, PipelineState,
    SavedPipeline,
};
pub use registry::{ArtifactRecord, ArtifactRegistry, AutoMlSystem};
pub use storage::{Database, LocalStorage, MetadataStore, Storage};
