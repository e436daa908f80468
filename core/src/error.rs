//! AutoML core errors
//!
//! Every failure in the core surfaces as one of these variants. Nothing is
//! retried and nothing is silently recovered; presenting the condition is
//! the caller's job.

use std::io;

/// AutoML core errors
#[derive(Debug, thiserror::Error)]
pub enum AutoMlError {
    /// Bad constructor arguments: empty names, unknown feature types,
    /// task-type/model-type mismatch, out-of-range hyperparameters.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced artifact, blob or metadata record is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// `predict` (or a parameter snapshot) was requested before `fit`.
    #[error("Model not fitted: {0}")]
    NotFitted(String),

    /// Mismatched row counts, empty arrays, wrong widths.
    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Metric '{metric}' is undefined: {reason}")]
    UndefinedMetric { metric: String, reason: String },

    #[error("Training failed: {model} - {reason}")]
    Training { model: String, reason: String },

    #[error("Dataset error: {0}")]
    Data(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for AutoML core operations
pub type Result<T> = std::result::Result<T, AutoMlError>;

impl AutoMlError {
    pub fn validation(message: impl Into<String>) -> Self {
        AutoMlError::Validation(message.into())
    }

    pub fn shape(message: impl Into<String>) -> Self {
        AutoMlError::Shape(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AutoMlError::NotFound(what.into())
    }

    pub fn training(model: impl Into<String>, reason: impl ToString) -> Self {
        AutoMlError::Training {
            model: model.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the not-found category, whatever layer raised it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AutoMlError::NotFound(_))
    }
}
