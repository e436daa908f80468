//! Evaluation metrics
//!
//! Every metric is a pure function of `(predictions, ground_truth)`.
//! Both inputs must be non-empty and of equal length.

use ndarray::Array1;
use std::fmt;

use crate::error::{AutoMlError, Result};
use crate::model::TaskType;

/// Names accepted by [`get_metric`]
pub const METRICS: [&str; 6] = [
    "mean_squared_error",
    "accuracy",
    "root_mean_squared_error",
    "r_squared",
    "precision",
    "recall",
];

/// A stateless evaluation function
pub trait Metric: fmt::Debug + Send + Sync {
    /// Display name, e.g. `Accuracy`
    fn name(&self) -> &'static str;

    /// Catalog key, e.g. `accuracy`
    fn key(&self) -> &'static str;

    fn evaluate(&self, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<f64>;
}

/// Look up a metric by name (snake_case or CamelCase).
pub fn get_metric(name: &str) -> Result<Box<dyn Metric>> {
    let normalized: String = name
        .trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-' && *c != ' ')
        .collect::<String>()
        .to_lowercase();

    match normalized.as_str() {
        "" => Err(AutoMlError::validation("Name of metric must be a non empty string")),
        "accuracy" => Ok(Box::new(Accuracy)),
        "meansquarederror" | "mse" => Ok(Box::new(MeanSquaredError)),
        "rootmeansquarederror" | "rmse" => Ok(Box::new(RootMeanSquaredError)),
        "rsquared" | "r2" => Ok(Box::new(RSquared)),
        "precision" => Ok(Box::new(Precision)),
        "recall" => Ok(Box::new(Recall)),
        _ => Err(AutoMlError::validation(format!(
            "Unknown metric '{}'. Available metrics: {}",
            name,
            METRICS.join(", ")
        ))),
    }
}

/// The metric set offered for a task when the caller picks none.
pub fn default_metrics(task_type: TaskType) -> Vec<Box<dyn Metric>> {
    match task_type {
        TaskType::Classification => vec![Box::new(Accuracy), Box::new(Precision), Box::new(Recall)],
        TaskType::Regression => vec![
            Box::new(MeanSquaredError),
            Box::new(RootMeanSquaredError),
            Box::new(RSquared),
        ],
    }
}

fn check_inputs(metric: &str, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<()> {
    if predictions.len() != ground_truth.len() {
        return Err(AutoMlError::shape(format!(
            "{}: predictions and ground truth must have the same length: {} vs {}",
            metric,
            predictions.len(),
            ground_truth.len()
        )));
    }
    if predictions.is_empty() {
        return Err(AutoMlError::shape(format!(
            "{}: predictions and ground truth cannot be empty",
            metric
        )));
    }
    Ok(())
}

/// Distinct values of the ground truth in ascending order.
fn observed_classes(ground_truth: &Array1<f64>) -> Vec<f64> {
    let mut classes = ground_truth.to_vec();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();
    classes
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Accuracy;

impl Metric for Accuracy {
    fn name(&self) -> &'static str {
        "Accuracy"
    }

    fn key(&self) -> &'static str {
        "accuracy"
    }

    fn evaluate(&self, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<f64> {
        check_inputs(self.name(), predictions, ground_truth)?;
        let correct = predictions
            .iter()
            .zip(ground_truth.iter())
            .filter(|(p, t)| p == t)
            .count();
        Ok(correct as f64 / predictions.len() as f64)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl Metric for MeanSquaredError {
    fn name(&self) -> &'static str {
        "MeanSquaredError"
    }

    fn key(&self) -> &'static str {
        "mean_squared_error"
    }

    fn evaluate(&self, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<f64> {
        check_inputs(self.name(), predictions, ground_truth)?;
        let residuals = predictions - ground_truth;
        Ok(residuals.mapv(|r| r * r).sum() / predictions.len() as f64)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RootMeanSquaredError;

impl Metric for RootMeanSquaredError {
    fn name(&self) -> &'static str {
        "RootMeanSquaredError"
    }

    fn key(&self) -> &'static str {
        "root_mean_squared_error"
    }

    fn evaluate(&self, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<f64> {
        Ok(MeanSquaredError.evaluate(predictions, ground_truth)?.sqrt())
    }
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// Undefined when the ground truth is constant (`SS_tot == 0`); that case
/// is reported as [`AutoMlError::UndefinedMetric`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RSquared;

impl Metric for RSquared {
    fn name(&self) -> &'static str {
        "RSquared"
    }

    fn key(&self) -> &'static str {
        "r_squared"
    }

    fn evaluate(&self, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<f64> {
        check_inputs(self.name(), predictions, ground_truth)?;
        let mean = ground_truth.sum() / ground_truth.len() as f64;
        let total: f64 = ground_truth.iter().map(|y| (y - mean).powi(2)).sum();
        let residual: f64 = ground_truth
            .iter()
            .zip(predictions.iter())
            .map(|(y, p)| (y - p).powi(2))
            .sum();

        if total == 0.0 {
            return Err(AutoMlError::UndefinedMetric {
                metric: self.name().to_string(),
                reason: "ground truth is constant, total sum of squares is zero".to_string(),
            });
        }
        Ok(1.0 - residual / total)
    }
}

/// Macro-averaged precision over the classes present in the ground truth.
///
/// A class that is never predicted contributes 0 instead of dividing by
/// zero, which pulls the average down compared to the textbook definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Precision;

impl Precision {
    pub fn per_class(&self, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<Vec<f64>> {
        check_inputs(self.name(), predictions, ground_truth)?;
        Ok(observed_classes(ground_truth)
            .into_iter()
            .map(|class| {
                let predicted = predictions.iter().filter(|&&p| p == class).count();
                let true_positives = predictions
                    .iter()
                    .zip(ground_truth.iter())
                    .filter(|(p, t)| **p == class && **t == class)
                    .count();
                if predicted == 0 {
                    0.0
                } else {
                    true_positives as f64 / predicted as f64
                }
            })
            .collect())
    }
}

impl Metric for Precision {
    fn name(&self) -> &'static str {
        "Precision"
    }

    fn key(&self) -> &'static str {
        "precision"
    }

    fn evaluate(&self, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<f64> {
        let per_class = self.per_class(predictions, ground_truth)?;
        Ok(per_class.iter().sum::<f64>() / per_class.len() as f64)
    }
}

/// Macro-averaged recall over the classes present in the ground truth.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recall;

impl Recall {
    pub fn per_class(&self, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<Vec<f64>> {
        check_inputs(self.name(), predictions, ground_truth)?;
        Ok(observed_classes(ground_truth)
            .into_iter()
            .map(|class| {
                let actual = ground_truth.iter().filter(|&&t| t == class).count();
                let true_positives = predictions
                    .iter()
                    .zip(ground_truth.iter())
                    .filter(|(p, t)| **p == class && **t == class)
                    .count();
                if actual == 0 {
                    0.0
                } else {
                    true_positives as f64 / actual as f64
                }
            })
            .collect())
    }
}

impl Metric for Recall {
    fn name(&self) -> &'static str {
        "Recall"
    }

    fn key(&self) -> &'static str {
        "recall"
    }

    fn evaluate(&self, predictions: &Array1<f64>, ground_truth: &Array1<f64>) -> Result<f64> {
        let per_class = self.per_class(predictions, ground_truth)?;
        Ok(per_class.iter().sum::<f64>() / per_class.len() as f64)
    }
}
