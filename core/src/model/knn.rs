//! K-nearest-neighbors classification

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    check_prediction_width, check_training_data, class_labels, hyper_usize, not_fitted,
    Hyperparameters, Model, TaskType,
};
use crate::error::{AutoMlError, Result};
use crate::operations::NDArrayOperations;

const NAME: &str = "knn";
const DEFAULT_K: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FittedKnn {
    observations: Array2<f64>,
    labels: Vec<usize>,
}

/// Lazy learner: `fit` memorizes the training set and `predict` takes a
/// majority vote among the `k` closest rows by Euclidean distance.
///
/// Neighbors are ranked with a stable sort, so equal distances keep
/// training order. A tied vote goes to the label met first among the
/// ranked neighbors.
#[derive(Debug, Clone)]
pub struct KNearestNeighbors {
    hyperparameters: Hyperparameters,
    k: usize,
    fitted: Option<FittedKnn>,
}

impl KNearestNeighbors {
    pub fn new(hyperparameters: Hyperparameters) -> Result<Self> {
        let k = hyper_usize(&hyperparameters, "k", DEFAULT_K)?;
        if k == 0 {
            return Err(AutoMlError::validation(format!("{}: k must be at least 1", NAME)));
        }
        Ok(Self {
            hyperparameters,
            k,
            fitted: None,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn vote(fitted: &FittedKnn, k: usize, row: ndarray::ArrayView1<f64>) -> usize {
        let mut ranked: Vec<(f64, usize)> = fitted
            .observations
            .outer_iter()
            .zip(fitted.labels.iter())
            .map(|(train, &label)| (NDArrayOperations::squared_distance(train, row), label))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        // (label, votes) in first-seen order
        let mut tally: Vec<(usize, usize)> = Vec::new();
        for &(_, label) in ranked.iter().take(k) {
            match tally.iter_mut().find(|(l, _)| *l == label) {
                Some(entry) => entry.1 += 1,
                None => tally.push((label, 1)),
            }
        }

        let mut winner = tally[0];
        for &entry in tally.iter().skip(1) {
            if entry.1 > winner.1 {
                winner = entry;
            }
        }
        winner.0
    }
}

impl Model for KNearestNeighbors {
    fn name(&self) -> &'static str {
        NAME
    }

    fn task_type(&self) -> TaskType {
        TaskType::Classification
    }

    fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(&mut self, observations: &Array2<f64>, ground_truth: &Array1<f64>) -> Result<()> {
        check_training_data(NAME, observations, ground_truth)?;
        let labels = class_labels(NAME, ground_truth)?;
        info!(
            "Storing {} samples with {} features for knn (k={})",
            observations.nrows(),
            observations.ncols(),
            self.k
        );
        self.fitted = Some(FittedKnn {
            observations: observations.clone(),
            labels: labels.to_vec(),
        });
        Ok(())
    }

    fn predict(&self, observations: &Array2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(NAME))?;
        check_prediction_width(NAME, observations, fitted.observations.ncols())?;
        let k = self.k.min(fitted.labels.len());
        Ok(observations
            .outer_iter()
            .map(|row| Self::vote(fitted, k, row) as f64)
            .collect())
    }

    fn parameters(&self) -> Result<serde_json::Value> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(NAME))?;
        Ok(serde_json::to_value(fitted)?)
    }

    fn restore(&mut self, parameters: serde_json::Value) -> Result<()> {
        let fitted: FittedKnn = serde_json::from_value(parameters)?;
        if fitted.observations.nrows() != fitted.labels.len() || fitted.labels.is_empty() {
            return Err(AutoMlError::shape(format!(
                "{}: stored observations and labels do not match",
                NAME
            )));
        }
        self.fitted = Some(fitted);
        Ok(())
    }
}
