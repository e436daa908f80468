//! Closed-form multiple linear regression

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_prediction_width, check_training_data, not_fitted, Hyperparameters, Model, TaskType};
use crate::error::{AutoMlError, Result};
use crate::operations::NDArrayOperations;

const NAME: &str = "multiple_linear_regression";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FittedLinear {
    weights: Vec<f64>,
    bias: f64,
}

/// Ordinary least squares solved with the normal equation
/// `w = pinv(XᵀX) Xᵀy` over the design matrix augmented with a bias
/// column. The pseudo-inverse keeps singular designs (duplicated or
/// constant columns) solvable.
#[derive(Debug, Clone)]
pub struct MultipleLinearRegression {
    hyperparameters: Hyperparameters,
    fitted: Option<FittedLinear>,
}

impl MultipleLinearRegression {
    pub fn new(hyperparameters: Hyperparameters) -> Result<Self> {
        if let Some(key) = hyperparameters.keys().next() {
            return Err(AutoMlError::validation(format!(
                "{} takes no hyperparameters, received '{}'",
                NAME, key
            )));
        }
        Ok(Self {
            hyperparameters,
            fitted: None,
        })
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.weights.as_slice())
    }

    pub fn bias(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.bias)
    }
}

impl Model for MultipleLinearRegression {
    fn name(&self) -> &'static str {
        NAME
    }

    fn task_type(&self) -> TaskType {
        TaskType::Regression
    }

    fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(&mut self, observations: &Array2<f64>, ground_truth: &Array1<f64>) -> Result<()> {
        check_training_data(NAME, observations, ground_truth)?;
        info!(
            "Starting linear regression fit with {} samples and {} features",
            observations.nrows(),
            observations.ncols()
        );

        let design = NDArrayOperations::with_intercept(observations);
        let gram = design.t().dot(&design);
        let gram_inverse = NDArrayOperations::symmetric_pseudo_inverse(&gram)?;
        let solution = gram_inverse.dot(&design.t()).dot(ground_truth);

        let n_features = observations.ncols();
        self.fitted = Some(FittedLinear {
            weights: solution.iter().take(n_features).copied().collect(),
            bias: solution[n_features],
        });
        Ok(())
    }

    fn predict(&self, observations: &Array2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(NAME))?;
        check_prediction_width(NAME, observations, fitted.weights.len())?;
        let weights = Array1::from_vec(fitted.weights.clone());
        Ok(observations.dot(&weights) + fitted.bias)
    }

    fn parameters(&self) -> Result<serde_json::Value> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(NAME))?;
        Ok(serde_json::to_value(fitted)?)
    }

    fn restore(&mut self, parameters: serde_json::Value) -> Result<()> {
        self.fitted = Some(serde_json::from_value(parameters)?);
        Ok(())
    }
}
