//! Lasso regression backed by `linfa-elasticnet`

use linfa::prelude::*;
use linfa_elasticnet::ElasticNet;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    check_prediction_width, check_training_data, hyper_f64, hyper_usize, not_fitted,
    Hyperparameters, Model, TaskType,
};
use crate::error::{AutoMlError, Result};

const NAME: &str = "lasso";
const DEFAULT_ALPHA: f64 = 1.0;
const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Learned hyperplane; prediction is `X·w + b`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FittedLasso {
    coefficients: Vec<f64>,
    intercept: f64,
}

/// L1-penalized linear regression (an elastic net with `l1_ratio = 1`).
#[derive(Debug, Clone)]
pub struct Lasso {
    hyperparameters: Hyperparameters,
    alpha: f64,
    max_iterations: usize,
    fitted: Option<FittedLasso>,
}

impl Lasso {
    pub fn new(hyperparameters: Hyperparameters) -> Result<Self> {
        let alpha = hyper_f64(&hyperparameters, "alpha", DEFAULT_ALPHA)?;
        let max_iterations = hyper_usize(&hyperparameters, "max_iterations", DEFAULT_MAX_ITERATIONS)?;

        if !(alpha >= 0.0) || !alpha.is_finite() {
            return Err(AutoMlError::validation(format!(
                "{}: alpha must be a non-negative number, received {}",
                NAME, alpha
            )));
        }
        if max_iterations == 0 {
            return Err(AutoMlError::validation(format!(
                "{}: max_iterations must be at least 1",
                NAME
            )));
        }

        Ok(Self {
            hyperparameters,
            alpha,
            max_iterations,
            fitted: None,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.coefficients.as_slice())
    }
}

impl Model for Lasso {
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
            "Starting lasso training with {} samples and {} features (alpha={})",
            observations.nrows(),
            observations.ncols(),
            self.alpha
        );

        let dataset = Dataset::new(observations.clone(), ground_truth.clone());
        let max_iterations = u32::try_from(self.max_iterations).unwrap_or(u32::MAX);
        let model = ElasticNet::params()
            .penalty(self.alpha)
            .l1_ratio(1.0)
            .max_iterations(max_iterations)
            .fit(&dataset)
            .map_err(|e| AutoMlError::training(NAME, e.to_string()))?;

        self.fitted = Some(FittedLasso {
            coefficients: model.hyperplane().to_vec(),
            intercept: model.intercept(),
        });
        Ok(())
    }

    fn predict(&self, observations: &Array2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(NAME))?;
        check_prediction_width(NAME, observations, fitted.coefficients.len())?;
        let coefficients = Array1::from_vec(fitted.coefficients.clone());
        Ok(observations.dot(&coefficients) + fitted.intercept)
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
