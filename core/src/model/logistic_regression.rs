//! Gradient-descent logistic regression

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    check_prediction_width, check_training_data, class_labels, hyper_f64, hyper_usize,
    not_fitted, Hyperparameters, Model, TaskType,
};
use crate::error::{AutoMlError, Result};
use crate::operations::NDArrayOperations;

const NAME: &str = "logistic_regression";
const DEFAULT_LEARNING_RATE: f64 = 0.1;
const DEFAULT_ITERATIONS: usize = 1000;
const DECISION_THRESHOLD: f64 = 0.5;

/// One sigmoid unit: `weights` over the features plus a trailing bias.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct SigmoidUnit {
    weights: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum FittedLogistic {
    /// Labels 0/1, positive class when p >= 0.5.
    Binary { unit: SigmoidUnit },
    /// One unit per class, highest probability wins.
    OneVsRest { units: Vec<SigmoidUnit> },
}

/// Logistic regression trained with batch gradient descent at a fixed
/// learning rate for a fixed number of iterations.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    hyperparameters: Hyperparameters,
    learning_rate: f64,
    iterations: usize,
    fitted: Option<FittedLogistic>,
}

impl LogisticRegression {
    pub fn new(hyperparameters: Hyperparameters) -> Result<Self> {
        let learning_rate = hyper_f64(&hyperparameters, "learning_rate", DEFAULT_LEARNING_RATE)?;
        let iterations = hyper_usize(&hyperparameters, "iterations", DEFAULT_ITERATIONS)?;

        if !(learning_rate > 0.0) {
            return Err(AutoMlError::validation(format!(
                "{}: learning_rate must be positive, received {}",
                NAME, learning_rate
            )));
        }
        if iterations == 0 {
            return Err(AutoMlError::validation(format!(
                "{}: iterations must be at least 1",
                NAME
            )));
        }

        Ok(Self {
            hyperparameters,
            learning_rate,
            iterations,
            fitted: None,
        })
    }

    fn train_unit(&self, design: &Array2<f64>, targets: &Array1<f64>) -> SigmoidUnit {
        let n = design.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(design.ncols());

        for _ in 0..self.iterations {
            let probabilities = NDArrayOperations::sigmoid(&design.dot(&weights));
            let gradient = design.t().dot(&(&probabilities - targets)) / n;
            weights = weights - gradient * self.learning_rate;
        }

        SigmoidUnit {
            weights: weights.to_vec(),
        }
    }

    fn probabilities(unit: &SigmoidUnit, design: &Array2<f64>) -> Array1<f64> {
        let weights = Array1::from_vec(unit.weights.clone());
        NDArrayOperations::sigmoid(&design.dot(&weights))
    }
}

impl Model for LogisticRegression {
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
        let n_classes = labels.iter().max().map_or(0, |max| max + 1);
        info!(
            "Starting logistic regression fit with {} samples, {} features and {} classes",
            observations.nrows(),
            observations.ncols(),
            n_classes
        );

        let design = NDArrayOperations::with_intercept(observations);
        let fitted = if n_classes <= 2 {
            let targets = labels.mapv(|l| l as f64);
            FittedLogistic::Binary {
                unit: self.train_unit(&design, &targets),
            }
        } else {
            let units = (0..n_classes)
                .map(|class| {
                    debug!("Training one-vs-rest unit for class {}", class);
                    let targets = labels.mapv(|l| if l == class { 1.0 } else { 0.0 });
                    self.train_unit(&design, &targets)
                })
                .collect();
            FittedLogistic::OneVsRest { units }
        };

        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, observations: &Array2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(NAME))?;
        let design = NDArrayOperations::with_intercept(observations);

        match fitted {
            FittedLogistic::Binary { unit } => {
                check_prediction_width(NAME, &design, unit.weights.len())?;
                Ok(Self::probabilities(unit, &design)
                    .mapv(|p| if p >= DECISION_THRESHOLD { 1.0 } else { 0.0 }))
            }
            FittedLogistic::OneVsRest { units } => {
                if let Some(first) = units.first() {
                    check_prediction_width(NAME, &design, first.weights.len())?;
                }
                let scores: Vec<Array1<f64>> = units
                    .iter()
                    .map(|unit| Self::probabilities(unit, &design))
                    .collect();
                Ok((0..design.nrows())
                    .map(|row| {
                        let mut best = 0;
                        for (class, score) in scores.iter().enumerate() {
                            if score[row] > scores[best][row] {
                                best = class;
                            }
                        }
                        best as f64
                    })
                    .collect())
            }
        }
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
