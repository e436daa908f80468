//! Tree classifiers backed by `linfa-trees`
//!
//! [`DecisionTree`] is a single CART tree. [`RandomForest`] bags several of
//! them over bootstrap resamples drawn from a seeded generator, so two fits
//! on the same data with the same seed grow the same forest.

use std::collections::BTreeMap;

use linfa::traits::{Fit, Predict};
use linfa_trees::DecisionTree as LinfaTree;
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    check_prediction_width, check_training_data, class_labels, hyper_opt_usize, hyper_usize,
    not_fitted, Hyperparameters, Model, TaskType,
};
use crate::error::{AutoMlError, Result};

const DEFAULT_MIN_SAMPLES_SPLIT: usize = 2;
const DEFAULT_N_ESTIMATORS: usize = 20;
const DEFAULT_SEED: u64 = 42;

/// Options shared by both tree models
#[derive(Debug, Clone, Copy)]
struct TreeOptions {
    max_depth: Option<usize>,
    min_samples_split: usize,
}

impl TreeOptions {
    fn from_hyperparameters(model: &str, hyperparameters: &Hyperparameters) -> Result<Self> {
        let max_depth = hyper_opt_usize(hyperparameters, "max_depth")?;
        let min_samples_split =
            hyper_usize(hyperparameters, "min_samples_split", DEFAULT_MIN_SAMPLES_SPLIT)?;

        if max_depth == Some(0) {
            return Err(AutoMlError::validation(format!(
                "{}: max_depth must be at least 1 when given",
                model
            )));
        }
        if min_samples_split < 2 {
            return Err(AutoMlError::validation(format!(
                "{}: min_samples_split must be at least 2",
                model
            )));
        }
        Ok(Self {
            max_depth,
            min_samples_split,
        })
    }

    fn grow(
        &self,
        model: &str,
        observations: Array2<f64>,
        labels: Array1<usize>,
    ) -> Result<LinfaTree<f64, usize>> {
        let dataset = linfa::Dataset::new(observations, labels);
        LinfaTree::params()
            .max_depth(self.max_depth)
            .min_weight_split(self.min_samples_split as f32)
            .fit(&dataset)
            .map_err(|e| AutoMlError::training(model, e.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FittedTrees {
    n_features: usize,
    trees: Vec<LinfaTree<f64, usize>>,
}

impl FittedTrees {
    /// Majority vote across trees; ties go to the lowest class index.
    fn vote(&self, model: &str, observations: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_width(model, observations, self.n_features)?;
        let ballots: Vec<Array1<usize>> = self
            .trees
            .iter()
            .map(|tree| tree.predict(observations))
            .collect();

        Ok((0..observations.nrows())
            .map(|row| {
                let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
                for ballot in &ballots {
                    *counts.entry(ballot[row]).or_insert(0) += 1;
                }
                let mut winner = (0usize, 0usize);
                for (&class, &votes) in &counts {
                    if votes > winner.1 {
                        winner = (class, votes);
                    }
                }
                winner.0 as f64
            })
            .collect())
    }
}

fn restore_trees(model: &str, parameters: serde_json::Value) -> Result<FittedTrees> {
    let fitted: FittedTrees = serde_json::from_value(parameters)?;
    if fitted.trees.is_empty() {
        return Err(AutoMlError::validation(format!(
            "{}: stored parameters contain no trees",
            model
        )));
    }
    Ok(fitted)
}

/// Single decision tree classifier.
#[derive(Debug)]
pub struct DecisionTree {
    hyperparameters: Hyperparameters,
    options: TreeOptions,
    fitted: Option<FittedTrees>,
}

impl DecisionTree {
    const NAME: &'static str = "decision_tree";

    pub fn new(hyperparameters: Hyperparameters) -> Result<Self> {
        let options = TreeOptions::from_hyperparameters(Self::NAME, &hyperparameters)?;
        Ok(Self {
            hyperparameters,
            options,
            fitted: None,
        })
    }
}

impl Model for DecisionTree {
    fn name(&self) -> &'static str {
        Self::NAME
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
        check_training_data(Self::NAME, observations, ground_truth)?;
        let labels = class_labels(Self::NAME, ground_truth)?;
        info!(
            "Starting decision tree training with {} samples and {} features",
            observations.nrows(),
            observations.ncols()
        );

        let tree = self.options.grow(Self::NAME, observations.clone(), labels)?;
        self.fitted = Some(FittedTrees {
            n_features: observations.ncols(),
            trees: vec![tree],
        });
        Ok(())
    }

    fn predict(&self, observations: &Array2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(Self::NAME))?;
        fitted.vote(Self::NAME, observations)
    }

    fn parameters(&self) -> Result<serde_json::Value> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(Self::NAME))?;
        Ok(serde_json::to_value(fitted)?)
    }

    fn restore(&mut self, parameters: serde_json::Value) -> Result<()> {
        self.fitted = Some(restore_trees(Self::NAME, parameters)?);
        Ok(())
    }
}

/// Bagged ensemble of decision trees.
///
/// Hyperparameters: `n_estimators` (default 20), `max_depth` (unbounded by
/// default), `min_samples_split` (default 2) and `seed` (default 42).
#[derive(Debug)]
pub struct RandomForest {
    hyperparameters: Hyperparameters,
    options: TreeOptions,
    n_estimators: usize,
    seed: u64,
    fitted: Option<FittedTrees>,
}

impl RandomForest {
    const NAME: &'static str = "random_forest";

    pub fn new(hyperparameters: Hyperparameters) -> Result<Self> {
        let options = TreeOptions::from_hyperparameters(Self::NAME, &hyperparameters)?;
        let n_estimators = hyper_usize(&hyperparameters, "n_estimators", DEFAULT_N_ESTIMATORS)?;
        let seed = hyper_usize(&hyperparameters, "seed", DEFAULT_SEED as usize)? as u64;

        if n_estimators == 0 {
            return Err(AutoMlError::validation(format!(
                "{}: n_estimators must be at least 1",
                Self::NAME
            )));
        }

        Ok(Self {
            hyperparameters,
            options,
            n_estimators,
            seed,
            fitted: None,
        })
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }
}

impl Model for RandomForest {
    fn name(&self) -> &'static str {
        Self::NAME
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
        check_training_data(Self::NAME, observations, ground_truth)?;
        let labels = class_labels(Self::NAME, ground_truth)?;
        let n_samples = observations.nrows();
        info!(
            "Starting random forest training with {} samples, {} features and {} trees",
            n_samples,
            observations.ncols(),
            self.n_estimators
        );

        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.n_estimators);
        for index in 0..self.n_estimators {
            let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            debug!("Growing tree {} on a bootstrap of {} rows", index, sample.len());
            let records = observations.select(Axis(0), &sample);
            let targets = labels.select(Axis(0), &sample);
            trees.push(self.options.grow(Self::NAME, records, targets)?);
        }

        self.fitted = Some(FittedTrees {
            n_features: observations.ncols(),
            trees,
        });
        Ok(())
    }

    fn predict(&self, observations: &Array2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(Self::NAME))?;
        fitted.vote(Self::NAME, observations)
    }

    fn parameters(&self) -> Result<serde_json::Value> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(Self::NAME))?;
        Ok(serde_json::to_value(fitted)?)
    }

    fn restore(&mut self, parameters: serde_json::Value) -> Result<()> {
        self.fitted = Some(restore_trees(Self::NAME, parameters)?);
        Ok(())
    }
}
