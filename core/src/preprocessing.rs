//! Feature preprocessing
//!
//! Each feature is encoded into a column block by a fitted transformer:
//! categorical features go through a [`OneHotEncoder`], numerical ones
//! through a [`StandardScaler`]. Blocks keep the order of the feature list
//! they came from. Fitted transformers serialize to JSON so inference can
//! replay exactly the encoding seen during training.

use itertools::Itertools;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::artifact::ArtifactKind;
use crate::dataset::{Dataset, Table};
use crate::error::{AutoMlError, Result};
use crate::feature::{Feature, FeatureType};
use crate::operations::NDArrayOperations;

/// Indicator encoding over the sorted set of categories seen at fit time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OneHotEncoder {
    categories: Vec<String>,
}

impl OneHotEncoder {
    pub fn fit(values: &[String]) -> Result<Self> {
        if values.is_empty() {
            return Err(AutoMlError::shape("Cannot fit a one-hot encoder on an empty column"));
        }
        let categories = values.iter().cloned().sorted().dedup().collect();
        Ok(Self { categories })
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    pub fn index_of(&self, category: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|probe| probe.as_str().cmp(category))
            .ok()
    }

    pub fn category(&self, index: usize) -> Option<&str> {
        self.categories.get(index).map(String::as_str)
    }

    /// Encode values as an `(n, categories)` indicator matrix. Unseen values
    /// become all-zero rows; `feature` only labels the warning.
    pub fn transform(&self, feature: &str, values: &[String]) -> Array2<f64> {
        let indices: Vec<Option<usize>> = values.iter().map(|v| self.index_of(v)).collect();
        let unseen = indices.iter().filter(|i| i.is_none()).count();
        if unseen > 0 {
            warn!(
                "Feature '{}' has {} value(s) outside the {} known categories; encoding them as zeros",
                feature,
                unseen,
                self.categories.len()
            );
        }
        NDArrayOperations::one_hot_encode(&indices, self.categories.len())
    }

    /// Class index of every value; unseen values are an error.
    pub fn encode_labels(&self, feature: &str, values: &[String]) -> Result<Array1<f64>> {
        values
            .iter()
            .map(|value| {
                self.index_of(value).map(|i| i as f64).ok_or_else(|| {
                    AutoMlError::validation(format!(
                        "Feature '{}' has unknown category '{}'",
                        feature, value
                    ))
                })
            })
            .collect()
    }
}

/// Z-score standardization with the population standard deviation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StandardScaler {
    mean: f64,
    scale: f64,
}

impl StandardScaler {
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(AutoMlError::shape("Cannot fit a scaler on an empty column"));
        }
        let (mean, scale) = NDArrayOperations::mean_and_scale(&Array1::from_vec(values.to_vec()));
        Ok(Self { mean, scale })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Standardize into a single-column block.
    pub fn transform(&self, values: &[f64]) -> Array2<f64> {
        Array2::from_shape_fn((values.len(), 1), |(i, _)| (values[i] - self.mean) / self.scale)
    }
}

/// A fitted transformer for one feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureEncoding {
    OneHot(OneHotEncoder),
    Standard(StandardScaler),
}

impl FeatureEncoding {
    /// Fit the transformer that matches the feature type on a table column.
    pub fn fit(feature: &Feature, table: &Table) -> Result<Self> {
        match feature.feature_type() {
            FeatureType::Categorical => {
                let values = table.text_column(feature.name())?;
                Ok(FeatureEncoding::OneHot(OneHotEncoder::fit(&values)?))
            }
            FeatureType::Numerical => {
                let values = table.numeric_column(feature.name())?;
                Ok(FeatureEncoding::Standard(StandardScaler::fit(&values)?))
            }
        }
    }

    /// Encode the feature's column of `table` into a column block.
    pub fn transform(&self, feature: &str, table: &Table) -> Result<Array2<f64>> {
        match self {
            FeatureEncoding::OneHot(encoder) => {
                Ok(encoder.transform(feature, &table.text_column(feature)?))
            }
            FeatureEncoding::Standard(scaler) => {
                Ok(scaler.transform(&table.numeric_column(feature)?))
            }
        }
    }

    /// Artifact kind used when the transformer is persisted.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            FeatureEncoding::OneHot(_) => ArtifactKind::Encoder,
            FeatureEncoding::Standard(_) => ArtifactKind::Scaler,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            FeatureEncoding::OneHot(encoder) => encoder.width(),
            FeatureEncoding::Standard(_) => 1,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// A feature together with its encoded block and the transformer that made it
#[derive(Debug, Clone)]
pub struct PreprocessedFeature {
    pub feature: Feature,
    pub data: Array2<f64>,
    pub encoding: FeatureEncoding,
}

/// Fit and apply one transformer per feature, in list order.
pub fn preprocess_features(features: &[Feature], dataset: &Dataset) -> Result<Vec<PreprocessedFeature>> {
    let table = dataset.read()?;
    features
        .iter()
        .map(|feature| {
            let encoding = FeatureEncoding::fit(feature, &table)?;
            let data = encoding.transform(feature.name(), &table)?;
            debug!(
                "Encoded feature '{}' into {} column(s)",
                feature.name(),
                data.ncols()
            );
            Ok(PreprocessedFeature {
                feature: feature.clone(),
                data,
                encoding,
            })
        })
        .collect()
}

/// Encoded prediction target
#[derive(Debug, Clone)]
pub struct EncodedTarget {
    /// Class indices for categorical targets, raw values for numerical ones
    pub values: Array1<f64>,
    /// Kept for categorical targets so predictions map back to labels
    pub encoder: Option<OneHotEncoder>,
}

/// Encode the target column: categories become class indices in the
/// encoder's sorted order, numbers pass through unchanged.
pub fn encode_target(feature: &Feature, table: &Table) -> Result<EncodedTarget> {
    match feature.feature_type() {
        FeatureType::Categorical => {
            let values = table.text_column(feature.name())?;
            let encoder = OneHotEncoder::fit(&values)?;
            let labels = encoder.encode_labels(feature.name(), &values)?;
            debug!(
                "Target '{}' has {} classes",
                feature.name(),
                encoder.width()
            );
            Ok(EncodedTarget {
                values: labels,
                encoder: Some(encoder),
            })
        }
        FeatureType::Numerical => Ok(EncodedTarget {
            values: Array1::from_vec(table.numeric_column(feature.name())?),
            encoder: None,
        }),
    }
}
