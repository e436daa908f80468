//! Feature descriptors and type detection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{AutoMlError, Result};
use crate::model::TaskType;

/// Column type of a feature
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Numerical,
    Categorical,
}

impl FeatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Numerical => "numerical",
            FeatureType::Categorical => "categorical",
        }
    }

    /// Task type implied when a feature of this type is the target.
    pub fn task_type(&self) -> TaskType {
        match self {
            FeatureType::Numerical => TaskType::Regression,
            FeatureType::Categorical => TaskType::Classification,
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureType {
    type Err = AutoMlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "numerical" => Ok(FeatureType::Numerical),
            "categorical" => Ok(FeatureType::Categorical),
            "" => Err(AutoMlError::validation("Feature type must be a non empty string")),
            other => Err(AutoMlError::validation(format!(
                "Feature type must be either numerical or categorical, received '{}'",
                other
            ))),
        }
    }
}

/// A typed reference to one dataset column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "FeatureFields")]
pub struct Feature {
    name: String,
    #[serde(rename = "type")]
    feature_type: FeatureType,
}

/// Serialized form of a [`Feature`], checked by [`Feature::new`]
#[derive(Deserialize)]
struct FeatureFields {
    name: String,
    #[serde(rename = "type")]
    feature_type: FeatureType,
}

impl TryFrom<FeatureFields> for Feature {
    type Error = AutoMlError;

    fn try_from(fields: FeatureFields) -> Result<Self> {
        Feature::new(fields.name, fields.feature_type)
    }
}

impl Feature {
    pub fn new(name: impl Into<String>, feature_type: FeatureType) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AutoMlError::validation("Feature name must be a non empty string"));
        }
        Ok(Self { name, feature_type })
    }

    /// Build a feature from a user-supplied type string.
    pub fn parse(name: impl Into<String>, feature_type: &str) -> Result<Self> {
        Self::new(name, feature_type.parse()?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Feature(name={}, type={})", self.name, self.feature_type)
    }
}

/// Guess the type of every column in the dataset.
///
/// A column is numerical when its values are numeric and their range is
/// wider than 1 (a sign of continuous data); everything else, including
/// 0/1 flags and text, is categorical. Columns come back in table order.
pub fn detect_feature_types(dataset: &Dataset) -> Result<Vec<Feature>> {
    let table = dataset.read()?;
    let mut features = Vec::with_capacity(table.column_names().len());

    for column in table.column_names() {
        let feature_type = match table.numeric_range(&column)? {
            Some((min, max)) if max - min > 1.0 => FeatureType::Numerical,
            _ => FeatureType::Categorical,
        };
        debug!("Detected feature '{}' as {}", column, feature_type);
        features.push(Feature::new(column, feature_type)?);
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_type_parsing_is_case_insensitive() {
        assert_eq!(
            "Numerical".parse::<FeatureType>().unwrap(),
            FeatureType::Numerical
        );
        assert_eq!(
            "CATEGORICAL".parse::<FeatureType>().unwrap(),
            FeatureType::Categorical
        );
    }

    #[test]
    fn test_feature_type_rejects_unknown() {
        let err = "numeric".parse::<FeatureType>().unwrap_err();
        assert!(matches!(err, AutoMlError::Validation(_)));

        let err = "".parse::<FeatureType>().unwrap_err();
        assert!(matches!(err, AutoMlError::Validation(_)));
    }

    #[test]
    fn test_feature_rejects_empty_name() {
        let result = Feature::new("  ", FeatureType::Numerical);
        assert!(matches!(result, Err(AutoMlError::Validation(_))));
    }

    #[test]
    fn test_feature_serializes_type_lowercase() {
        let feature = Feature::parse("age", "numerical").unwrap();
        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["name"], "age");
        assert_eq!(json["type"], "numerical");

        let back: Feature = serde_json::from_value(json).unwrap();
        assert_eq!(back, feature);
    }

    #[test]
    fn test_deserializing_checks_the_name() {
        let blank = serde_json::json!({"name": " ", "type": "categorical"});
        let err = serde_json::from_value::<Feature>(blank).unwrap_err();
        assert!(err.to_string().contains("non empty"), "{}", err);
    }

    #[test]
    fn test_detect_feature_types() {
        let csv = "age,smoker,city\n23,0,Paris\n41,1,Lyon\n35,1,Paris\n";
        let dataset = Dataset::from_csv("people", "1.0.0", csv.as_bytes().to_vec()).unwrap();

        let features = detect_feature_types(&dataset).unwrap();
        let types: Vec<_> = features
            .iter()
            .map(|f| (f.name().to_string(), f.feature_type()))
            .collect();

        assert_eq!(
            types,
            vec![
                ("age".to_string(), FeatureType::Numerical),
                ("smoker".to_string(), FeatureType::Categorical),
                ("city".to_string(), FeatureType::Categorical),
            ]
        );
    }
}
