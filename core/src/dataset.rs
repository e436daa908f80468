//! Datasets
//!
//! A dataset is an artifact whose payload is comma-separated text with a
//! header row. The payload is decoded on demand into a [`Table`]; decoding
//! never mutates the artifact, so reading is idempotent.

use polars::prelude::*;
use std::io::Cursor;
use tracing::debug;

use crate::artifact::{Artifact, ArtifactId, ArtifactKind};
use crate::error::{AutoMlError, Result};

/// A dataset artifact
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    artifact: Artifact,
}

impl Dataset {
    /// Wrap CSV bytes as a dataset, rejecting payloads that do not decode
    /// into a complete rectangular table.
    pub fn from_csv(
        name: impl Into<String>,
        version: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self> {
        Table::from_csv(&data)?;
        let artifact = Artifact::new(name, version, ArtifactKind::Dataset, data)?;
        Ok(Self { artifact })
    }

    /// Encode a table as a new dataset.
    pub fn from_table(
        table: &Table,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let artifact = Artifact::new(name, version, ArtifactKind::Dataset, table.to_csv()?)?;
        Ok(Self { artifact })
    }

    pub fn from_artifact(artifact: Artifact) -> Result<Self> {
        artifact.expect_kind(ArtifactKind::Dataset)?;
        Ok(Self { artifact })
    }

    pub fn id(&self) -> &ArtifactId {
        self.artifact.id()
    }

    pub fn name(&self) -> &str {
        self.artifact.name()
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn into_artifact(self) -> Artifact {
        self.artifact
    }

    /// Decode the payload into a table.
    pub fn read(&self) -> Result<Table> {
        Table::from_csv(self.artifact.data())
    }
}

/// Decoded tabular data
#[derive(Debug, Clone)]
pub struct Table {
    frame: DataFrame,
}

impl Table {
    pub fn from_csv(data: &[u8]) -> Result<Self> {
        let frame = CsvReader::new(Cursor::new(data.to_vec())).finish()?;

        if frame.width() == 0 {
            return Err(AutoMlError::shape("CSV payload has no columns"));
        }
        for series in frame.get_columns() {
            if series.null_count() > 0 {
                return Err(AutoMlError::shape(format!(
                    "Column '{}' has {} missing values; the table must be rectangular",
                    series.name(),
                    series.null_count()
                )));
            }
        }

        debug!(
            "Decoded table with {} rows and {} columns",
            frame.height(),
            frame.width()
        );
        Ok(Self { frame })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    fn series(&self, name: &str) -> Result<&Series> {
        self.frame
            .column(name)
            .map_err(|_| AutoMlError::not_found(format!("column '{}'", name)))
    }

    pub fn is_numeric(&self, name: &str) -> Result<bool> {
        Ok(self.series(name)?.dtype().is_numeric())
    }

    /// Values of a numeric column as `f64`.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let series = self.series(name)?;
        if !series.dtype().is_numeric() {
            return Err(AutoMlError::validation(format!(
                "Column '{}' is not numeric (found {})",
                name,
                series.dtype()
            )));
        }
        let values = series.cast(&DataType::Float64)?;
        values
            .f64()?
            .into_iter()
            .map(|value| {
                value.ok_or_else(|| {
                    AutoMlError::shape(format!("Column '{}' has missing values", name))
                })
            })
            .collect()
    }

    /// Values of any column rendered as text, used for category labels.
    pub fn text_column(&self, name: &str) -> Result<Vec<String>> {
        let series = self.series(name)?;
        let values = series.cast(&DataType::String)?;
        values
            .str()?
            .into_iter()
            .map(|value| {
                value.map(str::to_string).ok_or_else(|| {
                    AutoMlError::shape(format!("Column '{}' has missing values", name))
                })
            })
            .collect()
    }

    /// `(min, max)` of a numeric column, `None` for non-numeric or empty ones.
    pub fn numeric_range(&self, name: &str) -> Result<Option<(f64, f64)>> {
        if !self.is_numeric(name)? {
            return Ok(None);
        }
        let values = self.numeric_column(name)?;
        let range = values.iter().fold(None, |acc: Option<(f64, f64)>, &x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
        });
        Ok(range)
    }

    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut frame = self.frame.clone();
        let mut buffer = Vec::new();
        CsvWriter::new(&mut buffer)
            .include_header(true)
            .finish(&mut frame)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "height,weight,species\n1.5,50,cat\n1.8,80,dog\n1.6,65,cat\n";

    #[test]
    fn test_read_is_idempotent() {
        let dataset = Dataset::from_csv("animals", "1.0.0", CSV.as_bytes().to_vec()).unwrap();
        let first = dataset.read().unwrap();
        let second = dataset.read().unwrap();

        assert_eq!(first.column_names(), second.column_names());
        assert_eq!(first.n_rows(), 3);
        assert_eq!(
            first.numeric_column("weight").unwrap(),
            second.numeric_column("weight").unwrap()
        );
    }

    #[test]
    fn test_columns_decode_by_type() {
        let table = Table::from_csv(CSV.as_bytes()).unwrap();
        assert_eq!(table.column_names(), vec!["height", "weight", "species"]);
        assert_eq!(table.numeric_column("weight").unwrap(), vec![50.0, 80.0, 65.0]);
        assert_eq!(table.text_column("species").unwrap(), vec!["cat", "dog", "cat"]);
        assert!(table.numeric_column("species").is_err());
        assert_eq!(table.numeric_range("weight").unwrap(), Some((50.0, 80.0)));
        assert_eq!(table.numeric_range("species").unwrap(), None);
    }

    #[test]
    fn test_missing_column_is_not_found() {
        let table = Table::from_csv(CSV.as_bytes()).unwrap();
        let err = table.numeric_column("age").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_ragged_payload_is_rejected() {
        let ragged = "a,b\n1,2\n3\n";
        assert!(Dataset::from_csv("ragged", "1.0.0", ragged.as_bytes().to_vec()).is_err());
    }

    #[test]
    fn test_from_artifact_checks_kind() {
        let artifact = Artifact::new("m", "1.0.0", ArtifactKind::Model, vec![]).unwrap();
        assert!(Dataset::from_artifact(artifact).is_err());
    }

    #[test]
    fn test_table_to_csv_round_trips_values() {
        let table = Table::from_csv(CSV.as_bytes()).unwrap();
        let dataset = Dataset::from_table(&table, "copy", "1.0.0").unwrap();
        let reread = dataset.read().unwrap();
        assert_eq!(reread.text_column("species").unwrap(), vec!["cat", "dog", "cat"]);
    }
}
