//! CLI argument parsing
//!
//! Grammar:
//! ```text
//! automl [--config <file>] [--root <dir>] [--json] <command>
//!
//! COMMANDS:
//!   datasets upload <csv> [--name n] [--version v]
//!   datasets list
//!   datasets features <id>
//!   train --dataset <id> --inputs a,b --target c --model <name>
//!         [--metrics m1,m2] [--split r] [--param k=v]... [--save <name> [--version v]]
//!   pipelines list
//!   pipelines show <id>
//!   predict --pipeline <id> <csv>
//!   artifacts list [--type t]
//!   artifacts delete <id>
//! ```
//!
//! Artifact ids are written `name@version`.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::cli::Error;

/// Parsed CLI arguments
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "automl", version, about = "Train, store and serve tabular models")]
pub struct Args {
    /// Configuration file (TOML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Artifact store root, overriding the configuration
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Print machine readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Manage datasets
    Datasets {
        #[command(subcommand)]
        command: DatasetCommand,
    },

    /// Train and evaluate a pipeline, optionally saving it
    Train(TrainArgs),

    /// Inspect saved pipelines
    Pipelines {
        #[command(subcommand)]
        command: PipelineCommand,
    },

    /// Run a saved pipeline over a CSV file
    Predict(PredictArgs),

    /// List or delete any artifact
    Artifacts {
        #[command(subcommand)]
        command: ArtifactCommand,
    },
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum DatasetCommand {
    /// Register a CSV file as a dataset
    Upload {
        csv: PathBuf,

        /// Dataset name, defaults to the file stem
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "1.0.0")]
        version: String,
    },

    List,

    /// Show the detected type of every column
    Features { id: String },
}

#[derive(Debug, Clone, PartialEq, ClapArgs)]
pub struct TrainArgs {
    /// Dataset id (`name@version`)
    #[arg(long)]
    pub dataset: String,

    /// Input columns; `column:type` forces a feature type
    #[arg(long, value_delimiter = ',', required = true)]
    pub inputs: Vec<String>,

    /// Target column; `column:type` forces a feature type
    #[arg(long)]
    pub target: String,

    #[arg(long)]
    pub model: String,

    /// Metric names, defaulting to the configured ones for the task
    #[arg(long, value_delimiter = ',')]
    pub metrics: Vec<String>,

    /// Training fraction, defaulting to the configured split
    #[arg(long)]
    pub split: Option<f64>,

    /// Model hyperparameter, repeatable
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, serde_json::Value)>,

    /// Save the trained pipeline under this name
    #[arg(long)]
    pub save: Option<String>,

    /// Version of the saved pipeline
    #[arg(long, default_value = "1.0.0")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum PipelineCommand {
    List,
    Show { id: String },
}

#[derive(Debug, Clone, PartialEq, ClapArgs)]
pub struct PredictArgs {
    /// Pipeline id (`name@version`)
    #[arg(long)]
    pub pipeline: String,

    pub csv: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum ArtifactCommand {
    List {
        /// Only artifacts of this type (dataset, model, pipeline, encoder, scaler)
        #[arg(long = "type")]
        kind: Option<String>,
    },
    Delete {
        id: String,
    },
}

/// Parse `key=value`. The value is read as JSON when it parses, so `k=5`
/// is a number and `k=auto` a string.
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value), Error> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| Error::InvalidArgs(format!("expected KEY=VALUE, got '{}'", raw)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::InvalidArgs(format!("empty parameter name in '{}'", raw)));
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

/// Parse CLI arguments from an iterator, program name first.
pub fn parse_args<I, T>(args: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Args::try_parse_from(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_param_values() {
        assert_eq!(parse_param("k=5").unwrap(), ("k".to_string(), json!(5)));
        assert_eq!(parse_param("alpha=0.5").unwrap(), ("alpha".to_string(), json!(0.5)));
        assert_eq!(
            parse_param("mode = auto").unwrap(),
            ("mode".to_string(), json!("auto"))
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=3").is_err());
    }

    #[test]
    fn test_parse_train() {
        let args = parse_args([
            "automl", "--json", "train", "--dataset", "iris@1.0.0", "--inputs", "a,b:categorical",
            "--target", "c", "--model", "knn", "--param", "k=5", "--save", "iris-knn",
        ])
        .unwrap();
        assert!(args.json);
        match args.command {
            Command::Train(train) => {
                assert_eq!(train.inputs, vec!["a", "b:categorical"]);
                assert_eq!(train.params, vec![("k".to_string(), json!(5))]);
                assert_eq!(train.save.as_deref(), Some("iris-knn"));
                assert_eq!(train.version, "1.0.0");
                assert!(train.metrics.is_empty());
                assert_eq!(train.split, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse_args(["automl", "artifacts", "list", "--type", "model", "--root", "/tmp/x"])
            .unwrap();
        assert_eq!(args.root, Some(PathBuf::from("/tmp/x")));
        assert_eq!(
            args.command,
            Command::Artifacts {
                command: ArtifactCommand::List {
                    kind: Some("model".to_string())
                }
            }
        );
    }

    #[test]
    fn test_missing_subcommand_is_an_error() {
        assert!(parse_args(["automl"]).is_err());
        assert!(parse_args(["automl", "train", "--dataset", "d@1"]).is_err());
    }
}
