//! CLI command dispatch
//!
//! Each command opens the artifact store named by the configuration, does
//! its work through `automl-core` and writes either text or JSON to the
//! given output.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info};

use automl_core::{
    detect_feature_types, get_metric, get_model, AppConfig, ArtifactId, ArtifactKind,
    ArtifactRecord, AutoMlError, AutoMlSystem, Dataset, Feature, Hyperparameters, Pipeline,
    SavedPipeline, TaskType,
};

use crate::cli::{
    load_config, ArtifactCommand, Args, Command, DatasetCommand, Error, PipelineCommand,
    PredictArgs, TrainArgs, EXIT_FAILURE, EXIT_STORAGE_ERROR, EXIT_SUCCESS,
};

/// Exit code wrapper for CLI operations
pub type ExitCode = i32;

/// Run a parsed invocation and return its exit code.
///
/// Called from main() after argument parsing. Loads the configuration,
/// installs logging, then dispatches.
pub fn run_cli_mode(args: Args) -> ExitCode {
    let config = match load_config(args.config.as_deref(), args.root.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return exit_code_for(&e);
        }
    };

    let _guard = match crate::logging::init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FAILURE;
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match run_command(&args, &config, &mut out) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    }
}

/// Map an error to its exit code: storage failures are 2, anything else 1.
pub fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    for cause in error.chain() {
        if let Some(Error::Storage(_)) = cause.downcast_ref::<Error>() {
            return EXIT_STORAGE_ERROR;
        }
        if let Some(AutoMlError::Io(_)) = cause.downcast_ref::<AutoMlError>() {
            return EXIT_STORAGE_ERROR;
        }
    }
    EXIT_FAILURE
}

/// Run one command against the store described by `config`.
pub fn run_command(args: &Args, config: &AppConfig, out: &mut dyn Write) -> Result<()> {
    let mut system = AutoMlSystem::open(&config.storage).map_err(|e| {
        Error::Storage(format!(
            "cannot open artifact store at '{}': {}",
            config.storage.root.display(),
            e
        ))
    })?;
    debug!("Dispatching {:?}", args.command);

    match &args.command {
        Command::Datasets { command } => run_datasets(&mut system, command, args.json, out),
        Command::Train(train) => run_train(&mut system, config, train, args.json, out),
        Command::Pipelines { command } => run_pipelines(&mut system, command, args.json, out),
        Command::Predict(predict) => run_predict(&mut system, predict, args.json, out),
        Command::Artifacts { command } => run_artifacts(&mut system, command, args.json, out),
    }
}

fn parse_id(raw: &str) -> Result<ArtifactId> {
    raw.parse::<ArtifactId>()
        .with_context(|| format!("'{}' is not an artifact id (expected name@version)", raw))
}

fn read_csv(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_records(records: &[ArtifactRecord], json_output: bool, out: &mut dyn Write) -> Result<()> {
    if json_output {
        writeln!(out, "{}", serde_json::to_string(records)?)?;
        return Ok(());
    }
    if records.is_empty() {
        writeln!(out, "No artifacts")?;
    }
    for record in records {
        writeln!(
            out,
            "{}\t{}@{}\t{}\t{}",
            record.kind,
            record.name,
            record.version,
            record.asset_path,
            record.registered_at.format("%Y-%m-%d %H:%M:%S")
        )?;
    }
    Ok(())
}

fn run_datasets(
    system: &mut AutoMlSystem,
    command: &DatasetCommand,
    json_output: bool,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        DatasetCommand::Upload { csv, name, version } => {
            let name = match name {
                Some(name) => name.clone(),
                None => csv
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::InvalidArgs(format!("cannot derive a name from {}", csv.display()))
                    })?,
            };
            let dataset = Dataset::from_csv(name, version.clone(), read_csv(csv)?)
                .with_context(|| format!("{} is not a usable CSV dataset", csv.display()))?;
            let table = dataset.read()?;
            system.registry().register(dataset.artifact())?;
            info!("Uploaded dataset {}", dataset.id());

            if json_output {
                let output = json!({
                    "id": dataset.id().to_string(),
                    "rows": table.n_rows(),
                    "columns": table.column_names(),
                });
                writeln!(out, "{}", output)?;
            } else {
                writeln!(
                    out,
                    "Registered dataset {} ({} rows, {} columns)",
                    dataset.id(),
                    table.n_rows(),
                    table.column_names().len()
                )?;
            }
        }
        DatasetCommand::List => {
            let records = system.registry().records(Some(ArtifactKind::Dataset))?;
            print_records(&records, json_output, out)?;
        }
        DatasetCommand::Features { id } => {
            let id = parse_id(id)?;
            let dataset = Dataset::from_artifact(system.registry().get(&id)?)?;
            let features = detect_feature_types(&dataset)?;
            if json_output {
                let output: Vec<_> = features
                    .iter()
                    .map(|f| json!({ "name": f.name(), "type": f.feature_type().as_str() }))
                    .collect();
                writeln!(out, "{}", serde_json::Value::Array(output))?;
            } else {
                for feature in &features {
                    writeln!(out, "{}\t{}", feature.name(), feature.feature_type())?;
                }
            }
        }
    }
    Ok(())
}

/// Resolve `column` or `column:type` against the detected features.
fn resolve_feature(column: &str, detected: &[Feature], dataset: &ArtifactId) -> Result<Feature> {
    if let Some((name, feature_type)) = column.split_once(':') {
        return Ok(Feature::parse(name.trim(), feature_type)?);
    }
    detected
        .iter()
        .find(|feature| feature.name() == column)
        .cloned()
        .ok_or_else(|| {
            AutoMlError::not_found(format!("column '{}' in dataset {}", column, dataset)).into()
        })
}

fn run_train(
    system: &mut AutoMlSystem,
    config: &AppConfig,
    args: &TrainArgs,
    json_output: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let dataset_id = parse_id(&args.dataset)?;
    let dataset = Dataset::from_artifact(system.registry().get(&dataset_id)?)?;
    let detected = detect_feature_types(&dataset)?;

    let inputs = args
        .inputs
        .iter()
        .map(|column| resolve_feature(column, &detected, &dataset_id))
        .collect::<Result<Vec<_>>>()?;
    let target = resolve_feature(&args.target, &detected, &dataset_id)?;
    let task_type = target.feature_type().task_type();

    let metric_names = if !args.metrics.is_empty() {
        args.metrics.clone()
    } else {
        match task_type {
            TaskType::Classification => config.training.classification_metrics.clone(),
            TaskType::Regression => config.training.regression_metrics.clone(),
        }
    };
    let metrics = metric_names
        .iter()
        .map(|name| get_metric(name))
        .collect::<automl_core::Result<Vec<_>>>()?;

    let mut hyperparameters: Hyperparameters = args.params.iter().cloned().collect();
    if args.model.eq_ignore_ascii_case("random_forest") {
        hyperparameters
            .entry("seed".to_string())
            .or_insert_with(|| json!(config.training.seed));
    }
    let model = get_model(&args.model, hyperparameters)?;

    let split = args.split.unwrap_or(config.training.split);
    let mut pipeline = Pipeline::new(metrics, dataset, model, inputs, target, split)?;
    let report = pipeline
        .execute()
        .with_context(|| format!("Training {} on {} failed", args.model, dataset_id))?;
    let (train_rows, test_rows) = pipeline.split_sizes().unwrap_or_default();

    let saved = match &args.save {
        Some(name) => Some(pipeline.save(system.registry(), name, &args.version)?),
        None => None,
    };

    if json_output {
        let output = json!({
            "model": pipeline.model().name(),
            "task_type": task_type.as_str(),
            "train_rows": train_rows,
            "test_rows": test_rows,
            "metrics": report.metrics,
            "saved": saved.as_ref().map(ToString::to_string),
        });
        writeln!(out, "{}", output)?;
    } else {
        writeln!(out, "{}", pipeline)?;
        writeln!(
            out,
            "Trained on {} rows, evaluated on {} rows",
            train_rows, test_rows
        )?;
        for line in report.formatted_metrics() {
            writeln!(out, "  {}", line)?;
        }
        if let Some(id) = &saved {
            writeln!(out, "Saved pipeline {}", id)?;
        }
    }
    Ok(())
}

fn run_pipelines(
    system: &mut AutoMlSystem,
    command: &PipelineCommand,
    json_output: bool,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        PipelineCommand::List => {
            let records = system.registry().records(Some(ArtifactKind::Pipeline))?;
            print_records(&records, json_output, out)?;
        }
        PipelineCommand::Show { id } => {
            let id = parse_id(id)?;
            let record = system.registry().record(&id)?;
            let saved = SavedPipeline::load(system.registry(), &id)?;
            let config = saved.config();
            let inputs: Vec<String> = config.input_features.iter().map(ToString::to_string).collect();
            let metrics = record.metadata.get("metrics").cloned().unwrap_or(json!([]));

            if json_output {
                let output = json!({
                    "id": id.to_string(),
                    "config": config,
                    "metrics": metrics,
                    "members": record.metadata.get("members"),
                    "registered_at": record.registered_at,
                });
                writeln!(out, "{}", output)?;
            } else {
                writeln!(out, "Pipeline {}", id)?;
                writeln!(out, "  model:   {} ({})", config.model, config.task_type)?;
                writeln!(out, "  inputs:  {}", inputs.join(", "))?;
                writeln!(out, "  target:  {}", config.target_feature)?;
                writeln!(out, "  split:   {}", config.split)?;
                if let Some(lines) = metrics.as_array() {
                    for line in lines.iter().filter_map(|l| l.as_str()) {
                        writeln!(out, "  {}", line)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn run_predict(
    system: &mut AutoMlSystem,
    args: &PredictArgs,
    json_output: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let id = parse_id(&args.pipeline)?;
    let saved = SavedPipeline::load(system.registry(), &id)
        .with_context(|| format!("Failed to load pipeline {}", id))?;
    let batch = Dataset::from_csv("prediction-input", "1.0.0", read_csv(&args.csv)?)
        .with_context(|| format!("{} is not a usable CSV dataset", args.csv.display()))?;
    let labels = saved.predict_labels(&batch)?;
    info!("Predicted {} row(s) with {}", labels.len(), id);

    if json_output {
        let output = json!({ "pipeline": id.to_string(), "predictions": labels });
        writeln!(out, "{}", output)?;
    } else {
        for label in &labels {
            writeln!(out, "{}", label)?;
        }
    }
    Ok(())
}

fn run_artifacts(
    system: &mut AutoMlSystem,
    command: &ArtifactCommand,
    json_output: bool,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        ArtifactCommand::List { kind } => {
            let kind = kind
                .as_deref()
                .map(str::parse::<ArtifactKind>)
                .transpose()?;
            let records = system.registry().records(kind)?;
            print_records(&records, json_output, out)?;
        }
        ArtifactCommand::Delete { id } => {
            let id = parse_id(id)?;
            system.registry().delete(&id)?;
            if json_output {
                writeln!(out, "{}", json!({ "deleted": id.to_string() }))?;
            } else {
                writeln!(out, "Deleted {}", id)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let storage = anyhow::Error::from(Error::Storage("disk".to_string()));
        assert_eq!(exit_code_for(&storage), EXIT_STORAGE_ERROR);

        let io = anyhow::Error::from(AutoMlError::Io(std::io::Error::other("denied")))
            .context("while saving");
        assert_eq!(exit_code_for(&io), EXIT_STORAGE_ERROR);

        let validation = anyhow::Error::from(AutoMlError::validation("bad split"));
        assert_eq!(exit_code_for(&validation), EXIT_FAILURE);
    }

    #[test]
    fn test_resolve_feature_override() {
        let id = ArtifactId::new("d", "1.0.0").unwrap();
        let detected = vec![Feature::parse("x", "numerical").unwrap()];
        assert_eq!(resolve_feature("x", &detected, &id).unwrap(), detected[0]);
        assert_eq!(
            resolve_feature("x:categorical", &detected, &id)
                .unwrap()
                .feature_type()
                .as_str(),
            "categorical"
        );
        assert!(resolve_feature("y", &detected, &id).is_err());
    }
}
