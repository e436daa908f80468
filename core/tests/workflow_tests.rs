//! End-to-end workflow tests against a real on-disk artifact store:
//! upload a dataset, train a pipeline, save it, reload it in a fresh
//! process context and predict.

use automl_core::{
    detect_feature_types, get_metric, get_model, Artifact, ArtifactId, ArtifactKind, AutoMlError,
    AutoMlSystem, Dataset, Feature, FeatureType, Hyperparameters, Pipeline, PipelineState,
    SavedPipeline, StorageConfig,
};
use serde_json::json;
use tempfile::TempDir;

const FLOWERS: &str = "\
petal_length,petal_width,colour,species
1.4,0.2,white,setosa
1.3,0.2,white,setosa
1.5,0.3,white,setosa
1.6,0.2,white,setosa
4.5,1.5,purple,versicolor
4.7,1.4,purple,versicolor
4.4,1.3,purple,versicolor
4.6,1.5,purple,versicolor
1.4,0.3,white,setosa
4.5,1.4,purple,versicolor
";

const HOUSES: &str = "\
rooms,area,price
1,30,65
2,45,95
3,60,125
4,80,165
5,95,195
6,110,225
7,130,265
8,150,305
9,160,325
10,175,355
";

fn open_system(dir: &TempDir) -> AutoMlSystem {
    let config = StorageConfig {
        root: dir.path().to_path_buf(),
        ..StorageConfig::default()
    };
    AutoMlSystem::open(&config).unwrap()
}

fn numerical(name: &str) -> Feature {
    Feature::new(name, FeatureType::Numerical).unwrap()
}

fn categorical(name: &str) -> Feature {
    Feature::new(name, FeatureType::Categorical).unwrap()
}

fn upload(system: &mut AutoMlSystem, name: &str, csv: &str) -> Dataset {
    let dataset = Dataset::from_csv(name, "1.0.0", csv.as_bytes().to_vec()).unwrap();
    system.registry().register(dataset.artifact()).unwrap();
    dataset
}

fn flower_pipeline(dataset: Dataset) -> Pipeline {
    Pipeline::new(
        vec![get_metric("accuracy").unwrap(), get_metric("recall").unwrap()],
        dataset,
        get_model("decision_tree", Hyperparameters::new()).unwrap(),
        vec![numerical("petal_length"), numerical("petal_width"), categorical("colour")],
        categorical("species"),
        0.8,
    )
    .unwrap()
}

#[test]
fn test_registry_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let artifact = Artifact::new("notes", "0.1.0", ArtifactKind::Model, b"{}".to_vec())
        .unwrap()
        .with_tags(["draft"])
        .with_metadata_entry("owner", json!("data-team"));
    open_system(&dir).registry().register(&artifact).unwrap();

    let mut reopened = open_system(&dir);
    let loaded = reopened.registry().get(artifact.id()).unwrap();
    assert_eq!(loaded, artifact);
    assert_eq!(reopened.registry().list(None).unwrap().len(), 1);
}

#[test]
fn test_reregistering_replaces_the_entry() {
    let dir = TempDir::new().unwrap();
    let mut system = open_system(&dir);
    let first = Artifact::new("weights", "1.0.0", ArtifactKind::Model, b"[1]".to_vec()).unwrap();
    let second = Artifact::new("weights", "1.0.0", ArtifactKind::Model, b"[2]".to_vec()).unwrap();

    system.registry().register(&first).unwrap();
    system.registry().register(&second).unwrap();

    let records = system.registry().records(Some(ArtifactKind::Model)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(system.registry().get(first.id()).unwrap().data(), b"[2]");
}

#[test]
fn test_delete_removes_payload_and_record() {
    let dir = TempDir::new().unwrap();
    let mut system = open_system(&dir);
    let dataset = upload(&mut system, "houses", HOUSES);
    let blob = dir.path().join("objects").join(dataset.artifact().asset_path());
    assert!(blob.exists());

    system.registry().delete(dataset.id()).unwrap();
    assert!(!blob.exists());
    assert!(!system.registry().contains(dataset.id()).unwrap());
    assert!(system.registry().get(dataset.id()).unwrap_err().is_not_found());
    assert!(system.registry().delete(dataset.id()).unwrap_err().is_not_found());
}

#[test]
fn test_detected_feature_types() {
    let dataset = Dataset::from_csv("flowers", "1.0.0", FLOWERS.as_bytes().to_vec()).unwrap();
    let features = detect_feature_types(&dataset).unwrap();
    let summary: Vec<(&str, FeatureType)> = features
        .iter()
        .map(|f| (f.name(), f.feature_type()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("petal_length", FeatureType::Numerical),
            ("petal_width", FeatureType::Numerical),
            ("colour", FeatureType::Categorical),
            ("species", FeatureType::Categorical),
        ]
    );
}

#[test]
fn test_train_save_load_predict() {
    let dir = TempDir::new().unwrap();
    let mut system = open_system(&dir);
    upload(&mut system, "flowers", FLOWERS);

    // Pull the dataset back out of the registry like a later run would
    let stored = system
        .registry()
        .get(&ArtifactId::new("flowers", "1.0.0").unwrap())
        .unwrap();
    let mut pipeline = flower_pipeline(Dataset::from_artifact(stored).unwrap());
    let report = pipeline.execute().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Evaluated);
    assert_eq!(pipeline.split_sizes(), Some((8, 2)));
    assert_eq!(report.formatted_metrics()[0], "Accuracy: 1");

    let id = pipeline.save(system.registry(), "flower-tree", "1.0.0").unwrap();
    let pipelines = system.registry().records(Some(ArtifactKind::Pipeline)).unwrap();
    assert_eq!(pipelines.len(), 1);
    assert_eq!(pipelines[0].name, "flower-tree");

    let mut reopened = open_system(&dir);
    let saved = SavedPipeline::load(reopened.registry(), &id).unwrap();
    assert_eq!(saved.config().model, "decision_tree");

    let batch = "petal_length,petal_width,colour\n1.5,0.2,white\n4.6,1.4,purple\n";
    let batch = Dataset::from_csv("batch", "1.0.0", batch.as_bytes().to_vec()).unwrap();
    let labels = saved.predict_labels(&batch).unwrap();
    assert_eq!(labels, vec!["setosa", "versicolor"]);
}

#[test]
fn test_prediction_needs_every_input_column() {
    let dir = TempDir::new().unwrap();
    let mut system = open_system(&dir);
    let mut pipeline = flower_pipeline(upload(&mut system, "flowers", FLOWERS));
    pipeline.execute().unwrap();
    let id = pipeline.save(system.registry(), "flower-tree", "1.0.0").unwrap();

    let saved = SavedPipeline::load(system.registry(), &id).unwrap();
    let batch = Dataset::from_csv("batch", "1.0.0", b"petal_length\n1.5\n".to_vec()).unwrap();
    match saved.predict(&batch).unwrap_err() {
        AutoMlError::Validation(message) => {
            assert!(message.contains("petal_width"), "{}", message);
            assert!(message.contains("colour"), "{}", message);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_regression_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut system = open_system(&dir);
    let dataset = upload(&mut system, "houses", HOUSES);

    let mut pipeline = Pipeline::new(
        vec![get_metric("mean_squared_error").unwrap()],
        dataset,
        get_model("multiple_linear_regression", Hyperparameters::new()).unwrap(),
        vec![numerical("rooms"), numerical("area")],
        numerical("price"),
        0.8,
    )
    .unwrap();
    let report = pipeline.execute().unwrap();
    // price = 5 + 2 * area exactly, so the fit is perfect
    assert!(report.metrics[0].value < 1e-6);

    let id = pipeline.save(system.registry(), "house-prices", "2.0.0").unwrap();
    let saved = SavedPipeline::load(system.registry(), &id).unwrap();
    let batch = Dataset::from_csv("batch", "1.0.0", b"rooms,area\n11,200\n".to_vec()).unwrap();
    let predictions = saved.predict(&batch).unwrap();
    assert!((predictions[0] - 405.0).abs() < 1e-6);
}

#[test]
fn test_columns_named_like_pipeline_members() {
    // y = 2 * model + 3 * pipeline_config + 1
    const RESERVED: &str = "\
model,pipeline_config,y
1,3,12
2,1,8
3,4,19
4,1,12
5,5,26
6,9,40
7,2,21
8,6,35
9,5,34
10,3,30
";
    let dir = TempDir::new().unwrap();
    let mut system = open_system(&dir);
    let dataset = upload(&mut system, "reserved", RESERVED);

    let mut pipeline = Pipeline::new(
        vec![get_metric("mean_squared_error").unwrap()],
        dataset,
        get_model("multiple_linear_regression", Hyperparameters::new()).unwrap(),
        vec![numerical("model"), numerical("pipeline_config")],
        numerical("y"),
        0.8,
    )
    .unwrap();
    pipeline.execute().unwrap();
    let id = pipeline.save(system.registry(), "reserved-fit", "1.0.0").unwrap();

    let stored = system.registry().get(&id).unwrap();
    assert_eq!(
        stored.metadata()["members"],
        json!([
            "reserved-fit.feature.model@1.0.0",
            "reserved-fit.feature.pipeline_config@1.0.0",
            "reserved-fit.model@1.0.0",
        ])
    );

    let saved = SavedPipeline::load(system.registry(), &id).unwrap();
    let batch = Dataset::from_csv("batch", "1.0.0", b"model,pipeline_config\n11,2\n".to_vec()).unwrap();
    let predictions = saved.predict(&batch).unwrap();
    assert!((predictions[0] - 29.0).abs() < 1e-6, "{}", predictions[0]);
}

#[test]
fn test_training_is_deterministic() {
    let train = |hyper: Hyperparameters| {
        let dataset = Dataset::from_csv("flowers", "1.0.0", FLOWERS.as_bytes().to_vec()).unwrap();
        let mut pipeline = Pipeline::new(
            vec![get_metric("accuracy").unwrap()],
            dataset,
            get_model("random_forest", hyper).unwrap(),
            vec![numerical("petal_length"), categorical("colour")],
            categorical("species"),
            0.7,
        )
        .unwrap();
        pipeline.execute().unwrap()
    };

    let mut hyper = Hyperparameters::new();
    hyper.insert("n_estimators".to_string(), json!(5));
    let first = train(hyper.clone());
    let second = train(hyper);
    assert_eq!(first.predictions, second.predictions);
    assert_eq!(first.formatted_metrics(), second.formatted_metrics());
}
