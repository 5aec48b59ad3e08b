//! Integration tests for the data stages.
//!
//! Each test builds a throwaway workspace, copies a fixture into it and runs
//! the stages through a [`StageContext`], exactly like the CLI does.

use polars::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wastecast_processing::utils::{numeric_values, text_values};
use wastecast_processing::{
    ArtifactStore, CategoricalEncoder, Config, MemoryReporter, PipelineError, StageContext,
    features, ingestion, preprocessing,
};

// ============================================================================
// Helper Functions
// ============================================================================

const CONFIG: &str = r#"
base:
  random_state: 42
  target_column: food_waste
data_ingestion:
  input_path: data/raw/food_waste.csv
  output_train_path: data/processed/train.csv
  output_test_path: data/processed/test.csv
  test_size: 0.2
data_preprocessing:
  train_input_path: data/processed/train.csv
  test_input_path: data/processed/test.csv
  train_output_path: data/processed/train_preprocessed.csv
  test_output_path: data/processed/test_preprocessed.csv
  encodings_path: data/processed/encodings.json
  categorical_columns: [weather]
  drop_duplicates: true
feature_engineering:
  train_input_path: data/processed/train_preprocessed.csv
  test_input_path: data/processed/test_preprocessed.csv
  train_output_path: data/processed/train_fe.csv
  test_output_path: data/processed/test_fe.csv
"#;

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// A temporary workspace with `fixture` installed as the raw dataset.
fn workspace(fixture: &str) -> (TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let raw = dir.path().join("data/raw");
    std::fs::create_dir_all(&raw).expect("Failed to create raw dir");
    std::fs::copy(fixtures_path().join(fixture), raw.join("food_waste.csv"))
        .expect("Failed to copy fixture");
    let store = ArtifactStore::new(dir.path());
    (dir, store)
}

fn config(extra: &str) -> Config {
    Config::from_yaml_str(&format!("{}{}", CONFIG, extra)).expect("valid config")
}

fn read_bytes(root: &Path, path: &str) -> Vec<u8> {
    std::fs::read(root.join(path)).expect("artifact exists")
}

// ============================================================================
// Ingestion
// ============================================================================

#[test]
fn test_ingestion_is_byte_for_byte_reproducible() {
    let config = config("");
    let reporter = MemoryReporter::new();

    let (first_dir, first) = workspace("food_waste.csv");
    let (second_dir, second) = workspace("food_waste.csv");
    ingestion::run(&StageContext::new(&config, &first, &reporter)).unwrap();
    ingestion::run(&StageContext::new(&config, &second, &reporter)).unwrap();

    for path in ["data/processed/train.csv", "data/processed/test.csv"] {
        assert_eq!(
            read_bytes(first_dir.path(), path),
            read_bytes(second_dir.path(), path)
        );
    }
}

#[test]
fn test_ingestion_partition_is_exhaustive_and_disjoint() {
    let config = config("");
    let (_dir, store) = workspace("food_waste.csv");
    let reporter = MemoryReporter::new();

    let summary = ingestion::run(&StageContext::new(&config, &store, &reporter)).unwrap();
    assert_eq!(summary.total_rows, 30);
    assert_eq!(summary.test_rows, 6);
    assert_eq!(summary.train_rows, 24);

    // every fixture row is unique on (sales, temperature)
    let key = |df: &DataFrame| -> HashSet<String> {
        let sales = numeric_values(df, "sales").unwrap();
        let temp = numeric_values(df, "temperature").unwrap();
        sales
            .iter()
            .zip(&temp)
            .map(|(s, t)| format!("{:?}/{:?}", s, t))
            .collect()
    };
    let train = key(&store.read_csv("data/processed/train.csv").unwrap());
    let test = key(&store.read_csv("data/processed/test.csv").unwrap());
    assert!(train.is_disjoint(&test));
    assert_eq!(train.len() + test.len(), 30);
}

#[test]
fn test_ten_row_split_with_seed_42() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let df = df![
        "row" => (0i64..10).collect::<Vec<_>>(),
        "target" => (0..10).map(|i| i as f64 * 1.5).collect::<Vec<_>>(),
    ]
    .unwrap();
    store.write_csv("raw.csv", &df).unwrap();

    let config = Config::from_yaml_str(
        "data_ingestion:\n  input_path: raw.csv\n  output_train_path: train.csv\n  output_test_path: test.csv\n  test_size: 0.2\n  random_state: 42\n",
    )
    .unwrap();
    let reporter = MemoryReporter::new();
    let ctx = StageContext::new(&config, &store, &reporter);

    let summary = ingestion::run(&ctx).unwrap();
    assert_eq!((summary.train_rows, summary.test_rows), (8, 2));
    let held_out = numeric_values(&store.read_csv("test.csv").unwrap(), "row").unwrap();

    ingestion::run(&ctx).unwrap();
    let again = numeric_values(&store.read_csv("test.csv").unwrap(), "row").unwrap();
    assert_eq!(held_out, again);

    let expected = ingestion::split_indices(10, 0.2, 42).unwrap();
    let expected: Vec<Option<f64>> = expected.test.iter().map(|&i| Some(i as f64)).collect();
    assert_eq!(held_out, expected);
}

#[test]
fn test_ingestion_missing_raw_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let config = config("");
    let reporter = MemoryReporter::new();

    let err = ingestion::run(&StageContext::new(&config, &store, &reporter)).unwrap_err();
    assert!(matches!(err.root(), PipelineError::ArtifactNotFound { .. }));
    assert_eq!(err.exit_code(), 3);
    assert!(err.to_string().starts_with("Data Ingestion failed"));
}

#[test]
fn test_ingestion_missing_fraction_is_config_error() {
    let (_dir, store) = workspace("food_waste.csv");
    let config = Config::from_yaml_str(
        "data_ingestion:\n  input_path: data/raw/food_waste.csv\n  output_train_path: a.csv\n  output_test_path: b.csv\n  random_state: 1\n",
    )
    .unwrap();
    let reporter = MemoryReporter::new();

    let err = ingestion::run(&StageContext::new(&config, &store, &reporter)).unwrap_err();
    match err.root() {
        PipelineError::ConfigMissingKey { path } => assert_eq!(path, "data_ingestion.test_size"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!store.exists("a.csv"));
}

// ============================================================================
// Preprocessing
// ============================================================================

fn run_through_preprocessing(fixture: &str) -> (TempDir, ArtifactStore) {
    let (dir, store) = workspace(fixture);
    let config = config("");
    let reporter = MemoryReporter::new();
    let ctx = StageContext::new(&config, &store, &reporter);
    ingestion::run(&ctx).unwrap();
    preprocessing::run(&ctx).unwrap();
    (dir, store)
}

#[test]
fn test_preprocessing_encodes_contiguous_codes_from_training_data() {
    let (_dir, store) = run_through_preprocessing("food_waste.csv");

    let raw_train = store.read_csv("data/processed/train.csv").unwrap();
    let distinct: HashSet<String> = text_values(&raw_train, "weather")
        .unwrap()
        .into_iter()
        .flatten()
        .collect();

    let train = store
        .read_csv("data/processed/train_preprocessed.csv")
        .unwrap();
    let codes: HashSet<i64> = numeric_values(&train, "weather")
        .unwrap()
        .into_iter()
        .flatten()
        .map(|v| v as i64)
        .collect();
    let expected: HashSet<i64> = (0..distinct.len() as i64).collect();
    assert_eq!(codes, expected);

    // the evaluation side uses the persisted training encoding
    let encoder: CategoricalEncoder = store.read_json("data/processed/encodings.json").unwrap();
    let encoding = encoder.encoding("weather").unwrap();
    let raw_test = store.read_csv("data/processed/test.csv").unwrap();
    let test = store.read_csv("data/processed/test_preprocessed.csv").unwrap();
    let labels = text_values(&raw_test, "weather").unwrap();
    let encoded = numeric_values(&test, "weather").unwrap();
    for (label, code) in labels.iter().zip(&encoded) {
        let label = label.as_deref().unwrap();
        assert_eq!(encoding.code(label).map(|c| c as f64), *code);
    }
}

#[test]
fn test_preprocessing_is_idempotent_on_its_output() {
    let (_dir, store) = run_through_preprocessing("food_waste.csv");
    let first_train = store
        .read_csv("data/processed/train_preprocessed.csv")
        .unwrap();
    let first_test = store
        .read_csv("data/processed/test_preprocessed.csv")
        .unwrap();

    let rerun = Config::from_yaml_str(
        r#"
data_preprocessing:
  train_input_path: data/processed/train_preprocessed.csv
  test_input_path: data/processed/test_preprocessed.csv
  train_output_path: data/processed/train_again.csv
  test_output_path: data/processed/test_again.csv
  encodings_path: data/processed/encodings_again.json
  categorical_columns: [weather]
  drop_duplicates: true
"#,
    )
    .unwrap();
    let reporter = MemoryReporter::new();
    preprocessing::run(&StageContext::new(&rerun, &store, &reporter)).unwrap();

    let second_train = store.read_csv("data/processed/train_again.csv").unwrap();
    let second_test = store.read_csv("data/processed/test_again.csv").unwrap();
    assert!(first_train.equals_missing(&second_train));
    assert!(first_test.equals_missing(&second_test));
}

#[test]
fn test_preprocessing_fills_gaps_and_drops_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    std::fs::copy(
        fixtures_path().join("with_gaps.csv"),
        dir.path().join("gaps.csv"),
    )
    .unwrap();
    let config = Config::from_yaml_str(
        r#"
data_preprocessing:
  train_input_path: gaps.csv
  test_input_path: gaps.csv
  train_output_path: out/train.csv
  test_output_path: out/test.csv
  encodings_path: out/encodings.json
  categorical_columns: [weather]
  drop_duplicates: true
  required_columns: [sales, temperature]
"#,
    )
    .unwrap();
    let reporter = MemoryReporter::new();

    let summary = preprocessing::run(&StageContext::new(&config, &store, &reporter)).unwrap();
    assert_eq!(summary.train.rows_in, 11);
    assert_eq!(summary.train.duplicates_removed, 1);
    assert_eq!(summary.train.rows_out, 10);

    let train = store.read_csv("out/train.csv").unwrap();
    let sales = numeric_values(&train, "sales").unwrap();
    assert_eq!(sales[1], Some(100.0));
    assert!(sales.iter().all(Option::is_some));
    // "sunny, cloudy, cloudy(filled), sunny, rainy" -> 0, 1, 1, 0, 2
    let weather = numeric_values(&train, "weather").unwrap();
    assert_eq!(
        &weather[..5],
        &[Some(0.0), Some(1.0), Some(1.0), Some(0.0), Some(2.0)]
    );
}

#[test]
fn test_preprocessing_unknown_categorical_column() {
    let (_dir, store) = workspace("food_waste.csv");
    let config = config("");
    let reporter = MemoryReporter::new();
    let ctx = StageContext::new(&config, &store, &reporter);
    ingestion::run(&ctx).unwrap();

    let bad = Config::from_yaml_str(&CONFIG.replace("[weather]", "[season]")).unwrap();
    let err = preprocessing::run(&StageContext::new(&bad, &store, &reporter)).unwrap_err();
    assert!(matches!(err.root(), PipelineError::SchemaViolation(_)));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_unseen_category_in_evaluation_data() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    store
        .write_csv(
            "train.csv",
            &df!["weather" => ["sunny", "rainy"], "sales" => [1i64, 2]].unwrap(),
        )
        .unwrap();
    store
        .write_csv(
            "test.csv",
            &df!["weather" => ["sunny", "snow"], "sales" => [3i64, 4]].unwrap(),
        )
        .unwrap();
    let config = Config::from_yaml_str(
        "data_preprocessing:\n  train_input_path: train.csv\n  test_input_path: test.csv\n  train_output_path: a.csv\n  test_output_path: b.csv\n  encodings_path: enc.json\n  categorical_columns: [weather]\n",
    )
    .unwrap();
    let reporter = MemoryReporter::new();

    let err = preprocessing::run(&StageContext::new(&config, &store, &reporter)).unwrap_err();
    match err.root() {
        PipelineError::UnknownCategory { column, value } => {
            assert_eq!(column, "weather");
            assert_eq!(value, "snow");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!store.exists("a.csv"));
}

// ============================================================================
// Feature Engineering
// ============================================================================

#[test]
fn test_default_catalog_end_to_end() {
    let (_dir, store) = run_through_preprocessing("food_waste.csv");
    let config = config("");
    let reporter = MemoryReporter::new();

    let summary = features::run(&StageContext::new(&config, &store, &reporter)).unwrap();
    assert_eq!(
        summary.applied,
        vec!["sales_7day_avg", "is_weekend", "temp_event_interaction"]
    );
    assert!(reporter.warnings().is_empty());

    let input = store
        .read_csv("data/processed/train_preprocessed.csv")
        .unwrap();
    let output = store.read_csv("data/processed/train_fe.csv").unwrap();
    let input_names: Vec<String> = input
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let output_names: Vec<String> = output
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    assert_eq!(&output_names[..input_names.len()], input_names.as_slice());

    let sales = numeric_values(&output, "sales").unwrap();
    let avg = numeric_values(&output, "sales_7day_avg").unwrap();
    assert_eq!(avg[0], sales[0]);
    for k in 1..6 {
        let expected = sales[..=k].iter().flatten().sum::<f64>() / (k + 1) as f64;
        assert!((avg[k].unwrap() - expected).abs() < 1e-9);
    }
}

#[test]
fn test_missing_sources_and_unknown_kinds_warn() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let df = df!["sales" => [1.0, 2.0, 3.0], "day_of_week" => [4i64, 5, 6]].unwrap();
    store.write_csv("train.csv", &df).unwrap();
    store.write_csv("test.csv", &df).unwrap();

    let config = Config::from_yaml_str(
        r#"
feature_engineering:
  train_input_path: train.csv
  test_input_path: test.csv
  train_output_path: train_fe.csv
  test_output_path: test_fe.csv
  derivations:
    - kind: rolling_mean
      source: sales
      window: 2
    - kind: weekend_flag
      source: day_of_week
    - kind: interaction
      left: temperature
      right: local_event
    - kind: fourier_terms
      period: 7
"#,
    )
    .unwrap();
    let reporter = MemoryReporter::new();

    let summary = features::run(&StageContext::new(&config, &store, &reporter)).unwrap();
    assert_eq!(summary.applied, vec!["sales_2day_avg", "is_weekend"]);

    let warnings = reporter.warnings();
    assert!(warnings.iter().any(|w| w.contains("fourier_terms")));
    assert!(
        warnings
            .iter()
            .any(|w| w.contains("temperature_local_event_interaction"))
    );

    let out = store.read_csv("train_fe.csv").unwrap();
    assert_eq!(
        numeric_values(&out, "is_weekend").unwrap(),
        vec![Some(0.0), Some(1.0), Some(1.0)]
    );
    assert_eq!(
        numeric_values(&out, "sales_2day_avg").unwrap(),
        vec![Some(1.0), Some(1.5), Some(2.5)]
    );
}

#[test]
fn test_summary_lists_skips_from_evaluation_data() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let train = df![
        "sales" => [1.0, 2.0, 3.0],
        "day_of_week" => [4i64, 5, 6],
        "temperature" => [20.0, 21.0, 22.0],
    ]
    .unwrap();
    let test = df!["sales" => [4.0, 5.0], "temperature" => [23.0, 24.0]].unwrap();
    store.write_csv("train.csv", &train).unwrap();
    store.write_csv("test.csv", &test).unwrap();

    let config = Config::from_yaml_str(
        "feature_engineering:\n  train_input_path: train.csv\n  test_input_path: test.csv\n  train_output_path: train_fe.csv\n  test_output_path: test_fe.csv\n",
    )
    .unwrap();
    let reporter = MemoryReporter::new();

    let summary = features::run(&StageContext::new(&config, &store, &reporter)).unwrap();
    assert_eq!(summary.applied, vec!["sales_7day_avg", "is_weekend"]);
    let skipped: Vec<&str> = summary.skipped.iter().map(|s| s.name.as_str()).collect();
    // the interaction is skipped on both sides but listed once
    assert_eq!(skipped, vec!["temp_event_interaction", "is_weekend"]);
    let test_out = store.read_csv("test_fe.csv").unwrap();
    assert!(test_out.column("is_weekend").is_err());
}
