//! Ingestion stage: load the raw dataset and split it into training and
//! evaluation subsets.
//!
//! The split is a seeded permutation of row positions. The same dataset, seed
//! and fraction always produce the same two files.

use crate::config::{Config, validate_fraction};
use crate::error::{PipelineError, Result};
use crate::pipeline::{PipelineStage, StageContext};
use crate::utils::take_rows;
use polars::prelude::DataFrame;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::path::PathBuf;

const STAGE: PipelineStage = PipelineStage::Ingestion;

/// Resolved `data_ingestion` section.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionConfig {
    pub input_path: PathBuf,
    pub output_train_path: PathBuf,
    pub output_test_path: PathBuf,
    /// Fraction of rows held out for evaluation, in (0, 1)
    pub test_size: f64,
    /// Seed of the row permutation
    pub random_state: u64,
}

impl IngestionConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        let section = STAGE.config_section();
        let test_size = config.get(&[section, "test_size"])?;
        Ok(Self {
            input_path: config.get(&[section, "input_path"])?,
            output_train_path: config.get(&[section, "output_train_path"])?,
            output_test_path: config.get(&[section, "output_test_path"])?,
            test_size: validate_fraction(&format!("{}.test_size", section), test_size)?,
            random_state: config.get_with_base(section, "random_state")?,
        })
    }
}

/// Row positions of each side of a split, in permutation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPartition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Partition `0..n_rows` with a permutation seeded by `seed`.
///
/// The evaluation side gets `round(test_size * n_rows)` rows, the training side
/// the rest. Both sides must be non-empty.
pub fn split_indices(n_rows: usize, test_size: f64, seed: u64) -> Result<SplitPartition> {
    let n_test = (test_size * n_rows as f64).round() as usize;
    let n_train = n_rows.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(PipelineError::InsufficientRows(format!(
            "splitting {} rows with test_size {} leaves {} training and {} evaluation rows",
            n_rows, test_size, n_train, n_test
        )));
    }

    let mut order: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let test = order.split_off(n_train);
    Ok(SplitPartition { train: order, test })
}

/// Split a dataset into `(train, test)` frames.
pub fn split_dataset(df: &DataFrame, test_size: f64, seed: u64) -> Result<(DataFrame, DataFrame)> {
    let partition = split_indices(df.height(), test_size, seed)?;
    Ok((
        take_rows(df, &partition.train)?,
        take_rows(df, &partition.test)?,
    ))
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionSummary {
    pub total_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
}

/// Run the ingestion stage.
pub fn run(ctx: &StageContext<'_>) -> Result<IngestionSummary> {
    ctx.run_stage(STAGE, |ctx| {
        let cfg = IngestionConfig::from_config(ctx.config)?;

        let df = ctx.store.read_csv(&cfg.input_path)?;
        ctx.info(
            STAGE,
            format!(
                "Loaded {} rows x {} columns from {}",
                df.height(),
                df.width(),
                cfg.input_path.display()
            ),
        );

        let (train, test) = split_dataset(&df, cfg.test_size, cfg.random_state)?;
        let train_path = ctx.store.write_csv(&cfg.output_train_path, &train)?;
        let test_path = ctx.store.write_csv(&cfg.output_test_path, &test)?;
        ctx.info(
            STAGE,
            format!(
                "Split into {} training and {} evaluation rows (seed {})",
                train.height(),
                test.height(),
                cfg.random_state
            ),
        );

        Ok(IngestionSummary {
            total_rows: df.height(),
            train_rows: train.height(),
            test_rows: test.height(),
            train_path,
            test_path,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::utils::numeric_values;
    use polars::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_split_sizes_and_disjointness() {
        let partition = split_indices(10, 0.2, 42).unwrap();
        assert_eq!(partition.train.len(), 8);
        assert_eq!(partition.test.len(), 2);

        let train: HashSet<usize> = partition.train.iter().copied().collect();
        let test: HashSet<usize> = partition.test.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), 10);
    }

    #[test]
    fn test_split_is_deterministic() {
        assert_eq!(
            split_indices(100, 0.25, 7).unwrap(),
            split_indices(100, 0.25, 7).unwrap()
        );
        assert_ne!(
            split_indices(100, 0.25, 7).unwrap(),
            split_indices(100, 0.25, 8).unwrap()
        );
    }

    #[test]
    fn test_split_rounds_evaluation_side() {
        // 0.25 * 7 = 1.75
        let partition = split_indices(7, 0.25, 1).unwrap();
        assert_eq!(partition.test.len(), 2);
        assert_eq!(partition.train.len(), 5);
    }

    #[test]
    fn test_split_rejects_empty_side() {
        assert!(matches!(
            split_indices(3, 0.1, 42),
            Err(PipelineError::InsufficientRows(_))
        ));
        assert!(matches!(
            split_indices(0, 0.5, 42),
            Err(PipelineError::InsufficientRows(_))
        ));
    }

    #[test]
    fn test_split_dataset_follows_permutation() {
        let df = df!["id" => (0i64..10).collect::<Vec<_>>()].unwrap();
        let partition = split_indices(10, 0.3, 5).unwrap();
        let (train, test) = split_dataset(&df, 0.3, 5).unwrap();

        let expected: Vec<Option<f64>> = partition
            .train
            .iter()
            .map(|&i| Some(i as f64))
            .collect();
        assert_eq!(numeric_values(&train, "id").unwrap(), expected);
        assert_eq!(test.height(), 3);
    }

    #[test]
    fn test_config_falls_back_to_base_seed() {
        let config = Config::from_yaml_str(
            r#"
base:
  random_state: 11
data_ingestion:
  input_path: data/raw/waste.csv
  output_train_path: data/processed/train.csv
  output_test_path: data/processed/test.csv
  test_size: 0.2
"#,
        )
        .unwrap();
        let cfg = IngestionConfig::from_config(&config).unwrap();
        assert_eq!(cfg.random_state, 11);
        assert_eq!(cfg.test_size, 0.2);
    }

    #[test]
    fn test_config_rejects_bad_fraction() {
        let config = Config::from_yaml_str(
            r#"
data_ingestion:
  input_path: a.csv
  output_train_path: b.csv
  output_test_path: c.csv
  test_size: 1.5
  random_state: 1
"#,
        )
        .unwrap();
        let err = IngestionConfig::from_config(&config).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { .. }));
    }
}
