//! Preprocessing stage: fill gaps, drop duplicates, encode categories.
//!
//! Both datasets are cleaned the same way. The categorical encoding is fitted
//! on the training dataset only, persisted next to the outputs, and applied
//! unchanged to the evaluation dataset, so a category always maps to the same
//! code on both sides. A category the training data never showed is an
//! [`PipelineError::UnknownCategory`].

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::pipeline::{PipelineStage, StageContext};
use crate::utils::{column_names, has_column, labels_match, text_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

const STAGE: PipelineStage = PipelineStage::Preprocessing;

/// Resolved `data_preprocessing` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    pub train_input_path: PathBuf,
    pub test_input_path: PathBuf,
    pub train_output_path: PathBuf,
    pub test_output_path: PathBuf,
    /// Where the fitted categorical encoding is persisted
    pub encodings_path: PathBuf,
    pub categorical_columns: Vec<String>,
    pub drop_duplicates: bool,
    /// Columns that must exist and be gap-free after cleaning
    pub required_columns: Vec<String>,
}

impl PreprocessingConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        let section = STAGE.config_section();
        Ok(Self {
            train_input_path: config.get(&[section, "train_input_path"])?,
            test_input_path: config.get(&[section, "test_input_path"])?,
            train_output_path: config.get(&[section, "train_output_path"])?,
            test_output_path: config.get(&[section, "test_output_path"])?,
            encodings_path: config.get(&[section, "encodings_path"])?,
            categorical_columns: config.get_or(&[section, "categorical_columns"], Vec::new())?,
            drop_duplicates: config.get_or(&[section, "drop_duplicates"], false)?,
            required_columns: config.get_or(&[section, "required_columns"], Vec::new())?,
        })
    }
}

// =============================================================================
// Cleaning
// =============================================================================

/// Replace each missing value with the last preceding non-missing value in its
/// column. Leading gaps stay missing.
pub fn forward_fill(df: &DataFrame) -> Result<DataFrame> {
    let mut df = df.clone();
    for name in column_names(&df) {
        let series = df.column(&name)?.as_materialized_series();
        if series.null_count() == 0 {
            continue;
        }
        let filled = series.fill_null(FillNullStrategy::Forward(None))?;
        df.replace(&name, filled)?;
    }
    Ok(df)
}

/// Drop rows identical to an earlier row, keeping first occurrences in order.
///
/// Returns the deduplicated dataset and the number of rows removed.
pub fn drop_duplicate_rows(df: &DataFrame) -> Result<(DataFrame, usize)> {
    let deduped = df.unique_stable(None, UniqueKeepStrategy::First, None)?;
    let removed = df.height() - deduped.height();
    Ok((deduped, removed))
}

/// Fail unless every required column exists and has no missing values.
pub fn check_required_columns(df: &DataFrame, required: &[String]) -> Result<()> {
    for name in required {
        if !has_column(df, name) {
            return Err(PipelineError::SchemaViolation(format!(
                "required column '{}' not found",
                name
            )));
        }
        let nulls = df.column(name)?.null_count();
        if nulls > 0 {
            return Err(PipelineError::SchemaViolation(format!(
                "required column '{}' still has {} missing value(s) after forward fill",
                name, nulls
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Categorical Encoding
// =============================================================================

/// Category labels of one column, in first-seen order. A label's position is
/// its code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnEncoding {
    pub column: String,
    pub categories: Vec<String>,
}

impl ColumnEncoding {
    /// Code of `label`, if it was seen at fit time.
    pub fn code(&self, label: &str) -> Option<i64> {
        self.categories
            .iter()
            .position(|known| known == label)
            .or_else(|| {
                self.categories
                    .iter()
                    .position(|known| labels_match(known, label))
            })
            .map(|idx| idx as i64)
    }
}

/// Label-to-code mapping for a set of categorical columns, fitted once on the
/// training dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub columns: Vec<ColumnEncoding>,
}

impl CategoricalEncoder {
    /// Learn codes `0..k` for each column from the order values first appear.
    pub fn fit(df: &DataFrame, columns: &[String]) -> Result<Self> {
        let mut encodings = Vec::with_capacity(columns.len());
        for column in columns {
            let labels = categorical_labels(df, column)?;
            let mut seen = HashSet::new();
            let categories: Vec<String> = labels
                .into_iter()
                .flatten()
                .filter(|label| seen.insert(label.clone()))
                .collect();
            encodings.push(ColumnEncoding {
                column: column.clone(),
                categories,
            });
        }
        Ok(Self { columns: encodings })
    }

    /// Replace each encoded column with its `Int64` codes. Missing values stay
    /// missing.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut df = df.clone();
        for encoding in &self.columns {
            let labels = categorical_labels(&df, &encoding.column)?;
            let mut cache: HashMap<String, i64> = HashMap::new();
            let mut codes: Vec<Option<i64>> = Vec::with_capacity(labels.len());
            for label in labels {
                let Some(label) = label else {
                    codes.push(None);
                    continue;
                };
                let code = match cache.get(&label) {
                    Some(code) => *code,
                    None => {
                        let code = encoding.code(&label).ok_or_else(|| {
                            PipelineError::UnknownCategory {
                                column: encoding.column.clone(),
                                value: label.clone(),
                            }
                        })?;
                        cache.insert(label, code);
                        code
                    }
                };
                codes.push(Some(code));
            }
            let series = Series::new(encoding.column.as_str().into(), codes);
            df.replace(&encoding.column, series)?;
        }
        Ok(df)
    }

    /// Fitted encoding of `column`, if it is encoded.
    pub fn encoding(&self, column: &str) -> Option<&ColumnEncoding> {
        self.columns.iter().find(|encoding| encoding.column == column)
    }
}

fn categorical_labels(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    if !has_column(df, column) {
        return Err(PipelineError::SchemaViolation(format!(
            "categorical column '{}' not found",
            column
        )));
    }
    text_values(df, column)
}

// =============================================================================
// Stage
// =============================================================================

/// Result of cleaning one dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanSummary {
    pub rows_in: usize,
    pub rows_out: usize,
    /// Missing values that forward fill resolved
    pub filled: usize,
    pub duplicates_removed: usize,
}

/// Forward fill, then optionally drop duplicate rows.
pub fn clean(df: &DataFrame, drop_duplicates: bool) -> Result<(DataFrame, CleanSummary)> {
    let nulls_before = total_nulls(df);
    let filled = forward_fill(df)?;
    let nulls_after = total_nulls(&filled);

    let (cleaned, duplicates_removed) = if drop_duplicates {
        drop_duplicate_rows(&filled)?
    } else {
        (filled, 0)
    };

    let summary = CleanSummary {
        rows_in: df.height(),
        rows_out: cleaned.height(),
        filled: nulls_before - nulls_after,
        duplicates_removed,
    };
    Ok((cleaned, summary))
}

fn total_nulls(df: &DataFrame) -> usize {
    df.get_columns().iter().map(|col| col.null_count()).sum()
}

/// Outcome of a preprocessing run.
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingSummary {
    pub train: CleanSummary,
    pub test: CleanSummary,
    pub encoded_columns: Vec<String>,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub encodings_path: PathBuf,
}

/// Run the preprocessing stage.
pub fn run(ctx: &StageContext<'_>) -> Result<PreprocessingSummary> {
    ctx.run_stage(STAGE, |ctx| {
        let cfg = PreprocessingConfig::from_config(ctx.config)?;

        let train = ctx.store.read_csv(&cfg.train_input_path)?;
        let test = ctx.store.read_csv(&cfg.test_input_path)?;

        let (train, train_summary) = clean(&train, cfg.drop_duplicates)?;
        let (test, test_summary) = clean(&test, cfg.drop_duplicates)?;
        for (side, summary) in [("training", &train_summary), ("evaluation", &test_summary)] {
            ctx.info(
                STAGE,
                format!(
                    "Cleaned {} data: {} values forward-filled, {} duplicate rows removed, {} rows remain",
                    side, summary.filled, summary.duplicates_removed, summary.rows_out
                ),
            );
        }

        let encoder = CategoricalEncoder::fit(&train, &cfg.categorical_columns)?;
        for encoding in &encoder.columns {
            ctx.debug(
                STAGE,
                format!(
                    "Encoded '{}' with {} categories",
                    encoding.column,
                    encoding.categories.len()
                ),
            );
        }
        let train = encoder.transform(&train)?;
        let test = encoder.transform(&test)?;

        check_required_columns(&train, &cfg.required_columns)?;
        check_required_columns(&test, &cfg.required_columns)?;

        let encodings_path = ctx.store.write_json(&cfg.encodings_path, &encoder)?;
        let train_path = ctx.store.write_csv(&cfg.train_output_path, &train)?;
        let test_path = ctx.store.write_csv(&cfg.test_output_path, &test)?;

        Ok(PreprocessingSummary {
            train: train_summary,
            test: test_summary,
            encoded_columns: cfg.categorical_columns.clone(),
            train_path,
            test_path,
            encodings_path,
        })
    })
}
