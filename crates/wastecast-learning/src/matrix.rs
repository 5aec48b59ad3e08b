//! Dense feature matrices extracted from stage tables.
//!
//! Estimators work on plain `f64` rows. [`FeatureMatrix::from_frame`] pulls the
//! named columns out of a `DataFrame` in the given order and rejects anything
//! an estimator cannot consume: absent columns, non-numeric columns and
//! missing values.

use crate::error::{EstimatorError, EstimatorResult};
use polars::prelude::DataFrame;
use wastecast_processing::utils::{column_names, numeric_values, require_columns};
use wastecast_processing::{PipelineError, Result};

/// Row-major matrix of feature values with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Build from named columns and rows. Every row must have one value per
    /// name.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<f64>>) -> EstimatorResult<Self> {
        if let Some(bad) = rows.iter().find(|row| row.len() != names.len()) {
            return Err(EstimatorError::DimensionMismatch {
                expected: names.len(),
                found: bad.len(),
            });
        }
        Ok(Self { names, rows })
    }

    /// Extract `names` from `df`, in that order.
    pub fn from_frame(df: &DataFrame, names: &[String]) -> Result<Self> {
        require_columns(df, names, "feature")?;

        let mut rows = vec![Vec::with_capacity(names.len()); df.height()];
        for name in names {
            for (row, value) in rows.iter_mut().zip(complete_column(df, name)?) {
                row.push(value);
            }
        }
        Ok(Self {
            names: names.to_vec(),
            rows,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.rows[idx]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Value at `(row, feature)`.
    #[inline]
    pub fn get(&self, row: usize, feature: usize) -> f64 {
        self.rows[row][feature]
    }

    /// Per-feature means.
    pub fn column_means(&self) -> Vec<f64> {
        let mut means = vec![0.0; self.n_features()];
        if self.rows.is_empty() {
            return means;
        }
        for row in &self.rows {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value;
            }
        }
        let n = self.rows.len() as f64;
        means.iter_mut().for_each(|mean| *mean /= n);
        means
    }
}

/// Read the target column as a complete numeric vector.
pub fn target_vector(df: &DataFrame, column: &str) -> Result<Vec<f64>> {
    require_columns(df, &[column.to_string()], "target")?;
    complete_column(df, column)
}

/// All columns except the target, in dataset order.
pub fn default_feature_columns(df: &DataFrame, target: &str) -> Vec<String> {
    column_names(df)
        .into_iter()
        .filter(|name| name != target)
        .collect()
}

fn complete_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let values = numeric_values(df, name)?;
    let missing = values.iter().filter(|v| v.is_none()).count();
    if missing > 0 {
        return Err(PipelineError::SchemaViolation(format!(
            "column '{}' has {} missing value(s)",
            name, missing
        )));
    }
    Ok(values.into_iter().flatten().collect())
}
