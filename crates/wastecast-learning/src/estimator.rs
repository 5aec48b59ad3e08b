//! The uniform estimator interface.
//!
//! Every model family implements [`Regressor`]. Training and evaluation only
//! see `Box<dyn Regressor>`; the [`ModelRegistry`](crate::ModelRegistry)
//! decides which concrete type sits behind a family name.

use crate::error::{EstimatorError, EstimatorResult};
use crate::matrix::FeatureMatrix;
use serde_json::Value;
use std::fmt;

/// A regression model that can be fitted, queried and persisted.
///
/// Implementations must be `Send + Sync` so fitted models can be shared
/// across threads.
pub trait Regressor: Send + Sync + fmt::Debug {
    /// Fit the model on `features` (one row per sample) against `target`.
    ///
    /// Refitting replaces any previous fit.
    fn fit(&mut self, features: &FeatureMatrix, target: &[f64]) -> EstimatorResult<()>;

    /// Predict one value per feature row.
    ///
    /// # Errors
    ///
    /// - [`EstimatorError::NotFitted`] before a successful `fit`
    /// - [`EstimatorError::DimensionMismatch`] if the column count differs
    ///   from the one seen at fit time
    fn predict(&self, features: &FeatureMatrix) -> EstimatorResult<Vec<f64>>;

    /// Resolved hyperparameters, for the metadata sidecar.
    fn hyperparameters(&self) -> Value;

    /// Serialized fitted state. Fails with [`EstimatorError::NotFitted`]
    /// before `fit`.
    fn to_blob(&self) -> EstimatorResult<Value>;

    /// Whether `fit` has succeeded.
    fn is_fitted(&self) -> bool;
}

/// Reject training data no estimator can fit.
pub fn check_training_data(features: &FeatureMatrix, target: &[f64]) -> EstimatorResult<()> {
    if features.n_rows() != target.len() {
        return Err(EstimatorError::LengthMismatch {
            features: features.n_rows(),
            targets: target.len(),
        });
    }
    if target.is_empty() {
        return Err(EstimatorError::EmptyTrainingSet);
    }
    let bad_row = features
        .rows()
        .iter()
        .zip(target)
        .position(|(row, y)| !y.is_finite() || row.iter().any(|x| !x.is_finite()));
    match bad_row {
        Some(row) => Err(EstimatorError::NonFiniteValue { row }),
        None => Ok(()),
    }
}

/// Reject a prediction matrix whose width differs from the fitted one.
pub fn check_width(expected: usize, features: &FeatureMatrix) -> EstimatorResult<()> {
    if features.n_features() == expected {
        Ok(())
    } else {
        Err(EstimatorError::DimensionMismatch {
            expected,
            found: features.n_features(),
        })
    }
}

/// Arithmetic mean; `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let width = rows.first().map_or(0, Vec::len);
        let names = (0..width).map(|i| format!("x{}", i)).collect();
        FeatureMatrix::from_rows(names, rows).unwrap()
    }

    #[test]
    fn test_check_training_data() {
        let x = matrix(vec![vec![1.0], vec![2.0]]);
        assert!(check_training_data(&x, &[1.0, 2.0]).is_ok());
        assert_eq!(
            check_training_data(&x, &[1.0]),
            Err(EstimatorError::LengthMismatch {
                features: 2,
                targets: 1
            })
        );
        assert_eq!(
            check_training_data(&x, &[1.0, f64::NAN]),
            Err(EstimatorError::NonFiniteValue { row: 1 })
        );
        let empty = FeatureMatrix::from_rows(vec!["x0".to_string()], Vec::new()).unwrap();
        assert_eq!(
            check_training_data(&empty, &[]),
            Err(EstimatorError::EmptyTrainingSet)
        );
    }

    #[test]
    fn test_check_width() {
        let x = matrix(vec![vec![1.0, 2.0]]);
        assert!(check_width(2, &x).is_ok());
        assert!(check_width(3, &x).is_err());
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(mean(&[]), 0.0);
    }
}
