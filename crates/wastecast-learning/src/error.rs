//! Error types for the wastecast-learning crate.
//!
//! This module defines [`EstimatorError`], the error returned by the
//! [`Regressor`](crate::Regressor) interface. Stages never surface it directly:
//! they convert it with [`EstimatorError::for_family`] into a
//! [`PipelineError::ModelFailed`] that names the model family, so a failed
//! training or evaluation run always says which model broke.
//!
//! # Example
//!
//! ```
//! use wastecast_learning::EstimatorError;
//! use wastecast_processing::PipelineError;
//!
//! let err = EstimatorError::NotFitted.for_family("RandomForest");
//! assert!(matches!(err, PipelineError::ModelFailed { .. }));
//! assert!(err.to_string().contains("RandomForest"));
//! ```

use thiserror::Error;
use wastecast_processing::PipelineError;

/// Errors raised by an estimator while fitting, predicting or restoring.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// without breaking downstream code.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EstimatorError {
    /// `predict` or `to_blob` was called before `fit`.
    #[error("model has not been fitted")]
    NotFitted,

    /// The feature matrix has a different number of columns than the model
    /// was fitted with.
    #[error("expected {expected} feature column(s), found {found}")]
    DimensionMismatch {
        /// Columns seen at fit time.
        expected: usize,
        /// Columns passed now.
        found: usize,
    },

    /// `fit` was called with zero rows.
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,

    /// Feature rows and target values differ in count.
    #[error("{features} feature row(s) but {targets} target value(s)")]
    LengthMismatch {
        /// Number of feature rows.
        features: usize,
        /// Number of target values.
        targets: usize,
    },

    /// A feature or target value is NaN or infinite.
    #[error("non-finite value in training row {row}")]
    NonFiniteValue {
        /// Zero-based row position.
        row: usize,
    },

    /// A hyperparameter has an unusable value.
    ///
    /// Type errors are caught earlier by the configuration resolver; this
    /// covers values of the right type outside their valid range.
    #[error("invalid hyperparameter '{name}': {reason}")]
    InvalidHyperparameter {
        /// Hyperparameter name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A persisted model blob does not decode into this family's state.
    #[error("cannot restore model: {0}")]
    Restore(String),
}

impl EstimatorError {
    /// Convert into the pipeline error for a failing model family.
    #[must_use]
    pub fn for_family(self, family: &str) -> PipelineError {
        PipelineError::ModelFailed {
            family: family.to_string(),
            reason: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for EstimatorError {
    fn from(err: serde_json::Error) -> Self {
        EstimatorError::Restore(err.to_string())
    }
}

/// Result type alias for estimator operations.
pub type EstimatorResult<T> = std::result::Result<T, EstimatorError>;
