//! Constant predictor used as a reference point in the metrics report.

use crate::error::{EstimatorError, EstimatorResult};
use crate::estimator::{Regressor, check_training_data, check_width, mean};
use crate::matrix::FeatureMatrix;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use wastecast_processing::{OwnedNode, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BaselineState {
    n_features: usize,
    value: f64,
}

/// Predicts the training-set mean of the target for every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanBaseline {
    state: Option<BaselineState>,
}

impl MeanBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The baseline takes no hyperparameters.
    pub fn from_config(_node: &OwnedNode<'_>, _seed: u64) -> Result<Self> {
        Ok(Self::new())
    }

    /// The constant prediction, once fitted.
    pub fn value(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.value)
    }

    pub fn from_blob(blob: Value) -> EstimatorResult<Self> {
        let model: Self = serde_json::from_value(blob)?;
        if model.state.is_none() {
            return Err(EstimatorError::NotFitted);
        }
        Ok(model)
    }
}

impl Regressor for MeanBaseline {
    fn fit(&mut self, features: &FeatureMatrix, target: &[f64]) -> EstimatorResult<()> {
        check_training_data(features, target)?;
        self.state = Some(BaselineState {
            n_features: features.n_features(),
            value: mean(target),
        });
        Ok(())
    }

    fn predict(&self, features: &FeatureMatrix) -> EstimatorResult<Vec<f64>> {
        let state = self.state.as_ref().ok_or(EstimatorError::NotFitted)?;
        check_width(state.n_features, features)?;
        Ok(vec![state.value; features.n_rows()])
    }

    fn hyperparameters(&self) -> Value {
        json!({})
    }

    fn to_blob(&self) -> EstimatorResult<Value> {
        if self.state.is_none() {
            return Err(EstimatorError::NotFitted);
        }
        Ok(serde_json::to_value(self)?)
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}
