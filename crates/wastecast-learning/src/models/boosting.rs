//! Gradient boosted regression trees with squared-error loss.
//!
//! Starts from the training mean and adds `learning_rate` times a tree fitted
//! to the current residuals on every round.

use super::tree::{RegressionTree, TreeParams};
use super::{count_param, depth_param, rate_param, seed_param};
use crate::error::{EstimatorError, EstimatorResult};
use crate::estimator::{Regressor, check_training_data, check_width, mean};
use crate::matrix::FeatureMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wastecast_processing::{OwnedNode, Result};

/// Hyperparameters of [`GradientBoostedTrees`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Boosting rounds (default 100).
    pub n_estimators: usize,
    /// Shrinkage applied to every tree (default 0.1).
    pub learning_rate: f64,
    /// Depth limit per tree (default 6).
    pub max_depth: Option<usize>,
    /// Minimum samples to split a node (default 2).
    pub min_samples_split: usize,
    /// Fraction of rows drawn without replacement per round (default 1.0).
    pub subsample: f64,
    /// Seed of the row subsampling.
    pub random_state: u64,
}

impl BoostingParams {
    pub fn with_seed(random_state: u64) -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(6),
            min_samples_split: 2,
            subsample: 1.0,
            random_state,
        }
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: 1,
        }
    }

    fn validate(&self) -> EstimatorResult<()> {
        let invalid = |name: &str, reason: &str| EstimatorError::InvalidHyperparameter {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", "must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid("learning_rate", "must be a positive number"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(invalid("subsample", "must be in (0, 1]"));
        }
        if self.max_depth == Some(0) {
            return Err(invalid("max_depth", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BoostingState {
    n_features: usize,
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl BoostingState {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|tree| self.learning_rate * tree.predict_row(row))
                .sum::<f64>()
    }
}

/// Squared-error gradient boosting over CART trees; the `XGBRegressor`
/// family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    state: Option<BoostingState>,
}

impl GradientBoostedTrees {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            state: None,
        }
    }

    /// Read hyperparameters from a `models` entry; `seed` is the shared
    /// training seed.
    pub fn from_config(node: &OwnedNode<'_>, seed: u64) -> Result<Self> {
        let defaults = BoostingParams::with_seed(seed);
        Ok(Self::new(BoostingParams {
            n_estimators: count_param(node, "n_estimators", defaults.n_estimators, 1)?,
            learning_rate: rate_param(node, "learning_rate", defaults.learning_rate, 1.0)?,
            max_depth: depth_param(node, "max_depth", defaults.max_depth)?,
            min_samples_split: count_param(
                node,
                "min_samples_split",
                defaults.min_samples_split,
                2,
            )?,
            subsample: rate_param(node, "subsample", defaults.subsample, 1.0)?,
            random_state: seed_param(node, seed)?,
        }))
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    /// Number of fitted rounds; zero before `fit`.
    pub fn n_rounds(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.trees.len())
    }

    /// Restore from a blob written by [`Regressor::to_blob`].
    pub fn from_blob(blob: Value) -> EstimatorResult<Self> {
        let model: Self = serde_json::from_value(blob)?;
        let state = model.state.as_ref().ok_or(EstimatorError::NotFitted)?;
        for tree in &state.trees {
            tree.validate(state.n_features)?;
        }
        Ok(model)
    }
}

impl Regressor for GradientBoostedTrees {
    fn fit(&mut self, features: &FeatureMatrix, target: &[f64]) -> EstimatorResult<()> {
        self.params.validate()?;
        check_training_data(features, target)?;

        let n = features.n_rows();
        let tree_params = self.params.tree_params();
        let lr = self.params.learning_rate;
        let base_score = mean(target);
        let mut current = vec![base_score; n];
        let mut residuals = vec![0.0; n];

        let all: Vec<usize> = (0..n).collect();
        let sample_size = ((self.params.subsample * n as f64).round() as usize).clamp(1, n);
        let mut rng = StdRng::seed_from_u64(self.params.random_state);

        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for _ in 0..self.params.n_estimators {
            for ((r, y), f) in residuals.iter_mut().zip(target).zip(&current) {
                *r = y - f;
            }

            let tree = if sample_size < n {
                let mut sample: Vec<usize> =
                    all.choose_multiple(&mut rng, sample_size).copied().collect();
                sample.sort_unstable();
                RegressionTree::fit(features, &residuals, &sample, &tree_params)
            } else {
                RegressionTree::fit(features, &residuals, &all, &tree_params)
            };

            for (f, row) in current.iter_mut().zip(features.rows()) {
                *f += lr * tree.predict_row(row);
            }
            trees.push(tree);
        }

        self.state = Some(BoostingState {
            n_features: features.n_features(),
            base_score,
            learning_rate: lr,
            trees,
        });
        Ok(())
    }

    fn predict(&self, features: &FeatureMatrix) -> EstimatorResult<Vec<f64>> {
        let state = self.state.as_ref().ok_or(EstimatorError::NotFitted)?;
        check_width(state.n_features, features)?;
        Ok(features
            .rows()
            .iter()
            .map(|row| state.predict_row(row))
            .collect())
    }

    fn hyperparameters(&self) -> Value {
        serde_json::to_value(&self.params).unwrap_or_default()
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
