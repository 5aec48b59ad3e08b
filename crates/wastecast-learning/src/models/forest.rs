//! Random forest: an average of regression trees grown on bootstrap samples.

use super::tree::{RegressionTree, TreeParams};
use super::{count_param, depth_param, seed_param};
use crate::error::{EstimatorError, EstimatorResult};
use crate::estimator::{Regressor, check_training_data, check_width};
use crate::matrix::FeatureMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wastecast_processing::{OwnedNode, Result};

/// Hyperparameters of [`RandomForest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees (default 100).
    pub n_estimators: usize,
    /// Depth limit per tree (default none).
    pub max_depth: Option<usize>,
    /// Minimum samples to split a node (default 2).
    pub min_samples_split: usize,
    /// Minimum samples per leaf (default 1).
    pub min_samples_leaf: usize,
    /// Grow each tree on a bootstrap sample (default `true`).
    pub bootstrap: bool,
    /// Seed of the bootstrap draws.
    pub random_state: u64,
}

impl ForestParams {
    /// Defaults with the given seed.
    pub fn with_seed(random_state: u64) -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            random_state,
        }
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }

    fn validate(&self) -> EstimatorResult<()> {
        if self.n_estimators == 0 {
            return Err(EstimatorError::InvalidHyperparameter {
                name: "n_estimators".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_depth == Some(0) {
            return Err(EstimatorError::InvalidHyperparameter {
                name: "max_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ForestState {
    n_features: usize,
    trees: Vec<RegressionTree>,
}

/// Bagged ensemble of CART regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    state: Option<ForestState>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            state: None,
        }
    }

    /// Read hyperparameters from a `models` entry; `seed` is the shared
    /// training seed.
    pub fn from_config(node: &OwnedNode<'_>, seed: u64) -> Result<Self> {
        let defaults = ForestParams::with_seed(seed);
        Ok(Self::new(ForestParams {
            n_estimators: count_param(node, "n_estimators", defaults.n_estimators, 1)?,
            max_depth: depth_param(node, "max_depth", defaults.max_depth)?,
            min_samples_split: count_param(
                node,
                "min_samples_split",
                defaults.min_samples_split,
                2,
            )?,
            min_samples_leaf: count_param(node, "min_samples_leaf", defaults.min_samples_leaf, 1)?,
            bootstrap: node.get_or(&["bootstrap"], defaults.bootstrap)?,
            random_state: seed_param(node, seed)?,
        }))
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Fitted trees; empty before `fit`.
    pub fn trees(&self) -> &[RegressionTree] {
        self.state.as_ref().map_or(&[], |s| s.trees.as_slice())
    }

    /// Restore from a blob written by [`Regressor::to_blob`].
    pub fn from_blob(blob: Value) -> EstimatorResult<Self> {
        let model: Self = serde_json::from_value(blob)?;
        let state = model.state.as_ref().ok_or(EstimatorError::NotFitted)?;
        if state.trees.is_empty() {
            return Err(EstimatorError::Restore("forest has no trees".to_string()));
        }
        for tree in &state.trees {
            tree.validate(state.n_features)?;
        }
        Ok(model)
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, features: &FeatureMatrix, target: &[f64]) -> EstimatorResult<()> {
        self.params.validate()?;
        check_training_data(features, target)?;

        let n = features.n_rows();
        let tree_params = self.params.tree_params();
        let mut rng = StdRng::seed_from_u64(self.params.random_state);
        let all: Vec<usize> = (0..n).collect();

        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for _ in 0..self.params.n_estimators {
            let tree = if self.params.bootstrap {
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(features, target, &sample, &tree_params)
            } else {
                RegressionTree::fit(features, target, &all, &tree_params)
            };
            trees.push(tree);
        }

        self.state = Some(ForestState {
            n_features: features.n_features(),
            trees,
        });
        Ok(())
    }

    fn predict(&self, features: &FeatureMatrix) -> EstimatorResult<Vec<f64>> {
        let state = self.state.as_ref().ok_or(EstimatorError::NotFitted)?;
        check_width(state.n_features, features)?;
        let n_trees = state.trees.len() as f64;
        Ok(features
            .rows()
            .iter()
            .map(|row| {
                state
                    .trees
                    .iter()
                    .map(|tree| tree.predict_row(row))
                    .sum::<f64>()
                    / n_trees
            })
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
