//! Concrete model families.
//!
//! | family | type | notes |
//! |--------|------|-------|
//! | `LinearRegression` | [`LinearRegression`] | least squares with intercept |
//! | `RandomForest` | [`RandomForest`] | bagged regression trees |
//! | `XGBRegressor` | [`GradientBoostedTrees`] | squared-error gradient boosting |
//! | `MeanBaseline` | [`MeanBaseline`] | predicts the training mean |
//!
//! Each family reads its hyperparameters from its entry under
//! `model_training.models` with `from_config`; absent keys take the defaults
//! documented on the params struct.

mod baseline;
mod boosting;
mod forest;
mod linear;
pub mod tree;

pub use baseline::MeanBaseline;
pub use boosting::{BoostingParams, GradientBoostedTrees};
pub use forest::{ForestParams, RandomForest};
pub use linear::{LinearParams, LinearRegression};
pub use tree::{RegressionTree, TreeParams};

use wastecast_processing::{OwnedNode, PipelineError, Result};

/// Hyperparameter key holding a per-family seed override.
pub const SEED_KEY: &str = "random_state";

/// An integer hyperparameter that must be at least `min`.
pub(crate) fn count_param(
    node: &OwnedNode<'_>,
    key: &str,
    default: usize,
    min: usize,
) -> Result<usize> {
    let value = node.get_or(&[key], default)?;
    if value < min {
        return Err(invalid(node, key, format!("must be at least {}, got {}", min, value)));
    }
    Ok(value)
}

/// An optional depth limit. Absent or `null` takes `default`.
pub(crate) fn depth_param(
    node: &OwnedNode<'_>,
    key: &str,
    default: Option<usize>,
) -> Result<Option<usize>> {
    match node.get_opt::<usize>(&[key])? {
        Some(0) => Err(invalid(node, key, "must be at least 1".to_string())),
        Some(depth) => Ok(Some(depth)),
        None => Ok(default),
    }
}

/// A float hyperparameter in `(0, max]`.
pub(crate) fn rate_param(node: &OwnedNode<'_>, key: &str, default: f64, max: f64) -> Result<f64> {
    let value: f64 = node.get_or(&[key], default)?;
    if !(value > 0.0 && value <= max) {
        return Err(invalid(node, key, format!("must be in (0, {}], got {}", max, value)));
    }
    Ok(value)
}

/// The family's seed, falling back to the shared training seed.
pub(crate) fn seed_param(node: &OwnedNode<'_>, shared_seed: u64) -> Result<u64> {
    node.get_or(&[SEED_KEY], shared_seed)
}

fn invalid(node: &OwnedNode<'_>, key: &str, reason: String) -> PipelineError {
    PipelineError::InvalidConfig {
        path: format!("{}.{}", node.path(), key),
        reason,
    }
}
