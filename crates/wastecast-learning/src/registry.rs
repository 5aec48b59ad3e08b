//! Model registry: family names mapped to constructors.
//!
//! The registry is the only place that knows which concrete [`Regressor`]
//! backs a family name. Training asks it to [`create`](ModelRegistry::create)
//! an unfitted estimator from a configuration entry; evaluation asks it to
//! [`restore`](ModelRegistry::restore) a fitted one from a persisted blob.
//! Names the registry does not know are the caller's to handle: training skips
//! them with a warning, evaluation fails with
//! [`PipelineError::UnknownModelFamily`].
//!
//! # Example
//!
//! ```
//! use wastecast_learning::ModelRegistry;
//!
//! let registry = ModelRegistry::with_defaults();
//! assert!(registry.contains("RandomForest"));
//! assert!(registry.contains("GradientBoosting"));
//! assert!(!registry.contains("SVR"));
//! ```

use crate::error::EstimatorResult;
use crate::estimator::Regressor;
use crate::models::{GradientBoostedTrees, LinearRegression, MeanBaseline, RandomForest};
use serde_json::Value;
use std::collections::BTreeMap;
use wastecast_processing::config::value_kind;
use wastecast_processing::{OwnedNode, PipelineError, Result};

/// Builds an unfitted estimator from its configuration entry and the shared
/// training seed.
pub type ModelFactory = fn(&OwnedNode<'_>, u64) -> Result<Box<dyn Regressor>>;

/// Rebuilds a fitted estimator from its persisted blob.
pub type ModelRestorer = fn(Value) -> EstimatorResult<Box<dyn Regressor>>;

#[derive(Clone, Copy)]
struct Entry {
    factory: ModelFactory,
    restorer: ModelRestorer,
}

/// Mapping from model-family name to constructor and restorer.
///
/// Names are matched exactly. Iteration order is alphabetical.
#[derive(Clone)]
pub struct ModelRegistry {
    entries: BTreeMap<String, Entry>,
}

impl ModelRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The built-in families.
    ///
    /// | name | estimator |
    /// |------|-----------|
    /// | `LinearRegression` | [`LinearRegression`] |
    /// | `RandomForest` | [`RandomForest`] |
    /// | `XGBRegressor`, `GradientBoosting` | [`GradientBoostedTrees`] |
    /// | `MeanBaseline` | [`MeanBaseline`] |
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "LinearRegression",
            |node, seed| Ok(Box::new(LinearRegression::from_config(node, seed)?)),
            |blob| Ok(Box::new(LinearRegression::from_blob(blob)?)),
        );
        registry.register(
            "RandomForest",
            |node, seed| Ok(Box::new(RandomForest::from_config(node, seed)?)),
            |blob| Ok(Box::new(RandomForest::from_blob(blob)?)),
        );
        for name in ["XGBRegressor", "GradientBoosting"] {
            registry.register(
                name,
                |node, seed| Ok(Box::new(GradientBoostedTrees::from_config(node, seed)?)),
                |blob| Ok(Box::new(GradientBoostedTrees::from_blob(blob)?)),
            );
        }
        registry.register(
            "MeanBaseline",
            |node, seed| Ok(Box::new(MeanBaseline::from_config(node, seed)?)),
            |blob| Ok(Box::new(MeanBaseline::from_blob(blob)?)),
        );
        registry
    }

    /// Add or replace a family.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: ModelFactory,
        restorer: ModelRestorer,
    ) -> &mut Self {
        self.entries
            .insert(name.into(), Entry { factory, restorer });
        self
    }

    /// Whether `name` is a registered family.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered family names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Build an unfitted estimator for `name` from its configuration entry.
    ///
    /// The entry must be a mapping of hyperparameters or `null` (all
    /// defaults).
    ///
    /// # Errors
    ///
    /// - [`PipelineError::UnknownModelFamily`] if `name` is not registered
    /// - [`PipelineError::ConfigTypeMismatch`] if the entry is not a mapping
    /// - whatever the family's hyperparameter validation raises
    pub fn create(&self, name: &str, node: &OwnedNode<'_>, seed: u64) -> Result<Box<dyn Regressor>> {
        let entry = self.lookup(name)?;
        match node.value() {
            Value::Null | Value::Object(_) => (entry.factory)(node, seed),
            other => Err(PipelineError::ConfigTypeMismatch {
                path: node.path().to_string(),
                expected: "a mapping of hyperparameters",
                found: value_kind(other),
            }),
        }
    }

    /// Rebuild a fitted estimator for `name` from its persisted blob.
    ///
    /// A blob that does not decode is reported as
    /// [`PipelineError::ModelFailed`] for that family.
    pub fn restore(&self, name: &str, blob: Value) -> Result<Box<dyn Regressor>> {
        let entry = self.lookup(name)?;
        (entry.restorer)(blob).map_err(|e| e.for_family(name))
    }

    fn lookup(&self, name: &str) -> Result<&Entry> {
        self.entries
            .get(name)
            .ok_or_else(|| PipelineError::UnknownModelFamily(name.to_string()))
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("families", &self.names())
            .finish()
    }
}

static_assertions::assert_impl_all!(ModelRegistry: Send, Sync);
