//! Resolved configuration of the training and evaluation stages.
//!
//! This module provides [`TrainingConfig`] (the `model_training` section) and
//! [`EvaluationConfig`] (the `model_evaluation` section). Both are resolved
//! from the loaded document before either stage reads an artifact, so a
//! missing path or a mistyped value fails the stage up front.
//!
//! # Example
//!
//! ```
//! use wastecast_learning::TrainingConfig;
//! use wastecast_processing::Config;
//!
//! let config = Config::from_yaml_str(
//!     r#"
//! base:
//!   target_column: food_waste
//!   random_state: 7
//! model_training:
//!   train_input_path: data/features/train.csv
//!   model_dir: models
//!   models:
//!     RandomForest:
//!       n_estimators: 50
//! "#,
//! )
//! .unwrap();
//!
//! let training = TrainingConfig::from_config(&config).unwrap();
//! assert_eq!(training.target_column, "food_waste");
//! assert_eq!(training.random_state, 7);
//! assert_eq!(training.models[0].name, "RandomForest");
//! ```

use std::path::PathBuf;
use wastecast_processing::config::BASE_SECTION;
use wastecast_processing::{Config, OwnedNode, PipelineError, PipelineStage, Result};

/// Seed used when neither `model_training.random_state` nor
/// `base.random_state` is set.
pub const DEFAULT_RANDOM_STATE: u64 = 42;

/// One entry of `model_training.models`.
#[derive(Debug, Clone)]
pub struct ModelSpec<'a> {
    /// Family name as written in the document.
    pub name: String,
    /// The entry's hyperparameter mapping (may be `null`).
    pub params: OwnedNode<'a>,
}

/// Resolved `model_training` section.
///
/// Borrows the document so each model's hyperparameters stay addressable by
/// their full dotted path in error messages.
#[derive(Debug, Clone)]
pub struct TrainingConfig<'a> {
    /// Feature-engineered training table.
    pub train_input_path: PathBuf,

    /// Directory receiving one blob and one sidecar per model family.
    pub model_dir: PathBuf,

    /// Column the models predict. Falls back to `base.target_column`.
    pub target_column: String,

    /// Feature columns in model order.
    ///
    /// If `None`, every column except the target is used, in table order.
    pub feature_columns: Option<Vec<String>>,

    /// Seed shared by all families that do not set their own (default: 42).
    pub random_state: u64,

    /// Configured families, in document order.
    pub models: Vec<ModelSpec<'a>>,
}

impl<'a> TrainingConfig<'a> {
    /// Resolve the `model_training` section of `config`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::ConfigMissingKey`] for an absent path, target or
    ///   `models` key
    /// - [`PipelineError::ConfigTypeMismatch`] for a value of the wrong type
    /// - [`PipelineError::InvalidConfig`] for an empty `feature_columns` list
    pub fn from_config(config: &'a Config) -> Result<Self> {
        let section = PipelineStage::Training.config_section();

        let feature_columns: Option<Vec<String>> =
            config.get_opt(&[section, "feature_columns"])?;
        if feature_columns.as_ref().is_some_and(Vec::is_empty) {
            return Err(PipelineError::InvalidConfig {
                path: format!("{}.feature_columns", section),
                reason: "must name at least one column".to_string(),
            });
        }

        let random_state = match config.get_opt(&[section, "random_state"])? {
            Some(seed) => seed,
            None => config
                .get_opt(&[BASE_SECTION, "random_state"])?
                .unwrap_or(DEFAULT_RANDOM_STATE),
        };

        let models = config
            .child(&[section, "models"])?
            .entries()?
            .into_iter()
            .map(|(name, params)| ModelSpec { name, params })
            .collect();

        Ok(Self {
            train_input_path: config.get(&[section, "train_input_path"])?,
            model_dir: config.get(&[section, "model_dir"])?,
            target_column: config.get_with_base(section, "target_column")?,
            feature_columns,
            random_state,
            models,
        })
    }

    /// Names of the configured families.
    #[must_use]
    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Resolved `model_evaluation` section.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    /// Feature-engineered evaluation table.
    pub test_input_path: PathBuf,

    /// Directory the training stage wrote models to.
    pub model_dir: PathBuf,

    /// Column compared against the predictions. Falls back to
    /// `base.target_column`.
    pub target_column: String,

    /// Destination of the JSON metrics report.
    pub metrics_path: PathBuf,

    /// Optional destination of the plain-text rendering.
    pub text_report_path: Option<PathBuf>,
}

impl EvaluationConfig {
    /// Resolve the `model_evaluation` section of `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let section = PipelineStage::Evaluation.config_section();
        Ok(Self {
            test_input_path: config.get(&[section, "test_input_path"])?,
            model_dir: config.get(&[section, "model_dir"])?,
            target_column: config.get_with_base(section, "target_column")?,
            metrics_path: config.get(&[section, "metrics_path"])?,
            text_report_path: config.get_opt(&[section, "text_report_path"])?,
        })
    }
}
