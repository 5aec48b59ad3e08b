//! wastecast-learning: model training and evaluation for the wastecast pipeline.
//!
//! This crate provides the two model-facing stages of the pipeline and the
//! native regressors they run. It builds on `wastecast_processing`: stages
//! receive the same [`StageContext`](wastecast_processing::StageContext) and
//! read and write exclusively through its
//! [`ArtifactStore`](wastecast_processing::ArtifactStore).
//!
//! # Features
//!
//! - **Uniform estimator interface**: every family implements [`Regressor`]
//! - **Explicit registry**: [`ModelRegistry`] maps family names to constructors
//! - **Native models**: least squares, random forest, gradient boosted trees
//!   and a mean baseline, all seeded and reproducible
//! - **Fail-fast training**: every family is fitted before any is persisted
//! - **Metrics report**: MAE, RMSE and R2 per family as JSON and plain text
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use wastecast_learning::{ModelRegistry, evaluation, training};
//! use wastecast_processing::{ArtifactStore, Config, StageContext, TracingReporter};
//!
//! let config = Config::from_path("params.yaml")?;
//! let store = ArtifactStore::new(".");
//! let ctx = StageContext::new(&config, &store, &TracingReporter);
//! let registry = ModelRegistry::with_defaults();
//!
//! let trained = training::run(&ctx, &registry)?;
//! println!("trained: {:?}, skipped: {:?}", trained.trained, trained.skipped);
//!
//! let evaluated = evaluation::run(&ctx, &registry)?;
//! print!("{}", evaluated.report.render_text());
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ training::run                                                    │
//! │   TrainingConfig ──► ModelRegistry::create ──► Regressor::fit    │
//! │                                   (all families, then persist)   │
//! └───────────────────────────┬──────────────────────────────────────┘
//!                             │ <family>.model + <family>.meta.json
//!                             ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ evaluation::run                                                  │
//! │   list_models ──► ModelRegistry::restore ──► Regressor::predict  │
//! │                                   ──► MetricsReport (written once)│
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Adding a Model Family
//!
//! Implement [`Regressor`], then register a factory and a restorer:
//!
//! ```rust,ignore
//! let mut registry = ModelRegistry::with_defaults();
//! registry.register(
//!     "Ridge",
//!     |node, seed| Ok(Box::new(Ridge::from_config(node, seed)?)),
//!     |blob| Ok(Box::new(Ridge::from_blob(blob)?)),
//! );
//! ```
//!
//! # Error Handling
//!
//! Stage functions return [`wastecast_processing::Result`]. Estimators return
//! [`EstimatorError`], which stages convert into
//! [`PipelineError::ModelFailed`](wastecast_processing::PipelineError::ModelFailed)
//! naming the family that failed.
//!
//! # Thread Safety
//!
//! [`Regressor`] requires `Send + Sync`, and [`ModelRegistry`] holds only
//! function pointers, so both can be shared across threads. Training itself
//! fits families one after another.

mod config;
mod error;
mod estimator;
pub mod evaluation;
mod matrix;
mod metrics;
pub mod models;
mod registry;
pub mod training;

// Re-export public API
//
// Configuration types
pub use config::{DEFAULT_RANDOM_STATE, EvaluationConfig, ModelSpec, TrainingConfig};
// Error types
pub use error::{EstimatorError, EstimatorResult};
// Estimator interface
pub use estimator::Regressor;
// Feature extraction
pub use matrix::{FeatureMatrix, default_feature_columns, target_vector};
// Metrics
pub use metrics::{MetricsReport, RegressionMetrics};
// Registry
pub use registry::{ModelFactory, ModelRegistry, ModelRestorer};
// Stage outcomes
pub use evaluation::EvaluationSummary;
pub use training::{FittedModel, TrainingSummary};

static_assertions::assert_impl_all!(models::RandomForest: Send, Sync);
static_assertions::assert_impl_all!(models::GradientBoostedTrees: Send, Sync);
static_assertions::assert_obj_safe!(Regressor);
