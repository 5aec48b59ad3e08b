//! Data side of the wastecast forecasting pipeline.
//!
//! A food-waste forecasting pipeline built with Rust and Polars, split into
//! independently invokable stages that only communicate through persisted
//! artifacts.
//!
//! # Overview
//!
//! This crate provides:
//!
//! - **Configuration**: typed, path-addressed access to the pipeline document
//! - **Artifact Store**: atomic CSV/JSON/model persistence under a workspace root
//! - **Ingestion**: seeded, reproducible train/evaluation split
//! - **Preprocessing**: forward fill, duplicate removal, train-fitted categorical encoding
//! - **Feature Engineering**: rolling means, weekend flags and interaction terms
//! - **Stage Reporting**: events routed through an injected [`StageReporter`]
//!
//! Training and evaluation live in the `wastecast_learning` crate and use the
//! same [`StageContext`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use wastecast_processing::{ArtifactStore, Config, StageContext, TracingReporter};
//! use wastecast_processing::{features, ingestion, preprocessing};
//!
//! let config = Config::from_path("params.yaml")?;
//! let store = ArtifactStore::new(".");
//! let reporter = TracingReporter;
//! let ctx = StageContext::new(&config, &store, &reporter);
//!
//! let split = ingestion::run(&ctx)?;
//! println!("{} training rows, {} evaluation rows", split.train_rows, split.test_rows);
//!
//! preprocessing::run(&ctx)?;
//! features::run(&ctx)?;
//! ```
//!
//! # Stage Events
//!
//! Stages never log through a global. Tests inject a [`MemoryReporter`] and
//! assert on the warnings a stage produced:
//!
//! ```rust,ignore
//! let reporter = MemoryReporter::new();
//! let ctx = StageContext::new(&config, &store, &reporter);
//! features::run(&ctx)?;
//! assert!(reporter.warnings().iter().any(|w| w.contains("is_weekend")));
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod ingestion;
pub mod pipeline;
pub mod preprocessing;
pub mod store;
pub mod utils;

// Re-exports for convenient access
pub use config::{Config, ConfigNode, FromConfigValue, OwnedNode, ScalarText};
pub use error::{PipelineError, Result, ResultExt};
pub use features::{Derivation, FeatureConfig, FeatureSummary};
pub use ingestion::{IngestionConfig, IngestionSummary, SplitPartition};
pub use pipeline::{
    ClosureReporter, EventLevel, MemoryReporter, PipelineStage, StageContext, StageEvent,
    StageReporter, TracingReporter,
};
pub use preprocessing::{CategoricalEncoder, PreprocessingConfig, PreprocessingSummary};
pub use store::{ArtifactStore, ModelArtifact, ModelMetadata};
pub use utils::{ColumnKind, is_numeric_dtype};

static_assertions::assert_impl_all!(ArtifactStore: Send, Sync, Clone);
static_assertions::assert_impl_all!(Config: Send, Sync, Clone);
