//! Training stage: fit every configured model family and persist it.
//!
//! Families the registry does not know are skipped with a warning. All
//! recognised families are fitted before anything is written; the first
//! failure aborts the run with [`PipelineError::ModelFailed`] and leaves the
//! model directory untouched. A successful run replaces the directory's
//! models wholesale: families not trained this time are removed.

use crate::config::TrainingConfig;
use crate::estimator::Regressor;
use crate::matrix::{FeatureMatrix, default_feature_columns, target_vector};
use crate::registry::ModelRegistry;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;
use wastecast_processing::{
    ModelArtifact, ModelMetadata, PipelineError, PipelineStage, Result, ResultExt, StageContext,
};

const STAGE: PipelineStage = PipelineStage::Training;

/// A fitted estimator with the family it was built for.
#[derive(Debug)]
pub struct FittedModel {
    pub family: String,
    pub model: Box<dyn Regressor>,
}

/// Outcome of a training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    /// Families fitted and persisted, in configuration order.
    pub trained: Vec<String>,
    /// Configured families the registry does not know.
    pub skipped: Vec<String>,
    /// Feature columns every model was fitted on.
    pub feature_names: Vec<String>,
    pub training_rows: usize,
    pub model_dir: PathBuf,
}

/// Feature columns for `df`: the configured list, or every column except the
/// target.
pub fn select_features(cfg: &TrainingConfig<'_>, df: &DataFrame) -> Result<Vec<String>> {
    match &cfg.feature_columns {
        Some(columns) => {
            if columns.contains(&cfg.target_column) {
                return Err(PipelineError::InvalidConfig {
                    path: format!("{}.feature_columns", STAGE.config_section()),
                    reason: format!("includes the target column '{}'", cfg.target_column),
                });
            }
            Ok(columns.clone())
        }
        None => Ok(default_feature_columns(df, &cfg.target_column)),
    }
}

/// Construct and fit every recognised family in `cfg`.
///
/// Returns the fitted models and the names that were skipped. Nothing is
/// persisted here.
pub fn fit_models(
    ctx: &StageContext<'_>,
    cfg: &TrainingConfig<'_>,
    registry: &ModelRegistry,
    features: &FeatureMatrix,
    target: &[f64],
) -> Result<(Vec<FittedModel>, Vec<String>)> {
    let mut fitted = Vec::new();
    let mut skipped = Vec::new();

    for spec in &cfg.models {
        if !registry.contains(&spec.name) {
            ctx.warn(
                STAGE,
                format!("Unknown model family '{}', skipping", spec.name),
            );
            skipped.push(spec.name.clone());
            continue;
        }

        let mut model = registry.create(&spec.name, &spec.params, cfg.random_state)?;
        ctx.info(STAGE, format!("Fitting {}", spec.name));
        model
            .fit(features, target)
            .map_err(|e| e.for_family(&spec.name))?;
        debug!(family = %spec.name, hyperparameters = %model.hyperparameters(), "model fitted");

        fitted.push(FittedModel {
            family: spec.name.clone(),
            model,
        });
    }

    Ok((fitted, skipped))
}

/// Run the training stage with the given registry.
pub fn run(ctx: &StageContext<'_>, registry: &ModelRegistry) -> Result<TrainingSummary> {
    ctx.run_stage(STAGE, |ctx| {
        let cfg = TrainingConfig::from_config(ctx.config)?;

        let df = ctx.store.read_csv(&cfg.train_input_path)?;
        let feature_names = select_features(&cfg, &df)?;
        let features = FeatureMatrix::from_frame(&df, &feature_names)?;
        let target = target_vector(&df, &cfg.target_column)?;
        ctx.info(
            STAGE,
            format!(
                "Training on {} rows with {} features: [{}]",
                features.n_rows(),
                features.n_features(),
                feature_names.join(", ")
            ),
        );

        let (fitted, skipped) = fit_models(ctx, &cfg, registry, &features, &target)?;
        if fitted.is_empty() {
            ctx.warn(STAGE, "No recognised model families configured");
        }

        let trained_at = chrono::Utc::now().to_rfc3339();
        let mut trained = Vec::with_capacity(fitted.len());
        for FittedModel { family, model } in fitted {
            let state = model.to_blob().map_err(|e| e.for_family(&family))?;
            let artifact = ModelArtifact {
                metadata: ModelMetadata {
                    family: family.clone(),
                    hyperparameters: model.hyperparameters(),
                    feature_names: feature_names.clone(),
                    target_column: cfg.target_column.clone(),
                    training_rows: features.n_rows(),
                    trained_at: trained_at.clone(),
                },
                state,
            };
            let path = ctx
                .store
                .write_model(&cfg.model_dir, &artifact)
                .context(format!("Failed to persist {}", family))?;
            ctx.info(STAGE, format!("Saved {} to {}", family, path.display()));
            trained.push(family);
        }

        for stale in ctx.store.list_models(&cfg.model_dir)? {
            if !trained.contains(&stale) {
                ctx.store.remove_model(&cfg.model_dir, &stale)?;
                ctx.info(STAGE, format!("Removed stale model {}", stale));
            }
        }

        Ok(TrainingSummary {
            trained,
            skipped,
            feature_names,
            training_rows: features.n_rows(),
            model_dir: ctx.store.resolve(&cfg.model_dir),
        })
    })
}
