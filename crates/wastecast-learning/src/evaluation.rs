//! Evaluation stage: score every persisted model on the held-out table.
//!
//! Each model is restored through the registry and fed the feature columns
//! recorded in its sidecar, in the recorded order. The report is written once,
//! after every model has been scored; a failure for any model aborts the stage
//! with that model's family in the error and writes nothing.

use crate::config::EvaluationConfig;
use crate::matrix::{FeatureMatrix, target_vector};
use crate::metrics::{MetricsReport, RegressionMetrics};
use crate::registry::ModelRegistry;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::path::PathBuf;
use wastecast_processing::{ModelArtifact, PipelineError, PipelineStage, Result, StageContext};

const STAGE: PipelineStage = PipelineStage::Evaluation;

/// Outcome of an evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSummary {
    pub report: MetricsReport,
    pub evaluation_rows: usize,
    pub metrics_path: PathBuf,
    pub text_report_path: Option<PathBuf>,
}

/// Score one persisted model against `df`.
///
/// Any failure (unknown family, undecodable blob, absent feature column,
/// prediction error) is reported as [`PipelineError::ModelFailed`] for the
/// artifact's family.
pub fn score_model(
    registry: &ModelRegistry,
    artifact: ModelArtifact,
    df: &DataFrame,
    target: &[f64],
) -> Result<RegressionMetrics> {
    let family = artifact.metadata.family.clone();
    let model = registry
        .restore(&family, artifact.state)
        .map_err(|e| e.for_family(&family))?;
    let features = FeatureMatrix::from_frame(df, &artifact.metadata.feature_names)
        .map_err(|e| e.for_family(&family))?;
    let predictions = model
        .predict(&features)
        .map_err(|e| e.for_family(&family))?;
    Ok(RegressionMetrics::compute(target, &predictions))
}

/// Run the evaluation stage with the given registry.
pub fn run(ctx: &StageContext<'_>, registry: &ModelRegistry) -> Result<EvaluationSummary> {
    ctx.run_stage(STAGE, |ctx| {
        let cfg = EvaluationConfig::from_config(ctx.config)?;

        let families = ctx.store.list_models(&cfg.model_dir)?;
        if families.is_empty() {
            return Err(PipelineError::ArtifactNotFound {
                path: format!("{} (no models)", ctx.store.resolve(&cfg.model_dir).display()),
            });
        }

        let df = ctx.store.read_csv(&cfg.test_input_path)?;
        let target = target_vector(&df, &cfg.target_column)?;
        ctx.info(
            STAGE,
            format!(
                "Evaluating {} model(s) on {} rows",
                families.len(),
                df.height()
            ),
        );

        let mut report = MetricsReport::new();
        for family in &families {
            let artifact = ctx.store.read_model(&cfg.model_dir, family)?;
            if artifact.metadata.target_column != cfg.target_column {
                ctx.warn(
                    STAGE,
                    format!(
                        "{} was trained on target '{}', evaluating against '{}'",
                        family, artifact.metadata.target_column, cfg.target_column
                    ),
                );
            }
            let metrics = score_model(registry, artifact, &df, &target)?;
            ctx.info(
                STAGE,
                format!(
                    "{}: MAE={:.4} RMSE={:.4} R2={:.4}",
                    family, metrics.mae, metrics.rmse, metrics.r2
                ),
            );
            report.insert(family.clone(), metrics);
        }

        let metrics_path = ctx.store.write_json(&cfg.metrics_path, &report)?;
        let text_report_path = match &cfg.text_report_path {
            Some(path) => Some(ctx.store.write_text(path, &report.render_text())?),
            None => None,
        };
        if let Some(best) = report.best_by_rmse() {
            ctx.info(STAGE, format!("Lowest RMSE: {}", best));
        }

        Ok(EvaluationSummary {
            report,
            evaluation_rows: df.height(),
            metrics_path,
            text_report_path,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::Regressor;
    use crate::models::MeanBaseline;
    use polars::prelude::*;
    use serde_json::json;
    use wastecast_processing::{ArtifactStore, Config, MemoryReporter, ModelMetadata};

    const DOC: &str = "model_evaluation:\n  test_input_path: test.csv\n  model_dir: models\n  target_column: y\n  metrics_path: reports/metrics.json\n  text_report_path: reports/metrics.txt\n";

    fn persist_baseline(store: &ArtifactStore, value_rows: &[f64], features: Vec<String>) {
        let x = FeatureMatrix::from_rows(
            vec!["x".to_string()],
            value_rows.iter().map(|_| vec![0.0]).collect(),
        )
        .unwrap();
        let mut model = MeanBaseline::new();
        model.fit(&x, value_rows).unwrap();
        let artifact = ModelArtifact {
            metadata: ModelMetadata {
                family: "MeanBaseline".to_string(),
                hyperparameters: json!({}),
                feature_names: features,
                target_column: "y".to_string(),
                training_rows: value_rows.len(),
                trained_at: "2024-01-01T00:00:00+00:00".to_string(),
            },
            state: model.to_blob().unwrap(),
        };
        store.write_model("models", &artifact).unwrap();
    }

    #[test]
    fn test_constant_predictor_scores_zero_r2() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let test = df!["x" => [1.0, 2.0, 3.0, 4.0], "y" => [1.0, 2.0, 3.0, 6.0]].unwrap();
        store.write_csv("test.csv", &test).unwrap();
        // training mean equals the evaluation mean (3.0)
        persist_baseline(&store, &[3.0, 3.0], vec!["x".to_string()]);

        let config = Config::from_yaml_str(DOC).unwrap();
        let reporter = MemoryReporter::new();
        let ctx = StageContext::new(&config, &store, &reporter);
        let summary = run(&ctx, &ModelRegistry::with_defaults()).unwrap();

        let metrics = summary.report.get("MeanBaseline").unwrap();
        assert_eq!(metrics.r2, 0.0);
        assert!((metrics.mae - 1.5).abs() < 1e-12);
        assert!(store.exists("reports/metrics.json"));
        assert!(store.exists("reports/metrics.txt"));
    }

    #[test]
    fn test_missing_feature_names_family_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let test = df!["y" => [1.0, 2.0]].unwrap();
        store.write_csv("test.csv", &test).unwrap();
        persist_baseline(&store, &[1.0, 2.0], vec!["x".to_string()]);

        let config = Config::from_yaml_str(DOC).unwrap();
        let reporter = MemoryReporter::new();
        let ctx = StageContext::new(&config, &store, &reporter);
        let err = run(&ctx, &ModelRegistry::with_defaults()).unwrap_err();

        assert!(matches!(
            err.root(),
            PipelineError::ModelFailed { family, .. } if family == "MeanBaseline"
        ));
        assert!(!store.exists("reports/metrics.json"));
    }

    #[test]
    fn test_empty_model_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let config = Config::from_yaml_str(DOC).unwrap();
        let reporter = MemoryReporter::new();
        let ctx = StageContext::new(&config, &store, &reporter);

        let err = run(&ctx, &ModelRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err.root(), PipelineError::ArtifactNotFound { .. }));
        assert_eq!(err.exit_code(), 3);
    }
}
