//! Feature engineering stage: append derived columns to both datasets.
//!
//! The stage is best-effort over a small catalog of derivations. A derivation
//! whose source column is absent (or not numeric where a number is needed) is
//! skipped with a warning; the remaining ones still apply.
//!
//! When the configuration lists no derivations, the default catalog is used:
//!
//! | name | derivation |
//! |------|------------|
//! | `sales_7day_avg` | trailing mean of `sales` over 7 rows |
//! | `is_weekend` | `day_of_week` in `{5, 6}` as 0/1 |
//! | `temp_event_interaction` | `temperature * local_event` |

use crate::config::{Config, OwnedNode, ScalarText};
use crate::error::{PipelineError, Result};
use crate::pipeline::{PipelineStage, StageContext};
use crate::utils::{has_column, labels_match, numeric_values, text_values};
use polars::prelude::*;
use serde::Serialize;
use std::path::PathBuf;

const STAGE: PipelineStage = PipelineStage::FeatureEngineering;

/// A derived column and how to compute it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    /// Trailing mean over the previous `window` rows, current row included.
    /// Defined from the first row on; missing values inside the window are
    /// ignored.
    RollingMean {
        source: String,
        window: usize,
        name: String,
    },
    /// 1 when the source value is one of `weekend_days`, else 0.
    WeekendFlag {
        source: String,
        weekend_days: Vec<String>,
        name: String,
    },
    /// Row-wise product of two numeric columns.
    Interaction {
        left: String,
        right: String,
        name: String,
    },
}

impl Derivation {
    /// The catalog applied when none is configured.
    pub fn default_catalog() -> Vec<Self> {
        vec![
            Self::RollingMean {
                source: "sales".to_string(),
                window: 7,
                name: "sales_7day_avg".to_string(),
            },
            Self::WeekendFlag {
                source: "day_of_week".to_string(),
                weekend_days: vec!["5".to_string(), "6".to_string()],
                name: "is_weekend".to_string(),
            },
            Self::Interaction {
                left: "temperature".to_string(),
                right: "local_event".to_string(),
                name: "temp_event_interaction".to_string(),
            },
        ]
    }

    /// Name of the produced column.
    pub fn name(&self) -> &str {
        match self {
            Self::RollingMean { name, .. }
            | Self::WeekendFlag { name, .. }
            | Self::Interaction { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RollingMean { .. } => "rolling_mean",
            Self::WeekendFlag { .. } => "weekend_flag",
            Self::Interaction { .. } => "interaction",
        }
    }

    /// Compute the derived column.
    ///
    /// The inner `Err` carries the reason a source column is unusable.
    pub fn compute(&self, df: &DataFrame) -> Result<std::result::Result<Series, String>> {
        match self {
            Self::RollingMean {
                source,
                window,
                name,
            } => {
                let values = match numeric_source(df, source)? {
                    Ok(values) => values,
                    Err(reason) => return Ok(Err(reason)),
                };
                Ok(Ok(Series::new(
                    name.as_str().into(),
                    rolling_mean(&values, *window),
                )))
            }
            Self::WeekendFlag {
                source,
                weekend_days,
                name,
            } => {
                if !has_column(df, source) {
                    return Ok(Err(format!("column '{}' not found", source)));
                }
                let flags: Vec<i64> = text_values(df, source)?
                    .iter()
                    .map(|value| match value {
                        Some(day) if weekend_days.iter().any(|w| labels_match(w, day)) => 1,
                        _ => 0,
                    })
                    .collect();
                Ok(Ok(Series::new(name.as_str().into(), flags)))
            }
            Self::Interaction { left, right, name } => {
                let left_values = match numeric_source(df, left)? {
                    Ok(values) => values,
                    Err(reason) => return Ok(Err(reason)),
                };
                let right_values = match numeric_source(df, right)? {
                    Ok(values) => values,
                    Err(reason) => return Ok(Err(reason)),
                };
                let product: Vec<Option<f64>> = left_values
                    .iter()
                    .zip(&right_values)
                    .map(|(l, r)| match (l, r) {
                        (Some(l), Some(r)) => Some(l * r),
                        _ => None,
                    })
                    .collect();
                Ok(Ok(Series::new(name.as_str().into(), product)))
            }
        }
    }

    /// Parse one `derivations` entry. Unknown kinds yield `None`.
    pub fn from_node(node: &OwnedNode<'_>) -> Result<Option<Self>> {
        let kind: String = node.get(&["kind"])?;
        let derivation = match kind.as_str() {
            "rolling_mean" => {
                let source: String = node.get(&["source"])?;
                let window: usize = node.get(&["window"])?;
                if window == 0 {
                    return Err(PipelineError::InvalidConfig {
                        path: format!("{}.window", node.path()),
                        reason: "window must be at least 1".to_string(),
                    });
                }
                let name = node.get_or(&["name"], format!("{}_{}day_avg", source, window))?;
                Self::RollingMean {
                    source,
                    window,
                    name,
                }
            }
            "weekend_flag" => {
                let source: String = node.get(&["source"])?;
                let weekend_days: Vec<ScalarText> = node.get_or(
                    &["weekend_days"],
                    vec![ScalarText("5".to_string()), ScalarText("6".to_string())],
                )?;
                Self::WeekendFlag {
                    source,
                    weekend_days: weekend_days.into_iter().map(|day| day.0).collect(),
                    name: node.get_or(&["name"], "is_weekend".to_string())?,
                }
            }
            "interaction" => {
                let left: String = node.get(&["left"])?;
                let right: String = node.get(&["right"])?;
                let name = node.get_or(&["name"], format!("{}_{}_interaction", left, right))?;
                Self::Interaction { left, right, name }
            }
            _ => return Ok(None),
        };
        Ok(Some(derivation))
    }
}

fn numeric_source(
    df: &DataFrame,
    column: &str,
) -> Result<std::result::Result<Vec<Option<f64>>, String>> {
    if !has_column(df, column) {
        return Ok(Err(format!("column '{}' not found", column)));
    }
    match numeric_values(df, column) {
        Ok(values) => Ok(Ok(values)),
        Err(PipelineError::SchemaViolation(reason)) => Ok(Err(reason)),
        Err(e) => Err(e),
    }
}

/// Trailing mean over `window` rows ending at each row, ignoring missing
/// values. Missing only when every value in the window is missing.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let present: Vec<f64> = values[start..=i].iter().flatten().copied().collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect()
}

// =============================================================================
// Applying
// =============================================================================

/// A derivation that could not be applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDerivation {
    pub name: String,
    pub reason: String,
}

/// Result of applying a derivation list to one dataset.
#[derive(Debug, Clone)]
pub struct FeatureOutcome {
    pub data: DataFrame,
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedDerivation>,
}

/// Apply derivations in order. Later derivations may read columns produced by
/// earlier ones. A column that already exists is replaced in place.
pub fn apply_derivations(df: &DataFrame, derivations: &[Derivation]) -> Result<FeatureOutcome> {
    let mut data = df.clone();
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for derivation in derivations {
        match derivation.compute(&data)? {
            Ok(series) => {
                let name = derivation.name().to_string();
                if has_column(&data, &name) {
                    data.replace(&name, series)?;
                } else {
                    data.with_column(series)?;
                }
                applied.push(name);
            }
            Err(reason) => skipped.push(SkippedDerivation {
                name: derivation.name().to_string(),
                reason,
            }),
        }
    }

    Ok(FeatureOutcome {
        data,
        applied,
        skipped,
    })
}

// =============================================================================
// Stage
// =============================================================================

/// Resolved `feature_engineering` section.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
    pub train_input_path: PathBuf,
    pub test_input_path: PathBuf,
    pub train_output_path: PathBuf,
    pub test_output_path: PathBuf,
    pub derivations: Vec<Derivation>,
    /// Configured entries with a kind outside the catalog, as `path (kind)`
    pub unsupported: Vec<String>,
}

impl FeatureConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        let section = STAGE.config_section();
        let mut derivations = Vec::new();
        let mut unsupported = Vec::new();

        match config.resolve(&[section, "derivations"]) {
            Ok(serde_json::Value::Null) | Err(PipelineError::ConfigMissingKey { .. }) => {
                derivations = Derivation::default_catalog();
            }
            Err(e) => return Err(e),
            Ok(_) => {
                for node in config.child(&[section, "derivations"])?.list()? {
                    match Derivation::from_node(&node)? {
                        Some(derivation) => derivations.push(derivation),
                        None => unsupported.push(format!(
                            "{} ({})",
                            node.path(),
                            node.get::<String>(&["kind"])?
                        )),
                    }
                }
            }
        }

        Ok(Self {
            train_input_path: config.get(&[section, "train_input_path"])?,
            test_input_path: config.get(&[section, "test_input_path"])?,
            train_output_path: config.get(&[section, "train_output_path"])?,
            test_output_path: config.get(&[section, "test_output_path"])?,
            derivations,
            unsupported,
        })
    }
}

/// Outcome of a feature engineering run.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSummary {
    /// Derivations applied to the training data.
    pub applied: Vec<String>,
    /// Derivations skipped on either dataset, training skips first.
    pub skipped: Vec<SkippedDerivation>,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
}

/// Run the feature engineering stage.
pub fn run(ctx: &StageContext<'_>) -> Result<FeatureSummary> {
    ctx.run_stage(STAGE, |ctx| {
        let cfg = FeatureConfig::from_config(ctx.config)?;
        for entry in &cfg.unsupported {
            ctx.warn(STAGE, format!("Unsupported derivation {}, skipping", entry));
        }

        let train = ctx.store.read_csv(&cfg.train_input_path)?;
        let test = ctx.store.read_csv(&cfg.test_input_path)?;

        let train = apply_derivations(&train, &cfg.derivations)?;
        let test = apply_derivations(&test, &cfg.derivations)?;
        for (side, outcome) in [("training", &train), ("evaluation", &test)] {
            for skip in &outcome.skipped {
                ctx.warn(
                    STAGE,
                    format!("Skipping '{}' on {} data: {}", skip.name, side, skip.reason),
                );
            }
        }
        ctx.info(
            STAGE,
            format!("Derived columns: [{}]", train.applied.join(", ")),
        );

        let train_path = ctx.store.write_csv(&cfg.train_output_path, &train.data)?;
        let test_path = ctx.store.write_csv(&cfg.test_output_path, &test.data)?;

        let mut skipped = train.skipped;
        for skip in test.skipped {
            if !skipped.contains(&skip) {
                skipped.push(skip);
            }
        }

        Ok(FeatureSummary {
            applied: train.applied,
            skipped,
            train_path,
            test_path,
        })
    })
}
