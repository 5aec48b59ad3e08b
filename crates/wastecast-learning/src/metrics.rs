//! Regression metrics and the evaluation report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// The three accuracy measures reported for every model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean absolute error.
    #[serde(rename = "MAE")]
    pub mae: f64,
    /// Root mean squared error.
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    /// Coefficient of determination.
    #[serde(rename = "R2")]
    pub r2: f64,
}

impl RegressionMetrics {
    /// Compare `predicted` against `actual`.
    ///
    /// `R2` is `1 - SS_res / SS_tot`. A constant target has `SS_tot = 0`; it
    /// scores 1.0 when predicted exactly and 0.0 otherwise. Both slices must
    /// have the same non-zero length.
    #[must_use]
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        debug_assert_eq!(actual.len(), predicted.len());
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return Self {
                mae: 0.0,
                rmse: 0.0,
                r2: 0.0,
            };
        }

        let mean = actual[..n].iter().sum::<f64>() / n as f64;
        let mut abs_sum = 0.0;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (y, p) in actual.iter().zip(predicted) {
            let err = y - p;
            abs_sum += err.abs();
            ss_res += err * err;
            ss_tot += (y - mean) * (y - mean);
        }

        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };
        Self {
            mae: abs_sum / n as f64,
            rmse: (ss_res / n as f64).sqrt(),
            r2,
        }
    }
}

/// Metrics per model family, keyed and ordered by family name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsReport {
    models: BTreeMap<String, RegressionMetrics>,
}

impl MetricsReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, family: impl Into<String>, metrics: RegressionMetrics) {
        self.models.insert(family.into(), metrics);
    }

    #[must_use]
    pub fn get(&self, family: &str) -> Option<&RegressionMetrics> {
        self.models.get(family)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegressionMetrics)> {
        self.models.iter().map(|(name, m)| (name.as_str(), m))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Family with the lowest RMSE.
    #[must_use]
    pub fn best_by_rmse(&self) -> Option<&str> {
        self.iter()
            .min_by(|a, b| a.1.rmse.total_cmp(&b.1.rmse))
            .map(|(name, _)| name)
    }

    /// Flat text rendering, one block per family.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (name, m) in self.iter() {
            let _ = writeln!(out, "{}:", name);
            let _ = writeln!(out, "  MAE: {:.4}", m.mae);
            let _ = writeln!(out, "  RMSE: {:.4}", m.rmse);
            let _ = writeln!(out, "  R2: {:.4}", m.r2);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_constant_mean_predictor() {
        let actual = [1.0, 2.0, 3.0, 6.0];
        let predicted = [3.0; 4];
        let m = RegressionMetrics::compute(&actual, &predicted);

        // deviations from the mean: 2, 1, 0, 3
        assert_eq!(m.r2, 0.0);
        assert!((m.mae - 1.5).abs() < 1e-12);
        assert!((m.rmse - 3.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_fit() {
        let actual = [1.0, 5.0, 9.0];
        let m = RegressionMetrics::compute(&actual, &actual);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.r2, 1.0);
    }

    #[test]
    fn test_constant_target() {
        let actual = [4.0, 4.0];
        assert_eq!(RegressionMetrics::compute(&actual, &[4.0, 4.0]).r2, 1.0);
        assert_eq!(RegressionMetrics::compute(&actual, &[3.0, 5.0]).r2, 0.0);
    }

    #[test]
    fn test_report_json_shape() {
        let mut report = MetricsReport::new();
        report.insert(
            "RandomForest",
            RegressionMetrics {
                mae: 1.0,
                rmse: 2.0,
                r2: 0.5,
            },
        );
        report.insert(
            "LinearRegression",
            RegressionMetrics {
                mae: 3.0,
                rmse: 4.0,
                r2: 0.25,
            },
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "LinearRegression": {"MAE": 3.0, "RMSE": 4.0, "R2": 0.25},
                "RandomForest": {"MAE": 1.0, "RMSE": 2.0, "R2": 0.5},
            })
        );
        assert_eq!(report.best_by_rmse(), Some("RandomForest"));
        assert!(report.render_text().starts_with("LinearRegression:\n  MAE: 3.0000\n"));
    }
}
