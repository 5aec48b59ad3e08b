//! Ordinary least squares.

use crate::error::{EstimatorError, EstimatorResult};
use crate::estimator::{Regressor, check_training_data, check_width, mean};
use crate::matrix::FeatureMatrix;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wastecast_processing::{OwnedNode, Result};

/// Relative ridge term added to the normal equations so collinear or constant
/// features still give a unique solution.
const RIDGE: f64 = 1e-10;

/// Hyperparameters of [`LinearRegression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    /// Fit an intercept term (default `true`).
    pub fit_intercept: bool,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LinearState {
    coefficients: Vec<f64>,
    intercept: f64,
}

/// Least squares linear regression, solved through the normal equations on
/// centered data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    params: LinearParams,
    state: Option<LinearState>,
}

impl LinearRegression {
    pub fn new(params: LinearParams) -> Self {
        Self {
            params,
            state: None,
        }
    }

    /// Read `fit_intercept` from a `models` entry.
    pub fn from_config(node: &OwnedNode<'_>, _seed: u64) -> Result<Self> {
        Ok(Self::new(LinearParams {
            fit_intercept: node.get_or(&["fit_intercept"], true)?,
        }))
    }

    /// Fitted coefficients, one per feature.
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.coefficients.as_slice())
    }

    pub fn intercept(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.intercept)
    }

    /// Restore from a blob written by [`Regressor::to_blob`].
    pub fn from_blob(blob: Value) -> EstimatorResult<Self> {
        let model: Self = serde_json::from_value(blob)?;
        if model.state.is_none() {
            return Err(EstimatorError::NotFitted);
        }
        Ok(model)
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, features: &FeatureMatrix, target: &[f64]) -> EstimatorResult<()> {
        check_training_data(features, target)?;
        let p = features.n_features();

        let (x_mean, y_mean) = if self.params.fit_intercept {
            (features.column_means(), mean(target))
        } else {
            (vec![0.0; p], 0.0)
        };

        // normal equations on centered data: (X'X + lambda I) b = X'y
        let mut gram = vec![vec![0.0; p]; p];
        let mut moment = vec![0.0; p];
        let mut centered = vec![0.0; p];
        for (row, y) in features.rows().iter().zip(target) {
            for j in 0..p {
                centered[j] = row[j] - x_mean[j];
            }
            let yc = y - y_mean;
            for j in 0..p {
                moment[j] += centered[j] * yc;
                for k in j..p {
                    gram[j][k] += centered[j] * centered[k];
                }
            }
        }
        for j in 0..p {
            for k in 0..j {
                gram[j][k] = gram[k][j];
            }
        }

        let scale = if p == 0 {
            1.0
        } else {
            ((0..p).map(|j| gram[j][j]).sum::<f64>() / p as f64).max(1.0)
        };
        for (j, row) in gram.iter_mut().enumerate() {
            row[j] += RIDGE * scale;
        }

        let coefficients = solve(gram, moment);
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(&x_mean)
                .map(|(b, m)| b * m)
                .sum::<f64>();

        self.state = Some(LinearState {
            coefficients,
            intercept,
        });
        Ok(())
    }

    fn predict(&self, features: &FeatureMatrix) -> EstimatorResult<Vec<f64>> {
        let state = self.state.as_ref().ok_or(EstimatorError::NotFitted)?;
        check_width(state.coefficients.len(), features)?;
        Ok(features
            .rows()
            .iter()
            .map(|row| {
                state.intercept
                    + row
                        .iter()
                        .zip(&state.coefficients)
                        .map(|(x, b)| x * b)
                        .sum::<f64>()
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

/// Solve `a x = b` by Gaussian elimination with partial pivoting. `a` is
/// symmetric positive definite here, so pivots stay away from zero.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);

        let diag = a[col][col];
        if diag == 0.0 {
            continue;
        }
        for row in col + 1..n {
            let factor = a[row][col] / diag;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = if a[row][row] == 0.0 {
            0.0
        } else {
            (b[row] - tail) / a[row][row]
        };
    }
    x
}
