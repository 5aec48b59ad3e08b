//! CART regression trees, the building block of both tree ensembles.
//!
//! Splits minimise the summed squared error of the two children. Candidate
//! thresholds are midpoints between consecutive distinct feature values, so a
//! row goes left when `value <= threshold`.

use crate::error::{EstimatorError, EstimatorResult};
use crate::matrix::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth; `None` grows until leaves are pure or too small.
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs to be split (default 2).
    pub min_samples_split: usize,
    /// Minimum samples in each child of a split (default 1).
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

/// One node of a fitted tree. Children are indices into the node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree. The root is node 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Grow a tree on the rows listed in `samples` (repeats allowed).
    ///
    /// `samples` must be non-empty and every index must be a row of
    /// `features`.
    pub fn fit(
        features: &FeatureMatrix,
        target: &[f64],
        samples: &[usize],
        params: &TreeParams,
    ) -> Self {
        let mut builder = TreeBuilder {
            features,
            target,
            params,
            nodes: Vec::new(),
        };
        builder.grow(samples, 0);
        Self {
            nodes: builder.nodes,
        }
    }

    /// Predict a single row.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }

    /// Length of the longest root-to-leaf path, in edges.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Check a restored tree: non-empty, children after their parent and in
    /// range, features below `n_features`.
    pub fn validate(&self, n_features: usize) -> EstimatorResult<()> {
        if self.nodes.is_empty() {
            return Err(EstimatorError::Restore("tree has no nodes".to_string()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                let in_range = |child: usize| child > idx && child < self.nodes.len();
                if *feature >= n_features || !in_range(*left) || !in_range(*right) {
                    return Err(EstimatorError::Restore(format!(
                        "tree node {} references an invalid child or feature",
                        idx
                    )));
                }
            }
        }
        Ok(())
    }
}

struct TreeBuilder<'a> {
    features: &'a FeatureMatrix,
    target: &'a [f64],
    params: &'a TreeParams,
    nodes: Vec<TreeNode>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, samples: &[usize], depth: usize) -> usize {
        let idx = self.nodes.len();
        let sum: f64 = samples.iter().map(|&s| self.target[s]).sum();
        let value = sum / samples.len() as f64;
        self.nodes.push(TreeNode::Leaf { value });

        if !self.may_split(samples, depth) {
            return idx;
        }
        let Some(split) = self.best_split(samples, sum) else {
            return idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&s| self.features.get(s, split.feature) <= split.threshold);
        let left = self.grow(&left, depth + 1);
        let right = self.grow(&right, depth + 1);
        self.nodes[idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn may_split(&self, samples: &[usize], depth: usize) -> bool {
        let n = samples.len();
        if n < self.params.min_samples_split.max(2) || n < 2 * self.params.min_samples_leaf {
            return false;
        }
        if self.params.max_depth.is_some_and(|max| depth >= max) {
            return false;
        }
        let first = self.target[samples[0]];
        samples.iter().any(|&s| self.target[s] != first)
    }

    /// Best split by `sum_l^2 / n_l + sum_r^2 / n_r`, which is the parent's
    /// squared error minus the children's.
    fn best_split(&self, samples: &[usize], total: f64) -> Option<SplitCandidate> {
        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent_score = total * total / n as f64;
        let tolerance = 1e-12 * parent_score.abs().max(1.0);

        let mut best: Option<SplitCandidate> = None;
        let mut order = samples.to_vec();
        for feature in 0..self.features.n_features() {
            order.sort_by(|&a, &b| {
                self.features
                    .get(a, feature)
                    .total_cmp(&self.features.get(b, feature))
            });

            let mut left_sum = 0.0;
            for i in 0..n - 1 {
                left_sum += self.target[order[i]];
                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let here = self.features.get(order[i], feature);
                let next = self.features.get(order[i + 1], feature);
                if here >= next {
                    continue;
                }

                let right_sum = total - left_sum;
                let score =
                    left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
                if score <= parent_score + tolerance {
                    continue;
                }
                if best.as_ref().is_none_or(|b| score > b.score) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        score,
                    });
                }
            }
        }
        best
    }
}
