//! CART regression tree
//!
//! Splits are chosen exhaustively on squared error: for every feature the
//! rows are sorted by value and every boundary between distinct values is
//! scored. Ties keep the first feature and the lowest threshold found, so
//! fitting is fully deterministic.

use crate::{check_design, MathError, Result};
use serde::{Deserialize, Serialize};

/// Minimum reduction in squared error for a split to be kept
const MIN_GAIN: f64 = 1e-12;

/// Growth limits for a regression tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    /// Maximum depth; a depth of 0 yields a single leaf
    pub max_depth: usize,
    /// Minimum number of rows in each leaf
    pub min_samples_leaf: usize,
    /// Minimum number of rows a node needs before it may split
    pub min_samples_split: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_samples_leaf: 1,
            min_samples_split: 2,
        }
    }
}

impl TreeParams {
    /// Validate the growth limits
    pub fn validate(&self) -> Result<()> {
        if self.min_samples_leaf == 0 {
            return Err(MathError::InvalidInput(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(MathError::InvalidInput(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
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

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

/// Fitted regression tree stored as a flat node arena
#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    n_features: usize,
    params: TreeParams,
}

impl RegressionTree {
    /// Fit a tree on every row
    pub fn fit(features: &[Vec<f64>], targets: &[f64], params: TreeParams) -> Result<Self> {
        let rows: Vec<usize> = (0..features.len()).collect();
        Self::fit_rows(features, targets, &rows, params)
    }

    /// Fit a tree on a subset of rows
    pub fn fit_rows(
        features: &[Vec<f64>],
        targets: &[f64],
        rows: &[usize],
        params: TreeParams,
    ) -> Result<Self> {
        params.validate()?;
        let n_features = check_design(features, targets)?;

        if rows.is_empty() {
            return Err(MathError::InsufficientData(
                "Cannot fit a tree on zero rows".to_string(),
            ));
        }
        if let Some(&bad) = rows.iter().find(|&&r| r >= features.len()) {
            return Err(MathError::InvalidInput(format!(
                "Row index {} out of bounds for {} rows",
                bad,
                features.len()
            )));
        }

        let mut tree = Self {
            nodes: Vec::new(),
            n_features,
            params,
        };
        tree.grow(features, targets, rows.to_vec(), 0);
        Ok(tree)
    }

    fn grow(&mut self, x: &[Vec<f64>], y: &[f64], rows: Vec<usize>, depth: usize) -> usize {
        let value = rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64;
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value });

        if depth >= self.params.max_depth
            || rows.len() < self.params.min_samples_split
            || rows.len() < 2 * self.params.min_samples_leaf
        {
            return id;
        }

        let Some(split) = self.best_split(x, y, &rows) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| x[r][split.feature] <= split.threshold);

        let left = self.grow(x, y, left_rows, depth + 1);
        let right = self.grow(x, y, right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&self, x: &[Vec<f64>], y: &[f64], rows: &[usize]) -> Option<SplitCandidate> {
        let n = rows.len();
        let min_leaf = self.params.min_samples_leaf;
        let total: f64 = rows.iter().map(|&r| y[r]).sum();
        let baseline = total * total / n as f64;

        let mut best: Option<SplitCandidate> = None;
        let mut sorted = rows.to_vec();

        for feature in 0..self.n_features {
            sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

            let mut left_sum = 0.0;
            for i in 0..n - 1 {
                left_sum += y[sorted[i]];
                let left_n = i + 1;
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let here = x[sorted[i]][feature];
                let next = x[sorted[i + 1]][feature];
                if here == next {
                    continue;
                }

                let right_sum = total - left_sum;
                let score =
                    left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;

                let improves = match best {
                    Some(b) => score > b.score + MIN_GAIN,
                    None => score > baseline + MIN_GAIN,
                };
                if improves {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        score,
                    });
                }
            }
        }

        best
    }

    /// Predict a single row
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    /// Predict every row of a feature matrix
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
        if let Some(row) = features.iter().find(|r| r.len() != self.n_features) {
            return Err(MathError::InvalidInput(format!(
                "Expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        Ok(features.iter().map(|r| self.predict_row(r)).collect())
    }

    /// Number of features the tree was fitted on
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of leaves
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Depth of the deepest leaf
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }
}
