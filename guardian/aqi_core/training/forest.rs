use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::ForestConfig,
    error::{AqiError, Result},
};

const MIN_IMPURITY_DECREASE: f64 = 1e-12;

/// Node of an arena-allocated regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Internal node: rows with `x[feature] <= threshold` go left.
    Split {
        /// Column index in schema order.
        feature: usize,
        /// Midpoint between the two neighbouring distinct values.
        threshold: f64,
        /// Arena index of the left child.
        left: usize,
        /// Arena index of the right child.
        right: usize,
    },
    /// Terminal node predicting the mean target of its rows.
    Leaf {
        /// Predicted value.
        value: f64,
        /// Training rows that reached this leaf.
        samples: usize,
    },
}

/// CART regression tree using variance reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    #[serde(skip)]
    impurity_decrease: Vec<f64>,
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    config: ForestConfig,
    nodes: Vec<TreeNode>,
    impurity_decrease: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    child_sse: f64,
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(count: usize) -> f64 {
    count as f64
}

fn sum_squared_error(sum: f64, sum_sq: f64, count: usize) -> f64 {
    (sum_sq - sum * sum / as_f64(count)).max(0.0)
}

impl TreeBuilder<'_> {
    fn leaf(&mut self, rows: &[usize]) -> usize {
        let value = rows.iter().map(|&row| self.y[row]).sum::<f64>() / as_f64(rows.len());
        self.nodes.push(TreeNode::Leaf {
            value,
            samples: rows.len(),
        });
        self.nodes.len() - 1
    }

    fn build(&mut self, rows: &mut [usize], depth: usize) -> usize {
        let n = rows.len();
        let (sum, sum_sq) = rows.iter().fold((0.0, 0.0), |(s, sq), &row| {
            let y = self.y[row];
            (s + y, sq + y * y)
        });
        let parent_sse = sum_squared_error(sum, sum_sq, n);
        if depth >= self.config.max_depth
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
            || parent_sse <= MIN_IMPURITY_DECREASE
        {
            return self.leaf(rows);
        }
        let Some(best) = self.best_split(rows) else {
            return self.leaf(rows);
        };
        let decrease = parent_sse - best.child_sse;
        if decrease <= MIN_IMPURITY_DECREASE {
            return self.leaf(rows);
        }
        self.impurity_decrease[best.feature] += decrease;

        let slot = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: 0.0,
            samples: n,
        });
        let (feature, threshold) = (best.feature, best.threshold);
        rows.sort_unstable_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
        let boundary = rows.partition_point(|&row| self.x[[row, feature]] <= threshold);
        let (left_rows, right_rows) = rows.split_at_mut(boundary);
        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);
        self.nodes[slot] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    fn best_split(&self, rows: &[usize]) -> Option<BestSplit> {
        let n = rows.len();
        let min_leaf = self.config.min_samples_leaf;
        let mut best: Option<BestSplit> = None;
        let mut order = rows.to_vec();
        for feature in 0..self.x.ncols() {
            order.sort_unstable_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let total: f64 = order.iter().map(|&row| self.y[row]).sum();
            let total_sq: f64 = order.iter().map(|&row| self.y[row].powi(2)).sum();
            let (mut left_sum, mut left_sq) = (0.0, 0.0);
            for position in 0..n - 1 {
                let y = self.y[order[position]];
                left_sum += y;
                left_sq += y * y;
                let left_count = position + 1;
                let right_count = n - left_count;
                if left_count < min_leaf || right_count < min_leaf {
                    continue;
                }
                let current = self.x[[order[position], feature]];
                let next = self.x[[order[position + 1], feature]];
                if next <= current {
                    continue;
                }
                let child_sse = sum_squared_error(left_sum, left_sq, left_count)
                    + sum_squared_error(total - left_sum, total_sq - left_sq, right_count);
                if best.as_ref().map_or(true, |b| child_sse < b.child_sse) {
                    best = Some(BestSplit {
                        feature,
                        threshold: current + (next - current) / 2.0,
                        child_sse,
                    });
                }
            }
        }
        best
    }
}

impl RegressionTree {
    /// Fits a tree on the given rows of `x`/`y` (duplicates allowed).
    #[must_use]
    pub fn fit<'a>(
        x: ArrayView2<'a, f64>,
        y: ArrayView1<'a, f64>,
        rows: &mut [usize],
        config: ForestConfig,
    ) -> Self {
        let mut builder = TreeBuilder {
            x,
            y,
            config,
            nodes: Vec::new(),
            impurity_decrease: vec![0.0; x.ncols()],
        };
        if rows.is_empty() {
            builder.nodes.push(TreeNode::Leaf {
                value: 0.0,
                samples: 0,
            });
        } else {
            builder.build(rows, 0);
        }
        Self {
            nodes: builder.nodes,
            impurity_decrease: builder.impurity_decrease,
        }
    }

    /// Predicts one row.
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => index = if row[*feature] <= *threshold { *left } else { *right },
                Some(TreeNode::Leaf { value, .. }) => return *value,
                None => return 0.0,
            }
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Longest root-to-leaf path, in edges.
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match nodes.get(index) {
                Some(TreeNode::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    fn normalized_importance(&self) -> Option<Vec<f64>> {
        let total: f64 = self.impurity_decrease.iter().sum();
        (total > 0.0).then(|| self.impurity_decrease.iter().map(|v| v / total).collect())
    }
}

/// Bootstrap-aggregated ensemble of [`RegressionTree`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    config: ForestConfig,
    random_state: u64,
    n_features: usize,
    trees: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForestRegressor {
    /// Fits `config.n_estimators` trees; tree `i` draws its bootstrap with seed `random_state + i`.
    pub fn fit<'a>(
        x: ArrayView2<'a, f64>,
        y: ArrayView1<'a, f64>,
        config: ForestConfig,
        random_state: u64,
    ) -> Result<Self> {
        config.validate()?;
        let n_samples = x.nrows();
        if n_samples == 0 || n_samples != y.len() {
            return Err(AqiError::DatasetShape(format!(
                "forest needs matching non-empty inputs, got {n_samples} rows and {} labels",
                y.len()
            )));
        }

        let grow = || -> Vec<RegressionTree> {
            (0..config.n_estimators)
                .into_par_iter()
                .map(|i| {
                    let mut rng = ChaCha8Rng::seed_from_u64(random_state.wrapping_add(i as u64));
                    let mut rows: Vec<usize> =
                        (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                    RegressionTree::fit(x, y, &mut rows, config)
                })
                .collect()
        };
        let trees = if config.n_jobs == 0 {
            grow()
        } else {
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.n_jobs)
                .build()
                .map_err(|err| AqiError::Config(format!("cannot start tree workers: {err}")))?
                .install(grow)
        };

        let feature_importances = aggregate_importances(&trees, x.ncols());
        Ok(Self {
            config,
            random_state,
            n_features: x.ncols(),
            trees,
            feature_importances,
        })
    }

    /// Mean of the tree predictions for every row.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(AqiError::DimensionMismatch {
                expected: self.n_features,
                found: x.ncols(),
            });
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| self.predict_row(row))
            .collect())
    }

    /// Mean of the tree predictions for one row.
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|tree| tree.predict_row(row)).sum::<f64>() / as_f64(self.trees.len())
    }

    /// Impurity-based importances in column order, summing to 1 (or all zero).
    #[must_use]
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Column count seen during fit.
    #[must_use]
    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    /// Hyperparameters used for fit.
    #[must_use]
    pub const fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Seed used for fit.
    #[must_use]
    pub const fn random_state(&self) -> u64 {
        self.random_state
    }
}

fn aggregate_importances(trees: &[RegressionTree], n_features: usize) -> Vec<f64> {
    let mut summed = vec![0.0; n_features];
    for importance in trees.iter().filter_map(RegressionTree::normalized_importance) {
        for (acc, value) in summed.iter_mut().zip(importance) {
            *acc += value;
        }
    }
    let total: f64 = summed.iter().sum();
    if total > 0.0 {
        for value in &mut summed {
            *value /= total;
        }
    }
    summed
}
