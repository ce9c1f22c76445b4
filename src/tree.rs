use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::error::ForestError;
use crate::node::{LeafValue, Node, NodeIndex};
use crate::split::{find_best_split, node_impurity, sample_features};
use crate::target::Targets;

/// Learning mode of a fitted tree, fixed by the target type at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TreeKind {
    /// Classification over `n_classes` zero-based labels.
    Classification {
        /// `max(label) + 1` over the training targets.
        n_classes: usize,
    },
    /// Regression over real-valued targets.
    Regression,
}

/// Configuration for a single decision tree.
///
/// Construct via [`DecisionTreeConfig::new`], then chain `with_*` methods.
/// Parameters are validated at the start of `fit`.
///
/// # Defaults
///
/// | Parameter               | Default               |
/// |-------------------------|-----------------------|
/// | `max_depth`             | `None` (unlimited)    |
/// | `min_samples_split`     | 2                     |
/// | `max_features`          | `None` (all features) |
/// | `min_impurity_decrease` | 0.0                   |
/// | `seed`                  | 42                    |
#[derive(Debug, Clone)]
pub struct DecisionTreeConfig {
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) max_features: Option<usize>,
    pub(crate) min_impurity_decrease: f64,
    pub(crate) seed: u64,
}

impl DecisionTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            min_impurity_decrease: 0.0,
            seed: 42,
        }
    }

    /// Set the maximum tree depth.
    ///
    /// `None` grows until all leaves are pure or stopping conditions are
    /// met. `Some(d)` limits depth to `d` levels (root is depth 0);
    /// `Some(0)` yields a single-leaf stump.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the number of features drawn (without replacement) at each node.
    ///
    /// `None` means consider all features, in column order.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the minimum information gain required to split instead of
    /// emitting a leaf.
    #[must_use]
    pub fn with_min_impurity_decrease(mut self, min_impurity_decrease: f64) -> Self {
        self.min_impurity_decrease = min_impurity_decrease;
        self
    }

    /// Set the random seed for the per-node feature draws.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the minimum samples required to split a node.
    #[must_use]
    pub fn min_samples_split(&self) -> usize {
        self.min_samples_split
    }

    /// Return the per-node feature draw count, if set.
    #[must_use]
    pub fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    /// Return the minimum information gain required to split.
    #[must_use]
    pub fn min_impurity_decrease(&self) -> f64 {
        self.min_impurity_decrease
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Train a decision tree on the provided row-major dataset.
    ///
    /// `features[sample_idx][feature_idx]` — row-major layout. The
    /// [`Targets`] variant selects classification or regression for the
    /// whole tree.
    ///
    /// # Errors
    ///
    /// | Variant                                     | When                                            |
    /// |---------------------------------------------|-------------------------------------------------|
    /// | [`ForestError::EmptyDataset`]               | `features` is empty                             |
    /// | [`ForestError::ZeroFeatures`]               | rows have zero feature columns                  |
    /// | [`ForestError::FeatureCountMismatch`]       | rows have inconsistent lengths                  |
    /// | [`ForestError::NonFiniteValue`]             | any feature value is NaN or infinite            |
    /// | [`ForestError::TargetCountMismatch`]        | `targets.len() != features.len()`               |
    /// | [`ForestError::NonFiniteTarget`]            | a regression target is NaN or infinite          |
    /// | [`ForestError::InvalidMinSamplesSplit`]     | `min_samples_split` < 2                         |
    /// | [`ForestError::InvalidMinImpurityDecrease`] | `min_impurity_decrease` negative or non-finite  |
    /// | [`ForestError::InvalidMaxFeatures`]         | `max_features` outside [1, n_features]          |
    #[instrument(skip(self, features, targets), fields(n_samples = features.len()))]
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        targets: Targets<'_>,
    ) -> Result<DecisionTree, ForestError> {
        let (n_samples, n_features) = validate_features(features)?;
        validate_targets(&targets, n_samples)?;
        self.validate(n_features)?;

        let n_classes = targets.n_classes();
        let kind = match targets {
            Targets::Labels(_) => TreeKind::Classification { n_classes },
            Targets::Values(_) => TreeKind::Regression,
        };

        debug!(n_samples, n_features, ?kind, "fitting decision tree");

        // Column-major copy for the split scan.
        let columns: Vec<Vec<f64>> = (0..n_features)
            .map(|feat_idx| features.iter().map(|row| row[feat_idx]).collect())
            .collect();

        let sample_indices: Vec<usize> = (0..n_samples).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut arena: Vec<Node> = Vec::new();

        let root = grow(
            &columns,
            &targets,
            &sample_indices,
            n_classes,
            self,
            0,
            &mut rng,
            &mut arena,
        );

        debug!(
            root_index = root.index(),
            n_nodes = arena.len(),
            "decision tree built"
        );

        Ok(DecisionTree {
            nodes: arena,
            n_features,
            kind,
        })
    }

    fn validate(&self, n_features: usize) -> Result<(), ForestError> {
        if self.min_samples_split < 2 {
            return Err(ForestError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if !self.min_impurity_decrease.is_finite() || self.min_impurity_decrease < 0.0 {
            return Err(ForestError::InvalidMinImpurityDecrease {
                min_impurity_decrease: self.min_impurity_decrease,
            });
        }
        if let Some(m) = self.max_features
            && (m == 0 || m > n_features)
        {
            return Err(ForestError::InvalidMaxFeatures {
                max_features: m,
                n_features,
            });
        }
        Ok(())
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Check the feature matrix: non-empty, rectangular, all values finite.
///
/// Returns `(n_samples, n_features)`.
pub(crate) fn validate_features(features: &[Vec<f64>]) -> Result<(usize, usize), ForestError> {
    if features.is_empty() {
        return Err(ForestError::EmptyDataset);
    }
    let n_samples = features.len();
    let n_features = features[0].len();
    if n_features == 0 {
        return Err(ForestError::ZeroFeatures);
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(ForestError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        for (feature_index, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(ForestError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
    }
    Ok((n_samples, n_features))
}

/// Check target length against the sample count, and regression targets
/// for finiteness.
pub(crate) fn validate_targets(targets: &Targets<'_>, n_samples: usize) -> Result<(), ForestError> {
    if targets.len() != n_samples {
        return Err(ForestError::TargetCountMismatch {
            n_samples,
            n_targets: targets.len(),
        });
    }
    if let Targets::Values(values) = targets {
        for (sample_index, &v) in values.iter().enumerate() {
            if !v.is_finite() {
                return Err(ForestError::NonFiniteTarget { sample_index });
            }
        }
    }
    Ok(())
}

/// Recursively grow the arena-based tree; returns the index of the node
/// just created.
#[allow(clippy::too_many_arguments)]
fn grow(
    columns: &[Vec<f64>],
    targets: &Targets<'_>,
    sample_indices: &[usize],
    n_classes: usize,
    config: &DecisionTreeConfig,
    depth: usize,
    rng: &mut ChaCha8Rng,
    arena: &mut Vec<Node>,
) -> NodeIndex {
    let n_samples = sample_indices.len();
    let impurity = node_impurity(targets, sample_indices, n_classes);

    let make_leaf = |arena: &mut Vec<Node>| -> NodeIndex {
        let value = targets
            .leaf_value(sample_indices)
            .expect("a grown node always holds at least one sample");
        let idx = arena.len();
        arena.push(Node::Leaf {
            value,
            impurity,
            n_samples,
        });
        NodeIndex::new(idx)
    };

    // Stopping tests, in order: depth cap, pure targets, too few samples.
    let depth_exceeded = config.max_depth.is_some_and(|max_d| depth >= max_d);
    if depth_exceeded
        || targets.is_constant(sample_indices)
        || n_samples < config.min_samples_split
    {
        return make_leaf(arena);
    }

    let feature_order = sample_features(columns.len(), config.max_features, rng);
    let split = match find_best_split(columns, targets, sample_indices, n_classes, &feature_order) {
        Some(s) => s,
        None => return make_leaf(arena),
    };

    if split.gain < config.min_impurity_decrease {
        debug!(depth, gain = split.gain, "gain below threshold, emitting leaf");
        return make_leaf(arena);
    }

    // Should not occur: an empty side scores gain 0 and the scan skips it.
    // Re-checked per the growth contract.
    if split.left_indices.is_empty() || split.right_indices.is_empty() {
        return make_leaf(arena);
    }

    // Arena pattern: reserve the index, recurse, then overwrite.
    let node_idx = arena.len();
    arena.push(Node::Leaf {
        value: LeafValue::Label(0),
        impurity,
        n_samples,
    });

    let left = grow(
        columns,
        targets,
        &split.left_indices,
        n_classes,
        config,
        depth + 1,
        rng,
        arena,
    );
    let right = grow(
        columns,
        targets,
        &split.right_indices,
        n_classes,
        config,
        depth + 1,
        rng,
        arena,
    );

    arena[node_idx] = Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left,
        right,
        impurity,
        n_samples,
    };

    NodeIndex::new(node_idx)
}

/// A fitted decision tree.
///
/// Stored as an arena of [`Node`]s with index references, root at index 0.
/// Read-only after fitting; prediction is a side-effect-free traversal.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) n_features: usize,
    pub(crate) kind: TreeKind,
}

impl DecisionTree {
    /// Predict the leaf value for a single sample.
    ///
    /// Traverses from the root: at each split, goes left when
    /// `sample[feature] <= threshold`, right otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] when
    /// `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<LeafValue, ForestError> {
        if sample.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        let leaf = self.traverse(sample);
        match &self.nodes[leaf] {
            Node::Leaf { value, .. } => Ok(*value),
            Node::Split { .. } => unreachable!("traverse always ends at a leaf"),
        }
    }

    /// Predict leaf values for a batch of samples, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] if any sample has
    /// the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<LeafValue>, ForestError> {
        features.iter().map(|sample| self.predict(sample)).collect()
    }

    /// Return the node arena for read-only inspection (visualization,
    /// diagnostics). The root is at index 0.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Return the learning mode of this tree.
    #[must_use]
    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    /// Return the number of features this tree was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the total number of nodes (splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree; a single-leaf tree has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        // Iterative BFS over the arena.
        let mut max_depth = 0usize;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, 0usize));

        while let Some((node_idx, d)) = queue.pop_front() {
            match &self.nodes[node_idx] {
                Node::Leaf { .. } => {
                    if d > max_depth {
                        max_depth = d;
                    }
                }
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }

        max_depth
    }

    /// Traverse from the root and return the arena index of the leaf.
    fn traverse(&self, sample: &[f64]) -> usize {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if sample[feature.index()] <= *threshold {
                        idx = left.index();
                    } else {
                        idx = right.index();
                    }
                }
            }
        }
    }
}
