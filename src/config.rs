//! Configuration builder for Random Forest training.

use crate::error::ForestError;
use crate::forest::RandomForest;

/// Strategy for the number of features drawn at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxFeatures {
    /// `⌊√(n_features)⌋`, clamped to at least 1.
    Sqrt,
    /// A fixed count.
    Fixed(usize),
    /// All features (no subsampling).
    All,
}

/// Whether to compute the out-of-bag score during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobMode {
    /// Accumulate OOB votes and compute accuracy and a confusion matrix.
    Enabled,
    /// Skip OOB evaluation.
    Disabled,
}

/// Configuration for Random Forest training.
///
/// Construct via [`RandomForestConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter               | Default    |
/// |-------------------------|------------|
/// | `max_features`          | `Sqrt`     |
/// | `max_depth`             | `None`     |
/// | `min_samples_split`     | 2          |
/// | `min_impurity_decrease` | 0.0        |
/// | `seed`                  | 42         |
/// | `oob_mode`              | `Enabled`  |
/// | `threads`               | `None` (all hardware threads) |
#[derive(Debug, Clone)]
pub struct RandomForestConfig {
    pub(crate) n_trees: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_impurity_decrease: f64,
    pub(crate) seed: u64,
    pub(crate) oob_mode: OobMode,
    pub(crate) threads: Option<usize>,
}

impl RandomForestConfig {
    /// Create a new config with the given number of trees.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidTreeCount`] if `n_trees` is zero.
    pub fn new(n_trees: usize) -> Result<Self, ForestError> {
        if n_trees == 0 {
            return Err(ForestError::InvalidTreeCount { n_trees });
        }
        Ok(Self {
            n_trees,
            max_features: MaxFeatures::Sqrt,
            max_depth: None,
            min_samples_split: 2,
            min_impurity_decrease: 0.0,
            seed: 42,
            oob_mode: OobMode::Enabled,
            threads: None,
        })
    }

    // --- Setters ---

    /// Set the max features strategy, resolved once per `fit`.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the maximum tree depth. `None` means unlimited.
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

    /// Set the minimum information gain required to split a node.
    #[must_use]
    pub fn with_min_impurity_decrease(mut self, min_impurity_decrease: f64) -> Self {
        self.min_impurity_decrease = min_impurity_decrease;
        self
    }

    /// Set the random seed for bootstrap draws and per-tree sub-seeds.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the OOB evaluation mode.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    /// Set the worker pool size for training and batch prediction.
    ///
    /// `None` uses all available hardware threads. The hint is operational
    /// only; it never changes the fitted model.
    #[must_use]
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    // --- Getters ---

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the max features strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

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

    /// Return the OOB evaluation mode.
    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    /// Return the worker pool size hint.
    #[must_use]
    pub fn threads(&self) -> Option<usize> {
        self.threads
    }

    /// Train a Random Forest classifier on the provided dataset.
    ///
    /// `features[sample_idx][feature_idx]` — row-major layout.
    /// `labels[sample_idx]` — zero-based class labels.
    ///
    /// # Errors
    ///
    /// | Variant                                     | When                                           |
    /// |---------------------------------------------|------------------------------------------------|
    /// | [`ForestError::EmptyDataset`]               | `features` is empty                            |
    /// | [`ForestError::ZeroFeatures`]               | rows have zero feature columns                 |
    /// | [`ForestError::FeatureCountMismatch`]       | rows have inconsistent lengths                 |
    /// | [`ForestError::NonFiniteValue`]             | any value is NaN or infinite                   |
    /// | [`ForestError::TargetCountMismatch`]        | `labels.len() != features.len()`               |
    /// | [`ForestError::InvalidMaxFeatures`]         | resolved max_features outside [1, n_features]  |
    /// | [`ForestError::InvalidMinSamplesSplit`]     | `min_samples_split` < 2                        |
    /// | [`ForestError::InvalidMinImpurityDecrease`] | `min_impurity_decrease` negative or non-finite |
    /// | [`ForestError::ThreadPool`]                 | the requested worker pool could not be built   |
    pub fn fit(&self, features: &[Vec<f64>], labels: &[usize]) -> Result<RandomForest, ForestError> {
        crate::forest::train(self, features, labels)
    }
}
