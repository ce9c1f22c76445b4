//! Random Forest training with parallel tree construction and
//! majority-vote prediction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::{MaxFeatures, OobMode, RandomForestConfig};
use crate::error::ForestError;
use crate::node::LeafValue;
use crate::oob::{OobScore, compute_oob};
use crate::target::{Targets, majority_label};
use crate::tree::{DecisionTree, DecisionTreeConfig, validate_features, validate_targets};

/// A fitted Random Forest classifier.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) n_features: usize,
    pub(crate) n_classes: usize,
    pub(crate) oob_score: Option<OobScore>,
}

/// Resolve a [`MaxFeatures`] strategy to a concrete per-node draw count.
pub(crate) fn resolve_max_features(
    max_features: MaxFeatures,
    n_features: usize,
) -> Result<usize, ForestError> {
    let resolved = match max_features {
        MaxFeatures::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
        MaxFeatures::Fixed(n) => n,
        MaxFeatures::All => n_features,
    };
    if resolved == 0 || resolved > n_features {
        return Err(ForestError::InvalidMaxFeatures {
            max_features: resolved,
            n_features,
        });
    }
    Ok(resolved)
}

/// Draw a bootstrap sample (`n_samples` indices with replacement) and its
/// out-of-bag complement (indices never drawn).
fn bootstrap_sample(n_samples: usize, rng: &mut impl Rng) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

/// The output of one independent training round.
struct RoundResult {
    tree: DecisionTree,
    oob_indices: Vec<usize>,
    oob_predictions: Vec<usize>,
}

/// Train the Random Forest ensemble.
#[instrument(skip_all, fields(n_trees = config.n_trees, n_samples = features.len()))]
pub(crate) fn train(
    config: &RandomForestConfig,
    features: &[Vec<f64>],
    labels: &[usize],
) -> Result<RandomForest, ForestError> {
    let (n_samples, n_features) = validate_features(features)?;
    validate_targets(&Targets::Labels(labels), n_samples)?;

    let max_features = resolve_max_features(config.max_features, n_features)?;
    let n_classes = labels.iter().max().map_or(0, |&m| m + 1);

    info!(
        n_trees = config.n_trees,
        n_samples,
        n_features,
        n_classes,
        max_features,
        "training random forest"
    );

    // Per-round sub-seeds, drawn sequentially from the master RNG before
    // dispatch so bootstrap draws are independent of worker scheduling.
    let mut master_rng = ChaCha8Rng::seed_from_u64(config.seed);
    let seeds: Vec<u64> = (0..config.n_trees).map(|_| master_rng.r#gen()).collect();

    let tree_config = DecisionTreeConfig::new()
        .with_max_depth(config.max_depth)
        .with_min_samples_split(config.min_samples_split)
        .with_min_impurity_decrease(config.min_impurity_decrease)
        .with_max_features(Some(max_features));

    let run_rounds = || -> Vec<RoundResult> {
        seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let (bootstrap_indices, oob_indices) = bootstrap_sample(n_samples, &mut rng);

                let boot_features: Vec<Vec<f64>> = bootstrap_indices
                    .iter()
                    .map(|&i| features[i].clone())
                    .collect();
                let boot_labels: Vec<usize> =
                    bootstrap_indices.iter().map(|&i| labels[i]).collect();

                // All inputs are pre-validated; fit cannot fail on data errors.
                let tree = tree_config
                    .clone()
                    .with_seed(rng.r#gen())
                    .fit(&boot_features, Targets::Labels(&boot_labels))
                    .expect("tree fit should not fail on pre-validated data");

                // An empty OOB set contributes a tree but no votes; this is
                // a normal condition, not an error.
                let oob_predictions: Vec<usize> = oob_indices
                    .iter()
                    .map(|&i| predict_label(&tree, &features[i]))
                    .collect();

                RoundResult {
                    tree,
                    oob_indices,
                    oob_predictions,
                }
            })
            .collect()
    };

    let rounds = match config.threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|source| ForestError::ThreadPool { threads, source })?;
            pool.install(run_rounds)
        }
        None => run_rounds(),
    };

    // Single-threaded fold: trees append in round order, OOB votes
    // accumulate (commutative adds, arrival order irrelevant).
    let mut trees = Vec::with_capacity(config.n_trees);
    let mut votes: Vec<Vec<usize>> = vec![vec![0; n_classes]; n_samples];
    for round in rounds {
        for (&idx, &pred) in round.oob_indices.iter().zip(&round.oob_predictions) {
            votes[idx][pred] += 1;
        }
        trees.push(round.tree);
    }

    debug!(n_trees_trained = trees.len(), "tree training complete");

    let oob_score = match config.oob_mode {
        OobMode::Enabled => compute_oob(&votes, labels, n_classes),
        OobMode::Disabled => None,
    };

    info!(
        oob_accuracy = oob_score.as_ref().map(|s| s.accuracy),
        "random forest training complete"
    );

    Ok(RandomForest {
        trees,
        n_features,
        n_classes,
        oob_score,
    })
}

/// Predict a class label with a tree trained by this forest.
///
/// The forest only grows classification trees on validated data, so both
/// failure paths are unreachable by construction.
fn predict_label(tree: &DecisionTree, sample: &[f64]) -> usize {
    match tree.predict(sample) {
        Ok(LeafValue::Label(label)) => label,
        Ok(LeafValue::Mean(_)) => unreachable!("forest trees are classification trees"),
        Err(_) => unreachable!("forest samples match the trained feature count"),
    }
}

impl RandomForest {
    /// Predict the class label for a single sample.
    ///
    /// Every tree votes with its own prediction; the output is the mode,
    /// ties broken toward the lowest label id.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] when
    /// `sample.len() != n_features`.
    pub fn predict(&self, sample: &[f64]) -> Result<usize, ForestError> {
        if sample.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        let mut votes = vec![0usize; self.n_classes];
        for tree in &self.trees {
            votes[predict_label(tree, sample)] += 1;
        }
        Ok(majority_label(&votes).expect("forest holds at least one tree"))
    }

    /// Predict class labels for a batch of samples in parallel, preserving
    /// input order.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::PredictionFeatureMismatch`] if any sample has
    /// the wrong feature count.
    pub fn predict_batch(&self, features: &[Vec<f64>]) -> Result<Vec<usize>, ForestError> {
        features
            .into_par_iter()
            .map(|sample| self.predict(sample))
            .collect()
    }

    /// Return the OOB score computed during training, if any.
    ///
    /// `None` when OOB evaluation was disabled, or when every bootstrap
    /// draw covered every sample so no vote was ever recorded.
    #[must_use]
    pub fn oob_score(&self) -> Option<&OobScore> {
        self.oob_score.as_ref()
    }

    /// Return the fitted trees, in training order, for read-only inspection.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Return the number of features this forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_max_features;
    use crate::config::{MaxFeatures, OobMode, RandomForestConfig};
    use crate::error::ForestError;

    /// Generate a simple 3-class separable dataset.
    fn make_separable_data() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        // Class 0: x in [0, 3]
        for i in 0..20 {
            features.push(vec![i as f64 * 0.15, 0.5]);
            labels.push(0);
        }
        // Class 1: x in [10, 13]
        for i in 0..20 {
            features.push(vec![10.0 + i as f64 * 0.15, 0.5]);
            labels.push(1);
        }
        // Class 2: x in [20, 23]
        for i in 0..20 {
            features.push(vec![20.0 + i as f64 * 0.15, 0.5]);
            labels.push(2);
        }
        (features, labels)
    }

    #[test]
    fn sqrt_resolution_floors() {
        assert_eq!(resolve_max_features(MaxFeatures::Sqrt, 10).unwrap(), 3);
        assert_eq!(resolve_max_features(MaxFeatures::Sqrt, 16).unwrap(), 4);
        assert_eq!(resolve_max_features(MaxFeatures::Sqrt, 1).unwrap(), 1);
    }

    #[test]
    fn fixed_resolution_bounds_checked() {
        assert_eq!(resolve_max_features(MaxFeatures::Fixed(2), 5).unwrap(), 2);
        assert!(matches!(
            resolve_max_features(MaxFeatures::Fixed(6), 5).unwrap_err(),
            ForestError::InvalidMaxFeatures { max_features: 6, n_features: 5 }
        ));
        assert!(resolve_max_features(MaxFeatures::Fixed(0), 5).is_err());
    }

    #[test]
    fn three_class_separable_accuracy() {
        let (features, labels) = make_separable_data();
        let config = RandomForestConfig::new(50)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(42);
        let forest = config.fit(&features, &labels).unwrap();

        let predictions = forest.predict_batch(&features).unwrap();
        let correct = predictions
            .iter()
            .zip(&labels)
            .filter(|&(&p, &l)| p == l)
            .count();
        let accuracy = correct as f64 / labels.len() as f64;
        assert!(accuracy > 0.9, "accuracy = {accuracy}");
    }

    #[test]
    fn oob_score_computed_by_default() {
        let (features, labels) = make_separable_data();
        let config = RandomForestConfig::new(50).unwrap().with_seed(42);
        let forest = config.fit(&features, &labels).unwrap();

        let oob = forest.oob_score().expect("OOB should be computed");
        assert!(oob.accuracy > 0.8, "oob accuracy = {}", oob.accuracy);
        assert!(oob.n_oob_samples > 0);
    }

    #[test]
    fn oob_disabled_skips_score() {
        let (features, labels) = make_separable_data();
        let forest = RandomForestConfig::new(10)
            .unwrap()
            .with_oob_mode(OobMode::Disabled)
            .fit(&features, &labels)
            .unwrap();
        assert!(forest.oob_score().is_none());
    }

    #[test]
    fn single_sample_has_no_oob_score() {
        // Every bootstrap of one sample draws that sample; the OOB set is
        // always empty and no score can be produced.
        let forest = RandomForestConfig::new(5)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .fit(&[vec![1.0]], &[0])
            .unwrap();
        assert_eq!(forest.n_trees(), 5);
        assert!(forest.oob_score().is_none());
        assert_eq!(forest.predict(&[1.0]).unwrap(), 0);
    }

    #[test]
    fn one_tree_forest_matches_its_tree() {
        let (features, labels) = make_separable_data();
        let forest = RandomForestConfig::new(1)
            .unwrap()
            .with_max_features(MaxFeatures::All)
            .with_seed(9)
            .fit(&features, &labels)
            .unwrap();

        let tree = &forest.trees()[0];
        for sample in &features {
            let from_tree = tree.predict(sample).unwrap().label().unwrap();
            assert_eq!(forest.predict(sample).unwrap(), from_tree);
        }
    }

    #[test]
    fn deterministic_with_same_seed() {
        let (features, labels) = make_separable_data();
        let fit = || {
            RandomForestConfig::new(10)
                .unwrap()
                .with_seed(99)
                .fit(&features, &labels)
                .unwrap()
        };
        let preds1 = fit().predict_batch(&features).unwrap();
        let preds2 = fit().predict_batch(&features).unwrap();
        assert_eq!(preds1, preds2);
    }

    #[test]
    fn thread_hint_does_not_change_predictions() {
        let (features, labels) = make_separable_data();
        let sequential = RandomForestConfig::new(8)
            .unwrap()
            .with_seed(5)
            .with_threads(Some(1))
            .fit(&features, &labels)
            .unwrap();
        let parallel = RandomForestConfig::new(8)
            .unwrap()
            .with_seed(5)
            .with_threads(Some(4))
            .fit(&features, &labels)
            .unwrap();
        assert_eq!(
            sequential.predict_batch(&features).unwrap(),
            parallel.predict_batch(&features).unwrap()
        );
    }

    #[test]
    fn empty_dataset_error() {
        let config = RandomForestConfig::new(10).unwrap();
        let err = config.fit(&[], &[]).unwrap_err();
        assert!(matches!(err, ForestError::EmptyDataset));
    }

    #[test]
    fn label_count_mismatch_error() {
        let config = RandomForestConfig::new(10).unwrap();
        let err = config.fit(&[vec![1.0], vec![2.0]], &[0]).unwrap_err();
        assert!(matches!(err, ForestError::TargetCountMismatch { .. }));
    }

    #[test]
    fn prediction_feature_mismatch_error() {
        let (features, labels) = make_separable_data();
        let forest = RandomForestConfig::new(3)
            .unwrap()
            .fit(&features, &labels)
            .unwrap();
        let err = forest.predict(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            ForestError::PredictionFeatureMismatch { expected: 2, got: 1 }
        ));
    }
}
