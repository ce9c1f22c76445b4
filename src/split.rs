//! Impurity measures and the greedy best-split search.

use rand::Rng;

use crate::node::{FeatureIndex, Impurity};
use crate::target::{Targets, class_counts};

/// Shannon entropy of a class-count tally, in bits: `-Σ p·log2(p)`.
///
/// Zero samples count as a pure (zero-entropy) node.
pub(crate) fn entropy(counts: &[usize], n_samples: usize) -> Impurity {
    if n_samples == 0 {
        return Impurity::new(0.0);
    }
    let n = n_samples as f64;
    let value = -counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            p * p.log2()
        })
        .sum::<f64>();
    Impurity::new(value)
}

/// Mean squared error around the mean, from running moments.
///
/// `E[x²] - E[x]²`; clamped at zero against rounding on near-constant data.
fn mse_from_moments(sum: f64, sum_sq: f64, n_samples: usize) -> f64 {
    if n_samples == 0 {
        return 0.0;
    }
    let n = n_samples as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Impurity of a sample subset under the tree's learning mode.
pub(crate) fn node_impurity(targets: &Targets<'_>, indices: &[usize], n_classes: usize) -> Impurity {
    match targets {
        Targets::Labels(labels) => {
            let counts = class_counts(labels, indices, n_classes);
            entropy(&counts, indices.len())
        }
        Targets::Values(values) => {
            let mut sum = 0.0;
            let mut sum_sq = 0.0;
            for &i in indices {
                sum += values[i];
                sum_sq += values[i] * values[i];
            }
            Impurity::new(mse_from_moments(sum, sum_sq, indices.len()))
        }
    }
}

/// The winning split for a node.
#[derive(Debug, Clone)]
pub(crate) struct BestSplit {
    /// Feature used for the split.
    pub(crate) feature: FeatureIndex,
    /// Threshold value; samples with `value <= threshold` go left.
    pub(crate) threshold: f64,
    /// Information gain: parent impurity minus weighted child impurity.
    pub(crate) gain: f64,
    /// Sample indices going to the left child, in input order.
    pub(crate) left_indices: Vec<usize>,
    /// Sample indices going to the right child, in input order.
    pub(crate) right_indices: Vec<usize>,
}

/// Choose the candidate features for one node.
///
/// `Some(m)` draws `m` distinct feature indices without replacement via a
/// partial Fisher-Yates shuffle of the RNG; `None` keeps all features in
/// column order. The draw order is the search order.
pub(crate) fn sample_features(
    n_features: usize,
    max_features: Option<usize>,
    rng: &mut impl Rng,
) -> Vec<usize> {
    match max_features {
        None => (0..n_features).collect(),
        Some(m) => {
            let take = m.min(n_features);
            let mut order: Vec<usize> = (0..n_features).collect();
            for i in 0..take {
                let j = rng.gen_range(i..n_features);
                order.swap(i, j);
            }
            order.truncate(take);
            order
        }
    }
}

/// Find the best split across the candidate features.
///
/// For each feature (in `feature_order`), every unique value present in the
/// column is a candidate threshold, scanned ascending with incremental class
/// counts (classification) or running moments (regression). Gain is the
/// parent impurity minus the sample-weighted child impurity; the single best
/// split is tracked by strictly-greater gain, so the first candidate seen
/// wins ties. A split that would leave either side empty scores gain 0 and
/// is never evaluated as a boundary.
///
/// Returns `None` when no candidate boundary exists (all selected columns
/// constant over the subset).
///
/// # Column-major layout
///
/// `columns[feature_idx][sample_idx]`; `sample_indices` index into the
/// inner Vecs.
pub(crate) fn find_best_split(
    columns: &[Vec<f64>],
    targets: &Targets<'_>,
    sample_indices: &[usize],
    n_classes: usize,
    feature_order: &[usize],
) -> Option<BestSplit> {
    let n_samples = sample_indices.len();
    if n_samples < 2 {
        return None;
    }

    let parent = node_impurity(targets, sample_indices, n_classes).value();

    let mut best: Option<(FeatureIndex, f64, f64)> = None;

    for &feat_idx in feature_order {
        let col = &columns[feat_idx];

        let mut sorted: Vec<(f64, usize)> =
            sample_indices.iter().map(|&si| (col[si], si)).collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        match targets {
            Targets::Labels(labels) => {
                let mut left_counts = vec![0usize; n_classes];
                let mut right_counts = class_counts(labels, sample_indices, n_classes);

                for i in 0..(n_samples - 1) {
                    let (val, si) = sorted[i];
                    let class = labels[si];
                    left_counts[class] += 1;
                    right_counts[class] -= 1;

                    // A boundary only exists where the sorted value changes.
                    if val == sorted[i + 1].0 {
                        continue;
                    }

                    let n_left = i + 1;
                    let n_right = n_samples - n_left;
                    let gain = parent
                        - (n_left as f64 / n_samples as f64)
                            * entropy(&left_counts, n_left).value()
                        - (n_right as f64 / n_samples as f64)
                            * entropy(&right_counts, n_right).value();

                    if best.is_none_or(|(_, _, g)| gain > g) {
                        best = Some((FeatureIndex::new(feat_idx), val, gain));
                    }
                }
            }
            Targets::Values(values) => {
                let mut right_sum = 0.0;
                let mut right_sq = 0.0;
                for &si in sample_indices {
                    right_sum += values[si];
                    right_sq += values[si] * values[si];
                }
                let mut left_sum = 0.0;
                let mut left_sq = 0.0;

                for i in 0..(n_samples - 1) {
                    let (val, si) = sorted[i];
                    let y = values[si];
                    left_sum += y;
                    left_sq += y * y;
                    right_sum -= y;
                    right_sq -= y * y;

                    if val == sorted[i + 1].0 {
                        continue;
                    }

                    let n_left = i + 1;
                    let n_right = n_samples - n_left;
                    let gain = parent
                        - (n_left as f64 / n_samples as f64)
                            * mse_from_moments(left_sum, left_sq, n_left)
                        - (n_right as f64 / n_samples as f64)
                            * mse_from_moments(right_sum, right_sq, n_right);

                    if best.is_none_or(|(_, _, g)| gain > g) {
                        best = Some((FeatureIndex::new(feat_idx), val, gain));
                    }
                }
            }
        }
    }

    let (feature, threshold, gain) = best?;

    // Partition in input order: `<= threshold` left, `> threshold` right.
    let col = &columns[feature.index()];
    let mut left_indices = Vec::with_capacity(n_samples / 2);
    let mut right_indices = Vec::with_capacity(n_samples / 2);
    for &si in sample_indices {
        if col[si] <= threshold {
            left_indices.push(si);
        } else {
            right_indices.push(si);
        }
    }

    Some(BestSplit {
        feature,
        threshold,
        gain,
        left_indices,
        right_indices,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{entropy, find_best_split, node_impurity, sample_features};
    use crate::target::Targets;

    #[test]
    fn entropy_pure_is_zero() {
        assert!((entropy(&[10, 0, 0], 10).value() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn entropy_balanced_binary_is_one_bit() {
        assert!((entropy(&[5, 5], 10).value() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn entropy_empty_is_zero() {
        assert!((entropy(&[], 0).value() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mse_impurity_of_constant_is_zero() {
        let targets = Targets::Values(&[2.0, 2.0, 2.0]);
        let imp = node_impurity(&targets, &[0, 1, 2], 0);
        assert!((imp.value() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mse_impurity_known_value() {
        // Values [0, 2]: mean 1, MSE = 1.
        let targets = Targets::Values(&[0.0, 2.0]);
        let imp = node_impurity(&targets, &[0, 1], 0);
        assert!((imp.value() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn separable_labels_split_on_boundary_value() {
        let columns = vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let targets = Targets::Labels(&labels);
        let indices: Vec<usize> = (0..6).collect();

        let split = find_best_split(&columns, &targets, &indices, 2, &[0])
            .expect("should find a split");
        assert_eq!(split.feature.index(), 0);
        // Threshold is the unique value at the boundary, not a midpoint.
        assert!((split.threshold - 3.0).abs() < f64::EPSILON);
        assert_eq!(split.left_indices, vec![0, 1, 2]);
        assert_eq!(split.right_indices, vec![3, 4, 5]);
    }

    #[test]
    fn partition_invariants_hold() {
        let columns = vec![vec![5.0, 1.0, 3.0, 4.0, 2.0]];
        let labels = vec![1, 0, 0, 1, 0];
        let targets = Targets::Labels(&labels);
        let indices: Vec<usize> = (0..5).collect();

        let split = find_best_split(&columns, &targets, &indices, 2, &[0]).unwrap();
        for &i in &split.left_indices {
            assert!(columns[0][i] <= split.threshold);
        }
        for &i in &split.right_indices {
            assert!(columns[0][i] > split.threshold);
        }
        let mut all: Vec<usize> = split
            .left_indices
            .iter()
            .chain(split.right_indices.iter())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, indices);
    }

    #[test]
    fn constant_feature_no_split() {
        let columns = vec![vec![5.0, 5.0, 5.0, 5.0]];
        let labels = vec![0, 0, 1, 1];
        let targets = Targets::Labels(&labels);
        let result = find_best_split(&columns, &targets, &[0, 1, 2, 3], 2, &[0]);
        assert!(result.is_none());
    }

    #[test]
    fn empty_side_threshold_never_selected() {
        // The largest unique value (2.0) would send everything left; the
        // chosen threshold must be the interior boundary 1.0.
        let columns = vec![vec![1.0, 1.0, 2.0, 2.0]];
        let labels = vec![0, 0, 1, 1];
        let targets = Targets::Labels(&labels);
        let split = find_best_split(&columns, &targets, &[0, 1, 2, 3], 2, &[0]).unwrap();
        assert!((split.threshold - 1.0).abs() < f64::EPSILON);
        assert_eq!(split.left_indices.len(), 2);
        assert_eq!(split.right_indices.len(), 2);
    }

    #[test]
    fn tie_prefers_first_feature_in_order() {
        // Both columns separate the labels perfectly with identical gain.
        let columns = vec![
            vec![0.0, 0.0, 1.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
        ];
        let labels = vec![0, 0, 1, 1];
        let targets = Targets::Labels(&labels);

        let split = find_best_split(&columns, &targets, &[0, 1, 2, 3], 2, &[1, 0]).unwrap();
        assert_eq!(split.feature.index(), 1, "first feature in search order wins ties");
    }

    #[test]
    fn regression_split_reduces_mse() {
        let columns = vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]];
        let values = vec![0.0, 0.1, 0.2, 5.0, 5.1, 5.2];
        let targets = Targets::Values(&values);
        let split = find_best_split(&columns, &targets, &[0, 1, 2, 3, 4, 5], 0, &[0]).unwrap();
        assert!((split.threshold - 3.0).abs() < f64::EPSILON);
        assert!(split.gain > 0.0);
    }

    #[test]
    fn sample_features_all_in_order() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let order = sample_features(4, None, &mut rng);
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn sample_features_draws_distinct() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let order = sample_features(10, Some(4), &mut rng);
        assert_eq!(order.len(), 4);
        let mut dedup = order.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), 4, "feature draw must be without replacement");
    }

    #[test]
    fn sample_features_reproducible() {
        let mut rng1 = ChaCha8Rng::seed_from_u64(7);
        let mut rng2 = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(
            sample_features(20, Some(5), &mut rng1),
            sample_features(20, Some(5), &mut rng2)
        );
    }
}
