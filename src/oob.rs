//! Out-of-bag (OOB) scoring for Random Forest.

use crate::confusion::ConfusionMatrix;
use crate::target::majority_label;

/// Out-of-bag evaluation result.
///
/// Built from the vote accumulator filled during training: one tally row
/// per training sample, one column per class, incremented once per tree
/// for which the sample was out of bag.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OobScore {
    /// Fraction of correctly predicted OOB samples.
    pub accuracy: f64,
    /// Confusion matrix over the OOB predictions, `[true][predicted]`.
    pub confusion_matrix: ConfusionMatrix,
    /// Number of samples that received at least one OOB vote.
    pub n_oob_samples: usize,
}

/// Score the accumulated OOB votes against the true labels.
///
/// A sample's OOB prediction is the first-max argmax of its vote row
/// (ties toward the lowest label); samples with zero votes are excluded
/// from the denominator entirely. Returns `None` when no sample received
/// any vote — a normal outcome when every bootstrap covered every sample,
/// not an error and not a NaN.
pub(crate) fn compute_oob(
    votes: &[Vec<usize>],
    labels: &[usize],
    n_classes: usize,
) -> Option<OobScore> {
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for (sample_idx, row) in votes.iter().enumerate() {
        if let Some(predicted) = majority_label(row) {
            pairs.push((labels[sample_idx], predicted));
        }
    }

    if pairs.is_empty() {
        return None;
    }

    let n_oob_samples = pairs.len();
    let correct = pairs.iter().filter(|&&(t, p)| t == p).count();
    let confusion_matrix = ConfusionMatrix::from_pairs(pairs.iter().copied(), n_classes);

    Some(OobScore {
        accuracy: correct as f64 / n_oob_samples as f64,
        confusion_matrix,
        n_oob_samples,
    })
}
