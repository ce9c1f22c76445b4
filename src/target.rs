//! Training targets and the shared majority-vote rule.

use crate::node::LeafValue;

/// Borrowed target vector for `fit`.
///
/// The variant selects the learning mode for the whole tree: `Labels`
/// grows a classification tree (entropy impurity, majority-label leaves),
/// `Values` grows a regression tree (MSE impurity, mean leaves).
#[derive(Debug, Clone, Copy)]
pub enum Targets<'a> {
    /// Class labels, zero-based and usable as array indices.
    Labels(&'a [usize]),
    /// Real-valued regression targets.
    Values(&'a [f64]),
}

impl Targets<'_> {
    /// Return the number of target entries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Targets::Labels(l) => l.len(),
            Targets::Values(v) => v.len(),
        }
    }

    /// Return `true` when there are no target entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return `max(label) + 1` for classification targets, 0 for regression.
    pub(crate) fn n_classes(&self) -> usize {
        match self {
            Targets::Labels(labels) => labels.iter().max().map_or(0, |&m| m + 1),
            Targets::Values(_) => 0,
        }
    }

    /// Return `true` when every selected target is identical (a pure node).
    pub(crate) fn is_constant(&self, indices: &[usize]) -> bool {
        match self {
            Targets::Labels(labels) => {
                let first = labels[indices[0]];
                indices.iter().all(|&i| labels[i] == first)
            }
            Targets::Values(values) => {
                let first = values[indices[0]];
                indices.iter().all(|&i| values[i] == first)
            }
        }
    }

    /// Compute the leaf prediction for the selected samples: majority label
    /// for classification, mean for regression.
    ///
    /// Returns `None` when `indices` is empty — an unavailable prediction,
    /// never a silent label 0.
    pub(crate) fn leaf_value(&self, indices: &[usize]) -> Option<LeafValue> {
        if indices.is_empty() {
            return None;
        }
        match self {
            Targets::Labels(labels) => {
                let n_classes = indices.iter().map(|&i| labels[i]).max().map_or(0, |m| m + 1);
                let counts = class_counts(labels, indices, n_classes);
                majority_label(&counts).map(LeafValue::Label)
            }
            Targets::Values(values) => {
                let sum: f64 = indices.iter().map(|&i| values[i]).sum();
                Some(LeafValue::Mean(sum / indices.len() as f64))
            }
        }
    }
}

/// Tally class counts over a subset of samples.
pub(crate) fn class_counts(labels: &[usize], indices: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in indices {
        counts[labels[i]] += 1;
    }
    counts
}

/// First-max argmax over a vote tally: the most frequent label, ties broken
/// by the lowest label id.
///
/// Returns `None` when every count is zero. Callers must treat that as
/// "no prediction available", not as label 0. This single rule backs leaf
/// assignment, ensemble voting, and OOB scoring.
#[must_use]
pub fn majority_label(counts: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (label, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        // Strictly greater keeps the first (lowest) label on ties.
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label)
}
