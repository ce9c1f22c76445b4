//! Random Forest classification and regression trees: train, evaluate,
//! predict.
//!
//! Provides a hand-rolled CART decision tree learner (entropy for
//! classification, MSE for regression) and a bagged Random Forest
//! ensemble on top of it, with parallel training via rayon, out-of-bag
//! evaluation, and model serialization.

mod config;
mod confusion;
mod error;
mod forest;
mod node;
mod oob;
mod serialize;
mod split;
mod target;
mod tree;

pub use config::{MaxFeatures, OobMode, RandomForestConfig};
pub use confusion::{ClassMetrics, ConfusionMatrix};
pub use error::ForestError;
pub use forest::RandomForest;
pub use node::{FeatureIndex, Impurity, LeafValue, Node, NodeIndex};
pub use oob::OobScore;
pub use target::{Targets, majority_label};
pub use tree::{DecisionTree, DecisionTreeConfig, TreeKind};
