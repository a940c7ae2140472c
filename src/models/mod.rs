//! Outlier detection models and their lifecycle

pub mod isolation_forest;
pub mod lifecycle;

pub use isolation_forest::IsolationForest;
pub use lifecycle::{BatchOutcome, LifecyclePhase, ModelLifecycleManager};

use crate::error::Result;
use crate::feature_extractor::FeatureVector;
use serde::{Deserialize, Serialize};

/// Per-vector binary decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Normal,
    Outlier,
}

impl Label {
    pub fn is_outlier(self) -> bool {
        self == Label::Outlier
    }
}

/// Unsupervised outlier detection capability.
///
/// Scores follow the "higher = more normal" convention and are only comparable
/// between calls against the same fit.
pub trait OutlierModel: Send + Sync {
    /// Fit the model on a corpus treated as normal behaviour
    fn fit(&mut self, corpus: &[FeatureVector]) -> Result<()>;

    /// Score each vector; lower means more anomalous
    fn score(&self, batch: &[FeatureVector]) -> Result<Vec<f64>>;

    /// Label each vector using the fitted decision boundary
    fn predict_label(&self, batch: &[FeatureVector]) -> Result<Vec<Label>>;

    /// Get model name
    fn name(&self) -> &str;

    /// Check if the model has been fitted
    fn is_fitted(&self) -> bool;
}
