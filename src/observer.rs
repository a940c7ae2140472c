//! Structured observability hooks for the anomaly engine.
//!
//! The engine never prints; it reports feature batches, lifecycle transitions
//! and scores to observers, which decide where the events go.

use crate::feature_extractor::FeatureVector;
use crate::models::{Label, LifecyclePhase};
use tracing::{debug, info};

/// Receives engine events. All methods default to no-ops.
pub trait EngineObserver: Send + Sync {
    /// Features were extracted for a subject's trajectory
    fn on_features(&self, _subject_id: &str, _features: &[FeatureVector]) {}

    /// The shared model changed lifecycle phase
    fn on_phase_transition(&self, _from: LifecyclePhase, _to: LifecyclePhase, _corpus_size: usize) {}

    /// A trajectory was scored
    fn on_scored(&self, _subject_id: &str, _scores: &[f64], _labels: &[Label]) {}
}

/// Observer that emits every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EngineObserver for TracingObserver {
    fn on_features(&self, subject_id: &str, features: &[FeatureVector]) {
        debug!(
            subject_id = %subject_id,
            segments = features.len(),
            features = ?features,
            "Extracted trajectory features"
        );
    }

    fn on_phase_transition(&self, from: LifecyclePhase, to: LifecyclePhase, corpus_size: usize) {
        info!(
            from = ?from,
            to = ?to,
            corpus_size = corpus_size,
            "Model lifecycle transition"
        );
    }

    fn on_scored(&self, subject_id: &str, scores: &[f64], labels: &[Label]) {
        let outliers = labels.iter().filter(|l| l.is_outlier()).count();
        debug!(
            subject_id = %subject_id,
            scores = ?scores,
            outliers = outliers,
            "Scored trajectory"
        );
    }
}
