//! Model lifecycle: train once on the first batch, then score everything after.
//!
//! The first batch ever submitted becomes the baseline of "normal" movement and
//! is never revisited. A poisoned first request therefore skews the model for
//! the lifetime of the process.

use super::{Label, OutlierModel};
use crate::error::{EngineError, Result};
use crate::feature_extractor::FeatureVector;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

/// Lifecycle phase of the shared model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Untrained,
    Trained,
}

/// Result of handing one batch to the lifecycle manager
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The batch was absorbed into the corpus and the model was fitted
    TrainingCompleted { corpus_size: usize },
    /// The batch was scored against the frozen model
    Scored { labels: Vec<Label>, scores: Vec<f64> },
}

struct ModelState<M> {
    phase: LifecyclePhase,
    corpus: Vec<FeatureVector>,
    model: M,
}

/// Sole owner of the process-wide model state.
///
/// Every transition and every scoring call runs under one mutex, so the
/// `Untrained -> Trained` transition happens at most once and scoring never
/// observes a half-fitted model.
pub struct ModelLifecycleManager<M: OutlierModel> {
    state: Mutex<ModelState<M>>,
}

impl<M: OutlierModel> ModelLifecycleManager<M> {
    /// Wrap an unfitted model
    pub fn new(model: M) -> Self {
        Self {
            state: Mutex::new(ModelState {
                phase: LifecyclePhase::Untrained,
                corpus: Vec::new(),
                model,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ModelState<M>>> {
        self.state.lock().map_err(|_| EngineError::StatePoisoned)
    }

    /// Train on the batch if untrained, otherwise score it
    pub fn process_batch(&self, batch: &[FeatureVector]) -> Result<BatchOutcome> {
        if batch.is_empty() {
            warn!("Refusing to process empty feature batch");
            return Err(EngineError::DegenerateFeatureBatch);
        }

        let mut guard = self.lock()?;
        let state = &mut *guard;

        match state.phase {
            LifecyclePhase::Untrained => {
                let prior_len = state.corpus.len();
                state.corpus.extend_from_slice(batch);

                if let Err(e) = state.model.fit(&state.corpus) {
                    state.corpus.truncate(prior_len);
                    error!(
                        model = %state.model.name(),
                        error = %e,
                        "Model fit failed, staying untrained"
                    );
                    return Err(e);
                }

                state.phase = LifecyclePhase::Trained;
                let corpus_size = state.corpus.len();

                info!(
                    model = %state.model.name(),
                    corpus_size = corpus_size,
                    "Model trained on first batch"
                );

                Ok(BatchOutcome::TrainingCompleted { corpus_size })
            }
            LifecyclePhase::Trained => {
                let scores = state.model.score(batch)?;
                let labels = state.model.predict_label(batch)?;
                Ok(BatchOutcome::Scored { labels, scores })
            }
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Result<LifecyclePhase> {
        Ok(self.lock()?.phase)
    }

    /// Number of feature vectors the model was (or will be) trained on
    pub fn corpus_size(&self) -> Result<usize> {
        Ok(self.lock()?.corpus.len())
    }

    /// Name of the wrapped model
    pub fn model_name(&self) -> Result<String> {
        Ok(self.lock()?.model.name().to_string())
    }
}
