//! Error taxonomy for the anomaly engine.

use thiserror::Error;

/// Errors raised by feature extraction, the outlier model, and the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("insufficient data: need at least {needed} positions, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("invalid position at index {index}: {reason}")]
    InvalidPosition { index: usize, reason: String },

    #[error("feature batch is empty")]
    DegenerateFeatureBatch,

    #[error("model fit failed: {0}")]
    ModelFitFailure(String),

    #[error("model has not been fitted")]
    ModelNotFitted,

    #[error("inconsistent model output: {0}")]
    InconsistentModelOutput(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("model state lock poisoned")]
    StatePoisoned,
}

impl EngineError {
    /// Whether the failure was caused by the caller's input rather than the engine.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientData { .. } | EngineError::InvalidPosition { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
