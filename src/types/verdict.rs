//! Verdict returned for every analyzed trajectory

use serde::{Deserialize, Serialize};

pub const EXPLANATION_TRAINING: &str = "training complete";
pub const EXPLANATION_ANOMALY: &str = "anomaly detected";
pub const EXPLANATION_NORMAL: &str = "no anomaly";

/// Which branch of the model lifecycle produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictPhase {
    /// The trajectory was absorbed as the baseline; nothing was scored.
    TrainingCompleted,
    /// The trajectory was scored against the fitted baseline.
    Scored,
}

/// Outcome of analyzing one trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub phase: VerdictPhase,

    /// True when at least one segment was labelled an outlier
    pub anomaly: bool,

    /// Minimum per-segment score (lower = more anomalous); 0.0 while training
    pub risk_score: f64,

    pub explanation: String,

    /// Indices of outlier segments; segment `i` joins positions `i` and `i + 1`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outlier_segments: Vec<usize>,
}

impl Verdict {
    /// Verdict for the request that trained the model
    pub fn training_completed() -> Self {
        Self {
            phase: VerdictPhase::TrainingCompleted,
            anomaly: false,
            risk_score: 0.0,
            explanation: EXPLANATION_TRAINING.to_string(),
            outlier_segments: Vec::new(),
        }
    }

    /// Verdict for a scored trajectory
    pub fn scored(risk_score: f64, outlier_segments: Vec<usize>) -> Self {
        let anomaly = !outlier_segments.is_empty();
        let explanation = if anomaly {
            EXPLANATION_ANOMALY
        } else {
            EXPLANATION_NORMAL
        };

        Self {
            phase: VerdictPhase::Scored,
            anomaly,
            risk_score,
            explanation: explanation.to_string(),
            outlier_segments,
        }
    }

    pub fn is_training(&self) -> bool {
        self.phase == VerdictPhase::TrainingCompleted
    }
}
