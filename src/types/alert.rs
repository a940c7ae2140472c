//! Anomaly alert and audit ledger entry data structures

use super::verdict::Verdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert published when a scored trajectory is anomalous
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAlert {
    /// Unique alert identifier
    pub alert_id: String,

    /// Subject whose trajectory was flagged
    pub subject_id: String,

    /// Minimum segment score of the trajectory
    pub risk_score: f64,

    pub explanation: String,

    /// Flagged segment indices
    pub outlier_segments: Vec<usize>,

    /// Alert generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl AnomalyAlert {
    /// Build an alert from an anomalous verdict
    pub fn from_verdict(subject_id: &str, verdict: &Verdict) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            risk_score: verdict.risk_score,
            explanation: verdict.explanation.clone(),
            outlier_segments: verdict.outlier_segments.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Event categories recorded in the external audit ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEventType {
    StatusChange,
    MovementAnomaly,
}

/// Entry submitted to the audit ledger; hashing and chaining happen on the ledger side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub event: LedgerEventType,
    pub details: serde_json::Value,
}

impl LedgerEntry {
    pub fn new(event: LedgerEventType, details: serde_json::Value) -> Self {
        Self { event, details }
    }
}
