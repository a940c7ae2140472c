//! Contracts for the services that talk to the engine's host.
//!
//! The geofence/alerting side pushes zone context and subject status changes
//! here. Neither feeds the anomaly model; they are kept for operators and
//! forwarded to the audit ledger by the gateway.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{debug, info};

/// Safety status of a subject, as decided by the alerting collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectStatus {
    Safe,
    Breach,
    Emergency,
    HelpDispatched,
}

/// Status transition pushed by the alerting collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(rename = "subjectId", alias = "userId", alias = "subject_id")]
    pub subject_id: String,
    pub status: SubjectStatus,
}

/// Accepts advisory zone context; fire-and-forget
pub trait ZoneContextSink: Send + Sync {
    fn accept_zone_context(&self, payload: &serde_json::Value);
}

/// Accepts subject status transitions
pub trait StatusUpdateSink: Send + Sync {
    /// Apply an update, returning the previous status if one was known
    fn update_status(&self, update: &StatusUpdate) -> Option<SubjectStatus>;
}

/// Zone context sink that logs payloads and counts them
#[derive(Debug, Default)]
pub struct ZoneContextLog {
    received: AtomicU64,
}

impl ZoneContextLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl ZoneContextSink for ZoneContextLog {
    fn accept_zone_context(&self, payload: &serde_json::Value) {
        self.received.fetch_add(1, Ordering::Relaxed);
        debug!(payload = %payload, "Received zone context");
    }
}

/// In-memory board of the latest known status per subject
#[derive(Debug, Default)]
pub struct StatusBoard {
    statuses: RwLock<HashMap<String, SubjectStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest status for a subject, if any was reported
    pub fn status_of(&self, subject_id: &str) -> Option<SubjectStatus> {
        self.statuses
            .read()
            .ok()
            .and_then(|s| s.get(subject_id).copied())
    }

    pub fn len(&self) -> usize {
        self.statuses.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatusUpdateSink for StatusBoard {
    fn update_status(&self, update: &StatusUpdate) -> Option<SubjectStatus> {
        let previous = match self.statuses.write() {
            Ok(mut statuses) => statuses.insert(update.subject_id.clone(), update.status),
            // a poisoned board only loses history; the new status still wins
            Err(poisoned) => poisoned
                .into_inner()
                .insert(update.subject_id.clone(), update.status),
        };

        info!(
            subject_id = %update.subject_id,
            status = ?update.status,
            previous = ?previous,
            "Subject status updated"
        );

        previous
    }
}
