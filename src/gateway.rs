//! Message handlers between the transport and the anomaly engine.
//!
//! Handlers are synchronous and transport-agnostic: they take a raw JSON
//! payload and return the reply body plus any alert or ledger entry that the
//! transport layer should publish.

use crate::collaborators::{StatusUpdate, StatusUpdateSink, ZoneContextSink};
use crate::engine::AnomalyEngine;
use crate::metrics::EngineMetrics;
use crate::models::{IsolationForest, OutlierModel};
use crate::types::alert::{AnomalyAlert, LedgerEntry, LedgerEventType};
use crate::types::position::Position;
use crate::types::verdict::Verdict;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Analysis request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(alias = "tourist_id", alias = "subjectId")]
    pub subject_id: String,
    #[serde(alias = "recent_coordinates")]
    pub positions: Vec<Position>,
}

/// Error body with an HTTP-style status code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    pub status: u16,
}

impl ErrorReply {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: 400,
        }
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: 500,
        }
    }
}

/// Reply body sent back to the requester
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Verdict(Verdict),
    Ack(serde_json::Value),
    Error(ErrorReply),
}

/// Everything a handler wants the transport to send
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub reply: Reply,
    pub alert: Option<AnomalyAlert>,
    pub ledger: Option<LedgerEntry>,
}

impl HandlerOutcome {
    fn reply(reply: Reply) -> Self {
        Self {
            reply,
            alert: None,
            ledger: None,
        }
    }
}

/// Routes decoded requests into the engine and the collaborator sinks
pub struct IngestGateway<M: OutlierModel = IsolationForest> {
    engine: Arc<AnomalyEngine<M>>,
    metrics: Arc<EngineMetrics>,
    zone_sink: Arc<dyn ZoneContextSink>,
    status_sink: Arc<dyn StatusUpdateSink>,
}

impl<M: OutlierModel> IngestGateway<M> {
    pub fn new(
        engine: Arc<AnomalyEngine<M>>,
        metrics: Arc<EngineMetrics>,
        zone_sink: Arc<dyn ZoneContextSink>,
        status_sink: Arc<dyn StatusUpdateSink>,
    ) -> Self {
        Self {
            engine,
            metrics,
            zone_sink,
            status_sink,
        }
    }

    /// Analyze a trajectory request
    pub fn handle_analyze(&self, payload: &[u8]) -> HandlerOutcome {
        let start_time = Instant::now();

        let request: AnalyzeRequest = match serde_json::from_slice(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Failed to deserialize analyze request");
                self.metrics.record_rejection();
                return HandlerOutcome::reply(Reply::Error(ErrorReply::bad_request(format!(
                    "invalid request: {}",
                    e
                ))));
            }
        };

        match self
            .engine
            .analyze_subject(&request.subject_id, &request.positions)
        {
            Ok(verdict) => {
                let processing_time = start_time.elapsed();
                self.metrics.record_verdict(processing_time, &verdict);

                if !verdict.anomaly {
                    return HandlerOutcome::reply(Reply::Verdict(verdict));
                }

                let alert = AnomalyAlert::from_verdict(&request.subject_id, &verdict);
                info!(
                    subject_id = %request.subject_id,
                    alert_id = %alert.alert_id,
                    risk_score = verdict.risk_score,
                    outlier_segments = ?verdict.outlier_segments,
                    processing_time_us = processing_time.as_micros(),
                    "Movement anomaly detected"
                );
                let ledger = LedgerEntry::new(
                    LedgerEventType::MovementAnomaly,
                    json!({
                        "alertId": alert.alert_id,
                        "subjectId": alert.subject_id,
                        "riskScore": alert.risk_score,
                        "outlierSegments": alert.outlier_segments,
                        "timestamp": alert.timestamp,
                    }),
                );

                HandlerOutcome {
                    reply: Reply::Verdict(verdict),
                    alert: Some(alert),
                    ledger: Some(ledger),
                }
            }
            Err(e) if e.is_client_error() => {
                warn!(subject_id = %request.subject_id, error = %e, "Rejected analyze request");
                self.metrics.record_rejection();
                HandlerOutcome::reply(Reply::Error(ErrorReply::bad_request(e.to_string())))
            }
            Err(e) => {
                error!(subject_id = %request.subject_id, error = %e, "Analysis failed");
                self.metrics.record_failure();
                HandlerOutcome::reply(Reply::Error(ErrorReply::internal(e.to_string())))
            }
        }
    }

    /// Accept an advisory zone context payload
    pub fn handle_zone_context(&self, payload: &[u8]) -> HandlerOutcome {
        match serde_json::from_slice::<serde_json::Value>(payload) {
            Ok(value) => {
                self.zone_sink.accept_zone_context(&value);
                HandlerOutcome::reply(Reply::Ack(json!({"status": "ok", "received": true})))
            }
            Err(e) => {
                warn!(error = %e, "Failed to deserialize zone context");
                HandlerOutcome::reply(Reply::Error(ErrorReply::bad_request(format!(
                    "invalid zone context: {}",
                    e
                ))))
            }
        }
    }

    /// Apply a subject status update and record it in the audit ledger
    pub fn handle_status_update(&self, payload: &[u8]) -> HandlerOutcome {
        let update: StatusUpdate = match serde_json::from_slice(payload) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "Failed to deserialize status update");
                return HandlerOutcome::reply(Reply::Error(ErrorReply::bad_request(format!(
                    "invalid status update: {}",
                    e
                ))));
            }
        };

        let previous = self.status_sink.update_status(&update);

        HandlerOutcome {
            reply: Reply::Ack(json!({"status": "ok", "updated": true})),
            alert: None,
            ledger: Some(LedgerEntry::new(
                LedgerEventType::StatusChange,
                json!({
                    "subjectId": update.subject_id,
                    "status": update.status,
                    "previousStatus": previous,
                }),
            )),
        }
    }
}
