//! NATS publisher for replies, anomaly alerts and audit ledger entries

use crate::types::alert::{AnomalyAlert, LedgerEntry};
use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use tracing::debug;

/// Publishes everything the engine sends outward
#[derive(Clone)]
pub struct AlertProducer {
    client: Client,
    alert_subject: String,
    audit_subject: String,
}

impl AlertProducer {
    pub fn new(client: Client, alert_subject: &str, audit_subject: &str) -> Self {
        Self {
            client,
            alert_subject: alert_subject.to_string(),
            audit_subject: audit_subject.to_string(),
        }
    }

    /// Answer a request on its reply inbox
    pub async fn reply<T: Serialize>(&self, reply_subject: Subject, body: &T) -> Result<()> {
        let payload = serde_json::to_vec(body)?;
        self.client.publish(reply_subject, payload.into()).await?;
        Ok(())
    }

    /// Publish an anomaly alert
    pub async fn publish(&self, alert: &AnomalyAlert) -> Result<()> {
        let payload = serde_json::to_vec(alert)?;

        self.client
            .publish(self.alert_subject.clone(), payload.into())
            .await?;

        debug!(
            alert_id = %alert.alert_id,
            subject_id = %alert.subject_id,
            risk_score = alert.risk_score,
            "Published anomaly alert"
        );

        Ok(())
    }

    /// Submit an entry to the audit ledger
    pub async fn log_event(&self, entry: &LedgerEntry) -> Result<()> {
        let payload = serde_json::to_vec(entry)?;

        self.client
            .publish(self.audit_subject.clone(), payload.into())
            .await?;

        debug!(event = ?entry.event, "Submitted audit ledger entry");

        Ok(())
    }

    /// Flush buffered publishes to the server
    pub async fn flush(&self) -> Result<()> {
        self.client.flush().await?;
        Ok(())
    }

    pub fn alert_subject(&self) -> &str {
        &self.alert_subject
    }

    pub fn audit_subject(&self) -> &str {
        &self.audit_subject
    }
}
