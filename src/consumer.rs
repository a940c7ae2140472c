//! NATS subscriptions for inbound engine requests

use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Inbound request channels served by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Analyze,
    ZoneContext,
    StatusUpdate,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Analyze => "analyze",
            RequestKind::ZoneContext => "zone_context",
            RequestKind::StatusUpdate => "status",
        }
    }
}

/// Consumer for one request subject
pub struct RequestConsumer {
    client: Client,
    subject: String,
    kind: RequestKind,
}

impl RequestConsumer {
    pub fn new(client: Client, subject: &str, kind: RequestKind) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            kind,
        }
    }

    /// Subscribe to the request subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(
            subject = %self.subject,
            kind = self.kind.as_str(),
            "Subscribed to request subject"
        );
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}
