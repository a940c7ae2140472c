//! Trajectory Sentinel - Main Entry Point
//!
//! Serves trajectory analysis requests over NATS, answers with verdicts, and
//! publishes anomaly alerts and audit ledger entries.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use trajectory_sentinel::{
    collaborators::{StatusBoard, ZoneContextLog},
    config::{AppConfig, LoggingConfig},
    consumer::{RequestConsumer, RequestKind},
    engine::AnomalyEngine,
    gateway::{ErrorReply, HandlerOutcome, IngestGateway, Reply},
    metrics::{EngineMetrics, MetricsReporter},
    observer::TracingObserver,
    producer::AlertProducer,
};

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("trajectory_sentinel={}", logging.level)))
        .context("Invalid log level")?;

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from_path(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => AppConfig::load()?,
    };

    init_logging(&config.logging)?;

    info!("Starting Trajectory Sentinel");
    info!(
        n_estimators = config.model.n_estimators,
        max_samples = config.model.max_samples,
        contamination = config.model.contamination,
        seeded = config.model.random_state.is_some(),
        "Configuration loaded successfully"
    );

    let metrics = Arc::new(EngineMetrics::new());

    let engine = Arc::new(
        AnomalyEngine::from_config(&config.model)
            .context("Failed to build anomaly engine")?
            .with_observer(Arc::new(TracingObserver)),
    );
    info!(
        model = %engine.model_name()?,
        features = ?engine.feature_names(),
        "Anomaly engine initialized ({} features, untrained)",
        engine.feature_count()
    );

    let zone_log = Arc::new(ZoneContextLog::new());
    let status_board = Arc::new(StatusBoard::new());
    let gateway = Arc::new(IngestGateway::new(
        engine.clone(),
        metrics.clone(),
        zone_log.clone(),
        status_board.clone(),
    ));

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let producer = Arc::new(AlertProducer::new(
        client.clone(),
        &config.nats.alert_subject,
        &config.nats.audit_subject,
    ));
    info!("Publishing alerts to: {}", producer.alert_subject());
    info!("Publishing audit entries to: {}", producer.audit_subject());

    let num_workers = config.pipeline.workers.max(1);
    info!("Serving requests with {} parallel workers", num_workers);
    let semaphore = Arc::new(Semaphore::new(num_workers));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let consumers = [
        RequestConsumer::new(client.clone(), &config.nats.analyze_subject, RequestKind::Analyze),
        RequestConsumer::new(
            client.clone(),
            &config.nats.zone_context_subject,
            RequestKind::ZoneContext,
        ),
        RequestConsumer::new(
            client.clone(),
            &config.nats.status_subject,
            RequestKind::StatusUpdate,
        ),
    ];

    let mut loops = Vec::with_capacity(consumers.len());
    for consumer in consumers {
        let subscription = consumer.subscribe().await?;
        info!(kind = consumer.kind().as_str(), "Listening on subject: {}", consumer.subject());
        loops.push(tokio::spawn(serve(
            consumer.kind(),
            subscription,
            gateway.clone(),
            producer.clone(),
            semaphore.clone(),
        )));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
        _ = futures::future::select_all(loops) => warn!("A request subscription closed"),
    }

    info!("Sentinel shutting down...");
    if let Err(e) = producer.flush().await {
        warn!(error = %e, "Failed to flush pending publishes");
    }
    metrics.print_summary();
    info!(
        zone_contexts = zone_log.received(),
        tracked_subjects = status_board.len(),
        "Collaborator state at shutdown"
    );

    Ok(())
}

/// Handle every message on one subscription, bounded by the shared semaphore
async fn serve(
    kind: RequestKind,
    mut subscription: async_nats::Subscriber,
    gateway: Arc<IngestGateway>,
    producer: Arc<AlertProducer>,
    semaphore: Arc<Semaphore>,
) {
    let handled = Arc::new(AtomicU64::new(0));

    while let Some(message) = subscription.next().await {
        // Acquire permit (limits concurrent tasks)
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let gateway = gateway.clone();
        let producer = producer.clone();
        let handled = handled.clone();

        tokio::spawn(async move {
            // fitting and scoring hold the model lock; keep them off the async workers
            let payload = message.payload.clone();
            let handled_outcome = tokio::task::spawn_blocking(move || match kind {
                RequestKind::Analyze => gateway.handle_analyze(&payload),
                RequestKind::ZoneContext => gateway.handle_zone_context(&payload),
                RequestKind::StatusUpdate => gateway.handle_status_update(&payload),
            })
            .await;

            let outcome = match handled_outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(kind = kind.as_str(), error = %e, "Request handler panicked");
                    HandlerOutcome {
                        reply: Reply::Error(ErrorReply::internal("internal error")),
                        alert: None,
                        ledger: None,
                    }
                }
            };

            dispatch(kind, message.reply, outcome, &producer).await;

            let count = handled.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                info!(kind = kind.as_str(), handled = count, "Processing milestone");
            }

            drop(permit);
        });
    }
}

/// Publish the reply, alert and ledger entry a handler produced
async fn dispatch(
    kind: RequestKind,
    reply_subject: Option<async_nats::Subject>,
    outcome: HandlerOutcome,
    producer: &AlertProducer,
) {
    match reply_subject {
        Some(reply_subject) => {
            if let Err(e) = producer.reply(reply_subject, &outcome.reply).await {
                error!(kind = kind.as_str(), error = %e, "Failed to send reply");
            }
        }
        None => debug!(kind = kind.as_str(), "Request had no reply subject"),
    }

    if let Some(alert) = &outcome.alert {
        if let Err(e) = producer.publish(alert).await {
            error!(alert_id = %alert.alert_id, error = %e, "Failed to publish anomaly alert");
        } else {
            info!(
                alert_id = %alert.alert_id,
                subject_id = %alert.subject_id,
                risk_score = alert.risk_score,
                "Anomaly alert published"
            );
        }
    }

    // the ledger is a fire-and-forget collaborator; failures never reach the caller
    if let Some(entry) = &outcome.ledger {
        if let Err(e) = producer.log_event(entry).await {
            warn!(event = ?entry.event, error = %e, "Failed to submit audit ledger entry");
        }
    }
}
