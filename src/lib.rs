//! Trajectory Sentinel Library
//!
//! Real-time movement anomaly detection for GPS trajectories. The first
//! trajectory received trains an isolation forest over per-segment
//! displacement and speed; every later trajectory is scored against it.

pub mod collaborators;
pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod feature_extractor;
pub mod gateway;
pub mod metrics;
pub mod models;
pub mod observer;
pub mod producer;
pub mod types;

pub use config::AppConfig;
pub use consumer::{RequestConsumer, RequestKind};
pub use engine::AnomalyEngine;
pub use error::{EngineError, Result};
pub use feature_extractor::{FeatureExtractor, FeatureVector};
pub use gateway::{HandlerOutcome, IngestGateway, Reply};
pub use models::{IsolationForest, Label, OutlierModel};
pub use producer::AlertProducer;
pub use types::{position::Position, verdict::Verdict};
