//! GPS Trajectory Simulator
//!
//! Sends a baseline trajectory followed by a mix of normal and anomalous
//! trajectories to the sentinel's analyze subject and logs each verdict.
//! Without a reachable NATS server it runs the engine in-process instead.

use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use trajectory_sentinel::config::ModelConfig;
use trajectory_sentinel::engine::AnomalyEngine;
use trajectory_sentinel::types::position::Position;

/// Seconds between simulated fixes
const FIX_INTERVAL_SECS: f64 = 60.0;

/// Analyze request in the sentinel's wire format
#[derive(Debug, Serialize)]
struct AnalyzeRequest {
    subject_id: String,
    positions: Vec<Position>,
}

/// Random-walk generator of GPS fixes for a walking subject
struct TrajectoryGenerator {
    rng: rand::rngs::ThreadRng,
    origin: (f64, f64),
    clock: f64,
}

impl TrajectoryGenerator {
    fn new(origin: (f64, f64)) -> Self {
        Self {
            rng: rand::thread_rng(),
            origin,
            clock: chrono::Utc::now().timestamp() as f64,
        }
    }

    /// Walk at roughly 1.4 m/s with a little heading jitter
    fn generate_normal(&mut self, fixes: usize) -> Vec<Position> {
        let mut lat = self.origin.0 + self.rng.gen_range(-0.001..0.001);
        let mut lng = self.origin.1 + self.rng.gen_range(-0.001..0.001);
        let mut positions = Vec::with_capacity(fixes);

        for _ in 0..fixes {
            positions.push(Position::new(lat, lng, self.clock));
            lat += self.rng.gen_range(0.0006..0.0009);
            lng += self.rng.gen_range(-0.0002..0.0002);
            self.clock += FIX_INTERVAL_SECS;
        }
        positions
    }

    /// Normal walk with a multi-kilometre teleport in the middle
    fn generate_anomalous(&mut self, fixes: usize) -> Vec<Position> {
        let mut positions = self.generate_normal(fixes.max(3));
        let jump_at = positions.len() / 2;
        let dlat = self.rng.gen_range(0.05..0.15);
        let dlng = self.rng.gen_range(0.05..0.15);
        for p in positions.iter_mut().skip(jump_at) {
            p.latitude += dlat;
            p.longitude += dlng;
        }
        positions
    }
}

/// Fraction of trajectories with an injected jump; defaults to 0.2
fn parse_anomaly_rate(arg: Option<&str>) -> anyhow::Result<f64> {
    let rate = match arg {
        Some(raw) => raw.parse::<f64>()?,
        None => 0.2,
    };
    if !(0.0..=1.0).contains(&rate) {
        anyhow::bail!("anomaly rate must be within [0, 1], got {}", rate);
    }
    Ok(rate)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("simulate_gps=info".parse()?),
        )
        .init();

    info!("Starting GPS trajectory simulator");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("sentinel.analyze");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);
    let anomaly_rate = parse_anomaly_rate(args.get(4).map(|s| s.as_str()))?;
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(250);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        anomaly_rate = anomaly_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, anomaly_rate, delay_ms).await;
        }
    };

    let mut generator = TrajectoryGenerator::new((28.6139, 77.2090));
    let mut rng = rand::thread_rng();

    // the first trajectory becomes the model's baseline
    let baseline = AnalyzeRequest {
        subject_id: "tourist-baseline".to_string(),
        positions: generator.generate_normal(30),
    };
    let reply = client
        .request(subject.to_string(), serde_json::to_vec(&baseline)?.into())
        .await?;
    info!(reply = %String::from_utf8_lossy(&reply.payload), "Baseline submitted");

    let mut anomalous_sent = 0;
    let mut anomalies_flagged = 0;

    for i in 0..count {
        let anomalous = rng.gen_bool(anomaly_rate);
        let positions = if anomalous {
            anomalous_sent += 1;
            generator.generate_anomalous(8)
        } else {
            generator.generate_normal(8)
        };
        let request = AnalyzeRequest {
            subject_id: format!("tourist-{:04}", i % 10),
            positions,
        };

        let reply = client
            .request(subject.to_string(), serde_json::to_vec(&request)?.into())
            .await?;
        let verdict: serde_json::Value = serde_json::from_slice(&reply.payload)?;
        if verdict["anomaly"].as_bool().unwrap_or(false) {
            anomalies_flagged += 1;
        }

        info!(
            subject_id = %request.subject_id,
            injected = anomalous,
            verdict = %verdict,
            "Trajectory analyzed"
        );

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} trajectories ({} with injected jumps, {} flagged)",
        count, anomalous_sent, anomalies_flagged
    );

    Ok(())
}

async fn run_dry_mode(count: u64, anomaly_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (in-process engine)");

    let engine = AnomalyEngine::from_config(&ModelConfig::default())?;
    let mut generator = TrajectoryGenerator::new((28.6139, 77.2090));
    let mut rng = rand::thread_rng();

    let verdict = engine.analyze_subject("tourist-baseline", &generator.generate_normal(30))?;
    info!(verdict = %serde_json::to_string(&verdict)?, "Baseline submitted");

    for i in 0..count {
        let anomalous = rng.gen_bool(anomaly_rate);
        let positions = if anomalous {
            generator.generate_anomalous(8)
        } else {
            generator.generate_normal(8)
        };

        let verdict = engine.analyze_subject(&format!("tourist-{:04}", i % 10), &positions)?;
        info!(
            injected = anomalous,
            anomaly = verdict.anomaly,
            risk_score = verdict.risk_score,
            outlier_segments = ?verdict.outlier_segments,
            "Trajectory analyzed"
        );

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
