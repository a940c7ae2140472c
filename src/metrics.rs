//! Performance metrics and statistics tracking for the trajectory sentinel.

use crate::types::verdict::{Verdict, VerdictPhase};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const MAX_TIMING_SAMPLES: usize = 10_000;

/// Metrics collector for engine throughput and verdicts
pub struct EngineMetrics {
    /// Trajectories that produced a verdict
    pub trajectories_analyzed: AtomicU64,
    /// Scored verdicts flagged as anomalous
    pub anomalies_detected: AtomicU64,
    /// Training verdicts (at most one per process)
    pub training_events: AtomicU64,
    /// Requests rejected as invalid input
    pub rejected_requests: AtomicU64,
    /// Requests that failed inside the engine
    pub engine_failures: AtomicU64,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Risk score buckets over [-1, 0], most anomalous first
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl EngineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            trajectories_analyzed: AtomicU64::new(0),
            anomalies_detected: AtomicU64::new(0),
            training_events: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            engine_failures: AtomicU64::new(0),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a verdict and how long it took to produce
    pub fn record_verdict(&self, processing_time: Duration, verdict: &Verdict) {
        self.trajectories_analyzed.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > MAX_TIMING_SAMPLES {
                times.drain(0..MAX_TIMING_SAMPLES / 2);
            }
        }

        match verdict.phase {
            VerdictPhase::TrainingCompleted => {
                self.training_events.fetch_add(1, Ordering::Relaxed);
            }
            VerdictPhase::Scored => {
                if verdict.anomaly {
                    self.anomalies_detected.fetch_add(1, Ordering::Relaxed);
                }
                let bucket = Self::bucket_for(verdict.risk_score);
                if let Ok(mut buckets) = self.score_buckets.write() {
                    buckets[bucket] += 1;
                }
            }
        }
    }

    /// Record a request rejected for invalid input
    pub fn record_rejection(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that failed inside the engine
    pub fn record_failure(&self) {
        self.engine_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn bucket_for(risk_score: f64) -> usize {
        // -1.0 lands in bucket 0, scores near 0.0 in bucket 9
        (((risk_score + 1.0) * 10.0).max(0.0) as usize).min(9)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = match self.processing_times.read() {
            Ok(times) => times,
            Err(_) => return ProcessingStats::default(),
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (trajectories per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.trajectories_analyzed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get score distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let analyzed = self.trajectories_analyzed.load(Ordering::Relaxed);
        let anomalies = self.anomalies_detected.load(Ordering::Relaxed);
        let scored = analyzed.saturating_sub(self.training_events.load(Ordering::Relaxed));
        let anomaly_rate = if scored > 0 {
            (anomalies as f64 / scored as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();

        info!(
            analyzed = analyzed,
            anomalies = anomalies,
            anomaly_rate = format!("{:.1}%", anomaly_rate),
            rejected = self.rejected_requests.load(Ordering::Relaxed),
            failures = self.engine_failures.load(Ordering::Relaxed),
            throughput = format!("{:.1} traj/s", self.get_throughput()),
            "Engine metrics summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Processing time"
        );

        let score_dist = self.get_score_distribution();
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let pct = (count as f64 / total as f64) * 100.0;
            info!(
                "  risk {:.1}..{:.1}: {:>6} ({:>5.1}%) {}",
                -1.0 + i as f64 / 10.0,
                -1.0 + (i + 1) as f64 / 10.0,
                count,
                pct,
                "█".repeat(((pct / 5.0) as usize).min(20))
            );
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<EngineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<EngineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
