//! Request metrics and periodic summaries for the prediction service.

use crate::error::ServiceError;
use crate::models::inference::PredictionResult;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for served predictions
pub struct ServiceMetrics {
    /// Successful predictions
    pub predictions: AtomicU64,
    /// Requests rejected because no model was loaded
    pub unavailable: AtomicU64,
    /// Requests rejected for a bad feature payload
    pub invalid_input: AtomicU64,
    /// Requests where the model call failed
    pub inference_failures: AtomicU64,
    /// Prediction latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Count of each predicted class
    class_counts: RwLock<BTreeMap<u64, u64>>,
    /// Confidence distribution buckets
    confidence_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            predictions: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            invalid_input: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            class_counts: RwLock::new(BTreeMap::new()),
            confidence_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, latency: Duration, result: &PredictionResult) {
        self.predictions.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut latencies) = self.latencies.write() {
            latencies.push(latency.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if latencies.len() > 10000 {
                latencies.drain(0..5000);
            }
        }

        if let Ok(mut counts) = self.class_counts.write() {
            *counts.entry(result.prediction).or_insert(0) += 1;
        }

        let bucket = (result.confidence * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.confidence_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a rejected or failed request
    pub fn record_failure(&self, error: &ServiceError) {
        let counter = match error {
            ServiceError::InvalidInput(_) => &self.invalid_input,
            ServiceError::Inference(_) => &self.inference_failures,
            ServiceError::ModelUnavailable
            | ServiceError::NotFound(_)
            | ServiceError::Load { .. } => &self.unavailable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Total requests seen by the predict endpoint
    pub fn total_requests(&self) -> u64 {
        self.predictions.load(Ordering::Relaxed)
            + self.unavailable.load(Ordering::Relaxed)
            + self.invalid_input.load(Ordering::Relaxed)
            + self.inference_failures.load(Ordering::Relaxed)
    }

    /// Get latency statistics
    pub fn get_latency_stats(&self) -> LatencyStats {
        let Ok(latencies) = self.latencies.read() else {
            return LatencyStats::default();
        };
        if latencies.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = latencies.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (successful predictions per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get predicted class counts
    pub fn get_class_distribution(&self) -> BTreeMap<u64, u64> {
        self.class_counts
            .read()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }

    /// Get confidence distribution
    pub fn get_confidence_distribution(&self) -> [u64; 10] {
        self.confidence_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or_default()
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let predictions = self.predictions.load(Ordering::Relaxed);
        let total = self.total_requests();
        let latency = self.get_latency_stats();

        info!(
            requests = total,
            predictions = predictions,
            unavailable = self.unavailable.load(Ordering::Relaxed),
            invalid_input = self.invalid_input.load(Ordering::Relaxed),
            inference_failures = self.inference_failures.load(Ordering::Relaxed),
            throughput = format!("{:.1} req/s", self.get_throughput()),
            "Prediction service summary"
        );

        if latency.count > 0 {
            info!(
                mean_us = latency.mean_us,
                p50_us = latency.p50_us,
                p95_us = latency.p95_us,
                p99_us = latency.p99_us,
                max_us = latency.max_us,
                "Prediction latency"
            );
        }

        for (class, count) in self.get_class_distribution() {
            let pct = if predictions > 0 {
                (count as f64 / predictions as f64) * 100.0
            } else {
                0.0
            };
            info!(class = class, count = count, "Predicted class share {:.1}%", pct);
        }

        let buckets = self.get_confidence_distribution();
        let bucketed: u64 = buckets.iter().sum();
        if bucketed > 0 {
            let shares: Vec<String> = buckets
                .iter()
                .enumerate()
                .map(|(i, &count)| format!("{:.1}-{:.1}:{}", i as f64 / 10.0, (i + 1) as f64 / 10.0, count))
                .collect();
            info!(buckets = %shares.join(" "), "Confidence distribution");
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let period = Duration::from_secs(self.interval_secs.max(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
