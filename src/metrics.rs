//! Performance metrics and statistics tracking for the classification service.

use crate::types::EnsembleResult;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for request processing
pub struct ServiceMetrics {
    /// Requests that produced a classification
    pub requests_classified: AtomicU64,
    /// Requests that ended in an error
    pub requests_failed: AtomicU64,
    /// Failures by error kind
    failures_by_kind: RwLock<HashMap<String, u64>>,
    /// Consensus counts by class code
    consensus_by_class: RwLock<HashMap<String, u64>>,
    /// Models excluded from a result, by model name
    model_failures: RwLock<HashMap<String, u64>>,
    /// End-to-end processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Model inference times (in microseconds)
    model_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Agreement ratio of every classified request
    agreements: RwLock<Vec<f64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_classified: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            consensus_by_class: RwLock::new(HashMap::new()),
            model_failures: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            model_times: RwLock::new(HashMap::new()),
            agreements: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a successful classification
    pub fn record_classification(&self, processing_time: Duration, result: &EnsembleResult) {
        self.requests_classified.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Ok(mut by_class) = self.consensus_by_class.write() {
            *by_class
                .entry(result.consensus.code().to_string())
                .or_insert(0) += 1;
        }

        if let Ok(mut agreements) = self.agreements.write() {
            agreements.push(result.agreement);
            if agreements.len() > 1000 {
                agreements.drain(0..500);
            }
        }

        for (model, latency) in &result.model_latencies {
            self.record_model_time(model, *latency);
        }

        if !result.failed_models.is_empty() {
            if let Ok(mut failures) = self.model_failures.write() {
                for model in result.failed_models.keys() {
                    *failures.entry(model.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    /// Record a failed request
    pub fn record_failure(&self, kind: &str) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Record model inference time
    pub fn record_model_time(&self, model_name: &str, duration: Duration) {
        if let Ok(mut times) = self.model_times.write() {
            let model_times = times.entry(model_name.to_string()).or_default();
            model_times.push(duration.as_micros() as u64);
            // Keep only last 1000 per model
            if model_times.len() > 1000 {
                model_times.drain(0..500);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = self
            .processing_times
            .read()
            .map(|times| times.clone())
            .unwrap_or_default();
        if sorted.is_empty() {
            return ProcessingStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Get model performance stats
    pub fn get_model_stats(&self) -> BTreeMap<String, ModelStats> {
        let Ok(times) = self.model_times.read() else {
            return BTreeMap::new();
        };
        let mut stats = BTreeMap::new();

        for (model, model_times) in times.iter() {
            if model_times.is_empty() {
                continue;
            }

            let mut sorted = model_times.clone();
            sorted.sort_unstable();

            let sum: u64 = sorted.iter().sum();
            let count = sorted.len();

            stats.insert(
                model.clone(),
                ModelStats {
                    calls: count as u64,
                    mean_us: sum / count as u64,
                    p50_us: sorted[count / 2],
                    p99_us: sorted[(count as f64 * 0.99) as usize],
                },
            );
        }

        stats
    }

    /// Get average agreement ratio
    pub fn get_avg_agreement(&self) -> f64 {
        let Ok(agreements) = self.agreements.read() else {
            return 0.0;
        };
        if agreements.is_empty() {
            return 0.0;
        }
        agreements.iter().sum::<f64>() / agreements.len() as f64
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_classified.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    fn counts(map: &RwLock<HashMap<String, u64>>) -> BTreeMap<String, u64> {
        map.read()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests_classified: self.requests_classified.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            throughput: self.get_throughput(),
            average_agreement: self.get_avg_agreement(),
            processing: self.get_processing_stats(),
            models: self.get_model_stats(),
            consensus_by_class: Self::counts(&self.consensus_by_class),
            failures_by_kind: Self::counts(&self.failures_by_kind),
            model_failures: Self::counts(&self.model_failures),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let total = snapshot.requests_classified + snapshot.requests_failed;
        let failure_rate = if total > 0 {
            (snapshot.requests_failed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let processing = &snapshot.processing;

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║        LESION CLASSIFICATION SERVICE - METRICS SUMMARY       ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests Classified: {:>8}  │  Throughput: {:>6.2} req/s  ║",
            snapshot.requests_classified, snapshot.throughput
        );
        info!(
            "║ Requests Failed:     {:>8}  │  Failure Rate: {:>6.1}%     ║",
            snapshot.requests_failed, failure_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!(
            "║ Model Agreement: {:>5.1}% (share of models voting with consensus) ║",
            snapshot.average_agreement * 100.0
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Consensus by Class:                                          ║");
        for (class, count) in &snapshot.consensus_by_class {
            let pct = if snapshot.requests_classified > 0 {
                (*count as f64 / snapshot.requests_classified as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
            info!("║   {:6}: {:>6} ({:>5.1}%) {}", class, count, pct, bar);
        }
        if !snapshot.failures_by_kind.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Kind:                                            ║");
            for (kind, count) in &snapshot.failures_by_kind {
                info!("║   {:20}: {:>6}", kind, count);
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        if !snapshot.models.is_empty() {
            info!("Model Inference Times (μs):");
            for (model, stats) in &snapshot.models {
                let failures = snapshot.model_failures.get(model).copied().unwrap_or(0);
                info!(
                    "  {}: mean={} p50={} p99={} (calls={}, failures={})",
                    model, stats.mean_us, stats.p50_us, stats.p99_us, stats.calls, failures
                );
            }
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Model-specific statistics
#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}

/// Serializable view served by the metrics endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests_classified: u64,
    pub requests_failed: u64,
    pub throughput: f64,
    pub average_agreement: f64,
    pub processing: ProcessingStats,
    pub models: BTreeMap<String, ModelStats>,
    pub consensus_by_class: BTreeMap<String, u64>,
    pub failures_by_kind: BTreeMap<String, u64>,
    pub model_failures: BTreeMap<String, u64>,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
