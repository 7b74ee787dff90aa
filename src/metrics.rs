use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// Latency samples kept per operation.
const MAX_SAMPLES: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub latencies: BTreeMap<String, LatencySummary>,
    pub gauges: BTreeMap<String, f64>,
}

/// Thread-safe request counters, operation latencies and last-value gauges
#[derive(Default)]
pub struct MetricsCollector {
    counters: Mutex<BTreeMap<String, u64>>,
    durations: Mutex<BTreeMap<String, VecDeque<f64>>>,
    gauges: Mutex<BTreeMap<String, f64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a simple metric value. Only the latest value is kept.
    pub fn track_metric(&self, name: &str, value: f64) {
        tracing::debug!("Metric {}: {}", name, value);
        if let Ok(mut gauges) = self.gauges.lock() {
            gauges.insert(name.to_string(), value);
        }
    }

    pub fn increment(&self, name: &str) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(name.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_duration(&self, name: &str, duration_ms: f64) {
        tracing::debug!("Operation {} took {:.2}ms", name, duration_ms);
        if let Ok(mut durations) = self.durations.lock() {
            let samples = durations.entry(name.to_string()).or_default();
            if samples.len() == MAX_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(duration_ms);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        let latencies = self
            .durations
            .lock()
            .map(|d| {
                d.iter()
                    .map(|(name, samples)| (name.clone(), Self::summarize(samples)))
                    .collect()
            })
            .unwrap_or_default();
        let gauges = self.gauges.lock().map(|g| g.clone()).unwrap_or_default();
        MetricsSnapshot {
            counters,
            latencies,
            gauges,
        }
    }

    fn summarize(samples: &VecDeque<f64>) -> LatencySummary {
        if samples.is_empty() {
            return LatencySummary::default();
        }
        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        LatencySummary {
            count: sorted.len(),
            avg_ms: sorted.iter().sum::<f64>() / sorted.len() as f64,
            p50_ms: Self::percentile(&sorted, 50.0),
            p95_ms: Self::percentile(&sorted, 95.0),
            p99_ms: Self::percentile(&sorted, 99.0),
            max_ms: sorted[sorted.len() - 1],
        }
    }

    fn percentile(sorted: &[f64], percentile: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let index = (percentile / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        sorted[index.min(sorted.len() - 1)]
    }
}

/// Global metrics collector instance
pub static METRICS_COLLECTOR: std::sync::OnceLock<MetricsCollector> = std::sync::OnceLock::new();

/// Get the global metrics collector
pub fn get_metrics_collector() -> &'static MetricsCollector {
    METRICS_COLLECTOR.get_or_init(MetricsCollector::new)
}

/// Records the lifetime of the returned guard as the duration of `$operation_name`.
#[macro_export]
macro_rules! measure_operation {
    ($operation_name:expr) => {{
        struct OperationTimer {
            start: std::time::Instant,
            name: String,
        }

        impl Drop for OperationTimer {
            fn drop(&mut self) {
                let duration = self.start.elapsed().as_secs_f64() * 1000.0;
                $crate::metrics::get_metrics_collector().record_duration(&self.name, duration);
            }
        }

        OperationTimer {
            start: std::time::Instant::now(),
            name: $operation_name.to_string(),
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = MetricsCollector::new();
        metrics.increment("chat.requests");
        metrics.increment("chat.requests");
        metrics.increment("chat.rejected");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.counters["chat.requests"], 2);
        assert_eq!(snapshot.counters["chat.rejected"], 1);
    }

    #[test]
    fn test_gauges_keep_latest_value() {
        let metrics = MetricsCollector::new();
        metrics.track_metric("builder.vectors", 12.0);
        metrics.track_metric("builder.vectors", 5.0);
        metrics.track_metric("retrieval.results", 3.0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.gauges["builder.vectors"], 5.0);
        assert_eq!(snapshot.gauges["retrieval.results"], 3.0);
        assert!(snapshot.counters.is_empty());
    }

    #[test]
    fn test_latency_summary() {
        let metrics = MetricsCollector::new();
        for ms in 1..=100 {
            metrics.record_duration("generate", ms as f64);
        }
        let summary = &metrics.snapshot().latencies["generate"];
        assert_eq!(summary.count, 100);
        assert_eq!(summary.max_ms, 100.0);
        assert!((summary.avg_ms - 50.5).abs() < 1e-9);
        assert!(summary.p95_ms >= 94.0 && summary.p95_ms <= 96.0);
    }

    #[test]
    fn test_sample_window_is_bounded() {
        let metrics = MetricsCollector::new();
        for _ in 0..(MAX_SAMPLES + 10) {
            metrics.record_duration("retrieve", 1.0);
        }
        assert_eq!(metrics.snapshot().latencies["retrieve"].count, MAX_SAMPLES);
    }

    #[test]
    fn test_measure_operation_records() {
        {
            let _timer = crate::measure_operation!("metrics.test_timer");
        }
        let snapshot = get_metrics_collector().snapshot();
        assert!(snapshot.latencies.contains_key("metrics.test_timer"));
    }
}
