//! Metrics collection and reporting for the aggregator.
//!
//! Counters are lock-free atomics so the ingestion path can bump them on
//! every event; the collector only takes a lock to register metrics or to
//! render a report.
//!
//! # Overview
//!
//! - [`Metric`] trait defines the interface for custom metrics
//! - [`MetricsCollector`] manages metric registration and reporting
//! - [`AggregatorMetrics`] holds the built-in counters of one aggregator
//! - Metrics can be printed to stdout or saved to a JSON file
//!
//! # Example
//!
//! ```
//! use ironrank::metrics::{CounterMetric, MetricsCollector};
//! use std::sync::Arc;
//!
//! let collector = MetricsCollector::new();
//! let hits = Arc::new(CounterMetric::new("cache_hits"));
//! collector.register(hits.clone());
//! hits.add(3);
//! assert_eq!(collector.snapshot()["cache_hits"], serde_json::json!(3));
//! ```

use anyhow::Result;
use parking_lot::RwLock;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Trait for metrics that can be reported by a [`MetricsCollector`].
pub trait Metric: Send + Sync {
    /// The name of this metric (e.g., `events_ingested`).
    fn name(&self) -> &str;

    /// The current value of this metric as a JSON value.
    fn value(&self) -> Value;

    /// Optional description of what this metric measures.
    fn description(&self) -> Option<&str> {
        None
    }
}

/// Thread-safe registry of metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsCollectorInner>>,
}

struct MetricsCollectorInner {
    metrics: BTreeMap<String, Arc<dyn Metric>>,
    start_time: Instant,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsCollectorInner {
                metrics: BTreeMap::new(),
                start_time: Instant::now(),
            })),
        }
    }

    /// Register a metric. A metric with the same name is replaced.
    pub fn register(&self, metric: Arc<dyn Metric>) {
        let mut inner = self.inner.write();
        inner.metrics.insert(metric.name().to_string(), metric);
    }

    /// Time since the collector was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.inner.read().start_time.elapsed()
    }

    /// Current value of one metric.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.read().metrics.get(name).map(|m| m.value())
    }

    /// All metrics as a JSON object, with descriptions.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.inner.read();
        let mut metrics_json = serde_json::Map::new();

        for (name, metric) in &inner.metrics {
            let mut metric_obj = serde_json::Map::new();
            metric_obj.insert("value".to_string(), metric.value());
            if let Some(desc) = metric.description() {
                metric_obj.insert("description".to_string(), json!(desc));
            }
            metrics_json.insert(name.clone(), Value::Object(metric_obj));
        }

        let mut uptime = serde_json::Map::new();
        uptime.insert(
            "value".to_string(),
            json!(inner.start_time.elapsed().as_millis() as u64),
        );
        uptime.insert("description".to_string(), json!("Collector uptime in milliseconds"));
        metrics_json.insert("uptime_ms".to_string(), Value::Object(uptime));
        drop(inner);
        json!(metrics_json)
    }

    /// Print all metrics to stdout in a human-readable format.
    pub fn print(&self) {
        println!("\n========== Aggregator Metrics ==========");

        let inner = self.inner.read();
        let elapsed = inner.start_time.elapsed();
        println!(
            "Uptime: {:.3}s ({} ms)",
            elapsed.as_secs_f64(),
            elapsed.as_millis()
        );
        println!("----------------------------------------");

        for (name, metric) in &inner.metrics {
            if let Some(desc) = metric.description() {
                println!("{}: {} ({})", name, metric.value(), desc);
            } else {
                println!("{}: {}", name, metric.value());
            }
        }
        drop(inner);
        println!("========================================\n");
    }

    /// Save all metrics to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let json = self.to_json();
        let mut file = File::create(path)?;
        let formatted = serde_json::to_string_pretty(&json)?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }

    /// Metric names mapped to their current values.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let inner = self.inner.read();
        inner
            .metrics
            .iter()
            .map(|(name, metric)| (name.clone(), metric.value()))
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Built-in Metrics ==========

/// A monotonically increasing counter.
pub struct CounterMetric {
    name: String,
    description: Option<String>,
    count: AtomicU64,
}

impl CounterMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            count: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Metric for CounterMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.get())
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// A gauge holding the latest observed value.
pub struct GaugeMetric {
    name: String,
    description: Option<String>,
    value: AtomicI64,
}

impl GaugeMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            value: AtomicI64::new(0),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Metric for GaugeMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.get())
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// The counters one aggregator maintains, registered on its collector.
pub struct AggregatorMetrics {
    pub events_ingested: Arc<CounterMetric>,
    pub events_rejected: Arc<CounterMetric>,
    pub late_events: Arc<CounterMetric>,
    pub late_increments: Arc<CounterMetric>,
    pub windows_closed: Arc<CounterMetric>,
    pub snapshots_emitted: Arc<CounterMetric>,
    pub snapshots_dropped: Arc<CounterMetric>,
    pub sink_retries: Arc<CounterMetric>,
    pub sink_failures: Arc<CounterMetric>,
    pub open_windows: Arc<GaugeMetric>,
    pub emit_backlog: Arc<GaugeMetric>,
    collector: MetricsCollector,
}

impl AggregatorMetrics {
    #[must_use]
    pub fn new() -> Self {
        let counter = |name: &str, desc: &str| {
            Arc::new(CounterMetric::new(name).with_description(desc))
        };
        let metrics = Self {
            events_ingested: counter("events_ingested", "Events accepted into the store"),
            events_rejected: counter("events_rejected", "Events rejected as invalid or after shutdown"),
            late_events: counter("late_events", "Events targeting at least one closed window"),
            late_increments: counter("late_increments", "Per-window increments dropped as late"),
            windows_closed: counter("windows_closed", "Window instances closed and evicted"),
            snapshots_emitted: counter("snapshots_emitted", "Snapshots delivered to the sink"),
            snapshots_dropped: counter("snapshots_dropped", "Snapshots dropped because the emit queue was already closed"),
            sink_retries: counter("sink_retries", "Sink delivery retries"),
            sink_failures: counter("sink_failures", "Snapshots abandoned after exhausting retries"),
            open_windows: Arc::new(
                GaugeMetric::new("open_windows")
                    .with_description("Window instances currently holding state"),
            ),
            emit_backlog: Arc::new(
                GaugeMetric::new("emit_backlog")
                    .with_description("Snapshots waiting for the emit worker"),
            ),
            collector: MetricsCollector::new(),
        };
        for m in [
            &metrics.events_ingested,
            &metrics.events_rejected,
            &metrics.late_events,
            &metrics.late_increments,
            &metrics.windows_closed,
            &metrics.snapshots_emitted,
            &metrics.snapshots_dropped,
            &metrics.sink_retries,
            &metrics.sink_failures,
        ] {
            metrics.collector.register(m.clone());
        }
        metrics.collector.register(metrics.open_windows.clone());
        metrics.collector.register(metrics.emit_backlog.clone());
        metrics
    }

    #[must_use]
    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}

impl Default for AggregatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
