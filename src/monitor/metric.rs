//! Metric samples, snapshots and their summaries.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::host::HostStats;

/// Per-component numeric metrics, e.g. `template_compiler → cache_hits`.
pub type ComponentMetrics = BTreeMap<String, BTreeMap<String, f64>>;

/// Seconds since the Unix epoch.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// What a metric measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Timing,
    Memory,
    Cpu,
    Cache,
    Throughput,
    ErrorRate,
}

impl MetricKind {
    /// Guess the kind from a metric name.
    pub fn classify(name: &str) -> Self {
        let name = name.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| name.contains(w));
        if has(&["error", "fail"]) {
            MetricKind::ErrorRate
        } else if has(&["time", "duration", "_ms"]) {
            MetricKind::Timing
        } else if has(&["memory", "bytes"]) {
            MetricKind::Memory
        } else if has(&["cpu", "usage"]) {
            MetricKind::Cpu
        } else if has(&["cache", "hit", "miss"]) {
            MetricKind::Cache
        } else {
            MetricKind::Throughput
        }
    }
}

/// Display unit for a metric name.
pub fn unit_for(name: &str) -> &'static str {
    let name = name.to_lowercase();
    if name.ends_with("_ms") || name.contains("time") || name.contains("duration") {
        "ms"
    } else if name.contains("rate") || name.contains("cpu") {
        "%"
    } else if name == "memory_usage" {
        "MB"
    } else if name.contains("memory") {
        "bytes"
    } else {
        "count"
    }
}

/// One timestamped sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub kind: MetricKind,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl PerformanceMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        let name = name.into();
        Self {
            unit: unit_for(&name).to_string(),
            kind: MetricKind::classify(&name),
            timestamp: unix_now(),
            component: None,
            name,
            value,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

/// Metrics collected at one sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub timestamp: f64,
    pub metrics: Vec<PerformanceMetric>,
    pub host: HostStats,
}

impl PerformanceSnapshot {
    /// Flatten component metrics into `<component>_<metric>` samples and
    /// append host metrics when available.
    pub fn capture(components: &ComponentMetrics, host: HostStats) -> Self {
        let timestamp = unix_now();
        let mut metrics = Vec::new();
        for (component, values) in components {
            for (name, &value) in values {
                let mut metric =
                    PerformanceMetric::new(format!("{component}_{name}"), value).with_component(component);
                metric.timestamp = timestamp;
                metrics.push(metric);
            }
        }
        if let Some(mb) = host.memory_mb {
            let mut metric = PerformanceMetric::new("memory_usage", mb);
            metric.timestamp = timestamp;
            metrics.push(metric);
        }
        if let Some(cpu) = host.cpu_percent {
            let mut metric = PerformanceMetric::new("cpu_usage", cpu);
            metric.timestamp = timestamp;
            metrics.push(metric);
        }
        Self {
            timestamp,
            metrics,
            host,
        }
    }
}

/// Running statistics for one operation name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OperationStats {
    pub count: u64,
    pub successes: u64,
    pub failures: u64,
    pub average_ms: f64,
    pub peak_ms: f64,
    pub last_ms: f64,
}

impl OperationStats {
    pub fn record(&mut self, duration_ms: f64, success: bool) {
        self.count += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.average_ms += (duration_ms - self.average_ms) / self.count as f64;
        self.peak_ms = self.peak_ms.max(duration_ms);
        self.last_ms = duration_ms;
    }
}

/// Aggregate over every retained sample of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub latest: f64,
}

/// Summaries keyed by metric name, in retention order.
pub fn summarize<'a>(
    metrics: impl IntoIterator<Item = &'a PerformanceMetric>,
) -> BTreeMap<String, MetricSummary> {
    let mut out: BTreeMap<String, MetricSummary> = BTreeMap::new();
    for m in metrics {
        out.entry(m.name.clone())
            .and_modify(|s| {
                s.count += 1;
                s.min = s.min.min(m.value);
                s.max = s.max.max(m.value);
                s.average += (m.value - s.average) / s.count as f64;
                s.latest = m.value;
            })
            .or_insert(MetricSummary {
                count: 1,
                min: m.value,
                max: m.value,
                average: m.value,
                latest: m.value,
            });
    }
    out
}
