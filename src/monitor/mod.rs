//! Performance monitor: sampling, thresholds, alerts and operation timing.
//!
//! Purely observational. The sampling loop runs on one background worker
//! that publishes snapshots back over a channel; the monitor ingests them on
//! [`PerformanceMonitor::poll`].

pub mod host;
pub mod metric;
pub mod threshold;
mod worker;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::config::MonitorConfig;

pub use host::{HostSampler, HostStats};
pub use metric::{
    summarize, unix_now, ComponentMetrics, MetricKind, MetricSummary, OperationStats,
    PerformanceMetric, PerformanceSnapshot,
};
pub use threshold::{
    default_thresholds, Comparison, PerformanceAlert, PerformanceLevel, PerformanceThreshold,
};

use worker::Worker;

/// Snapshots included in an exported report.
pub const REPORT_SNAPSHOTS: usize = 10;

pub type AlertCallback = Arc<dyn Fn(&PerformanceAlert) + Send + Sync>;

/// Handle returned by [`PerformanceMonitor::add_alert_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Aggregate view of everything the monitor retains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub monitoring_duration: f64,
    pub total_metrics: usize,
    pub total_snapshots: usize,
    pub alerts: u64,
    pub totals: OperationStats,
    pub operations: BTreeMap<String, OperationStats>,
    pub metric_summaries: BTreeMap<String, MetricSummary>,
}

#[derive(Serialize)]
struct Report<'a> {
    timestamp: f64,
    performance_summary: PerformanceSummary,
    recent_snapshots: Vec<&'a PerformanceSnapshot>,
    thresholds: &'a BTreeMap<String, PerformanceThreshold>,
    settings: &'a MonitorConfig,
}

pub struct PerformanceMonitor {
    config: MonitorConfig,
    thresholds: BTreeMap<String, PerformanceThreshold>,
    metrics: VecDeque<PerformanceMetric>,
    snapshots: VecDeque<PerformanceSnapshot>,
    operations: BTreeMap<String, OperationStats>,
    totals: OperationStats,
    alerts: u64,
    callbacks: Vec<(CallbackId, AlertCallback)>,
    next_callback: u64,
    sampler: HostSampler,
    components_tx: watch::Sender<ComponentMetrics>,
    snapshots_rx: mpsc::Receiver<PerformanceSnapshot>,
    worker: Option<Worker>,
    started: Instant,
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .field("metrics", &self.metrics.len())
            .field("snapshots", &self.snapshots.len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let (components_tx, _) = watch::channel(ComponentMetrics::new());
        let (_, snapshots_rx) = mpsc::channel(queue_capacity(&config));
        Self {
            config,
            thresholds: default_thresholds(),
            metrics: VecDeque::new(),
            snapshots: VecDeque::new(),
            operations: BTreeMap::new(),
            totals: OperationStats::default(),
            alerts: 0,
            callbacks: Vec::new(),
            next_callback: 0,
            sampler: HostSampler::default(),
            components_tx,
            snapshots_rx,
            worker: None,
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Apply new settings. A running worker restarts with the new interval.
    pub fn set_config(&mut self, config: MonitorConfig) {
        let was_running = self.is_running();
        if was_running {
            self.stop();
        }
        self.config = config;
        trim(&mut self.metrics, self.config.max_metrics_history);
        trim(&mut self.snapshots, self.config.max_snapshots_history);
        if was_running && self.config.enabled {
            self.start();
        }
    }

    // -----------------------------------------------------------------------
    // Worker lifecycle
    // -----------------------------------------------------------------------

    /// Start the sampling worker. Returns whether a worker is running.
    pub fn start(&mut self) -> bool {
        if !self.config.enabled {
            tracing::warn!("performance monitoring is disabled");
            return false;
        }
        if self.is_running() {
            return true;
        }
        self.poll();
        let (snapshots_tx, snapshots_rx) = mpsc::channel(queue_capacity(&self.config));
        self.snapshots_rx = snapshots_rx;
        match Worker::spawn(
            self.config.interval(),
            self.config.enable_system_monitoring,
            self.components_tx.subscribe(),
            snapshots_tx,
        ) {
            Ok(worker) => {
                self.worker = Some(worker);
                tracing::info!(interval = self.config.monitoring_interval, "performance monitoring started");
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn monitor worker");
                false
            }
        }
    }

    /// Stop and join the worker. Returns whether one was running.
    pub fn stop(&mut self) -> bool {
        let Some(mut worker) = self.worker.take() else {
            return false;
        };
        worker.stop();
        self.poll();
        tracing::info!("performance monitoring stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(Worker::is_running)
    }

    // -----------------------------------------------------------------------
    // Sampling
    // -----------------------------------------------------------------------

    /// Make `components` the metrics the next sample reports.
    pub fn publish(&self, components: ComponentMetrics) {
        self.components_tx.send_replace(components);
    }

    /// Ingest every snapshot the worker has sent. Returns how many.
    pub fn poll(&mut self) -> usize {
        let mut count = 0;
        while let Ok(snapshot) = self.snapshots_rx.try_recv() {
            self.ingest(snapshot);
            count += 1;
        }
        count
    }

    /// Take a snapshot on the calling thread from the last published metrics.
    pub fn sample_now(&mut self) -> &PerformanceSnapshot {
        let host = if self.config.enable_system_monitoring {
            self.sampler.sample()
        } else {
            HostStats::default()
        };
        let components = self.components_tx.borrow().clone();
        self.ingest(PerformanceSnapshot::capture(&components, host));
        // `ingest` just pushed it, unless history is capped at zero.
        self.snapshots.back().unwrap_or(&EMPTY_SNAPSHOT)
    }

    fn ingest(&mut self, snapshot: PerformanceSnapshot) {
        if self.config.enable_performance_alerts {
            self.check_thresholds(&snapshot.metrics);
        }
        self.metrics.extend(snapshot.metrics.iter().cloned());
        trim(&mut self.metrics, self.config.max_metrics_history);
        tracing::debug!(metrics = snapshot.metrics.len(), "performance snapshot");
        self.snapshots.push_back(snapshot);
        trim(&mut self.snapshots, self.config.max_snapshots_history);
    }

    fn check_thresholds(&mut self, metrics: &[PerformanceMetric]) {
        for metric in metrics {
            for threshold in self.thresholds.values() {
                if !threshold.applies_to(&metric.name) {
                    continue;
                }
                let level = threshold.level(metric.value);
                if !level.is_alert() {
                    continue;
                }
                let alert = PerformanceAlert {
                    timestamp: metric.timestamp,
                    level,
                    metric_name: metric.name.clone(),
                    value: metric.value,
                    unit: metric.unit.clone(),
                    warning: threshold.warning,
                    critical: threshold.critical,
                    message: format!(
                        "{} is {}{} (warning {}, critical {})",
                        metric.name, metric.value, metric.unit, threshold.warning, threshold.critical
                    ),
                };
                if level == PerformanceLevel::Critical {
                    tracing::error!(metric = %alert.metric_name, value = alert.value, "{}", alert.message);
                } else {
                    tracing::warn!(metric = %alert.metric_name, value = alert.value, "{}", alert.message);
                }
                self.alerts += 1;
                for (_, callback) in &self.callbacks {
                    callback(&alert);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Thresholds and alerts
    // -----------------------------------------------------------------------

    pub fn set_threshold(&mut self, threshold: PerformanceThreshold) {
        self.thresholds.insert(threshold.metric_name.clone(), threshold);
    }

    pub fn remove_threshold(&mut self, metric_name: &str) -> bool {
        self.thresholds.remove(metric_name).is_some()
    }

    pub fn thresholds(&self) -> &BTreeMap<String, PerformanceThreshold> {
        &self.thresholds
    }

    /// Classify `value` for `metric_name`. Metrics without a threshold are
    /// `None`.
    pub fn classify(&self, metric_name: &str, value: f64) -> Option<PerformanceLevel> {
        self.thresholds
            .values()
            .find(|t| t.applies_to(metric_name))
            .map(|t| t.level(value))
    }

    pub fn add_alert_callback(
        &mut self,
        callback: impl Fn(&PerformanceAlert) + Send + Sync + 'static,
    ) -> CallbackId {
        let id = CallbackId(self.next_callback);
        self.next_callback += 1;
        self.callbacks.push((id, Arc::new(callback)));
        id
    }

    pub fn remove_alert_callback(&mut self, id: CallbackId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(cid, _)| *cid != id);
        self.callbacks.len() != before
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Record one operation that began at `start` and ends now.
    pub fn record_operation(&mut self, name: &str, start: Instant, success: bool) {
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.record_duration(name, duration_ms, success);
    }

    /// Record one operation with a known duration.
    pub fn record_duration(&mut self, name: &str, duration_ms: f64, success: bool) {
        self.operations
            .entry(name.to_string())
            .or_default()
            .record(duration_ms, success);
        self.totals.record(duration_ms, success);
        let mut metric = PerformanceMetric::new(format!("{name}_duration"), duration_ms);
        metric.kind = MetricKind::Timing;
        metric.unit = "ms".into();
        self.metrics.push_back(metric);
        trim(&mut self.metrics, self.config.max_metrics_history);
    }

    pub fn operation(&self, name: &str) -> Option<&OperationStats> {
        self.operations.get(name)
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    pub fn metrics(&self) -> impl Iterator<Item = &PerformanceMetric> {
        self.metrics.iter()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &PerformanceSnapshot> {
        self.snapshots.iter()
    }

    pub fn summary(&self) -> PerformanceSummary {
        PerformanceSummary {
            monitoring_duration: self.started.elapsed().as_secs_f64(),
            total_metrics: self.metrics.len(),
            total_snapshots: self.snapshots.len(),
            alerts: self.alerts,
            totals: self.totals,
            operations: self.operations.clone(),
            metric_summaries: summarize(&self.metrics),
        }
    }

    /// JSON report: summary, recent snapshots, thresholds and settings.
    /// Serialization failures log and yield an empty string.
    pub fn export_report(&self) -> String {
        let skip = self.snapshots.len().saturating_sub(REPORT_SNAPSHOTS);
        let report = Report {
            timestamp: unix_now(),
            performance_summary: self.summary(),
            recent_snapshots: self.snapshots.iter().skip(skip).collect(),
            thresholds: &self.thresholds,
            settings: &self.config,
        };
        serde_json::to_string_pretty(&report).unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to export performance report");
            String::new()
        })
    }

    /// Forget every sample, snapshot and operation statistic.
    pub fn clear_history(&mut self) {
        self.metrics.clear();
        self.snapshots.clear();
        self.operations.clear();
        self.totals = OperationStats::default();
        self.alerts = 0;
        tracing::info!("performance history cleared");
    }
}

static EMPTY_SNAPSHOT: PerformanceSnapshot = PerformanceSnapshot {
    timestamp: 0.0,
    metrics: Vec::new(),
    host: HostStats {
        memory_mb: None,
        cpu_percent: None,
        threads: None,
    },
};

/// Evict from the front until `ring` holds at most `cap` entries.
/// Snapshots the worker may queue between polls. Anything beyond the
/// history cap would be trimmed on ingest anyway.
fn queue_capacity(config: &MonitorConfig) -> usize {
    config.max_snapshots_history.max(1)
}

fn trim<T>(ring: &mut VecDeque<T>, cap: usize) {
    while ring.len() > cap {
        ring.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn quiet() -> MonitorConfig {
        MonitorConfig {
            enable_system_monitoring: false,
            ..MonitorConfig::default()
        }
    }

    fn components(component: &str, name: &str, value: f64) -> ComponentMetrics {
        let mut out = ComponentMetrics::new();
        out.entry(component.into())
            .or_default()
            .insert(name.into(), value);
        out
    }

    // ── Sampling ─────────────────────────────────────────────────────

    #[test]
    fn sample_now_uses_published_metrics() {
        let mut monitor = PerformanceMonitor::new(quiet());
        monitor.publish(components("template_compiler", "compilations", 4.0));
        let snap = monitor.sample_now();
        assert_eq!(snap.metrics.len(), 1);
        assert_eq!(snap.metrics[0].name, "template_compiler_compilations");
        assert_eq!(monitor.summary().total_snapshots, 1);
    }

    #[test]
    fn history_is_bounded() {
        let mut monitor = PerformanceMonitor::new(MonitorConfig {
            max_metrics_history: 3,
            max_snapshots_history: 2,
            ..quiet()
        });
        monitor.publish(components("c", "x", 1.0));
        for _ in 0..5 {
            monitor.sample_now();
        }
        for _ in 0..5 {
            monitor.record_duration("op", 1.0, true);
        }
        let summary = monitor.summary();
        assert_eq!(summary.total_snapshots, 2);
        assert_eq!(summary.total_metrics, 3);
    }

    #[test]
    fn worker_snapshots_arrive_through_poll() {
        let mut monitor = PerformanceMonitor::new(MonitorConfig {
            monitoring_interval: 0.005,
            ..quiet()
        });
        monitor.publish(components("theme_manager", "theme_switches", 1.0));
        assert!(monitor.start());
        assert!(monitor.is_running());
        std::thread::sleep(Duration::from_millis(40));
        assert!(monitor.stop());
        assert!(!monitor.is_running());
        assert!(!monitor.stop());
        assert!(monitor.summary().total_snapshots >= 1);
    }

    #[test]
    fn worker_queue_is_bounded_by_history() {
        let mut monitor = PerformanceMonitor::new(MonitorConfig {
            monitoring_interval: 0.001,
            max_snapshots_history: 5,
            ..quiet()
        });
        assert!(monitor.start());
        std::thread::sleep(Duration::from_millis(100));
        assert!(monitor.poll() <= 5);
        monitor.stop();
        assert!(monitor.snapshots().count() <= 5);
    }

    #[test]
    fn tiny_interval_falls_back_instead_of_panicking() {
        let mut monitor = PerformanceMonitor::new(MonitorConfig {
            monitoring_interval: 1e-12,
            ..quiet()
        });
        assert!(monitor.start());
        assert!(monitor.is_running());
        assert!(monitor.stop());
    }

    #[test]
    fn disabled_monitor_does_not_start() {
        let mut monitor = PerformanceMonitor::new(MonitorConfig {
            enabled: false,
            ..quiet()
        });
        assert!(!monitor.start());
        assert!(!monitor.is_running());
    }

    // ── Alerts ───────────────────────────────────────────────────────

    #[test]
    fn crossings_fire_callbacks_with_level() {
        let mut monitor = PerformanceMonitor::new(quiet());
        let seen: Arc<Mutex<Vec<PerformanceLevel>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let id = monitor.add_alert_callback(move |alert| sink.lock().unwrap().push(alert.level));

        monitor.publish(components("template_compiler", "cache_hit_rate", 70.0));
        monitor.sample_now();
        monitor.publish(components("template_compiler", "cache_hit_rate", 10.0));
        monitor.sample_now();
        monitor.publish(components("template_compiler", "cache_hit_rate", 99.0));
        monitor.sample_now();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![PerformanceLevel::Poor, PerformanceLevel::Critical]
        );
        assert_eq!(monitor.summary().alerts, 2);

        assert!(monitor.remove_alert_callback(id));
        assert!(!monitor.remove_alert_callback(id));
    }

    #[test]
    fn alerts_can_be_disabled() {
        let mut monitor = PerformanceMonitor::new(MonitorConfig {
            enable_performance_alerts: false,
            ..quiet()
        });
        monitor.publish(components("c", "cpu_usage", 99.0));
        monitor.sample_now();
        assert_eq!(monitor.summary().alerts, 0);
    }

    #[test]
    fn classify_uses_matching_threshold() {
        let monitor = PerformanceMonitor::default();
        assert_eq!(monitor.classify("cpu_usage", 10.0), Some(PerformanceLevel::Excellent));
        assert_eq!(monitor.classify("dynamic_cpu_usage", 95.0), Some(PerformanceLevel::Critical));
        assert_eq!(monitor.classify("unknown", 1.0), None);
    }

    // ── Operations and reports ───────────────────────────────────────

    #[test]
    fn operations_keep_running_averages() {
        let mut monitor = PerformanceMonitor::new(quiet());
        monitor.record_duration("compile", 10.0, true);
        monitor.record_duration("compile", 30.0, false);
        monitor.record_operation("switch", Instant::now(), true);

        let compile = monitor.operation("compile").unwrap();
        assert_eq!(compile.count, 2);
        assert_eq!(compile.failures, 1);
        assert!((compile.average_ms - 20.0).abs() < 1e-9);

        let summary = monitor.summary();
        assert_eq!(summary.totals.count, 3);
        assert_eq!(summary.metric_summaries["compile_duration"].max, 30.0);
    }

    #[test]
    fn report_is_json_with_sections() {
        let mut monitor = PerformanceMonitor::new(quiet());
        monitor.record_duration("compile", 5.0, true);
        for _ in 0..12 {
            monitor.sample_now();
        }
        let report: serde_json::Value = serde_json::from_str(&monitor.export_report()).unwrap();
        for key in ["timestamp", "performance_summary", "recent_snapshots", "thresholds", "settings"] {
            assert!(report.get(key).is_some(), "{key}");
        }
        assert_eq!(report["recent_snapshots"].as_array().unwrap().len(), REPORT_SNAPSHOTS);
        assert_eq!(report["thresholds"]["cpu_usage"]["comparison"], ">");
    }

    #[test]
    fn clear_history_resets_everything() {
        let mut monitor = PerformanceMonitor::new(quiet());
        monitor.record_duration("compile", 5.0, true);
        monitor.sample_now();
        monitor.clear_history();
        let summary = monitor.summary();
        assert_eq!(summary.total_metrics, 0);
        assert_eq!(summary.total_snapshots, 0);
        assert!(summary.operations.is_empty());
        assert_eq!(summary.totals.count, 0);
    }
}
