//! Warning/critical thresholds and performance levels.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison a threshold applies as `value <op> threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterEqual,
    #[serde(rename = "<=")]
    LessEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl Comparison {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Greater => value > threshold,
            Comparison::Less => value < threshold,
            Comparison::GreaterEqual => value >= threshold,
            Comparison::LessEqual => value <= threshold,
            Comparison::Equal => (value - threshold).abs() < f64::EPSILON,
            Comparison::NotEqual => (value - threshold).abs() >= f64::EPSILON,
        }
    }
}

/// Badge classification of a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceLevel {
    Excellent,
    Good,
    Acceptable,
    Poor,
    Critical,
}

impl PerformanceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PerformanceLevel::Excellent => "excellent",
            PerformanceLevel::Good => "good",
            PerformanceLevel::Acceptable => "acceptable",
            PerformanceLevel::Poor => "poor",
            PerformanceLevel::Critical => "critical",
        }
    }

    /// Whether this level raises an alert.
    pub fn is_alert(self) -> bool {
        self >= PerformanceLevel::Poor
    }
}

impl fmt::Display for PerformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceThreshold {
    pub metric_name: String,
    pub warning: f64,
    pub critical: f64,
    pub comparison: Comparison,
}

impl PerformanceThreshold {
    pub fn new(metric_name: impl Into<String>, warning: f64, critical: f64, comparison: Comparison) -> Self {
        Self {
            metric_name: metric_name.into(),
            warning,
            critical,
            comparison,
        }
    }

    /// Critical and warning crossings map to `Critical`/`Poor`. Otherwise
    /// values above 80% of the warning threshold are acceptable, above 60%
    /// good, and anything lower excellent.
    pub fn level(&self, value: f64) -> PerformanceLevel {
        if self.comparison.holds(value, self.critical) {
            PerformanceLevel::Critical
        } else if self.comparison.holds(value, self.warning) {
            PerformanceLevel::Poor
        } else if value > self.warning * 0.8 {
            PerformanceLevel::Acceptable
        } else if value > self.warning * 0.6 {
            PerformanceLevel::Good
        } else {
            PerformanceLevel::Excellent
        }
    }

    /// Whether this threshold watches `metric`: an exact name or a
    /// `<component>_<name>` metric.
    pub fn applies_to(&self, metric: &str) -> bool {
        metric == self.metric_name
            || metric
                .strip_suffix(self.metric_name.as_str())
                .is_some_and(|prefix| prefix.ends_with('_'))
    }
}

/// The thresholds a fresh monitor watches.
pub fn default_thresholds() -> BTreeMap<String, PerformanceThreshold> {
    [
        PerformanceThreshold::new("response_time", 100.0, 500.0, Comparison::Greater),
        PerformanceThreshold::new("memory_usage", 100.0, 500.0, Comparison::Greater),
        PerformanceThreshold::new("cpu_usage", 70.0, 90.0, Comparison::Greater),
        PerformanceThreshold::new("cache_hit_rate", 80.0, 60.0, Comparison::Less),
        PerformanceThreshold::new("throughput", 100.0, 50.0, Comparison::Less),
    ]
    .into_iter()
    .map(|t| (t.metric_name.clone(), t))
    .collect()
}

/// A threshold crossing delivered to alert callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceAlert {
    pub timestamp: f64,
    pub level: PerformanceLevel,
    pub metric_name: String,
    pub value: f64,
    pub unit: String,
    pub warning: f64,
    pub critical: f64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greater_levels() {
        let t = PerformanceThreshold::new("response_time", 100.0, 500.0, Comparison::Greater);
        assert_eq!(t.level(600.0), PerformanceLevel::Critical);
        assert_eq!(t.level(200.0), PerformanceLevel::Poor);
        assert_eq!(t.level(90.0), PerformanceLevel::Acceptable);
        assert_eq!(t.level(70.0), PerformanceLevel::Good);
        assert_eq!(t.level(10.0), PerformanceLevel::Excellent);
    }

    #[test]
    fn less_levels() {
        let t = PerformanceThreshold::new("cache_hit_rate", 80.0, 60.0, Comparison::Less);
        assert_eq!(t.level(50.0), PerformanceLevel::Critical);
        assert_eq!(t.level(70.0), PerformanceLevel::Poor);
        assert!(!t.level(95.0).is_alert());
    }

    #[test]
    fn every_operator() {
        assert!(Comparison::GreaterEqual.holds(1.0, 1.0));
        assert!(Comparison::LessEqual.holds(1.0, 1.0));
        assert!(Comparison::Equal.holds(2.0, 2.0));
        assert!(Comparison::NotEqual.holds(2.0, 3.0));
        let op: Comparison = serde_json::from_str("\">=\"").unwrap();
        assert_eq!(op, Comparison::GreaterEqual);
    }

    #[test]
    fn applies_to_component_prefixed_names() {
        let t = PerformanceThreshold::new("cache_hit_rate", 80.0, 60.0, Comparison::Less);
        assert!(t.applies_to("cache_hit_rate"));
        assert!(t.applies_to("template_compiler_cache_hit_rate"));
        assert!(!t.applies_to("xcache_hit_rate"));
        assert!(!t.applies_to("cache_hit_rate_avg"));
    }

    #[test]
    fn defaults_cover_core_metrics() {
        let defaults = default_thresholds();
        assert_eq!(defaults.len(), 5);
        assert_eq!(defaults["cpu_usage"].critical, 90.0);
        assert_eq!(defaults["throughput"].comparison, Comparison::Less);
    }
}
