//! ThemeConfig: settings for every component, loadable from TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::optimizer::OptimizationLevel;
use crate::tokens::resolver::DEFAULT_MAX_PASSES;

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(
        "monitoring_interval must be between {min} and {max} seconds, got {0}",
        min = MIN_MONITOR_INTERVAL,
        max = MAX_MONITOR_INTERVAL
    )]
    BadInterval(f64),
}

/// Shortest accepted sampling interval, in seconds.
pub const MIN_MONITOR_INTERVAL: f64 = 0.001;
/// Longest accepted sampling interval, in seconds (one day).
pub const MAX_MONITOR_INTERVAL: f64 = 86_400.0;
const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Template compiler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub cache_enabled: bool,
    pub minify: bool,
    pub remove_comments: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            minify: true,
            remove_comments: true,
        }
    }
}

/// AST optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub level: OptimizationLevel,
    pub cache_optimizations: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            level: OptimizationLevel::Advanced,
            cache_optimizations: true,
        }
    }
}

/// Dynamic style engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicConfig {
    pub enable_media_queries: bool,
    pub enable_caching: bool,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            enable_media_queries: true,
            enable_caching: true,
        }
    }
}

/// Performance monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Start sampling as soon as the theme manager is created.
    pub auto_monitoring: bool,
    /// Seconds between samples.
    pub monitoring_interval: f64,
    pub max_metrics_history: usize,
    pub max_snapshots_history: usize,
    pub enable_system_monitoring: bool,
    pub enable_performance_alerts: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_monitoring: false,
            monitoring_interval: DEFAULT_MONITOR_INTERVAL.as_secs_f64(),
            max_metrics_history: 10_000,
            max_snapshots_history: 1_000,
            enable_system_monitoring: true,
            enable_performance_alerts: true,
        }
    }
}

impl MonitorConfig {
    /// Whether `monitoring_interval` lies in the accepted range.
    pub fn interval_in_range(&self) -> bool {
        (MIN_MONITOR_INTERVAL..=MAX_MONITOR_INTERVAL).contains(&self.monitoring_interval)
    }

    /// Sampling interval; out-of-range values fall back to the default.
    pub fn interval(&self) -> Duration {
        if !self.interval_in_range() {
            return DEFAULT_MONITOR_INTERVAL;
        }
        Duration::try_from_secs_f64(self.monitoring_interval).unwrap_or(DEFAULT_MONITOR_INTERVAL)
    }
}

/// Token resolver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub max_passes: usize,
    pub enable_validation: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            enable_validation: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ThemeConfig
// ---------------------------------------------------------------------------

/// Settings for the whole pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    /// Theme selected when the manager is created.
    pub default_theme: Option<String>,
    pub compiler: CompilerConfig,
    pub optimizer: OptimizerConfig,
    pub dynamic: DynamicConfig,
    pub monitor: MonitorConfig,
    pub resolver: ResolverConfig,
}

impl ThemeConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ThemeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.monitor.interval_in_range() {
            return Err(ConfigError::BadInterval(self.monitor.monitoring_interval));
        }
        Ok(())
    }

    /// Set the initial theme (builder).
    pub fn with_default_theme(mut self, name: impl Into<String>) -> Self {
        self.default_theme = Some(name.into());
        self
    }

    /// Set minification (builder).
    pub fn with_minify(mut self, minify: bool) -> Self {
        self.compiler.minify = minify;
        self
    }

    /// Set comment removal (builder).
    pub fn with_remove_comments(mut self, remove: bool) -> Self {
        self.compiler.remove_comments = remove;
        self
    }

    /// Set the default optimization level (builder).
    pub fn with_level(mut self, level: OptimizationLevel) -> Self {
        self.optimizer.level = level;
        self
    }

    /// Enable or disable every cache (builder).
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.compiler.cache_enabled = enabled;
        self.optimizer.cache_optimizations = enabled;
        self.dynamic.enable_caching = enabled;
        self
    }

    /// Set media query support for dynamic rules (builder).
    pub fn with_media_queries(mut self, enabled: bool) -> Self {
        self.dynamic.enable_media_queries = enabled;
        self
    }

    /// Replace the monitor section (builder).
    pub fn with_monitor(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    /// Replace the resolver section (builder).
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }
}
