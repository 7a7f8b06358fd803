//! ThemeManager: the public surface tying tokens, templates, compiler,
//! optimizer, dynamic styles and the performance monitor together.
//!
//! The manager owns every cache and is the single point that invalidates
//! them on a theme switch or a settings change.

use std::collections::BTreeMap;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::Serialize;
use thiserror::Error;

use crate::compiler::Compiler;
use crate::config::{ConfigError, ThemeConfig};
use crate::dynamic::{DynamicEngine, DynamicStyleRule, StyleCondition};
use crate::hash::content_hash;
use crate::metrics::{ratio, Counters};
use crate::monitor::{unix_now, ComponentMetrics, PerformanceMonitor, PerformanceSummary};
use crate::optimizer::{OptimizationLevel, Optimizer};
use crate::template::{MemoryTemplateStore, TemplateLoader, TemplateStore};
use crate::tokens::{
    normalize_theme_name, FunctionTable, MemoryVariableStore, Resolver, TokenEngine, TokenSet,
    TokenValue, VariableStore,
};

/// Errors from theme switching and settings updates.
#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("unknown theme: {0}")]
    UnknownTheme(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Compiled-and-optimized cache key: (source hash, token version, level).
type OptimizedKey = (u64, u64, OptimizationLevel);

#[derive(Serialize)]
struct Report<'a> {
    timestamp: f64,
    theme: Option<&'a str>,
    performance_metrics: ComponentMetrics,
    monitor: PerformanceSummary,
    settings: &'a ThemeConfig,
}

/// Orchestrates the theming pipeline.
///
/// # Example
///
/// ```
/// use theme_forge::{MemoryTemplateStore, MemoryVariableStore, ThemeConfig, ThemeManager, TokenSet};
///
/// let base = TokenSet::from_pairs([("primary", "#007acc")]);
/// let variables = MemoryVariableStore::new()
///     .with_base(base)
///     .with_theme("light", TokenSet::new());
/// let mut manager = ThemeManager::new(ThemeConfig::new(), variables, MemoryTemplateStore::new());
///
/// assert!(manager.switch_theme("light"));
/// assert_eq!(manager.compile(".a { color: $primary; }"), ".a{color:#007acc}");
/// ```
#[derive(Debug)]
pub struct ThemeManager {
    config: ThemeConfig,
    engine: TokenEngine,
    loader: TemplateLoader,
    compiler: Compiler,
    optimizer: Optimizer,
    dynamic: DynamicEngine,
    monitor: PerformanceMonitor,
    current_theme: Option<String>,
    tokens: TokenSet,
    optimized: FxHashMap<OptimizedKey, String>,
    counters: Counters,
}

impl Default for ThemeManager {
    fn default() -> Self {
        Self::new(
            ThemeConfig::default(),
            MemoryVariableStore::new(),
            MemoryTemplateStore::new(),
        )
    }
}

impl ThemeManager {
    /// Build a manager over the given stores.
    ///
    /// Selects `config.default_theme` when set, and starts the monitor when
    /// `auto_monitoring` is on.
    pub fn new(
        config: ThemeConfig,
        variables: impl VariableStore + 'static,
        templates: impl TemplateStore + 'static,
    ) -> Self {
        let engine = TokenEngine::new(variables).with_resolver(resolver_for(&config));
        let functions = engine.functions().clone();
        let mut manager = Self {
            loader: TemplateLoader::new(templates).with_functions(functions.clone()),
            compiler: Compiler::new(config.compiler.clone()).with_functions(functions),
            optimizer: Optimizer::new(config.optimizer.clone()),
            dynamic: DynamicEngine::new(config.dynamic.clone()),
            monitor: PerformanceMonitor::new(config.monitor.clone()),
            engine,
            current_theme: None,
            tokens: TokenSet::new(),
            optimized: FxHashMap::default(),
            counters: Counters::default(),
            config,
        };
        if let Some(theme) = manager.config.default_theme.clone() {
            manager.switch_theme(&theme);
        }
        if manager.config.monitor.enabled && manager.config.monitor.auto_monitoring {
            manager.start_monitoring();
        }
        manager
    }

    // -----------------------------------------------------------------------
    // Themes
    // -----------------------------------------------------------------------

    /// Switch to `name`. Unknown themes leave every piece of state untouched.
    pub fn try_switch_theme(&mut self, name: &str) -> Result<(), ThemeError> {
        let start = Instant::now();
        let canonical = if self.engine.available_themes().iter().any(|t| t == name) {
            name.to_string()
        } else {
            normalize_theme_name(name)
        };
        let tokens = self
            .engine
            .build_theme(&canonical)
            .ok_or_else(|| ThemeError::UnknownTheme(name.to_string()))?;

        let report = self.engine.last_report();
        if !report.unresolved.is_empty() {
            tracing::warn!(theme = %canonical, unresolved = ?report.unresolved, "theme has unresolved tokens");
        }
        for issue in &report.issues {
            tracing::warn!(theme = %canonical, path = %issue.path, "{}", issue.message);
        }

        self.apply_tokens(tokens);
        tracing::info!(theme = %canonical, "switched theme");
        self.current_theme = Some(canonical);
        self.counters.bump("theme_switches");
        self.finish("theme_switch", start);
        Ok(())
    }

    /// Switch to `name`; `false` (and a warning) when it does not exist.
    pub fn switch_theme(&mut self, name: &str) -> bool {
        match self.try_switch_theme(name) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "theme switch rejected");
                false
            }
        }
    }

    fn apply_tokens(&mut self, tokens: TokenSet) {
        self.compiler.set_tokens(tokens.clone());
        self.loader.replace_variables(tokens.clone());
        self.tokens = tokens;
        self.clear_caches();
    }

    pub fn current_theme(&self) -> Option<&str> {
        self.current_theme.as_deref()
    }

    /// The merged, resolved tokens of the current theme.
    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    pub fn token(&self, path: &str) -> Option<&TokenValue> {
        self.tokens.lookup(path)
    }

    pub fn available_themes(&self) -> Vec<String> {
        self.engine.available_themes()
    }

    /// Register a value function everywhere templates and tokens are
    /// evaluated. Takes effect for the current theme immediately.
    pub fn register_function<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[TokenValue]) -> Option<TokenValue> + Send + Sync + 'static,
    {
        self.engine.functions_mut().register(name, f);
        let functions: FunctionTable = self.engine.functions().clone();
        self.compiler.set_functions(functions.clone());
        self.loader.set_functions(functions);
        self.rebuild_current();
    }

    fn rebuild_current(&mut self) {
        match self.current_theme.clone() {
            Some(theme) => {
                if let Some(tokens) = self.engine.build_theme(&theme) {
                    self.apply_tokens(tokens);
                }
            }
            None => self.clear_caches(),
        }
    }

    // -----------------------------------------------------------------------
    // Compilation
    // -----------------------------------------------------------------------

    pub fn compile(&mut self, text: &str) -> String {
        self.compile_with_context(text, None)
    }

    /// Compile with `context` layered over the theme tokens.
    pub fn compile_with_context(&mut self, text: &str, context: Option<&TokenSet>) -> String {
        let start = Instant::now();
        let out = self.compiler.compile(text, context);
        self.finish("compile", start);
        out
    }

    /// Compile, optimize at `level`, serialize. Cached per (content, level)
    /// for the current tokens.
    pub fn compile_with_optimization(&mut self, text: &str, level: OptimizationLevel) -> String {
        let start = Instant::now();
        let key = (content_hash(text), self.compiler.tokens_version(), level);
        let caching = self.config.optimizer.cache_optimizations;
        if caching {
            if let Some(hit) = self.optimized.get(&key) {
                self.counters.bump("optimized_cache_hits");
                return hit.clone();
            }
        }
        self.counters.bump("optimized_cache_misses");

        let ast = self.compiler.compile_ast(text, None);
        let (optimized, result) = self.optimizer.optimize(&ast, level);
        let out = self.compiler.serialize(&optimized);
        tracing::debug!(
            level = %level,
            removed = result.removed_nodes,
            bytes = out.len(),
            "compiled with optimization"
        );
        if caching {
            self.optimized.insert(key, out.clone());
        }
        self.finish("compile_optimized", start);
        out
    }

    /// [`compile_with_optimization`](Self::compile_with_optimization) at the
    /// configured level.
    pub fn compile_optimized(&mut self, text: &str) -> String {
        let level = self.config.optimizer.level;
        self.compile_with_optimization(text, level)
    }

    /// Load `name` from the template store and compile it. Missing templates
    /// compile to the empty string.
    pub fn compile_template(&mut self, name: &str, context: Option<&TokenSet>) -> String {
        let text = self.loader.load(name, false);
        if text.is_empty() {
            return text;
        }
        self.compile_with_context(&text, context)
    }

    // -----------------------------------------------------------------------
    // Dynamic styles
    // -----------------------------------------------------------------------

    pub fn add_dynamic_style(
        &mut self,
        selector: &str,
        properties: BTreeMap<String, String>,
        conditions: Vec<StyleCondition>,
    ) -> bool {
        self.dynamic.add_dynamic_style(selector, properties, conditions)
    }

    pub fn add_dynamic_rule(&mut self, rule: DynamicStyleRule) -> bool {
        self.dynamic.add_rule(rule)
    }

    pub fn remove_dynamic_style(&mut self, selector: &str) -> bool {
        self.dynamic.remove_dynamic_style(selector)
    }

    pub fn dynamic_rules(&self) -> &[DynamicStyleRule] {
        self.dynamic.rules()
    }

    /// Compile `text` and append every dynamic rule matching `context`.
    pub fn generate_dynamic_output(&mut self, text: &str, context: &TokenSet) -> String {
        let start = Instant::now();
        let out = self.dynamic.generate(&mut self.compiler, text, context);
        self.finish("generate_dynamic", start);
        out
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &ThemeConfig {
        &self.config
    }

    pub fn engine(&self) -> &TokenEngine {
        &self.engine
    }

    pub fn loader(&self) -> &TemplateLoader {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut TemplateLoader {
        &mut self.loader
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    /// Mutable monitor access, after ingesting pending snapshots.
    pub fn monitor_mut(&mut self) -> &mut PerformanceMonitor {
        self.monitor.poll();
        &mut self.monitor
    }

    // -----------------------------------------------------------------------
    // Settings and caches
    // -----------------------------------------------------------------------

    /// Apply new settings to every component and drop every cache.
    ///
    /// A changed resolver section re-resolves the current theme. An invalid
    /// config is rejected without changing anything.
    pub fn update_settings(&mut self, config: ThemeConfig) -> Result<(), ThemeError> {
        config.validate()?;
        let resolver_changed = config.resolver != self.config.resolver;
        self.compiler.set_config(config.compiler.clone());
        self.optimizer.set_config(config.optimizer.clone());
        self.dynamic.set_config(config.dynamic.clone());
        self.monitor.set_config(config.monitor.clone());
        self.engine.set_resolver(resolver_for(&config));
        self.config = config;
        if resolver_changed {
            self.rebuild_current();
        } else {
            self.clear_caches();
        }
        tracing::info!("theme settings updated");
        Ok(())
    }

    /// Drop every compiled, optimized, loaded and dynamic cache entry.
    pub fn clear_caches(&mut self) {
        self.compiler.clear_cache();
        self.optimizer.clear_cache();
        self.dynamic.clear_cache();
        self.loader.clear_cache();
        self.optimized.clear();
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Zero the counters of every component. Caches and monitor history
    /// are kept.
    pub fn reset_metrics(&mut self) {
        self.compiler.reset_metrics();
        self.optimizer.reset_metrics();
        self.dynamic.reset_metrics();
        self.loader.reset_metrics();
        self.counters.reset();
    }

    /// Counters per component.
    pub fn get_performance_metrics(&self) -> ComponentMetrics {
        let mut manager = self.counters.snapshot();
        let hits = self.counters.get("optimized_cache_hits");
        let misses = self.counters.get("optimized_cache_misses");
        manager.insert("optimized_cache_hit_rate".into(), ratio(hits, hits + misses) * 100.0);
        manager.insert("optimized_cache_size".into(), self.optimized.len() as f64);
        manager.insert("tokens".into(), self.tokens.paths().len() as f64);
        manager.insert("themes".into(), self.engine.available_themes().len() as f64);

        let mut out = ComponentMetrics::new();
        out.insert("template_compiler".into(), self.compiler.metrics());
        out.insert("template_loader".into(), self.loader.metrics());
        out.insert("compiler_optimizer".into(), self.optimizer.metrics());
        out.insert("dynamic_style_engine".into(), self.dynamic.metrics());
        out.insert("theme_manager".into(), manager);
        out
    }

    /// JSON report: timestamp, theme, component metrics, monitor summary and
    /// settings.
    pub fn export_report(&mut self) -> String {
        self.monitor.poll();
        let report = Report {
            timestamp: unix_now(),
            theme: self.current_theme.as_deref(),
            performance_metrics: self.get_performance_metrics(),
            monitor: self.monitor.summary(),
            settings: &self.config,
        };
        serde_json::to_string_pretty(&report).unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to export theme report");
            String::new()
        })
    }

    pub fn start_monitoring(&mut self) -> bool {
        self.monitor.publish(self.get_performance_metrics());
        self.monitor.start()
    }

    pub fn stop_monitoring(&mut self) -> bool {
        self.monitor.stop()
    }

    /// Record an operation, ingest queued snapshots and feed fresh metrics
    /// to a running monitor.
    fn finish(&mut self, operation: &str, start: Instant) {
        if !self.config.monitor.enabled {
            return;
        }
        self.monitor.record_operation(operation, start, true);
        if self.monitor.is_running() {
            self.monitor.poll();
            self.monitor.publish(self.get_performance_metrics());
        }
    }
}

impl Drop for ThemeManager {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}

fn resolver_for(config: &ThemeConfig) -> Resolver {
    Resolver::new(config.resolver.max_passes).with_validation(config.resolver.enable_validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::dynamic::StyleCondition;
    use pretty_assertions::assert_eq;

    fn variables() -> MemoryVariableStore {
        let base = TokenSet::from_json_str(
            r##"{"primary": "#007acc", "text": "contrast($primary)", "spacing": {"md": "16px"}}"##,
        )
        .unwrap();
        MemoryVariableStore::new()
            .with_base(base)
            .with_theme("light", TokenSet::new())
            .with_theme("dark", TokenSet::from_pairs([("primary", "#1e90ff")]))
            .with_theme("high-contrast", TokenSet::from_pairs([("primary", "#000000")]))
    }

    fn manager() -> ThemeManager {
        let templates = MemoryTemplateStore::new()
            .with_template("button", ".btn { color: $primary; padding: ${spacing.md}; }");
        ThemeManager::new(ThemeConfig::new(), variables(), templates)
    }

    // ── Themes ───────────────────────────────────────────────────────

    #[test]
    fn switching_rebuilds_tokens() {
        let mut m = manager();
        assert!(m.switch_theme("light"));
        assert_eq!(m.token("primary"), Some(&TokenValue::from("#007acc")));
        assert!(m.switch_theme("dark"));
        assert_eq!(m.token("primary"), Some(&TokenValue::from("#1e90ff")));
        assert_eq!(m.current_theme(), Some("dark"));
    }

    #[test]
    fn theme_names_normalize() {
        let mut m = manager();
        assert!(m.switch_theme("high_contrast"));
        assert_eq!(m.current_theme(), Some("high-contrast"));
        assert_eq!(m.token("text"), Some(&TokenValue::from("#ffffff")));
    }

    #[test]
    fn unknown_theme_has_no_side_effects() {
        let mut m = manager();
        m.switch_theme("dark");
        let out = m.compile(".a { color: $primary; }");
        let compiled = m.compiler().output_cache_len();

        assert!(!m.switch_theme("neon"));
        assert!(matches!(
            m.try_switch_theme("neon"),
            Err(ThemeError::UnknownTheme(name)) if name == "neon"
        ));
        assert_eq!(m.current_theme(), Some("dark"));
        assert_eq!(m.compiler().output_cache_len(), compiled);
        assert_eq!(m.compile(".a { color: $primary; }"), out);
    }

    #[test]
    fn default_theme_applies_on_creation() {
        let m = ThemeManager::new(
            ThemeConfig::new().with_default_theme("dark"),
            variables(),
            MemoryTemplateStore::new(),
        );
        assert_eq!(m.current_theme(), Some("dark"));
    }

    // ── Compilation ──────────────────────────────────────────────────

    #[test]
    fn compile_uses_theme_tokens() {
        let mut m = manager();
        m.switch_theme("light");
        assert_eq!(m.compile(".a { color: $primary; }"), ".a{color:#007acc}");
        m.switch_theme("dark");
        assert_eq!(m.compile(".a { color: $primary; }"), ".a{color:#1e90ff}");
    }

    #[test]
    fn context_overrides_tokens() {
        let mut m = manager();
        m.switch_theme("light");
        let ctx = TokenSet::from_pairs([("primary", "red")]);
        assert_eq!(
            m.compile_with_context(".a { color: $primary; }", Some(&ctx)),
            ".a{color:red}"
        );
    }

    #[test]
    fn compile_template_by_name() {
        let mut m = manager();
        m.switch_theme("light");
        assert_eq!(
            m.compile_template("button", None),
            ".btn{color:#007acc;padding:16px}"
        );
        assert_eq!(m.compile_template("missing", None), "");
    }

    #[test]
    fn optimized_output_is_cached_per_level() {
        let mut m = manager();
        m.switch_theme("light");
        let src = ".a { color: red; color: $primary; } .b {}";
        let advanced = m.compile_with_optimization(src, OptimizationLevel::Advanced);
        assert_eq!(advanced, ".a{color:#007acc}");
        assert_eq!(m.compile_with_optimization(src, OptimizationLevel::Advanced), advanced);
        let basic = m.compile_with_optimization(src, OptimizationLevel::Basic);
        assert_eq!(basic, ".a{color:red;color:#007acc}");

        let metrics = m.get_performance_metrics();
        assert_eq!(metrics["theme_manager"]["optimized_cache_hits"], 1.0);
        assert_eq!(metrics["theme_manager"]["optimized_cache_size"], 2.0);

        m.switch_theme("dark");
        assert_eq!(m.get_performance_metrics()["theme_manager"]["optimized_cache_size"], 0.0);
        assert_eq!(
            m.compile_with_optimization(src, OptimizationLevel::Advanced),
            ".a{color:#1e90ff}"
        );
    }

    #[test]
    fn registered_functions_reach_templates() {
        let mut m = manager();
        m.switch_theme("light");
        m.register_function("double", |args| {
            Some(TokenValue::Int(args.first()?.as_f64()? as i64 * 2))
        });
        assert_eq!(m.compile(".a { width: double(21); }"), ".a{width:42}");
    }

    // ── Dynamic styles ───────────────────────────────────────────────

    #[test]
    fn dynamic_rules_follow_context() {
        let mut m = manager();
        m.switch_theme("light");
        let props = BTreeMap::from([("background".to_string(), "$primary".to_string())]);
        assert!(m.add_dynamic_style(".panel", props, vec![StyleCondition::equals("mode", "dark")]));
        let dark = TokenSet::from_pairs([("mode", "dark")]);
        let light = TokenSet::from_pairs([("mode", "light")]);
        assert_eq!(
            m.generate_dynamic_output(".a { b: c; }", &dark),
            ".a{b:c}.panel{background:#007acc}"
        );
        assert_eq!(m.generate_dynamic_output(".a { b: c; }", &light), ".a{b:c}");

        // Rules survive theme switches.
        m.switch_theme("dark");
        assert_eq!(
            m.generate_dynamic_output(".a { b: c; }", &dark),
            ".a{b:c}.panel{background:#1e90ff}"
        );
        assert!(m.remove_dynamic_style(".panel"));
        assert!(m.dynamic_rules().is_empty());
    }

    // ── Settings and diagnostics ─────────────────────────────────────

    #[test]
    fn update_settings_applies_and_invalidates() {
        let mut m = manager();
        m.switch_theme("light");
        m.compile(".a { color: red; }");
        m.update_settings(ThemeConfig::new().with_minify(false)).unwrap();
        assert_eq!(m.compiler().output_cache_len(), 0);
        assert_eq!(m.compile(".a { color: red; }"), ".a {\n    color: red;\n}\n");
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut m = manager();
        let bad = ThemeConfig::new().with_monitor(MonitorConfig {
            monitoring_interval: -1.0,
            ..MonitorConfig::default()
        });
        assert!(matches!(m.update_settings(bad), Err(ThemeError::Config(_))));
        assert!(m.config().compiler.minify);
    }

    #[test]
    fn metrics_cover_every_component() {
        let mut m = manager();
        m.switch_theme("light");
        m.compile(".a { b: c; }");
        let metrics = m.get_performance_metrics();
        let components: Vec<&str> = metrics.keys().map(String::as_str).collect();
        assert_eq!(
            components,
            vec![
                "compiler_optimizer",
                "dynamic_style_engine",
                "template_compiler",
                "template_loader",
                "theme_manager"
            ]
        );
        assert_eq!(metrics["theme_manager"]["theme_switches"], 1.0);
        assert_eq!(m.monitor().operation("compile").map(|s| s.count), Some(1));
    }

    #[test]
    fn reset_metrics_keeps_caches() {
        let mut m = manager();
        m.switch_theme("light");
        m.compile_template("button", None);
        assert_eq!(m.get_performance_metrics()["template_compiler"]["compilations"], 1.0);
        assert!(m.get_performance_metrics()["template_compiler"]["peak_compile_ms"] >= 0.0);

        m.reset_metrics();
        let metrics = m.get_performance_metrics();
        assert_eq!(metrics["template_compiler"].get("compilations"), None);
        assert_eq!(metrics["template_loader"].get("loads"), None);
        assert_eq!(metrics["theme_manager"].get("theme_switches"), None);
        assert_eq!(m.compiler().output_cache_len(), 1);

        m.compile_template("button", None);
        assert_eq!(m.get_performance_metrics()["template_compiler"]["cache_hits"], 1.0);
    }

    #[test]
    fn report_is_json() {
        let mut m = manager();
        m.switch_theme("dark");
        let report: serde_json::Value = serde_json::from_str(&m.export_report()).unwrap();
        assert_eq!(report["theme"], "dark");
        assert!(report["performance_metrics"]["template_compiler"].is_object());
        assert!(report["settings"]["compiler"]["minify"].as_bool().unwrap());
    }

    #[test]
    fn operations_ingest_worker_snapshots() {
        let mut m = ThemeManager::new(
            ThemeConfig::new().with_monitor(MonitorConfig {
                monitoring_interval: 0.005,
                max_snapshots_history: 3,
                enable_system_monitoring: false,
                ..MonitorConfig::default()
            }),
            variables(),
            MemoryTemplateStore::new(),
        );
        m.switch_theme("light");
        assert!(m.start_monitoring());
        std::thread::sleep(std::time::Duration::from_millis(50));
        m.compile(".a { b: c; }");
        let ingested = m.monitor().snapshots().count();
        assert!((1..=3).contains(&ingested));
        m.stop_monitoring();
    }

    #[test]
    fn monitoring_starts_and_stops() {
        let mut m = ThemeManager::new(
            ThemeConfig::new().with_monitor(MonitorConfig {
                monitoring_interval: 0.01,
                enable_system_monitoring: false,
                ..MonitorConfig::default()
            }),
            variables(),
            MemoryTemplateStore::new(),
        );
        assert!(m.start_monitoring());
        assert!(m.monitor().is_running());
        assert!(m.stop_monitoring());
        assert!(!m.monitor().is_running());
    }
}
