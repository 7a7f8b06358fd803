//! Integration tests for theme-forge.
//!
//! These tests drive the public API from outside the crate: theme switching,
//! template compilation, optimization, dynamic rules and monitoring working
//! together through `ThemeManager`.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use theme_forge::compiler::parse;
use theme_forge::monitor::{Comparison, PerformanceLevel, PerformanceThreshold};
use theme_forge::tokens::FunctionTable;
use theme_forge::*;

fn variables() -> MemoryVariableStore {
    let base = TokenSet::from_json_str(
        r##"{
            "colors": {"primary": "#007acc", "secondary": "#6c757d", "black": "#000000"},
            "spacing": {"sm": "8px", "md": "16px"},
            "base": 8
        }"##,
    )
    .unwrap();
    let dark = TokenSet::from_json_str(r##"{"colors": {"primary": "#1e90ff"}}"##).unwrap();
    MemoryVariableStore::new()
        .with_base(base)
        .with_theme("light", TokenSet::new())
        .with_theme("dark", dark)
}

fn templates() -> MemoryTemplateStore {
    MemoryTemplateStore::new()
        .with_template("reset", "* { margin: 0; }")
        .with_categorized(
            "button",
            "@import reset;\n/* primary button */\n.btn { color: $colors.primary; padding: ${spacing.md}; }",
            "components",
        )
}

fn manager() -> ThemeManager {
    ThemeManager::new(ThemeConfig::new(), variables(), templates())
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[test]
fn theme_entries_override_nested_base_entries() {
    let mut m = manager();
    assert!(m.switch_theme("light"));
    assert_eq!(m.tokens().get("colors.primary"), Some(&TokenValue::from("#007acc")));

    assert!(m.switch_theme("dark"));
    assert_eq!(m.tokens().get("colors.primary"), Some(&TokenValue::from("#1e90ff")));
    assert_eq!(m.tokens().get("colors.secondary"), Some(&TokenValue::from("#6c757d")));
    assert_eq!(m.available_themes(), vec!["dark".to_string(), "light".to_string()]);
}

#[test]
fn reference_cycles_terminate() {
    let base = TokenSet::from_pairs([("a", "$b"), ("b", "$a"), ("gap", "4px")]);
    let store = MemoryVariableStore::new()
        .with_base(base)
        .with_theme("light", TokenSet::new());
    let mut m = ThemeManager::new(ThemeConfig::new(), store, MemoryTemplateStore::new());

    assert!(m.switch_theme("light"));
    let report = m.engine().last_report();
    assert!(!report.converged);
    assert_eq!(report.unresolved, vec!["a".to_string(), "b".to_string()]);
    assert!(m.tokens().get("a").unwrap().to_string().starts_with('$'));
    assert_eq!(m.tokens().get("gap"), Some(&TokenValue::from("4px")));
}

#[test]
fn function_identities() {
    let f = FunctionTable::with_builtins();
    let c = TokenValue::from("#336699");
    assert_eq!(f.call("mix", &[c.clone(), c.clone(), 0.4.into()]), Some(c.clone()));
    assert_eq!(f.call("lighten", &[c.clone(), 0.0.into()]), Some(c.clone()));
    assert_eq!(f.call("darken", &[c.clone(), 0.0.into()]), Some(c.clone()));
    assert_eq!(
        f.call("contrast", &[TokenValue::from("#000000")]),
        Some(TokenValue::from("#ffffff"))
    );
    assert_eq!(
        f.call("contrast", &[TokenValue::from("#ffffff")]),
        Some(TokenValue::from("#000000"))
    );
    assert_eq!(
        f.call("math", &[TokenValue::from("divide"), TokenValue::Int(10), TokenValue::Int(0)]),
        Some(TokenValue::Int(10))
    );
}

#[test]
fn functions_evaluate_inside_templates() {
    let mut m = manager();
    m.switch_theme("light");
    let out = m.compile(
        ".a { color: contrast($colors.black); margin: math(divide, $base, 0)px; border-color: darken($colors.primary, 0); }",
    );
    insta::assert_snapshot!(out, @".a{color:#ffffff;margin:8px;border-color:#007acc}");
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[test]
fn templates_inline_imports_and_compile() {
    let mut m = manager();
    m.switch_theme("dark");
    let out = m.compile_template("button", None);
    insta::assert_snapshot!(out, @"*{margin:0}.btn{color:#1e90ff;padding:16px}");

    let info = m.loader().info("button").unwrap();
    assert_eq!(info.imports, vec!["reset".to_string()]);
    assert_eq!(info.category.as_deref(), Some("components"));
}

#[test]
fn overwritten_template_recompiles() {
    let mut m = manager();
    m.switch_theme("light");
    m.loader_mut().set("reset", "* { padding: 0; }");
    let out = m.compile_template("button", None);
    assert_eq!(out, "*{padding:0}.btn{color:#007acc;padding:16px}");
    assert_eq!(m.compile_template("nope", None), "");
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

#[test]
fn compiled_output_round_trips() {
    let mut m = manager();
    m.switch_theme("light");
    let src = ".btn { color: $colors.primary; &:hover { color: $colors.secondary; } }\n\
               @media (max-width: 600px) { .btn { padding: ${spacing.sm}; } }";
    let once = m.compile(src);
    insta::assert_snapshot!(
        once,
        @".btn{color:#007acc}.btn:hover{color:#6c757d}@media (max-width: 600px){.btn{padding:8px}}"
    );
    assert_eq!(m.compile(&once), once);
}

#[test]
fn cached_output_is_byte_identical() {
    let mut m = manager();
    m.switch_theme("light");
    let src = ".a { color: $colors.primary; }";
    let first = m.compile(src);
    let second = m.compile(src);
    assert_eq!(first, second);

    let metrics = m.get_performance_metrics();
    assert_eq!(metrics["template_compiler"]["cache_hits"], 1.0);
    assert_eq!(metrics["template_compiler"]["compilations"], 1.0);
}

#[test]
fn theme_switch_invalidates_compiled_output() {
    let mut m = manager();
    m.switch_theme("light");
    let src = ".a { color: $colors.primary; }";
    assert_eq!(m.compile(src), ".a{color:#007acc}");
    m.switch_theme("dark");
    assert_eq!(m.compile(src), ".a{color:#1e90ff}");
}

#[test]
fn large_template_compiles_quickly() {
    let mut m = manager();
    m.switch_theme("light");
    let src: String = (0..200)
        .map(|i| format!(".rule-{i} {{ color: $colors.primary; padding: ${{spacing.md}}; margin: {i}px; }}\n"))
        .collect();
    let start = Instant::now();
    let out = m.compile(&src);
    let optimized = m.compile_with_optimization(&src, OptimizationLevel::Aggressive);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(out.contains(".rule-199{color:#007acc;padding:16px;margin:199px}"));
    assert!(optimized.len() <= out.len());
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

#[test]
fn optimization_levels_are_monotonic() {
    let src = ".a { color: red; color: blue; } .b {} .c { color: blue; } .a { margin: 0; } .d { margin: 0; }";
    let ast = parse(src);
    let mut optimizer = Optimizer::default();
    let (_, basic) = optimizer.optimize(&ast, OptimizationLevel::Basic);
    let (_, advanced) = optimizer.optimize(&ast, OptimizationLevel::Advanced);
    let (_, aggressive) = optimizer.optimize(&ast, OptimizationLevel::Aggressive);
    assert!(basic.optimized_nodes <= basic.original_nodes);
    assert!(advanced.optimized_nodes <= basic.optimized_nodes);
    assert!(aggressive.optimized_nodes <= advanced.optimized_nodes);
    assert!(aggressive.removed_nodes >= advanced.removed_nodes);

    let mut m = manager();
    m.switch_theme("light");
    let basic = m.compile_with_optimization(src, OptimizationLevel::Basic);
    let advanced = m.compile_with_optimization(src, OptimizationLevel::Advanced);
    let aggressive = m.compile_with_optimization(src, OptimizationLevel::Aggressive);
    assert!(advanced.len() <= basic.len());
    assert!(aggressive.len() <= advanced.len());
}

// ---------------------------------------------------------------------------
// Dynamic styles
// ---------------------------------------------------------------------------

#[test]
fn dynamic_rules_follow_dark_and_light_context() {
    let mut m = manager();
    m.switch_theme("light");
    let dark_props = BTreeMap::from([("background".to_string(), "#000000".to_string())]);
    let light_props = BTreeMap::from([("background".to_string(), "#ffffff".to_string())]);
    assert!(m.add_dynamic_style(".panel", dark_props, vec![StyleCondition::equals("mode", "dark")]));
    assert!(m.add_dynamic_style(".sheet", light_props, vec![StyleCondition::equals("mode", "light")]));
    assert!(!m.add_dynamic_style("", BTreeMap::new(), Vec::new()));

    let dark = TokenSet::from_pairs([("mode", "dark")]);
    let light = TokenSet::from_pairs([("mode", "light")]);
    let dark_out = m.generate_dynamic_output(".a { b: c; }", &dark);
    let light_out = m.generate_dynamic_output(".a { b: c; }", &light);
    assert!(dark_out.contains(".panel{background:#000000}"));
    assert!(!dark_out.contains(".sheet"));
    assert!(light_out.contains(".sheet{background:#ffffff}"));
    assert!(!light_out.contains(".panel"));
}

#[test]
fn unknown_condition_kind_never_matches() {
    let condition: StyleCondition =
        serde_json::from_str(r#"{"type": "matches_regex", "property": "mode", "value": "dark"}"#)
            .unwrap();
    let mut m = manager();
    m.switch_theme("light");
    let props = BTreeMap::from([("x".to_string(), "y".to_string())]);
    assert!(m.add_dynamic_style(".never", props, vec![condition]));
    let out = m.generate_dynamic_output(".a { b: c; }", &TokenSet::from_pairs([("mode", "dark")]));
    assert_eq!(out, ".a{b:c}");
}

// ---------------------------------------------------------------------------
// Settings and monitoring
// ---------------------------------------------------------------------------

#[test]
fn settings_load_from_toml() {
    let config = ThemeConfig::from_toml_str(
        r#"
        default_theme = "dark"

        [compiler]
        minify = false
        "#,
    )
    .unwrap();
    let mut m = ThemeManager::new(config, variables(), templates());
    assert_eq!(m.current_theme(), Some("dark"));
    assert_eq!(m.compile(".a { color: $colors.primary; }"), ".a {\n    color: #1e90ff;\n}\n");
}

#[test]
fn monitor_classifies_and_alerts() {
    let mut m = manager();
    let monitor = m.monitor_mut();
    monitor.set_threshold(PerformanceThreshold::new("compile_duration", 50.0, 200.0, Comparison::Greater));
    assert_eq!(monitor.classify("compile_duration", 300.0), Some(PerformanceLevel::Critical));
    assert_eq!(monitor.classify("compile_duration", 75.0), Some(PerformanceLevel::Poor));
    assert_eq!(monitor.classify("compile_duration", 1.0), Some(PerformanceLevel::Excellent));
}

#[test]
fn report_includes_theme_and_metrics() {
    let mut m = manager();
    m.switch_theme("dark");
    m.compile(".a { b: c; }");
    let report: serde_json::Value = serde_json::from_str(&m.export_report()).unwrap();
    assert_eq!(report["theme"], "dark");
    assert_eq!(report["performance_metrics"]["theme_manager"]["theme_switches"], 1.0);
    assert!(report["monitor"]["operations"]["compile"].is_object());
}
