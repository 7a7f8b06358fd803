//! Named template lookup with preprocessing and a result cache.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Instant;

use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::compiler::parse_with_diagnostics;
use crate::compiler::tokenizer::{normalize_whitespace, strip_comments};
use crate::metrics::{ratio, Counters};
use crate::tokens::{eval, FunctionTable, Mode, TokenSet, TokenValue};

use super::store::{MemoryTemplateStore, StoreError, TemplateStore, DEFAULT_CATEGORY};

const IMPORT_PATTERN: &str = r#"@import\s+(?:url\()?["']?([^"');\s]+)["']?\)?\s*;?"#;

fn import_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(IMPORT_PATTERN).ok()).as_ref()
}

/// Summary of one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateInfo {
    pub name: String,
    pub category: Option<String>,
    pub content_length: usize,
    pub lines: usize,
    pub imports: Vec<String>,
}

#[derive(Debug, Clone)]
struct Cached {
    text: String,
    imports: Vec<String>,
}

/// Resolves template names to preprocessed text.
///
/// Lookup checks templates registered with [`set`](Self::set) first, then
/// the backing store. Loading runs, in order: comment stripping, whitespace
/// normalization, one level of `@import` inlining and, when requested,
/// variable substitution followed by function invocation.
pub struct TemplateLoader {
    store: Box<dyn TemplateStore>,
    inline: BTreeMap<String, String>,
    variables: TokenSet,
    functions: FunctionTable,
    cache: FxHashMap<(String, bool), Cached>,
    counters: Counters,
}

impl std::fmt::Debug for TemplateLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateLoader")
            .field("inline", &self.inline.len())
            .field("variables", &self.variables.len())
            .field("cache", &self.cache.len())
            .finish()
    }
}

impl Default for TemplateLoader {
    fn default() -> Self {
        Self::new(MemoryTemplateStore::new())
    }
}

impl TemplateLoader {
    pub fn new(store: impl TemplateStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            inline: BTreeMap::new(),
            variables: TokenSet::new(),
            functions: FunctionTable::with_builtins(),
            cache: FxHashMap::default(),
            counters: Counters::default(),
        }
    }

    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = functions;
        self.cache.clear();
        self
    }

    pub fn set_functions(&mut self, functions: FunctionTable) {
        self.functions = functions;
        self.cache.clear();
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Unprocessed text for `name`.
    pub fn raw(&self, name: &str) -> Result<String, StoreError> {
        if let Some(text) = self.inline.get(name) {
            return Ok(text.clone());
        }
        match self.store.read(name) {
            Ok(text) => Ok(text),
            // `base.css` falls back to `base`.
            Err(err) => match name.rsplit_once('.') {
                Some((stem, _)) if !stem.is_empty() => self
                    .inline
                    .get(stem)
                    .cloned()
                    .map_or_else(|| self.store.read(stem), Ok)
                    .map_err(|_| err),
                _ => Err(err),
            },
        }
    }

    /// Load and preprocess `name`, reporting why it failed.
    pub fn try_load(&mut self, name: &str, resolve_variables: bool) -> Result<String, StoreError> {
        let key = (name.to_string(), resolve_variables);
        if let Some(hit) = self.cache.get(&key) {
            self.counters.bump("cache_hits");
            return Ok(hit.text.clone());
        }

        let start = Instant::now();
        let raw = self.raw(name)?;
        let mut imports = Vec::new();
        let mut text = normalize_whitespace(&strip_comments(&raw));
        text = self.expand_imports(name, &text, &mut imports);
        if resolve_variables {
            text = self.resolve(name, &text);
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.counters.bump("loads");
        self.counters.add("total_load_ms", elapsed_ms);
        self.counters.max("peak_load_ms", elapsed_ms);
        self.cache.insert(
            key,
            Cached {
                text: text.clone(),
                imports,
            },
        );
        Ok(text)
    }

    /// Load and preprocess `name`. Missing templates log an error and load
    /// as the empty string.
    pub fn load(&mut self, name: &str, resolve_variables: bool) -> String {
        match self.try_load(name, resolve_variables) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(template = name, error = %err, "failed to load template");
                self.counters.bump("load_errors");
                String::new()
            }
        }
    }

    fn expand_imports(&self, name: &str, text: &str, imports: &mut Vec<String>) -> String {
        let Some(pattern) = import_pattern() else {
            return text.to_string();
        };
        pattern
            .replace_all(text, |caps: &Captures<'_>| {
                let target = &caps[1];
                if target == name {
                    tracing::warn!(template = name, "template imports itself; dropping directive");
                    return String::new();
                }
                match self.raw(target) {
                    // Inlined text keeps its own directives; expansion is one level.
                    Ok(raw) => {
                        imports.push(target.to_string());
                        normalize_whitespace(&strip_comments(&raw))
                    }
                    Err(err) => {
                        tracing::warn!(template = name, import = target, error = %err, "unresolved import");
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    fn resolve(&mut self, name: &str, text: &str) -> String {
        let refs = eval::evaluate(text, &self.variables, &self.functions, Mode::References);
        if refs.unresolved {
            self.counters.bump("unresolved_references");
            tracing::warn!(template = name, "template has unresolved variables; keeping text");
        }
        eval::evaluate_to_string(
            &refs.value.to_string(),
            &self.variables,
            &self.functions,
            Mode::Functions,
        )
    }

    // -----------------------------------------------------------------------
    // Registration and persistence
    // -----------------------------------------------------------------------

    /// Register `content` under `name`, shadowing the store.
    pub fn set(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let name = name.into();
        self.invalidate(&name);
        self.inline.insert(name, content.into());
    }

    /// Persist `content` to the store. An empty category means the default.
    pub fn save(&mut self, name: &str, content: &str, category: &str) -> bool {
        let category = if category.is_empty() {
            DEFAULT_CATEGORY
        } else {
            category
        };
        match self.store.write(name, content, category) {
            Ok(()) => {
                self.inline.remove(name);
                self.invalidate(name);
                tracing::info!(template = name, category, "saved template");
                true
            }
            Err(err) => {
                tracing::error!(template = name, error = %err, "failed to save template");
                false
            }
        }
    }

    /// Remove `name` everywhere. `false` if it existed nowhere.
    pub fn delete(&mut self, name: &str) -> bool {
        let inline = self.inline.remove(name).is_some();
        let stored = self.store.remove(name).is_ok();
        if inline || stored {
            self.invalidate(name);
        }
        inline || stored
    }

    /// Names from both registered and stored templates, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inline.keys().cloned().collect();
        names.extend(self.store.names());
        names.sort();
        names.dedup();
        names
    }

    /// Names whose name or raw content contains `query` (case-insensitive).
    pub fn search(&self, query: &str) -> Vec<String> {
        let needle = query.to_lowercase();
        self.list_names()
            .into_iter()
            .filter(|name| {
                name.to_lowercase().contains(&needle)
                    || self
                        .raw(name)
                        .is_ok_and(|text| text.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Check that `name` exists and parses cleanly.
    pub fn validate(&self, name: &str) -> (bool, Vec<String>) {
        let raw = match self.raw(name) {
            Ok(raw) => raw,
            Err(err) => return (false, vec![err.to_string()]),
        };
        let (_, errors) = parse_with_diagnostics(&raw);
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        (messages.is_empty(), messages)
    }

    pub fn info(&self, name: &str) -> Option<TemplateInfo> {
        let raw = self.raw(name).ok()?;
        let imports = import_pattern()
            .map(|p| {
                p.captures_iter(&raw)
                    .map(|c| c[1].to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Some(TemplateInfo {
            name: name.to_string(),
            category: if self.inline.contains_key(name) {
                None
            } else {
                self.store.category(name)
            },
            content_length: raw.chars().count(),
            lines: raw.lines().count(),
            imports,
        })
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    pub fn set_variable(&mut self, name: &str, value: impl Into<TokenValue>) {
        self.variables.set(name, value);
        self.drop_resolved();
    }

    pub fn set_variables<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: Into<TokenValue>,
    {
        for (k, v) in pairs {
            self.variables.set(k.as_ref(), v);
        }
        self.drop_resolved();
    }

    /// Replace every variable with `tokens`.
    pub fn replace_variables(&mut self, tokens: TokenSet) {
        self.variables = tokens;
        self.drop_resolved();
    }

    pub fn variable(&self, name: &str) -> Option<&TokenValue> {
        self.variables.lookup(name)
    }

    pub fn variables(&self) -> &TokenSet {
        &self.variables
    }

    pub fn clear_variables(&mut self) {
        self.variables = TokenSet::new();
        self.drop_resolved();
    }

    // -----------------------------------------------------------------------
    // Cache
    // -----------------------------------------------------------------------

    /// Drop cached results for `name` and for every template importing it.
    fn invalidate(&mut self, name: &str) {
        self.cache
            .retain(|(cached, _), entry| cached != name && !entry.imports.iter().any(|i| i == name));
    }

    fn drop_resolved(&mut self) {
        self.cache.retain(|(_, resolved), _| !resolved);
    }

    /// Forget registered templates and cached results. The store is untouched.
    pub fn clear(&mut self) {
        self.inline.clear();
        self.cache.clear();
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn reset_metrics(&mut self) {
        self.counters.reset();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let mut out = self.counters.snapshot();
        out.insert(
            "average_load_ms".into(),
            ratio(self.counters.get("total_load_ms"), self.counters.get("loads")),
        );
        out.insert("cache_size".into(), self.cache.len() as f64);
        out.insert("templates".into(), self.list_names().len() as f64);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BUTTON: &str = "QPushButton {\n    /* primary */\n    background-color: var(--primary-color);\n    padding: $spacing;\n}\n";

    fn loader() -> TemplateLoader {
        TemplateLoader::new(
            MemoryTemplateStore::new()
                .with_template("button", BUTTON)
                .with_categorized("main_window", "QMainWindow { color: red; }", "layouts"),
        )
    }

    // ── Loading ──────────────────────────────────────────────────────

    #[test]
    fn missing_template_loads_empty() {
        let mut l = loader();
        assert_eq!(l.load("nonexistent", true), "");
        assert_eq!(l.metrics()["load_errors"], 1.0);
        assert!(matches!(
            l.try_load("nonexistent", false),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn preprocessing_strips_and_normalizes() {
        let mut l = loader();
        assert_eq!(
            l.load("button", false),
            "QPushButton {\nbackground-color: var(--primary-color);\npadding: $spacing;\n}"
        );
    }

    #[test]
    fn variables_and_functions_resolve() {
        let mut l = loader();
        l.set_variable("primary-color", "#007acc");
        l.set_variable("spacing", "16px");
        assert_eq!(
            l.load("button", true),
            "QPushButton {\nbackground-color: #007acc;\npadding: 16px;\n}"
        );

        l.set("fn", "a { color: darken(#ffffff, 0); border: mix(#000000, #ffffff, 1) }");
        assert_eq!(
            l.load("fn", true),
            "a { color: #ffffff; border: #ffffff }"
        );
        assert_eq!(
            l.load("fn", false),
            "a { color: darken(#ffffff, 0); border: mix(#000000, #ffffff, 1) }"
        );
    }

    #[test]
    fn unresolved_variables_stay_verbatim() {
        let mut l = loader();
        let out = l.load("button", true);
        assert!(out.contains("var(--primary-color)"));
        assert!(out.contains("$spacing"));
        assert_eq!(l.metrics()["unresolved_references"], 1.0);
    }

    // ── Imports ──────────────────────────────────────────────────────

    #[test]
    fn import_forms_inline_the_target() {
        let mut l = TemplateLoader::default();
        l.set("base", "* { margin: 0; }");
        for directive in ["@import base;", "@import \"base\";", "@import url(base);", "@import 'base.css';"] {
            l.set("main", format!("{directive}\na {{ b: c; }}"));
            assert_eq!(l.load("main", false), "* { margin: 0; }\na { b: c; }", "{directive}");
        }
    }

    #[test]
    fn imports_expand_one_level() {
        let mut l = TemplateLoader::default();
        l.set("c", ".c { x: 1; }");
        l.set("b", "@import c;\n.b { x: 2; }");
        l.set("a", "@import b;\n.a { x: 3; }");
        assert_eq!(l.load("a", false), "@import c;\n.b { x: 2; }\n.a { x: 3; }");
    }

    #[test]
    fn self_import_is_dropped() {
        let mut l = TemplateLoader::default();
        l.set("loop", "@import loop;\n.a { x: 1; }");
        assert_eq!(l.load("loop", false), "\n.a { x: 1; }");
    }

    #[test]
    fn missing_import_keeps_directive() {
        let mut l = TemplateLoader::default();
        l.set("a", "@import ghost;\n.a { x: 1; }");
        assert_eq!(l.load("a", false), "@import ghost;\n.a { x: 1; }");
    }

    // ── Cache ────────────────────────────────────────────────────────

    #[test]
    fn cache_is_keyed_by_name_and_flag() {
        let mut l = loader();
        let first = l.load("button", true);
        let second = l.load("button", true);
        assert_eq!(first, second);
        assert_eq!(l.metrics()["cache_hits"], 1.0);
        l.load("button", false);
        assert_eq!(l.cache_len(), 2);
    }

    #[test]
    fn set_invalidates_name_and_importers() {
        let mut l = TemplateLoader::default();
        l.set("base", ".base { x: 1; }");
        l.set("main", "@import base;");
        assert_eq!(l.load("main", false), ".base { x: 1; }");
        l.set("base", ".base { x: 2; }");
        assert_eq!(l.load("main", false), ".base { x: 2; }");
        assert_eq!(l.load("base", false), ".base { x: 2; }");
    }

    #[test]
    fn variable_changes_drop_resolved_entries_only() {
        let mut l = loader();
        l.load("button", true);
        l.load("button", false);
        l.set_variable("spacing", "4px");
        assert_eq!(l.cache_len(), 1);
        assert!(l.load("button", true).contains("padding: 4px;"));
    }

    // ── Management ───────────────────────────────────────────────────

    #[test]
    fn save_delete_and_listing() {
        let mut l = loader();
        assert!(l.save("card", "QFrame { border: 1px; }", "components"));
        l.set("search_test", "QWidget { color: red; }");
        assert_eq!(
            l.list_names(),
            vec!["button", "card", "main_window", "search_test"]
        );
        assert_eq!(l.search("SEARCH"), vec!["search_test"]);
        assert_eq!(l.search("QMainWindow"), vec!["main_window"]);

        assert!(l.delete("card"));
        assert!(!l.delete("card"));
        assert!(!l.save("", "x", "components"));
    }

    #[test]
    fn validate_uses_parser_diagnostics() {
        let mut l = loader();
        l.set("valid", "QWidget { color: red; }");
        l.set("broken", "QWidget { color: red;");
        assert_eq!(l.validate("valid"), (true, vec![]));
        let (ok, errors) = l.validate("broken");
        assert!(!ok);
        assert!(!errors.is_empty());
        assert!(!l.validate("absent").0);
    }

    #[test]
    fn info_reports_shape() {
        let mut l = loader();
        l.set("info_test", "@import button;\nQWidget { color: red; }");
        let info = l.info("info_test").unwrap();
        assert_eq!(info.name, "info_test");
        assert_eq!(info.content_length, 39);
        assert_eq!(info.lines, 2);
        assert_eq!(info.imports, vec!["button"]);
        assert_eq!(info.category, None);
        assert_eq!(
            l.info("main_window").unwrap().category.as_deref(),
            Some("layouts")
        );
    }

    #[test]
    fn variable_management() {
        let mut l = loader();
        l.set_variable("test_var", "test_value");
        l.set_variables([("var1", "value1"), ("var2", "value2")]);
        assert_eq!(l.variable("var1"), Some(&TokenValue::from("value1")));
        assert_eq!(l.variables().len(), 3);
        l.clear_variables();
        assert!(l.variables().is_empty());
    }

    #[test]
    fn clear_forgets_registered_templates() {
        let mut l = loader();
        l.set("test1", "content1");
        l.load("test1", false);
        l.clear();
        assert_eq!(l.cache_len(), 0);
        assert_eq!(l.list_names(), vec!["button", "main_window"]);
    }
}
