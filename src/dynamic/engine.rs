//! Dynamic style rules appended to compiled output when their conditions
//! hold for the current context.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ast::{Ast, NodeData};
use crate::compiler::Compiler;
use crate::config::DynamicConfig;
use crate::hash::{content_hash, tokens_hash};
use crate::metrics::Counters;
use crate::tokens::TokenSet;

use super::condition::{all_hold, StyleCondition};

/// A conditionally applied style block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicStyleRule {
    pub selector: String,
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<StyleCondition>,
    /// Media query prelude, e.g. `(max-width: 600px)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_query: Option<String>,
}

impl DynamicStyleRule {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            properties: BTreeMap::new(),
            conditions: Vec::new(),
            media_query: None,
        }
    }

    /// Add a declaration (builder).
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Add a condition (builder).
    pub fn with_condition(mut self, condition: StyleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Wrap in `@media <query>` (builder).
    pub fn with_media_query(mut self, query: impl Into<String>) -> Self {
        self.media_query = Some(query.into());
        self
    }

    pub fn matches(&self, context: &TokenSet) -> bool {
        all_hold(&self.conditions, context)
    }
}

/// Registry of dynamic rules plus the generated-output cache.
#[derive(Debug, Default)]
pub struct DynamicEngine {
    config: DynamicConfig,
    rules: Vec<DynamicStyleRule>,
    version: u64,
    cache: FxHashMap<(u64, u64, u64, u64), String>,
    counters: Counters,
}

impl DynamicEngine {
    pub fn new(config: DynamicConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &DynamicConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DynamicConfig) {
        self.config = config;
        self.clear_cache();
    }

    /// Register a rule from parts. See [`add_rule`](Self::add_rule).
    pub fn add_dynamic_style(
        &mut self,
        selector: &str,
        properties: BTreeMap<String, String>,
        conditions: Vec<StyleCondition>,
    ) -> bool {
        self.add_rule(DynamicStyleRule {
            selector: selector.to_string(),
            properties,
            conditions,
            media_query: None,
        })
    }

    /// Register `rule`, replacing any rule with the same selector in place.
    ///
    /// Returns `false` (and logs) for an empty selector or an empty
    /// property name.
    pub fn add_rule(&mut self, mut rule: DynamicStyleRule) -> bool {
        rule.selector = rule.selector.trim().to_string();
        if rule.selector.is_empty() {
            tracing::error!("rejected dynamic style: empty selector");
            return false;
        }
        if rule.properties.keys().any(|k| k.trim().is_empty()) {
            tracing::error!(selector = %rule.selector, "rejected dynamic style: empty property name");
            return false;
        }
        match self.rules.iter_mut().find(|r| r.selector == rule.selector) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
        self.touch();
        true
    }

    /// Remove the rule for `selector`. `false` if none was registered.
    pub fn remove_dynamic_style(&mut self, selector: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.selector != selector.trim());
        let removed = self.rules.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    pub fn rules(&self) -> &[DynamicStyleRule] {
        &self.rules
    }

    pub fn clear(&mut self) {
        self.rules.clear();
        self.touch();
    }

    /// Bumped on every registry mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
        self.cache.clear();
    }

    /// Rules whose conditions all hold, in registration order.
    pub fn matching_rules(&self, context: &TokenSet) -> Vec<&DynamicStyleRule> {
        self.rules.iter().filter(|r| r.matches(context)).collect()
    }

    /// Build a tree holding the matching rules.
    pub fn build_ast(&self, context: &TokenSet) -> Ast {
        let mut ast = Ast::new();
        let root = ast.root();
        for rule in self.matching_rules(context) {
            let parent = match &rule.media_query {
                Some(query) if self.config.enable_media_queries => {
                    let prelude = query.trim().trim_start_matches("@media").trim();
                    ast.insert_child(root, NodeData::condition("media", prelude))
                }
                Some(query) => {
                    tracing::debug!(selector = %rule.selector, query = %query, "media queries disabled; skipping rule");
                    continue;
                }
                None => root,
            };
            let node = ast.insert_child(parent, NodeData::rule());
            ast.insert_child(node, NodeData::selector(rule.selector.clone()));
            for (name, value) in &rule.properties {
                ast.insert_child(node, NodeData::declaration(name.clone(), value.clone()));
            }
        }
        ast
    }

    /// Compile `text`, then append every matching rule.
    ///
    /// `context` drives condition evaluation and also overrides tokens during
    /// compilation. Rule values may reference tokens.
    pub fn generate(&mut self, compiler: &mut Compiler, text: &str, context: &TokenSet) -> String {
        let key = (
            content_hash(text),
            tokens_hash(Some(context)),
            self.version,
            compiler.tokens_version(),
        );
        if self.config.enable_caching {
            if let Some(hit) = self.cache.get(&key) {
                self.counters.bump("cache_hits");
                return hit.clone();
            }
        }

        let base = compiler.compile(text, Some(context));
        let mut dynamic = self.build_ast(context);
        let matched = dynamic.find_nodes(crate::ast::NodeKind::Rule).len();
        compiler.substitute(&mut dynamic, Some(context));
        let out = format!("{base}{}", compiler.serialize(&dynamic));

        self.counters.bump("generations");
        self.counters.add("matched_rules", matched as f64);
        if self.config.enable_caching {
            self.cache.insert(key, out.clone());
        }
        out
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
        out.insert("rules".into(), self.rules.len() as f64);
        out.insert("cache_size".into(), self.cache.len() as f64);
        out
    }
}
