//! Template compiler: parse → substitute → serialize, with caches.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::ast::{keys, Ast, NodeId, NodeKind};
use crate::config::CompilerConfig;
use crate::hash::{content_hash, tokens_hash};
use crate::metrics::{ratio, Counters};
use crate::tokens::{eval, FunctionTable, Layered, Mode, Scope, TokenSet, TokenValue};

use super::parser;
use super::serializer::{serialize, SerializeOptions};

/// Output cache key: (source hash, context hash, token version).
type OutputKey = (u64, u64, u64);

/// Compiles templates against a token set.
#[derive(Debug)]
pub struct Compiler {
    config: CompilerConfig,
    tokens: TokenSet,
    tokens_version: u64,
    functions: FunctionTable,
    ast_cache: FxHashMap<u64, Ast>,
    output_cache: FxHashMap<OutputKey, String>,
    counters: Counters,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            tokens: TokenSet::new(),
            tokens_version: 0,
            functions: FunctionTable::with_builtins(),
            ast_cache: FxHashMap::default(),
            output_cache: FxHashMap::default(),
            counters: Counters::default(),
        }
    }

    /// Use `functions` for calls inside declaration values (builder).
    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = functions;
        self
    }

    /// Swap the function table; clears both caches.
    pub fn set_functions(&mut self, functions: FunctionTable) {
        self.functions = functions;
        self.clear_cache();
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Replace the settings; clears both caches.
    pub fn set_config(&mut self, config: CompilerConfig) {
        self.config = config;
        self.clear_cache();
    }

    pub fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions {
            minify: self.config.minify,
            remove_comments: self.config.remove_comments,
        }
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    /// Replace the token set. Compiled outputs for older sets stop matching.
    pub fn set_tokens(&mut self, tokens: TokenSet) {
        self.tokens = tokens;
        self.tokens_version += 1;
        self.output_cache.clear();
    }

    pub fn tokens_version(&self) -> u64 {
        self.tokens_version
    }

    /// Parse `text`, reusing a cached tree for identical content.
    pub fn parse(&mut self, text: &str) -> Ast {
        let key = content_hash(text);
        if self.config.cache_enabled {
            if let Some(ast) = self.ast_cache.get(&key) {
                self.counters.bump("ast_cache_hits");
                return ast.clone();
            }
        }
        let (ast, errors) = parser::parse_with_diagnostics(text);
        if !errors.is_empty() {
            self.counters.add("parse_errors", errors.len() as f64);
            for err in &errors {
                tracing::debug!(error = %err, "template parse recovered");
            }
        }
        if self.config.cache_enabled {
            self.ast_cache.insert(key, ast.clone());
        }
        ast
    }

    /// Serialize with the current minify/comment settings.
    pub fn serialize(&self, ast: &Ast) -> String {
        serialize(ast, self.serialize_options())
    }

    /// Nodes of `kind` in `ast`, in document order.
    pub fn find_nodes(&self, ast: &Ast, kind: NodeKind) -> Vec<NodeId> {
        ast.find_nodes(kind)
    }

    /// Parse and substitute variables; `context` overrides the token set.
    pub fn compile_ast(&mut self, text: &str, context: Option<&TokenSet>) -> Ast {
        let mut ast = self.parse(text);
        self.substitute(&mut ast, context);
        ast
    }

    /// Compile `text` to stylesheet text.
    pub fn compile(&mut self, text: &str, context: Option<&TokenSet>) -> String {
        let start = Instant::now();
        let key = (content_hash(text), tokens_hash(context), self.tokens_version);
        if self.config.cache_enabled {
            if let Some(out) = self.output_cache.get(&key) {
                self.counters.bump("cache_hits");
                return out.clone();
            }
        }
        self.counters.bump("cache_misses");

        let ast = self.compile_ast(text, context);
        let out = self.serialize(&ast);

        if self.config.cache_enabled {
            self.output_cache.insert(key, out.clone());
        }
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.counters.bump("compilations");
        self.counters.add("total_compile_ms", elapsed_ms);
        self.counters.max("peak_compile_ms", elapsed_ms);
        out
    }

    /// Resolve references and calls in declaration values and condition
    /// preludes.
    ///
    /// Root-level `$name: value;` declarations define template-local
    /// variables; they are evaluated in order and removed from the tree.
    /// Lookup order: `context`, template locals, compiler tokens.
    pub fn substitute(&mut self, ast: &mut Ast, context: Option<&TokenSet>) {
        let empty = TokenSet::new();
        let context = context.unwrap_or(&empty);
        let mut locals = TokenSet::new();

        let local_decls: Vec<NodeId> = ast
            .children_of_kind(ast.root(), NodeKind::Declaration)
            .into_iter()
            .filter(|&d| {
                ast.get(d)
                    .is_some_and(|n| n.prop(keys::PROPERTY).starts_with('$'))
            })
            .collect();
        for id in local_decls {
            if let Some(node) = ast.remove(id) {
                let name = node.prop(keys::PROPERTY).trim_start_matches('$').to_string();
                let scope = Layered::new()
                    .push(context)
                    .push(&locals)
                    .push(&self.tokens);
                let value = eval::evaluate(node.prop(keys::VALUE), &scope, &self.functions, Mode::All);
                locals.insert(name, value.value);
            }
        }

        let scope = Layered::new().push(context).push(&locals).push(&self.tokens);
        let mut unresolved = 0usize;
        let targets = ast.query_all(|n| {
            matches!(n.kind, NodeKind::Declaration | NodeKind::ConditionBlock)
        });
        for id in targets {
            let Some(node) = ast.get_mut(id) else {
                continue;
            };
            let key = match node.kind {
                NodeKind::Declaration => keys::VALUE,
                _ => keys::PRELUDE,
            };
            let text = node.prop(key);
            if !eval::has_references(text) && !text.contains('(') {
                continue;
            }
            let ev = eval::evaluate(text, &scope as &dyn Scope, &self.functions, Mode::All);
            if ev.unresolved {
                unresolved += 1;
                tracing::warn!(
                    property = node.prop(keys::PROPERTY),
                    value = text,
                    "unresolved reference in template; keeping text"
                );
            }
            let rendered = ev.value.to_string();
            node.set(key, rendered);
        }
        if unresolved > 0 {
            self.counters.add("unresolved_references", unresolved as f64);
        }
    }

    /// Names `text` reads from the token set: references in declaration
    /// values and condition preludes, minus the template's own `$name:` locals.
    pub fn used_variables(&self, text: &str) -> BTreeSet<String> {
        let ast = parser::parse(text);
        let mut locals = BTreeSet::new();
        let mut used = BTreeSet::new();
        for id in ast.query_all(|n| matches!(n.kind, NodeKind::Declaration | NodeKind::ConditionBlock)) {
            let Some(node) = ast.get(id) else {
                continue;
            };
            let value = match node.kind {
                NodeKind::Declaration => {
                    if let Some(local) = node.prop(keys::PROPERTY).strip_prefix('$') {
                        locals.insert(local.to_string());
                    }
                    node.prop(keys::VALUE)
                }
                _ => node.prop(keys::PRELUDE),
            };
            used.extend(eval::referenced_names(value, &self.functions));
        }
        used.retain(|name| !locals.contains(name));
        used
    }

    /// Each used variable mapped to its value, `context` first. Names with
    /// no value are left out.
    pub fn variable_mapping(
        &self,
        text: &str,
        context: Option<&TokenSet>,
    ) -> BTreeMap<String, TokenValue> {
        let empty = TokenSet::new();
        let scope = Layered::new()
            .push(context.unwrap_or(&empty))
            .push(&self.tokens);
        let mut mapping = BTreeMap::new();
        for name in self.used_variables(text) {
            match scope.lookup_value(&name) {
                Some(value) => {
                    mapping.insert(name, value);
                }
                None => tracing::warn!(variable = %name, "variable used by template has no value"),
            }
        }
        mapping
    }

    /// Drop every cached tree and output.
    pub fn clear_cache(&mut self) {
        self.ast_cache.clear();
        self.output_cache.clear();
    }

    /// Zero every counter. Caches are kept.
    pub fn reset_metrics(&mut self) {
        self.counters.reset();
    }

    pub fn ast_cache_len(&self) -> usize {
        self.ast_cache.len()
    }

    pub fn output_cache_len(&self) -> usize {
        self.output_cache.len()
    }

    /// Counters for diagnostics.
    pub fn metrics(&self) -> std::collections::BTreeMap<String, f64> {
        let mut out = self.counters.snapshot();
        let hits = self.counters.get("cache_hits");
        let misses = self.counters.get("cache_misses");
        let compilations = self.counters.get("compilations");
        out.insert("cache_hit_rate".into(), ratio(hits, hits + misses) * 100.0);
        out.insert(
            "average_compile_ms".into(),
            ratio(self.counters.get("total_compile_ms"), compilations),
        );
        out.insert("ast_cache_size".into(), self.ast_cache.len() as f64);
        out.insert("output_cache_size".into(), self.output_cache.len() as f64);
        out
    }
}
