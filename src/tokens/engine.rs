//! TokenEngine: loads, merges and resolves variable sets from a store.

use super::functions::FunctionTable;
use super::resolver::{ResolveReport, Resolver};
use super::set::{self, TokenSet};
use super::store::{normalize_theme_name, MemoryVariableStore, VariableStore};

/// Variable/token resolution engine.
pub struct TokenEngine {
    store: Box<dyn VariableStore>,
    functions: FunctionTable,
    resolver: Resolver,
    last_report: ResolveReport,
}

impl std::fmt::Debug for TokenEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEngine")
            .field("themes", &self.store.theme_names())
            .field("functions", &self.functions)
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl Default for TokenEngine {
    fn default() -> Self {
        Self::new(MemoryVariableStore::new())
    }
}

impl TokenEngine {
    pub fn new(store: impl VariableStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            functions: FunctionTable::with_builtins(),
            resolver: Resolver::default(),
            last_report: ResolveReport::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn set_resolver(&mut self, resolver: Resolver) {
        self.resolver = resolver;
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Register extra functions. Built-ins may be replaced.
    pub fn functions_mut(&mut self) -> &mut FunctionTable {
        &mut self.functions
    }

    /// The base set; empty (with a warning) when the store has none.
    pub fn load_base(&self) -> TokenSet {
        self.store.base().unwrap_or_else(|| {
            tracing::warn!("no base variable set defined; using an empty set");
            TokenSet::new()
        })
    }

    /// The override set for `name`; empty (with a warning) when absent.
    pub fn load_theme(&self, name: &str) -> TokenSet {
        self.find_theme(name).unwrap_or_else(|| {
            tracing::warn!(theme = name, "theme variable set not found; using an empty set");
            TokenSet::new()
        })
    }

    pub fn has_theme(&self, name: &str) -> bool {
        self.find_theme(name).is_some()
    }

    pub fn available_themes(&self) -> Vec<String> {
        self.store.theme_names()
    }

    /// Deep-merge `theme` over `base`.
    pub fn merge(&self, base: &TokenSet, theme: &TokenSet) -> TokenSet {
        set::merge(base, theme)
    }

    /// Expand references and calls in `tokens`.
    pub fn resolve(&mut self, tokens: &TokenSet) -> TokenSet {
        let (resolved, report) = self.resolver.resolve(tokens, &self.functions);
        tracing::debug!(
            passes = report.passes,
            unresolved = report.unresolved.len(),
            "resolved token set"
        );
        self.last_report = report;
        resolved
    }

    /// Report from the most recent [`resolve`](Self::resolve).
    pub fn last_report(&self) -> &ResolveReport {
        &self.last_report
    }

    /// Load, merge and resolve the tokens for `name`. `None` if the theme
    /// does not exist.
    pub fn build_theme(&mut self, name: &str) -> Option<TokenSet> {
        let theme = self.find_theme(name)?;
        let base = self.load_base();
        let merged = self.merge(&base, &theme);
        Some(self.resolve(&merged))
    }

    fn find_theme(&self, name: &str) -> Option<TokenSet> {
        self.store
            .theme(name)
            .or_else(|| self.store.theme(&normalize_theme_name(name)))
    }
}
