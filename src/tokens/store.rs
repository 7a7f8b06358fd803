//! Variable sources: one base set plus one override set per theme.

use std::collections::BTreeMap;

use super::set::TokenSet;

/// External supplier of variable definitions.
pub trait VariableStore: Send {
    /// The base set, if one is defined.
    fn base(&self) -> Option<TokenSet>;

    /// The override set for `theme`, if that theme exists.
    fn theme(&self, theme: &str) -> Option<TokenSet>;

    /// Names of every theme with an override set.
    fn theme_names(&self) -> Vec<String>;
}

/// In-memory [`VariableStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryVariableStore {
    base: Option<TokenSet>,
    themes: BTreeMap<String, TokenSet>,
}

impl MemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(mut self, base: TokenSet) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_theme(mut self, name: impl Into<String>, set: TokenSet) -> Self {
        self.themes.insert(name.into(), set);
        self
    }

    pub fn set_base(&mut self, base: TokenSet) {
        self.base = Some(base);
    }

    pub fn set_theme(&mut self, name: impl Into<String>, set: TokenSet) {
        self.themes.insert(name.into(), set);
    }
}

impl VariableStore for MemoryVariableStore {
    fn base(&self) -> Option<TokenSet> {
        self.base.clone()
    }

    fn theme(&self, theme: &str) -> Option<TokenSet> {
        self.themes.get(theme).cloned()
    }

    fn theme_names(&self) -> Vec<String> {
        self.themes.keys().cloned().collect()
    }
}

/// Canonical spelling of a theme name.
///
/// Lowercases, turns `_` and spaces into `-`, and maps the unseparated
/// `highcontrast` onto `high-contrast`.
pub fn normalize_theme_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase().replace(['_', ' '], "-");
    match lowered.as_str() {
        "highcontrast" => "high-contrast".to_string(),
        _ => lowered,
    }
}
