//! TokenSet: nested name → value map with dotted-path access and deep merge.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::TokenValue;

/// A themeable variable set.
///
/// Keys may nest through [`TokenValue::Map`]; dotted paths (`colors.primary`)
/// address nested entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSet {
    entries: BTreeMap<String, TokenValue>,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object into a token set.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Build a set from `(key, value)` pairs (builder style).
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<TokenValue>,
    {
        let mut set = Self::new();
        for (k, v) in pairs {
            set.entries.insert(k.into(), v.into());
        }
        set
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-level entries.
    pub fn entries(&self) -> &BTreeMap<String, TokenValue> {
        &self.entries
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TokenValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Look up a value by dotted path.
    ///
    /// An exact top-level key wins over path splitting, so `primary-color`
    /// and `a.b` stored flat both resolve.
    pub fn get(&self, path: &str) -> Option<&TokenValue> {
        if let Some(v) = self.entries.get(path) {
            return Some(v);
        }
        let mut parts = path.split('.');
        let mut current = self.entries.get(parts.next()?)?;
        for part in parts {
            current = current.as_map()?.get(part)?;
        }
        Some(current)
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set a value at a dotted path, creating intermediate maps.
    pub fn set(&mut self, path: &str, value: impl Into<TokenValue>) {
        let value = value.into();
        let mut parts: Vec<&str> = path.split('.').collect();
        let Some(last) = parts.pop() else {
            return;
        };
        let mut map = &mut self.entries;
        for part in parts {
            let slot = map
                .entry(part.to_string())
                .or_insert_with(|| TokenValue::Map(BTreeMap::new()));
            if !slot.is_map() {
                *slot = TokenValue::Map(BTreeMap::new());
            }
            map = match slot {
                TokenValue::Map(m) => m,
                _ => return,
            };
        }
        map.insert(last.to_string(), value);
    }

    /// Resolve a reference name the way templates spell it.
    ///
    /// Tries, in order: the dotted path, the `variables` section, the
    /// hyphen→dot spelling, the hyphen→underscore spelling.
    pub fn lookup(&self, name: &str) -> Option<&TokenValue> {
        let found = self
            .get(name)
            .or_else(|| self.get(&format!("variables.{name}")))
            .or_else(|| {
                name.contains('-')
                    .then(|| self.get(&name.replace('-', ".")))
                    .flatten()
            })
            .or_else(|| {
                name.contains('-')
                    .then(|| self.get(&name.replace('-', "_")))
                    .flatten()
            })?;
        Some(found.leaf())
    }

    /// The path [`lookup`](Self::lookup) would read for `name`, or `None`
    /// when nothing matches.
    pub fn lookup_path(&self, name: &str) -> Option<String> {
        let mut candidates = vec![name.to_string(), format!("variables.{name}")];
        if name.contains('-') {
            candidates.push(name.replace('-', "."));
            candidates.push(name.replace('-', "_"));
        }
        candidates.into_iter().find_map(|path| {
            let found = self.get(&path)?;
            Some(match found.as_map() {
                Some(m) if m.contains_key("value") => format!("{path}.value"),
                _ => path,
            })
        })
    }

    /// Every leaf path in sorted order.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_paths(&self.entries, "", &mut out);
        out
    }

    /// Leaf paths containing `query` (case-insensitive).
    pub fn search(&self, query: &str) -> Vec<String> {
        let needle = query.to_lowercase();
        self.paths()
            .into_iter()
            .filter(|p| p.to_lowercase().contains(&needle))
            .collect()
    }

    /// Flatten to `path → leaf value`.
    pub fn flatten(&self) -> BTreeMap<String, TokenValue> {
        let mut out = BTreeMap::new();
        for path in self.paths() {
            if let Some(v) = self.get(&path) {
                out.insert(path, v.clone());
            }
        }
        out
    }

    /// Mutable access to every leaf, depth first, with its dotted path.
    pub(crate) fn for_each_leaf_mut(&mut self, mut f: impl FnMut(&str, &mut TokenValue)) {
        fn walk(
            map: &mut BTreeMap<String, TokenValue>,
            prefix: &str,
            f: &mut dyn FnMut(&str, &mut TokenValue),
        ) {
            for (k, v) in map.iter_mut() {
                let path = join(prefix, k);
                match v {
                    TokenValue::Map(inner) => walk(inner, &path, f),
                    leaf => f(&path, leaf),
                }
            }
        }
        walk(&mut self.entries, "", &mut f);
    }
}

/// Deep-merge `theme` over `base`: theme entries win per key, recursively.
pub fn merge(base: &TokenSet, theme: &TokenSet) -> TokenSet {
    TokenSet {
        entries: merge_maps(&base.entries, &theme.entries),
    }
}

fn merge_maps(
    base: &BTreeMap<String, TokenValue>,
    over: &BTreeMap<String, TokenValue>,
) -> BTreeMap<String, TokenValue> {
    let mut result = base.clone();
    for (key, value) in over {
        let merged = match (result.get(key), value) {
            (Some(TokenValue::Map(b)), TokenValue::Map(o)) => TokenValue::Map(merge_maps(b, o)),
            _ => value.clone(),
        };
        result.insert(key.clone(), merged);
    }
    result
}

fn collect_paths(map: &BTreeMap<String, TokenValue>, prefix: &str, out: &mut Vec<String>) {
    for (k, v) in map {
        let path = join(prefix, k);
        match v {
            TokenValue::Map(inner) => collect_paths(inner, &path, out),
            _ => out.push(path),
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> TokenSet {
        TokenSet::from_json_str(
            r##"{
                "variables": {"primary_color": "#007bff", "base": 16},
                "colors": {"primary": {"value": "#007acc", "description": "main"}},
                "spacing": {"sm": "8px"}
            }"##,
        )
        .unwrap()
    }

    #[test]
    fn get_walks_dotted_paths() {
        let set = sample();
        assert_eq!(set.get("spacing.sm"), Some(&TokenValue::from("8px")));
        assert_eq!(set.get("spacing.xl"), None);
        assert!(set.has("colors.primary.value"));
    }

    #[test]
    fn lookup_falls_back_to_variables_and_hyphens() {
        let set = sample();
        assert_eq!(set.lookup("primary_color"), Some(&TokenValue::from("#007bff")));
        assert_eq!(set.lookup("colors.primary"), Some(&TokenValue::from("#007acc")));
        assert_eq!(set.lookup("spacing-sm"), Some(&TokenValue::from("8px")));
        assert_eq!(set.lookup("nope"), None);
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let mut set = TokenSet::new();
        set.set("nested.level1.level2", "value");
        assert_eq!(set.get("nested.level1.level2"), Some(&TokenValue::from("value")));
        assert_eq!(set.paths(), vec!["nested.level1.level2".to_string()]);
    }

    #[test]
    fn merge_theme_wins_per_key() {
        let base = TokenSet::from_pairs([("primary", "#007acc")]);
        let empty = TokenSet::new();
        assert_eq!(
            merge(&base, &empty).get("primary"),
            Some(&TokenValue::from("#007acc"))
        );
        let theme = TokenSet::from_pairs([("primary", "#1e90ff")]);
        assert_eq!(
            merge(&base, &theme).get("primary"),
            Some(&TokenValue::from("#1e90ff"))
        );
    }

    #[test]
    fn merge_is_recursive() {
        let base = TokenSet::from_json_str(r#"{"colors": {"a": "1", "b": "2"}}"#).unwrap();
        let theme = TokenSet::from_json_str(r#"{"colors": {"b": "3"}}"#).unwrap();
        let merged = merge(&base, &theme);
        assert_eq!(merged.get("colors.a"), Some(&TokenValue::from("1")));
        assert_eq!(merged.get("colors.b"), Some(&TokenValue::from("3")));
    }

    #[test]
    fn search_is_case_insensitive() {
        let set = sample();
        assert!(!set.search("COLOR").is_empty());
        assert!(set.search("nonexistent").is_empty());
    }
}
