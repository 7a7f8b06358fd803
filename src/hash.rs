//! FxHash content hashing for cache keys.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::tokens::TokenSet;

/// Hash of a template's text.
pub fn content_hash(text: &str) -> u64 {
    let mut hasher = FxHasher::default();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Hash of a token set's flattened contents. `None` hashes as an empty set.
pub fn tokens_hash(tokens: Option<&TokenSet>) -> u64 {
    let mut hasher = FxHasher::default();
    if let Some(tokens) = tokens {
        for (path, value) in tokens.flatten() {
            path.hash(&mut hasher);
            format!("{value:?}").hash(&mut hasher);
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_hash_equal() {
        assert_eq!(content_hash("a { b: c }"), content_hash("a { b: c }"));
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn token_hash_sees_values_and_types() {
        let a = TokenSet::from_pairs([("mode", "dark")]);
        let b = TokenSet::from_pairs([("mode", "light")]);
        assert_ne!(tokens_hash(Some(&a)), tokens_hash(Some(&b)));
        assert_eq!(tokens_hash(None), tokens_hash(Some(&TokenSet::new())));
        let int = TokenSet::from_pairs([("n", 1i64)]);
        let text = TokenSet::from_pairs([("n", "1")]);
        assert_ne!(tokens_hash(Some(&int)), tokens_hash(Some(&text)));
    }
}
