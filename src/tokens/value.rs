//! Token values: strings, numbers, booleans and nested maps.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single themeable value.
///
/// Deserializes untagged, so JSON `{"primary": "#007acc", "base": 16}` maps
/// straight onto `Str` and `Int`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Map(BTreeMap<String, TokenValue>),
}

impl TokenValue {
    /// Parse literal argument text into the narrowest value type.
    ///
    /// `16` → `Int`, `1.5` → `Float`, `true` → `Bool`, anything else → `Str`.
    pub fn parse_literal(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return TokenValue::Int(i);
        }
        if trimmed.contains('.') || trimmed.contains('e') {
            if let Ok(f) = trimmed.parse::<f64>() {
                if f.is_finite() {
                    return TokenValue::Float(f);
                }
            }
        }
        match trimmed {
            "true" => TokenValue::Bool(true),
            "false" => TokenValue::Bool(false),
            _ => TokenValue::Str(trimmed.to_string()),
        }
    }

    /// Numeric view of this value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TokenValue::Int(i) => Some(*i as f64),
            TokenValue::Float(f) => Some(*f),
            TokenValue::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TokenValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, TokenValue>> {
        match self {
            TokenValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, TokenValue::Map(_))
    }

    /// A map with a `value` key stands in for that value when referenced.
    pub fn leaf(&self) -> &TokenValue {
        match self {
            TokenValue::Map(m) => m.get("value").unwrap_or(self),
            other => other,
        }
    }

    /// Compare two values: numerically when both are numeric, textually otherwise.
    pub fn compare(&self, other: &TokenValue) -> Option<Ordering> {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match (self, other) {
                (TokenValue::Map(_), _) | (_, TokenValue::Map(_)) => None,
                _ => Some(self.to_string().cmp(&other.to_string())),
            },
        }
    }

    /// Loose equality used by condition predicates: `"3"` equals `3`.
    pub fn loosely_equals(&self, other: &TokenValue) -> bool {
        self == other || self.compare(other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenValue::Bool(b) => write!(f, "{b}"),
            TokenValue::Int(i) => write!(f, "{i}"),
            TokenValue::Float(x) => write!(f, "{x}"),
            TokenValue::Str(s) => f.write_str(s),
            TokenValue::Map(m) => match m.get("value") {
                Some(v) => write!(f, "{v}"),
                None => f.write_str("{…}"),
            },
        }
    }
}

impl From<&str> for TokenValue {
    fn from(s: &str) -> Self {
        TokenValue::Str(s.to_string())
    }
}

impl From<String> for TokenValue {
    fn from(s: String) -> Self {
        TokenValue::Str(s)
    }
}

impl From<i64> for TokenValue {
    fn from(i: i64) -> Self {
        TokenValue::Int(i)
    }
}

impl From<f64> for TokenValue {
    fn from(x: f64) -> Self {
        TokenValue::Float(x)
    }
}

impl From<bool> for TokenValue {
    fn from(b: bool) -> Self {
        TokenValue::Bool(b)
    }
}
