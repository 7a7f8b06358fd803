//! Condition predicates evaluated against a runtime context.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::tokens::{TokenSet, TokenValue};

/// Comparison performed by a [`StyleCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    /// Textual containment of the expected value in the actual one.
    Contains,
    /// Any kind this version does not know. Never matches.
    #[serde(other)]
    Unknown,
}

/// One predicate: `context[key] <kind> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleCondition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(rename = "property", alias = "key")]
    pub key: String,
    pub value: TokenValue,
}

impl StyleCondition {
    pub fn new(kind: ConditionKind, key: impl Into<String>, value: impl Into<TokenValue>) -> Self {
        Self {
            kind,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn equals(key: impl Into<String>, value: impl Into<TokenValue>) -> Self {
        Self::new(ConditionKind::Equals, key, value)
    }

    pub fn not_equals(key: impl Into<String>, value: impl Into<TokenValue>) -> Self {
        Self::new(ConditionKind::NotEquals, key, value)
    }

    pub fn greater_than(key: impl Into<String>, value: impl Into<TokenValue>) -> Self {
        Self::new(ConditionKind::GreaterThan, key, value)
    }

    pub fn less_than(key: impl Into<String>, value: impl Into<TokenValue>) -> Self {
        Self::new(ConditionKind::LessThan, key, value)
    }

    /// Whether the predicate holds. A key missing from `context` never
    /// matches, whatever the kind.
    pub fn evaluate(&self, context: &TokenSet) -> bool {
        let Some(actual) = context.get(&self.key).map(TokenValue::leaf) else {
            return false;
        };
        let expected = &self.value;
        let ordering = || actual.compare(expected);
        match self.kind {
            ConditionKind::Equals => actual.loosely_equals(expected),
            ConditionKind::NotEquals => !actual.loosely_equals(expected),
            ConditionKind::GreaterThan => ordering() == Some(Ordering::Greater),
            ConditionKind::LessThan => ordering() == Some(Ordering::Less),
            ConditionKind::GreaterEqual => {
                matches!(ordering(), Some(Ordering::Greater | Ordering::Equal))
            }
            ConditionKind::LessEqual => {
                matches!(ordering(), Some(Ordering::Less | Ordering::Equal))
            }
            ConditionKind::Contains => actual.to_string().contains(&expected.to_string()),
            ConditionKind::Unknown => false,
        }
    }
}

/// AND over every condition. An empty list always holds.
pub fn all_hold(conditions: &[StyleCondition], context: &TokenSet) -> bool {
    conditions.iter().all(|c| c.evaluate(context))
}
