//! Dynamic style engine: condition predicates and the rule registry.

pub mod condition;
pub mod engine;

pub use condition::{all_hold, ConditionKind, StyleCondition};
pub use engine::{DynamicEngine, DynamicStyleRule};
