//! Variable/token resolution: values, sets, expressions, functions, resolver.

pub mod color;
pub mod engine;
pub mod eval;
pub mod expr;
pub mod functions;
pub mod resolver;
pub mod set;
pub mod store;
pub mod value;

pub use engine::TokenEngine;
pub use eval::{evaluate, Layered, Mode, Scope};
pub use functions::FunctionTable;
pub use resolver::{ResolveReport, Resolver, ValidationIssue};
pub use set::{merge, TokenSet};
pub use store::{normalize_theme_name, MemoryVariableStore, VariableStore};
pub use value::TokenValue;
