//! Template AST: slotmap-backed arena of tagged nodes.

pub mod node;
pub mod query;
pub mod tree;

pub use node::{keys, NodeData, NodeId, NodeKind};
pub use tree::{Ast, AstError};
