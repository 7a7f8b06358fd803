//! Node types: NodeId, NodeKind, NodeData.

use std::collections::BTreeMap;
use std::fmt;

use slotmap::new_key_type;

new_key_type! {
    /// Unique identifier for an AST node. Copy, lightweight (u64).
    pub struct NodeId;
}

/// Property keys used by the node constructors.
pub mod keys {
    /// Selector text, comment text.
    pub const TEXT: &str = "text";
    /// Declaration property name.
    pub const PROPERTY: &str = "property";
    /// Declaration value.
    pub const VALUE: &str = "value";
    /// Condition block at-keyword without the `@`.
    pub const NAME: &str = "name";
    /// Condition block prelude (`(max-width: 600px)`).
    pub const PRELUDE: &str = "prelude";
}

/// The kind of an AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Root,
    /// A block: selector children followed by body children.
    Rule,
    Selector,
    Declaration,
    /// `@name prelude { ... }`.
    ConditionBlock,
    Comment,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Rule => "rule",
            NodeKind::Selector => "selector",
            NodeKind::Declaration => "declaration",
            NodeKind::ConditionBlock => "condition_block",
            NodeKind::Comment => "comment",
        }
    }

    /// Parse a kind name as produced by [`as_str`](Self::as_str).
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "root" => NodeKind::Root,
            "rule" => NodeKind::Rule,
            "selector" => NodeKind::Selector,
            "declaration" => NodeKind::Declaration,
            "condition_block" => NodeKind::ConditionBlock,
            "comment" => NodeKind::Comment,
            _ => return None,
        })
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data associated with a single AST node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    pub kind: NodeKind,
    pub properties: BTreeMap<String, String>,
}

impl NodeData {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            properties: BTreeMap::new(),
        }
    }

    pub fn root() -> Self {
        Self::new(NodeKind::Root)
    }

    pub fn rule() -> Self {
        Self::new(NodeKind::Rule)
    }

    pub fn selector(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Selector).with(keys::TEXT, text)
    }

    pub fn declaration(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(NodeKind::Declaration)
            .with(keys::PROPERTY, property)
            .with(keys::VALUE, value)
    }

    pub fn condition(name: impl Into<String>, prelude: impl Into<String>) -> Self {
        Self::new(NodeKind::ConditionBlock)
            .with(keys::NAME, name)
            .with(keys::PRELUDE, prelude)
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Comment).with(keys::TEXT, text)
    }

    /// Set a property (builder).
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Property value or `""`.
    pub fn prop(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.properties.insert(key.to_string(), value.into());
    }

    pub fn is(&self, kind: NodeKind) -> bool {
        self.kind == kind
    }
}
