//! AST queries: by kind, by predicate, and rule accessors.

use std::collections::BTreeMap;

use super::node::{keys, NodeData, NodeId, NodeKind};
use super::tree::Ast;

impl Ast {
    /// Every node of `kind`, in document (pre-order) order.
    pub fn find_nodes(&self, kind: NodeKind) -> Vec<NodeId> {
        self.find_nodes_in(self.root(), kind)
    }

    /// Every node of `kind` in the subtree at `start`, `start` included.
    pub fn find_nodes_in(&self, start: NodeId, kind: NodeKind) -> Vec<NodeId> {
        self.query_all_in(start, |data| data.kind == kind)
    }

    /// Every node matching `predicate`, in document order.
    pub fn query_all(&self, predicate: impl Fn(&NodeData) -> bool) -> Vec<NodeId> {
        self.query_all_in(self.root(), predicate)
    }

    fn query_all_in(&self, start: NodeId, predicate: impl Fn(&NodeData) -> bool) -> Vec<NodeId> {
        self.walk_depth_first(start)
            .into_iter()
            .filter(|&id| self.get(id).is_some_and(&predicate))
            .collect()
    }

    /// Direct children of `id` with the given kind.
    pub fn children_of_kind(&self, id: NodeId, kind: NodeKind) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.kind(c) == Some(kind))
            .collect()
    }

    /// Selector texts of a rule, in order.
    pub fn selectors(&self, rule: NodeId) -> Vec<String> {
        self.children_of_kind(rule, NodeKind::Selector)
            .into_iter()
            .filter_map(|s| self.get(s).map(|d| d.prop(keys::TEXT).to_string()))
            .collect()
    }

    /// `(property, value)` pairs of a rule's declarations, in order.
    pub fn declarations(&self, rule: NodeId) -> Vec<(String, String)> {
        self.children_of_kind(rule, NodeKind::Declaration)
            .into_iter()
            .filter_map(|d| {
                self.get(d).map(|d| {
                    (
                        d.prop(keys::PROPERTY).to_string(),
                        d.prop(keys::VALUE).to_string(),
                    )
                })
            })
            .collect()
    }

    /// Node count per kind, for diagnostics.
    pub fn count_by_kind(&self) -> BTreeMap<NodeKind, usize> {
        let mut counts = BTreeMap::new();
        for id in self.walk_depth_first(self.root()) {
            if let Some(kind) = self.kind(id) {
                *counts.entry(kind).or_insert(0) += 1;
            }
        }
        counts
    }
}
