//! Tree operations: insert, remove, reparent, reorder, walk.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashSet, FxHasher};
use slotmap::{SecondaryMap, SlotMap};
use thiserror::Error;

use super::node::{NodeData, NodeId, NodeKind};

/// Empty slice constant for returning when a node has no children.
const EMPTY_CHILDREN: &[NodeId] = &[];

/// Structural problems found by [`Ast::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AstError {
    #[error("root node is missing or not of kind root")]
    BadRoot,
    #[error("{0} node(s) are not reachable from the root")]
    Unreachable(usize),
    #[error("child/parent links disagree")]
    LinkMismatch,
    #[error("a root node appears below the top of the tree")]
    NestedRoot,
}

/// A parsed template, backed by a slotmap arena.
///
/// All nodes live in a single `SlotMap`. Parent/child relationships are stored
/// in secondary maps so that subtree removal is O(subtree size) and lookup is
/// O(1). The root always exists and cannot be removed or moved.
#[derive(Debug, Clone)]
pub struct Ast {
    pub(crate) nodes: SlotMap<NodeId, NodeData>,
    children: SecondaryMap<NodeId, Vec<NodeId>>,
    parent: SecondaryMap<NodeId, NodeId>,
    root: NodeId,
}

impl Ast {
    /// A tree holding only its root.
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(NodeData::root());
        let mut children = SecondaryMap::new();
        children.insert(root, Vec::new());
        Self {
            nodes,
            children,
            parent: SecondaryMap::new(),
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Append a node as the last child of `parent`.
    ///
    /// A stale `parent` id attaches the node to the root instead.
    pub fn insert_child(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let parent = if self.nodes.contains_key(parent) {
            parent
        } else {
            tracing::debug!("insert_child: stale parent id, attaching to root");
            self.root
        };
        let id = self.nodes.insert(data);
        self.children.insert(id, Vec::new());
        self.parent.insert(id, parent);
        if let Some(siblings) = self.children.get_mut(parent) {
            siblings.push(id);
        }
        id
    }

    /// Remove a node and all its descendants.
    ///
    /// Returns the removed node's data, or `None` if it didn't exist or is the
    /// root.
    pub fn remove(&mut self, id: NodeId) -> Option<NodeData> {
        if id == self.root || !self.nodes.contains_key(id) {
            return None;
        }

        if let Some(parent_id) = self.parent.remove(id) {
            if let Some(siblings) = self.children.get_mut(parent_id) {
                siblings.retain(|&child| child != id);
            }
        }

        let mut to_remove = VecDeque::new();
        to_remove.push_back(id);
        let mut removed = None;

        while let Some(current) = to_remove.pop_front() {
            if let Some(kids) = self.children.remove(current) {
                to_remove.extend(kids);
            }
            self.parent.remove(current);
            let data = self.nodes.remove(current);
            if current == id {
                removed = data;
            }
        }

        removed
    }

    /// Move `node` (with its subtree) to the end of `new_parent`'s children.
    ///
    /// Refuses, returning `false`, when either id is stale, `node` is the
    /// root, or `new_parent` lies inside `node`'s subtree.
    pub fn reparent(&mut self, node: NodeId, new_parent: NodeId) -> bool {
        if node == self.root
            || !self.nodes.contains_key(node)
            || !self.nodes.contains_key(new_parent)
            || node == new_parent
            || self.ancestors(new_parent).contains(&node)
        {
            return false;
        }

        if let Some(old_parent) = self.parent.remove(node) {
            if let Some(siblings) = self.children.get_mut(old_parent) {
                siblings.retain(|&child| child != node);
            }
        }

        self.parent.insert(node, new_parent);
        if let Some(siblings) = self.children.get_mut(new_parent) {
            siblings.push(node);
        }
        true
    }

    /// Replace `id`'s child order. `order` must be a permutation of the
    /// current children; anything else is rejected.
    pub fn set_children(&mut self, id: NodeId, order: Vec<NodeId>) -> bool {
        let Some(current) = self.children.get(id) else {
            return false;
        };
        if current.len() != order.len() {
            return false;
        }
        let existing: FxHashSet<NodeId> = current.iter().copied().collect();
        let proposed: FxHashSet<NodeId> = order.iter().copied().collect();
        if existing != proposed {
            return false;
        }
        if let Some(slot) = self.children.get_mut(id) {
            *slot = order;
        }
        true
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parent.get(id).copied()
    }

    /// Children of a node. Empty if the node has none or does not exist.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.children
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(EMPTY_CHILDREN)
    }

    /// Walk from `id` up to the root, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = id;
        while let Some(p) = self.parent.get(current).copied() {
            if result.len() > self.nodes.len() {
                break;
            }
            result.push(p);
            current = p;
        }
        result
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(id).map(|n| n.kind)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the root has no children.
    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Pre-order depth-first traversal starting from `start`.
    pub fn walk_depth_first(&self, start: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !self.nodes.contains_key(current) || result.len() > self.nodes.len() {
                continue;
            }
            result.push(current);
            for &child in self.children(current).iter().rev() {
                stack.push(child);
            }
        }
        result
    }

    /// Check the structural invariants: a single root of kind root, every
    /// node reachable from it exactly once, parent links matching children.
    pub fn validate(&self) -> Result<(), AstError> {
        if self.kind(self.root) != Some(NodeKind::Root) || self.parent.contains_key(self.root) {
            return Err(AstError::BadRoot);
        }
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                return Err(AstError::LinkMismatch);
            }
            for &child in self.children(current) {
                if self.parent(child) != Some(current) || !self.contains(child) {
                    return Err(AstError::LinkMismatch);
                }
                if self.kind(child) == Some(NodeKind::Root) {
                    return Err(AstError::NestedRoot);
                }
                stack.push(child);
            }
        }
        if seen.len() != self.nodes.len() {
            return Err(AstError::Unreachable(self.nodes.len() - seen.len()));
        }
        Ok(())
    }

    /// Structural hash of the tree: kinds, properties and shape.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        for id in self.walk_depth_first(self.root) {
            if let Some(node) = self.get(id) {
                node.kind.hash(&mut hasher);
                node.properties.hash(&mut hasher);
                self.children(id).len().hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Detach `child` from its parent's list without removing it.
    #[cfg(test)]
    pub(crate) fn orphan_for_test(&mut self, child: NodeId) {
        if let Some(p) = self.parent(child) {
            if let Some(siblings) = self.children.get_mut(p) {
                siblings.retain(|&c| c != child);
            }
        }
    }
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ```text
    ///          root
    ///         /    \
    ///     rule_a   rule_b
    ///     /    \
    ///   sel    decl
    /// ```
    fn build_tree() -> (Ast, NodeId, NodeId, NodeId, NodeId, NodeId) {
        let mut ast = Ast::new();
        let root = ast.root();
        let a = ast.insert_child(root, NodeData::rule());
        let b = ast.insert_child(root, NodeData::rule());
        let sel = ast.insert_child(a, NodeData::selector(".a"));
        let decl = ast.insert_child(a, NodeData::declaration("color", "red"));
        (ast, root, a, b, sel, decl)
    }

    #[test]
    fn new_tree_has_root_only() {
        let ast = Ast::new();
        assert_eq!(ast.len(), 1);
        assert!(ast.is_empty());
        assert_eq!(ast.kind(ast.root()), Some(NodeKind::Root));
        assert!(ast.validate().is_ok());
    }

    #[test]
    fn insert_child_parent_relationship() {
        let (ast, root, a, b, sel, decl) = build_tree();
        assert_eq!(ast.parent(a), Some(root));
        assert_eq!(ast.parent(sel), Some(a));
        assert_eq!(ast.parent(root), None);
        assert_eq!(ast.children(root), &[a, b]);
        assert_eq!(ast.children(a), &[sel, decl]);
        assert!(ast.children(decl).is_empty());
    }

    #[test]
    fn ancestors() {
        let (ast, root, a, _b, sel, _decl) = build_tree();
        assert_eq!(ast.ancestors(sel), vec![a, root]);
        assert!(ast.ancestors(root).is_empty());
    }

    #[test]
    fn remove_subtree() {
        let (mut ast, root, a, b, sel, decl) = build_tree();
        let removed = ast.remove(a).unwrap();
        assert_eq!(removed.kind, NodeKind::Rule);
        assert!(!ast.contains(sel));
        assert!(!ast.contains(decl));
        assert_eq!(ast.children(root), &[b]);
        assert_eq!(ast.len(), 2);
        assert!(ast.remove(a).is_none());
    }

    #[test]
    fn root_cannot_be_removed() {
        let (mut ast, root, ..) = build_tree();
        assert!(ast.remove(root).is_none());
        assert!(ast.contains(root));
    }

    #[test]
    fn reparent_moves_subtree() {
        let (mut ast, root, a, b, _sel, decl) = build_tree();
        assert!(ast.reparent(decl, b));
        assert_eq!(ast.parent(decl), Some(b));
        assert!(!ast.children(a).contains(&decl));
        assert_eq!(ast.ancestors(decl), vec![b, root]);
        assert!(ast.validate().is_ok());
    }

    #[test]
    fn reparent_refuses_cycles() {
        let (mut ast, root, a, _b, sel, _decl) = build_tree();
        assert!(!ast.reparent(a, sel));
        assert!(!ast.reparent(a, a));
        assert!(!ast.reparent(root, a));
        assert_eq!(ast.parent(a), Some(root));
        assert!(ast.validate().is_ok());
    }

    #[test]
    fn set_children_only_accepts_permutations() {
        let (mut ast, root, a, b, sel, _decl) = build_tree();
        assert!(ast.set_children(root, vec![b, a]));
        assert_eq!(ast.children(root), &[b, a]);
        assert!(!ast.set_children(root, vec![b]));
        assert!(!ast.set_children(root, vec![b, sel]));
    }

    #[test]
    fn walk_depth_first_order() {
        let (ast, root, a, b, sel, decl) = build_tree();
        assert_eq!(ast.walk_depth_first(root), vec![root, a, sel, decl, b]);
        assert_eq!(ast.walk_depth_first(a), vec![a, sel, decl]);
    }

    #[test]
    fn validate_detects_orphans() {
        let (mut ast, _root, _a, b, ..) = build_tree();
        ast.orphan_for_test(b);
        assert!(ast.validate().is_err());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let (mut ast, _root, _a, _b, _sel, decl) = build_tree();
        let before = ast.fingerprint();
        assert_eq!(before, ast.clone().fingerprint());
        ast.get_mut(decl).unwrap().set("value", "blue");
        assert_ne!(before, ast.fingerprint());
    }
}
