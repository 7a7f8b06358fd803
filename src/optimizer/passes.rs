//! Tree-rewriting passes. Every pass only removes or moves nodes, so each
//! level's node count is bounded by the previous level's.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{keys, Ast, NodeData, NodeId, NodeKind};

use super::{OptimizationLevel, OptimizationResult, ESTIMATED_NODE_BYTES};

/// Optimize a copy of `ast` at `level`.
///
/// A structurally invalid tree is returned unchanged with a zero-change
/// result.
pub fn optimize(ast: &Ast, level: OptimizationLevel) -> (Ast, OptimizationResult) {
    let original_nodes = ast.len();
    if let Err(err) = ast.validate() {
        tracing::warn!(error = %err, "skipping optimization of malformed tree");
        return (ast.clone(), OptimizationResult::unchanged(original_nodes, level));
    }

    let mut out = ast.clone();
    remove_empty_declarations(&mut out);
    remove_empty_blocks(&mut out);

    if level >= OptimizationLevel::Advanced {
        dedupe_all_rules(&mut out);
    }

    if level >= OptimizationLevel::Aggressive {
        for container in containers(&out) {
            coalesce_same_selectors(&mut out, container);
        }
        dedupe_all_rules(&mut out);
        for container in containers(&out) {
            merge_identical_bodies(&mut out, container);
        }
        dedupe_selectors(&mut out);
    }

    let optimized_nodes = out.len();
    let removed_nodes = original_nodes.saturating_sub(optimized_nodes);
    let result = OptimizationResult {
        original_nodes,
        optimized_nodes,
        removed_nodes,
        memory_saved: removed_nodes * ESTIMATED_NODE_BYTES,
        level,
    };
    (out, result)
}

// ---------------------------------------------------------------------------
// Basic
// ---------------------------------------------------------------------------

/// Drop declarations whose value is empty. At-statements may have none.
fn remove_empty_declarations(ast: &mut Ast) {
    let empty = ast.query_all(|n| {
        n.kind == NodeKind::Declaration
            && !n.prop(keys::PROPERTY).starts_with('@')
            && n.prop(keys::VALUE).trim().is_empty()
    });
    for id in empty {
        ast.remove(id);
    }
}

/// Drop rules and condition blocks with nothing to emit, innermost first.
fn remove_empty_blocks(ast: &mut Ast) {
    let blocks = ast.query_all(|n| matches!(n.kind, NodeKind::Rule | NodeKind::ConditionBlock));
    for id in blocks.into_iter().rev() {
        let has_content = ast.children(id).iter().any(|&c| {
            matches!(
                ast.kind(c),
                Some(NodeKind::Declaration | NodeKind::Rule | NodeKind::ConditionBlock)
            )
        });
        if !has_content {
            ast.remove(id);
        }
    }
}

// ---------------------------------------------------------------------------
// Advanced
// ---------------------------------------------------------------------------

/// Within one block, keep only the last declaration of each property.
fn dedupe_declarations(ast: &mut Ast, block: NodeId) {
    let decls = ast.children_of_kind(block, NodeKind::Declaration);
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut doomed = Vec::new();
    for &id in decls.iter().rev() {
        let Some(node) = ast.get(id) else {
            continue;
        };
        let property = node.prop(keys::PROPERTY);
        // Repeated at-statements (`@import a; @import b;`) are distinct.
        if property.starts_with('@') {
            continue;
        }
        if !seen.insert(property.to_string()) {
            doomed.push(id);
        }
    }
    for id in doomed {
        ast.remove(id);
    }
}

fn dedupe_all_rules(ast: &mut Ast) {
    for rule in ast.find_nodes(NodeKind::Rule) {
        dedupe_declarations(ast, rule);
    }
}

// ---------------------------------------------------------------------------
// Aggressive
// ---------------------------------------------------------------------------

/// Blocks whose direct rule children may be merged: the root and every
/// condition block.
fn containers(ast: &Ast) -> Vec<NodeId> {
    let mut out = vec![ast.root()];
    out.extend(ast.find_nodes(NodeKind::ConditionBlock));
    out
}

/// Rules without nested rules or condition blocks.
fn flat_rules(ast: &Ast, container: NodeId) -> Vec<NodeId> {
    ast.children_of_kind(container, NodeKind::Rule)
        .into_iter()
        .filter(|&r| {
            !ast.children(r).iter().any(|&c| {
                matches!(ast.kind(c), Some(NodeKind::Rule | NodeKind::ConditionBlock))
            })
        })
        .collect()
}

/// Fold later rules with the same selector list into the first one.
fn coalesce_same_selectors(ast: &mut Ast, container: NodeId) {
    let mut first_by_selectors: FxHashMap<Vec<String>, NodeId> = FxHashMap::default();
    for rule in flat_rules(ast, container) {
        let selectors = ast.selectors(rule);
        match first_by_selectors.get(&selectors) {
            Some(&first) => {
                let body: Vec<NodeId> = ast
                    .children(rule)
                    .iter()
                    .copied()
                    .filter(|&c| ast.kind(c) != Some(NodeKind::Selector))
                    .collect();
                for child in body {
                    ast.reparent(child, first);
                }
                ast.remove(rule);
            }
            None => {
                first_by_selectors.insert(selectors, rule);
            }
        }
    }
}

/// Merge rules whose declaration sets are identical into one rule carrying
/// every selector.
fn merge_identical_bodies(ast: &mut Ast, container: NodeId) {
    let mut first_by_body: FxHashMap<BTreeSet<(String, String)>, NodeId> = FxHashMap::default();
    for rule in flat_rules(ast, container) {
        let body: BTreeSet<(String, String)> = ast.declarations(rule).into_iter().collect();
        if body.is_empty() {
            continue;
        }
        match first_by_body.get(&body) {
            Some(&first) => {
                let existing = ast.selectors(first);
                for selector in ast.selectors(rule) {
                    if !existing.contains(&selector) {
                        ast.insert_child(first, NodeData::selector(selector));
                    }
                }
                ast.remove(rule);
                selectors_first(ast, first);
            }
            None => {
                first_by_body.insert(body, rule);
            }
        }
    }
}

/// Move selector children ahead of body children, keeping relative order.
fn selectors_first(ast: &mut Ast, rule: NodeId) {
    let (mut order, rest): (Vec<NodeId>, Vec<NodeId>) = ast
        .children(rule)
        .iter()
        .partition(|&&c| ast.kind(c) == Some(NodeKind::Selector));
    order.extend(rest);
    ast.set_children(rule, order);
}

fn dedupe_selectors(ast: &mut Ast) {
    for rule in ast.find_nodes(NodeKind::Rule) {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let doomed: Vec<NodeId> = ast
            .children_of_kind(rule, NodeKind::Selector)
            .into_iter()
            .filter(|&s| {
                let text = ast.get(s).map(|n| n.prop(keys::TEXT).to_string());
                text.is_some_and(|t| !seen.insert(t))
            })
            .collect();
        for id in doomed {
            ast.remove(id);
        }
    }
}
