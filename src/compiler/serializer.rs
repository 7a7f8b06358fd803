//! Deterministic AST → stylesheet text.
//!
//! Nested rules are flattened: a child selector containing `&` has it
//! replaced by the parent selector, anything else is joined to the parent as
//! a descendant. A rule's own declarations are emitted before its nested
//! rules. Output of the pretty form re-parses to a tree that serializes to
//! the same text.

use crate::ast::{keys, Ast, NodeId, NodeKind};

/// Output formatting switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerializeOptions {
    pub minify: bool,
    pub remove_comments: bool,
}

const INDENT: &str = "    ";

/// Flattened output item.
#[derive(Debug, Clone, PartialEq)]
enum Item {
    Comment(String),
    /// `@name prelude;`
    Statement(String, String),
    /// A declaration outside any rule.
    Decl(String, String),
    Block {
        selectors: Vec<String>,
        body: Vec<Item>,
    },
    Condition {
        name: String,
        prelude: String,
        items: Vec<Item>,
    },
}

/// Serialize `ast` to text.
pub fn serialize(ast: &Ast, options: SerializeOptions) -> String {
    let items = Flattener { ast, options }.children(ast.root(), None);
    if options.minify {
        items.iter().map(minified).collect()
    } else {
        let mut out = items
            .iter()
            .map(|item| pretty(item, 0))
            .collect::<Vec<_>>()
            .join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

struct Flattener<'a> {
    ast: &'a Ast,
    options: SerializeOptions,
}

impl Flattener<'_> {
    /// Items for the children of `node`. `scope` holds the enclosing rule's
    /// resolved selectors, if any.
    fn children(&self, node: NodeId, scope: Option<&[String]>) -> Vec<Item> {
        let mut items = Vec::new();
        // Declarations directly inside a condition nested in a rule apply to
        // that rule's selectors; they are gathered into one leading block.
        let mut loose = Vec::new();

        for &child in self.ast.children(node) {
            let Some(data) = self.ast.get(child) else {
                continue;
            };
            match data.kind {
                NodeKind::Comment | NodeKind::Declaration => {
                    if let Some(entry) = self.body_entry(child) {
                        if scope.is_some() {
                            loose.push(entry);
                        } else {
                            items.push(entry);
                        }
                    }
                }
                NodeKind::Rule => items.extend(self.rule(child, scope)),
                NodeKind::ConditionBlock => items.push(Item::Condition {
                    name: data.prop(keys::NAME).to_string(),
                    prelude: data.prop(keys::PRELUDE).to_string(),
                    items: self.children(child, scope),
                }),
                NodeKind::Selector | NodeKind::Root => {}
            }
        }

        match scope {
            Some(selectors) if loose.iter().any(|e| !matches!(e, Item::Comment(_))) => {
                items.insert(
                    0,
                    Item::Block {
                        selectors: selectors.to_vec(),
                        body: loose,
                    },
                );
            }
            _ => {
                loose.append(&mut items);
                items = loose;
            }
        }
        items
    }

    fn body_entry(&self, id: NodeId) -> Option<Item> {
        let data = self.ast.get(id)?;
        match data.kind {
            NodeKind::Comment if self.options.remove_comments => None,
            NodeKind::Comment => Some(Item::Comment(data.prop(keys::TEXT).to_string())),
            NodeKind::Declaration => {
                let property = data.prop(keys::PROPERTY);
                let value = data.prop(keys::VALUE);
                Some(if property.starts_with('@') {
                    Item::Statement(property.to_string(), value.to_string())
                } else {
                    Item::Decl(property.to_string(), value.to_string())
                })
            }
            _ => None,
        }
    }

    fn rule(&self, rule: NodeId, scope: Option<&[String]>) -> Vec<Item> {
        let selectors = resolve_selectors(scope, &self.ast.selectors(rule));
        let mut body = Vec::new();
        let mut nested = Vec::new();
        let mut has_body_nodes = false;

        for &child in self.ast.children(rule) {
            match self.ast.kind(child) {
                Some(NodeKind::Declaration | NodeKind::Comment) => {
                    has_body_nodes = true;
                    if let Some(entry) = self.body_entry(child) {
                        body.push(entry);
                    }
                }
                Some(NodeKind::Rule) => nested.extend(self.rule(child, Some(&selectors))),
                Some(NodeKind::ConditionBlock) => {
                    if let Some(data) = self.ast.get(child) {
                        nested.push(Item::Condition {
                            name: data.prop(keys::NAME).to_string(),
                            prelude: data.prop(keys::PRELUDE).to_string(),
                            items: self.children(child, Some(&selectors)),
                        });
                    }
                }
                _ => {}
            }
        }

        let mut items = Vec::new();
        let is_leaf = !has_body_nodes && nested.is_empty();
        if !body.is_empty() || is_leaf {
            items.push(Item::Block { selectors, body });
        }
        items.extend(nested);
        items
    }
}

/// Combine parent and child selector lists.
fn resolve_selectors(scope: Option<&[String]>, own: &[String]) -> Vec<String> {
    let Some(parents) = scope else {
        return own.to_vec();
    };
    let mut out = Vec::with_capacity(parents.len() * own.len());
    for parent in parents {
        for child in own {
            if child.contains('&') {
                out.push(child.replace('&', parent));
            } else {
                out.push(format!("{parent} {child}"));
            }
        }
    }
    out
}

fn pretty(item: &Item, depth: usize) -> String {
    let pad = INDENT.repeat(depth);
    match item {
        Item::Comment(text) => format!("{pad}/* {text} */"),
        Item::Statement(name, prelude) => statement(&pad, name, prelude),
        Item::Decl(property, value) => format!("{pad}{property}: {value};"),
        Item::Block { selectors, body } => {
            let mut out = format!("{pad}{} {{\n", selectors.join(", "));
            for entry in body {
                out.push_str(&pretty(entry, depth + 1));
                out.push('\n');
            }
            out.push_str(&pad);
            out.push('}');
            out
        }
        Item::Condition {
            name,
            prelude,
            items,
        } => {
            let mut out = if prelude.is_empty() {
                format!("{pad}@{name} {{\n")
            } else {
                format!("{pad}@{name} {prelude} {{\n")
            };
            for inner in items {
                out.push_str(&pretty(inner, depth + 1));
                out.push('\n');
            }
            out.push_str(&pad);
            out.push('}');
            out
        }
    }
}

fn statement(pad: &str, name: &str, prelude: &str) -> String {
    if prelude.is_empty() {
        format!("{pad}{name};")
    } else {
        format!("{pad}{name} {prelude};")
    }
}

fn minified(item: &Item) -> String {
    match item {
        Item::Comment(text) => format!("/*{text}*/"),
        Item::Statement(name, prelude) => statement("", name, prelude),
        Item::Decl(property, value) => format!("{property}:{value};"),
        Item::Block { selectors, body } => {
            let inner: String = body.iter().map(minified).collect();
            let inner = inner.strip_suffix(';').unwrap_or(&inner);
            format!("{}{{{inner}}}", selectors.join(","))
        }
        Item::Condition {
            name,
            prelude,
            items,
        } => {
            let inner: String = items.iter().map(minified).collect();
            if prelude.is_empty() {
                format!("@{name}{{{inner}}}")
            } else {
                format!("@{name} {prelude}{{{inner}}}")
            }
        }
    }
}
