//! Bounded-pass reference resolution over a token set.
//!
//! Each pass evaluates every leaf against a snapshot of the previous pass.
//! Resolution stops when a pass changes nothing or `max_passes` is reached,
//! so reference cycles terminate with their text left unresolved.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::color;
use super::eval::{self, Mode};
use super::functions::FunctionTable;
use super::set::TokenSet;
use super::value::TokenValue;

/// Default pass limit.
pub const DEFAULT_MAX_PASSES: usize = 10;

/// A value that failed its field's format check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub value: String,
    pub message: String,
}

/// Outcome of one [`Resolver::resolve`] run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolveReport {
    pub passes: usize,
    pub converged: bool,
    /// Leaf paths still holding references after the last pass.
    pub unresolved: Vec<String>,
    pub issues: Vec<ValidationIssue>,
}

/// Resolves `$name` / `${path}` / `var(--name)` references and calls.
#[derive(Debug, Clone)]
pub struct Resolver {
    max_passes: usize,
    validate: bool,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            validate: false,
        }
    }
}

impl Resolver {
    pub fn new(max_passes: usize) -> Self {
        Self {
            max_passes: max_passes.max(1),
            ..Self::default()
        }
    }

    /// Enable format checks on color-named fields.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn max_passes(&self) -> usize {
        self.max_passes
    }

    /// Resolve every leaf of `set`. Never fails; problems go into the report.
    ///
    /// Leaves on a reference cycle, or depending on one, keep their original
    /// text. If the pass limit runs out first, every leaf still holding a
    /// reference is restored to its input text as well.
    pub fn resolve(&self, set: &TokenSet, functions: &FunctionTable) -> (TokenSet, ResolveReport) {
        let cyclic = cyclic_paths(set, functions);
        let mut current = set.clone();
        let mut report = ResolveReport::default();

        while report.passes < self.max_passes {
            report.passes += 1;
            let snapshot = current.clone();
            let mut changed = false;
            current.for_each_leaf_mut(|path, value| {
                if cyclic.contains(path) {
                    return;
                }
                let TokenValue::Str(text) = value else {
                    return;
                };
                let ev = eval::evaluate(text, &snapshot, functions, Mode::All);
                if ev.value != *value {
                    *value = ev.value;
                    changed = true;
                }
            });
            if !changed {
                report.converged = cyclic.is_empty();
                break;
            }
        }

        if !report.converged {
            current.for_each_leaf_mut(|path, value| {
                let pending = matches!(value, TokenValue::Str(text) if eval::has_references(text));
                if pending {
                    if let Some(original) = set.get(path) {
                        *value = original.clone();
                    }
                }
            });
        }

        current.for_each_leaf_mut(|path, value| {
            if let TokenValue::Str(text) = value {
                if eval::has_references(text) {
                    report.unresolved.push(path.to_string());
                }
            }
        });
        if !cyclic.is_empty() {
            tracing::warn!(paths = ?cyclic, "reference cycle in tokens; keeping original text");
        } else if !report.converged {
            tracing::warn!(
                passes = report.passes,
                "token resolution did not converge within the pass limit"
            );
        }
        for path in &report.unresolved {
            tracing::warn!(path = %path, "unresolved token reference");
        }

        if self.validate {
            report.issues = validate(&current);
            for issue in &report.issues {
                tracing::warn!(path = %issue.path, value = %issue.value, "{}", issue.message);
            }
        }

        (current, report)
    }
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Mark {
    Visiting,
    Done(bool),
}

/// Leaf paths that sit on a reference cycle or reach one.
fn cyclic_paths(set: &TokenSet, functions: &FunctionTable) -> BTreeSet<String> {
    let graph: BTreeMap<String, Vec<String>> = set
        .flatten()
        .into_iter()
        .filter_map(|(path, value)| {
            let TokenValue::Str(text) = value else {
                return None;
            };
            let deps: Vec<String> = eval::referenced_names(&text, functions)
                .iter()
                .filter_map(|name| set.lookup_path(name))
                .collect();
            (!deps.is_empty()).then_some((path, deps))
        })
        .collect();

    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
    for path in graph.keys() {
        reaches_cycle(path, &graph, &mut marks);
    }
    marks
        .into_iter()
        .filter(|(_, mark)| matches!(mark, Mark::Done(true)))
        .map(|(path, _)| path.to_string())
        .collect()
}

fn reaches_cycle<'g>(
    path: &'g str,
    graph: &'g BTreeMap<String, Vec<String>>,
    marks: &mut BTreeMap<&'g str, Mark>,
) -> bool {
    match marks.get(path) {
        Some(Mark::Visiting) => return true,
        Some(Mark::Done(cyclic)) => return *cyclic,
        None => {}
    }
    let Some(deps) = graph.get(path) else {
        return false;
    };
    marks.insert(path, Mark::Visiting);
    let mut cyclic = false;
    for dep in deps {
        cyclic |= reaches_cycle(dep, graph, marks);
    }
    marks.insert(path, Mark::Done(cyclic));
    cyclic
}

/// Check resolved values against their field naming conventions.
pub fn validate(set: &TokenSet) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for (path, value) in set.flatten() {
        let field = path.rsplit('.').next().unwrap_or(&path).to_ascii_lowercase();
        let parent_is_colors = path.to_ascii_lowercase().starts_with("colors.");
        let text = value.to_string();
        if eval::has_references(&text) {
            continue;
        }
        if (field.contains("color") || parent_is_colors) && !color::is_color(&text) {
            issues.push(ValidationIssue {
                path: path.clone(),
                value: text,
                message: "invalid color value".to_string(),
            });
        }
    }
    issues
}
