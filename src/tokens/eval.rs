//! Expression evaluation against a variable scope.

use super::expr::{self, Segment};
use super::functions::FunctionTable;
use super::set::TokenSet;
use super::value::TokenValue;

/// Something references can be looked up in.
pub trait Scope {
    fn lookup_value(&self, name: &str) -> Option<TokenValue>;
}

impl Scope for TokenSet {
    fn lookup_value(&self, name: &str) -> Option<TokenValue> {
        self.lookup(name).cloned()
    }
}

/// Scopes searched front to back; the first hit wins.
pub struct Layered<'a> {
    layers: Vec<&'a dyn Scope>,
}

impl<'a> Layered<'a> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn push(mut self, scope: &'a dyn Scope) -> Self {
        self.layers.push(scope);
        self
    }
}

impl Default for Layered<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope for Layered<'_> {
    fn lookup_value(&self, name: &str) -> Option<TokenValue> {
        self.layers.iter().find_map(|s| s.lookup_value(name))
    }
}

/// Which parts of an expression to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Substitute references; calls keep their names.
    References,
    /// Invoke functions; references stay verbatim.
    Functions,
    All,
}

impl Mode {
    fn references(self) -> bool {
        matches!(self, Mode::References | Mode::All)
    }

    fn functions(self) -> bool {
        matches!(self, Mode::Functions | Mode::All)
    }
}

/// Result of evaluating one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    pub value: TokenValue,
    /// Some reference could not be found.
    pub unresolved: bool,
}

/// Evaluate `text`.
///
/// A text that is exactly one reference or call yields that typed value;
/// anything else yields the concatenated string. Unknown references and
/// failing calls keep their source spelling.
pub fn evaluate(text: &str, scope: &dyn Scope, functions: &FunctionTable, mode: Mode) -> Evaluated {
    let segments = expr::parse(text, &|name| functions.contains(name));
    if !expr::has_dynamic_parts(&segments) {
        return Evaluated {
            value: TokenValue::Str(text.to_string()),
            unresolved: false,
        };
    }
    let ev = Evaluator {
        scope,
        functions,
        mode,
    };
    let (value, unresolved) = ev.list(&segments);
    Evaluated { value, unresolved }
}

/// Evaluate to display text.
pub fn evaluate_to_string(
    text: &str,
    scope: &dyn Scope,
    functions: &FunctionTable,
    mode: Mode,
) -> String {
    evaluate(text, scope, functions, mode).value.to_string()
}

/// Whether `text` still holds a reference that evaluation could act on.
pub fn has_references(text: &str) -> bool {
    fn any_ref(segments: &[Segment]) -> bool {
        segments.iter().any(|s| match s {
            Segment::Reference { .. } => true,
            Segment::Call { args, .. } => args.iter().any(|a| any_ref(a)),
            Segment::Text(_) => false,
        })
    }
    text.contains('$') || (text.contains("var(") && any_ref(&expr::parse(text, &|_| true)))
}

/// Every name `text` references, including those inside call arguments
/// and `var()` fallbacks, in order of appearance.
pub fn referenced_names(text: &str, functions: &FunctionTable) -> Vec<String> {
    fn collect(segments: &[Segment], out: &mut Vec<String>) {
        for seg in segments {
            match seg {
                Segment::Reference { name, fallback, .. } => {
                    out.push(name.clone());
                    if let Some(fb) = fallback {
                        collect(fb, out);
                    }
                }
                Segment::Call { args, .. } => args.iter().for_each(|a| collect(a, out)),
                Segment::Text(_) => {}
            }
        }
    }
    let mut out = Vec::new();
    collect(&expr::parse(text, &|name| functions.contains(name)), &mut out);
    out
}

struct Evaluator<'a> {
    scope: &'a dyn Scope,
    functions: &'a FunctionTable,
    mode: Mode,
}

impl Evaluator<'_> {
    fn list(&self, segments: &[Segment]) -> (TokenValue, bool) {
        if let [only] = segments {
            return self.segment(only);
        }
        let mut out = String::new();
        let mut unresolved = false;
        for seg in segments {
            let (v, u) = self.segment(seg);
            out.push_str(&v.to_string());
            unresolved |= u;
        }
        (TokenValue::Str(out), unresolved)
    }

    fn segment(&self, seg: &Segment) -> (TokenValue, bool) {
        match seg {
            Segment::Text(t) => (TokenValue::Str(t.clone()), false),
            Segment::Reference {
                name,
                raw,
                fallback,
            } => {
                if !self.mode.references() {
                    return (TokenValue::Str(raw.clone()), false);
                }
                if let Some(v) = self.scope.lookup_value(name) {
                    return (v, false);
                }
                match fallback {
                    Some(fb) => self.list(fb),
                    None => (TokenValue::Str(raw.clone()), true),
                }
            }
            Segment::Call { name, args, raw } => self.call(name, args, raw),
        }
    }

    fn call(&self, name: &str, args: &[Vec<Segment>], raw: &str) -> (TokenValue, bool) {
        let mut values = Vec::with_capacity(args.len());
        let mut unresolved = false;
        for arg in args {
            let trimmed = expr::trim_segments(arg.clone());
            let (v, u) = self.list(&trimmed);
            unresolved |= u;
            values.push(match v {
                TokenValue::Str(s) => TokenValue::parse_literal(&s),
                other => other,
            });
        }

        if self.mode.functions() && !unresolved {
            if let Some(v) = self.functions.call(name, &values) {
                return (v, false);
            }
        }

        let original: Vec<String> = args
            .iter()
            .map(|a| a.iter().map(Segment::raw).collect::<String>().trim().to_string())
            .collect();
        let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
        let text = if rendered == original {
            raw.to_string()
        } else {
            format!("{name}({})", rendered.join(", "))
        };
        (TokenValue::Str(text), unresolved)
    }
}
