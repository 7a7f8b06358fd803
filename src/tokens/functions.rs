//! Built-in value functions: color manipulation and numeric math.
//!
//! Every function takes already-evaluated arguments and returns `None` when
//! it cannot produce a value; callers then keep the call text verbatim.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::color::Rgba;
use super::value::TokenValue;

/// Signature of a registered value function.
pub type ValueFn = Arc<dyn Fn(&[TokenValue]) -> Option<TokenValue> + Send + Sync>;

/// Name → function registry.
#[derive(Clone)]
pub struct FunctionTable {
    functions: FxHashMap<String, ValueFn>,
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionTable").field("functions", &names).finish()
    }
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionTable {
    /// A table with no functions.
    pub fn empty() -> Self {
        Self {
            functions: FxHashMap::default(),
        }
    }

    /// A table with every built-in registered.
    pub fn with_builtins() -> Self {
        let mut table = Self::empty();
        table.register("lighten", lighten);
        table.register("darken", darken);
        table.register("mix", mix);
        table.register("contrast", contrast);
        table.register("invert", invert);
        table.register("alpha", alpha);
        table.register("math", math);
        table.register("scale", scale);
        table.register("rgb", rgb);
        table.register("rgba", rgba);
        table.register("hsl", hsl);
        table.register("hsla", hsla);
        table
    }

    /// Register or replace a function.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[TokenValue]) -> Option<TokenValue> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Call `name` with `args`. `None` if unknown or the call fails.
    pub fn call(&self, name: &str, args: &[TokenValue]) -> Option<TokenValue> {
        let f = self.functions.get(name)?;
        let result = f(args);
        if result.is_none() {
            tracing::debug!(function = name, ?args, "value function failed; keeping call text");
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn color_arg(args: &[TokenValue], i: usize) -> Option<Rgba> {
    args.get(i).and_then(|v| Rgba::parse(&v.to_string()))
}

fn num_arg(args: &[TokenValue], i: usize) -> Option<f64> {
    args.get(i)?.as_f64().filter(|n| n.is_finite())
}

fn text(value: &TokenValue) -> TokenValue {
    TokenValue::Str(value.to_string())
}

// ---------------------------------------------------------------------------
// Color functions
// ---------------------------------------------------------------------------

fn shift(args: &[TokenValue], apply: fn(&Rgba, f64) -> Rgba) -> Option<TokenValue> {
    let color = color_arg(args, 0)?;
    let amount = num_arg(args, 1)?.clamp(0.0, 1.0);
    if amount == 0.0 {
        return Some(text(&args[0]));
    }
    Some(TokenValue::Str(apply(&color, amount).to_css()))
}

/// `lighten(color, amount)`: mix toward white.
fn lighten(args: &[TokenValue]) -> Option<TokenValue> {
    shift(args, Rgba::lighten)
}

/// `darken(color, amount)`: mix toward black.
fn darken(args: &[TokenValue]) -> Option<TokenValue> {
    shift(args, Rgba::darken)
}

/// `mix(a, b, weight = 0.5)`.
fn mix(args: &[TokenValue]) -> Option<TokenValue> {
    let a = color_arg(args, 0)?;
    let b = color_arg(args, 1)?;
    let weight = match args.get(2) {
        Some(_) => num_arg(args, 2)?.clamp(0.0, 1.0),
        None => 0.5,
    };
    if weight == 0.0 || a == b {
        return Some(text(&args[0]));
    }
    if weight == 1.0 {
        return Some(text(&args[1]));
    }
    Some(TokenValue::Str(a.mix(&b, weight).to_css()))
}

/// `contrast(color)`: `#000000` on light backgrounds, `#ffffff` on dark.
fn contrast(args: &[TokenValue]) -> Option<TokenValue> {
    Some(TokenValue::Str(color_arg(args, 0)?.contrast().to_css()))
}

fn invert(args: &[TokenValue]) -> Option<TokenValue> {
    Some(TokenValue::Str(color_arg(args, 0)?.invert().to_css()))
}

/// `alpha(color, a)`: the color with its alpha replaced, clamped to [0, 1].
fn alpha(args: &[TokenValue]) -> Option<TokenValue> {
    let color = color_arg(args, 0)?;
    let a = num_arg(args, 1)?.clamp(0.0, 1.0);
    Some(TokenValue::Str(Rgba { a, ..color }.to_css()))
}

fn channel(v: f64) -> Option<u8> {
    (0.0..=255.0).contains(&v).then(|| v.round() as u8)
}

fn rgb(args: &[TokenValue]) -> Option<TokenValue> {
    let [r, g, b] = [0, 1, 2].map(|i| num_arg(args, i).and_then(channel));
    Some(TokenValue::Str(format!("rgb({}, {}, {})", r?, g?, b?)))
}

fn rgba(args: &[TokenValue]) -> Option<TokenValue> {
    let [r, g, b] = [0, 1, 2].map(|i| num_arg(args, i).and_then(channel));
    let a = num_arg(args, 3).filter(|a| (0.0..=1.0).contains(a))?;
    Some(TokenValue::Str(format!("rgba({}, {}, {}, {a})", r?, g?, b?)))
}

fn hsl_parts(args: &[TokenValue]) -> Option<(f64, f64, f64)> {
    let h = num_arg(args, 0)?;
    let s = num_arg(args, 1)?;
    let l = num_arg(args, 2)?;
    ((0.0..=100.0).contains(&s) && (0.0..=100.0).contains(&l)).then_some((h, s, l))
}

fn hsl(args: &[TokenValue]) -> Option<TokenValue> {
    let (h, s, l) = hsl_parts(args)?;
    Some(TokenValue::Str(format!("hsl({h}, {s}%, {l}%)")))
}

fn hsla(args: &[TokenValue]) -> Option<TokenValue> {
    let (h, s, l) = hsl_parts(args)?;
    let a = num_arg(args, 3).filter(|a| (0.0..=1.0).contains(a))?;
    Some(TokenValue::Str(format!("hsla({h}, {s}%, {l}%, {a})")))
}

// ---------------------------------------------------------------------------
// Numeric functions
// ---------------------------------------------------------------------------

/// `math(op, a, b, ...)`: left fold of `op` over the operands.
///
/// Integer operands stay integers for add/subtract/multiply. Division by
/// zero or an unknown op returns the first operand unchanged.
fn math(args: &[TokenValue]) -> Option<TokenValue> {
    let op = args.first()?.to_string();
    let operands = &args[1..];
    let first = operands.first()?.clone();
    if operands.iter().any(|v| v.as_f64().is_none()) {
        return None;
    }
    let all_int = operands.iter().all(|v| matches!(v, TokenValue::Int(_)));
    let ints = || operands.iter().filter_map(|v| match v {
        TokenValue::Int(i) => Some(*i),
        _ => None,
    });
    let floats = || operands.iter().filter_map(TokenValue::as_f64);

    let result = match op.as_str() {
        "add" if all_int => ints().try_fold(0i64, i64::checked_add).map(TokenValue::Int),
        "subtract" if all_int => {
            let mut it = ints();
            let head = it.next()?;
            it.try_fold(head, i64::checked_sub).map(TokenValue::Int)
        }
        "multiply" if all_int => ints().try_fold(1i64, i64::checked_mul).map(TokenValue::Int),
        "add" => Some(TokenValue::Float(floats().sum())),
        "subtract" => {
            let mut it = floats();
            let head = it.next()?;
            Some(TokenValue::Float(it.fold(head, |acc, x| acc - x)))
        }
        "multiply" => Some(TokenValue::Float(floats().product())),
        "divide" => {
            let mut it = floats();
            let head = it.next()?;
            it.try_fold(head, |acc, x| (x != 0.0).then(|| acc / x))
                .map(TokenValue::Float)
        }
        _ => None,
    };
    Some(result.unwrap_or(first))
}

/// `scale(value, factor)`: integer inputs truncate toward zero.
fn scale(args: &[TokenValue]) -> Option<TokenValue> {
    let factor = num_arg(args, 1)?;
    match args.first()? {
        TokenValue::Int(i) => Some(TokenValue::Int((*i as f64 * factor).trunc() as i64)),
        other => Some(TokenValue::Float(other.as_f64()? * factor)),
    }
}
