//! logos-based lexer and segment parser for value expressions.
//!
//! A value such as `1px solid lighten($primary, 0.2)` splits into literal
//! text, references (`$name`, `${path}`, `var(--name, fallback)`) and calls
//! to registered functions. Anything the parser does not understand stays
//! literal text, so evaluation can always fall back to the source spelling.

use logos::Logos;

/// Expression token.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    /// `${colors.primary}`
    #[regex(r"\$\{[^}]*\}")]
    BracedRef,

    /// `$primary`, `$colors.primary.500`
    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_-]*(\.[a-zA-Z0-9_-]+)*")]
    Ref,

    /// Function or keyword name.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_-]*")]
    Ident,

    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[token(",")]
    Comma,

    /// Everything else, including whitespace.
    #[regex(r"[^$a-zA-Z_(),]+")]
    Text,
}

/// One parsed piece of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Reference {
        name: String,
        raw: String,
        fallback: Option<Vec<Segment>>,
    },
    Call {
        name: String,
        args: Vec<Vec<Segment>>,
        raw: String,
    },
}

impl Segment {
    /// The source spelling of this segment.
    pub fn raw(&self) -> &str {
        match self {
            Segment::Text(t) => t,
            Segment::Reference { raw, .. } | Segment::Call { raw, .. } => raw,
        }
    }
}

#[derive(Debug, Clone)]
struct Lexeme {
    token: Token,
    start: usize,
    end: usize,
}

/// Parse `input` into segments. `is_function` decides which `name(` prefixes
/// are calls; everything else is literal.
pub fn parse(input: &str, is_function: &dyn Fn(&str) -> bool) -> Vec<Segment> {
    let lexemes: Vec<Lexeme> = Token::lexer(input)
        .spanned()
        .map(|(result, span)| Lexeme {
            // Unlexable characters (a lone `$`) are literal text.
            token: result.unwrap_or(Token::Text),
            start: span.start,
            end: span.end,
        })
        .collect();
    let parser = SegmentParser {
        src: input,
        lexemes: &lexemes,
        is_function,
    };
    parser.parse_range(0, lexemes.len())
}

/// Whether the text contains anything evaluation could change.
pub fn has_dynamic_parts(segments: &[Segment]) -> bool {
    segments.iter().any(|s| !matches!(s, Segment::Text(_)))
}

struct SegmentParser<'a> {
    src: &'a str,
    lexemes: &'a [Lexeme],
    is_function: &'a dyn Fn(&str) -> bool,
}

impl SegmentParser<'_> {
    fn text(&self, lx: &Lexeme) -> &str {
        &self.src[lx.start..lx.end]
    }

    fn parse_range(&self, from: usize, to: usize) -> Vec<Segment> {
        let mut out: Vec<Segment> = Vec::new();
        let mut i = from;
        while i < to {
            let lx = &self.lexemes[i];
            match lx.token {
                Token::Ref => {
                    let raw = self.text(lx);
                    out.push(Segment::Reference {
                        name: raw[1..].to_string(),
                        raw: raw.to_string(),
                        fallback: None,
                    });
                    i += 1;
                }
                Token::BracedRef => {
                    let raw = self.text(lx);
                    let name = raw[2..raw.len() - 1].trim();
                    if name.is_empty() {
                        push_text(&mut out, raw);
                    } else {
                        out.push(Segment::Reference {
                            name: name.to_string(),
                            raw: raw.to_string(),
                            fallback: None,
                        });
                    }
                    i += 1;
                }
                Token::Ident => {
                    let name = self.text(lx);
                    let opens = self
                        .lexemes
                        .get(i + 1)
                        .filter(|next| i + 1 < to && next.token == Token::ParenOpen);
                    let close = opens.and_then(|_| self.matching_close(i + 1, to));
                    match close {
                        Some(close) if name == "var" => {
                            match self.parse_var(i, close) {
                                Some(seg) => out.push(seg),
                                None => push_text(&mut out, self.span_text(i, close)),
                            }
                            i = close + 1;
                        }
                        Some(close) if (self.is_function)(name) => {
                            let args = self
                                .split_args(i + 2, close)
                                .into_iter()
                                .map(|(a, b)| self.parse_range(a, b))
                                .collect();
                            out.push(Segment::Call {
                                name: name.to_string(),
                                args,
                                raw: self.span_text(i, close).to_string(),
                            });
                            i = close + 1;
                        }
                        _ => {
                            push_text(&mut out, name);
                            i += 1;
                        }
                    }
                }
                _ => {
                    push_text(&mut out, self.text(lx));
                    i += 1;
                }
            }
        }
        out
    }

    /// Text from lexeme `a` through lexeme `b` inclusive.
    fn span_text(&self, a: usize, b: usize) -> &str {
        &self.src[self.lexemes[a].start..self.lexemes[b].end]
    }

    fn matching_close(&self, open: usize, to: usize) -> Option<usize> {
        let mut depth = 0usize;
        for j in open..to {
            match self.lexemes[j].token {
                Token::ParenOpen => depth += 1,
                Token::ParenClose => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(j);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Split lexemes `[from, to)` at depth-0 commas.
    fn split_args(&self, from: usize, to: usize) -> Vec<(usize, usize)> {
        if from >= to {
            return Vec::new();
        }
        let mut parts = Vec::new();
        let mut depth = 0usize;
        let mut start = from;
        for j in from..to {
            match self.lexemes[j].token {
                Token::ParenOpen => depth += 1,
                Token::ParenClose => depth = depth.saturating_sub(1),
                Token::Comma if depth == 0 => {
                    parts.push((start, j));
                    start = j + 1;
                }
                _ => {}
            }
        }
        parts.push((start, to));
        parts
    }

    /// `var(--name)` / `var(--name, fallback)`.
    fn parse_var(&self, ident: usize, close: usize) -> Option<Segment> {
        let args = self.split_args(ident + 2, close);
        let (a, b) = *args.first()?;
        if a >= b {
            return None;
        }
        let name_text = self.src[self.lexemes[a].start..self.lexemes[b - 1].end].trim();
        let name = name_text.strip_prefix("--")?.trim();
        if name.is_empty() {
            return None;
        }
        let fallback = args.get(1).map(|&(fa, _)| {
            let (_, last) = *args.last().unwrap_or(&(fa, fa));
            self.parse_range(fa, last)
        });
        Some(Segment::Reference {
            name: name.to_string(),
            raw: self.span_text(ident, close).to_string(),
            fallback: fallback.map(trim_segments),
        })
    }
}

fn push_text(out: &mut Vec<Segment>, text: &str) {
    if let Some(Segment::Text(prev)) = out.last_mut() {
        prev.push_str(text);
    } else {
        out.push(Segment::Text(text.to_string()));
    }
}

/// Drop leading/trailing whitespace-only text around the segments.
pub fn trim_segments(mut segments: Vec<Segment>) -> Vec<Segment> {
    if let Some(Segment::Text(t)) = segments.first_mut() {
        *t = t.trim_start().to_string();
    }
    if let Some(Segment::Text(t)) = segments.last_mut() {
        *t = t.trim_end().to_string();
    }
    segments.retain(|s| !matches!(s, Segment::Text(t) if t.is_empty()));
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funcs(name: &str) -> bool {
        matches!(name, "lighten" | "math" | "mix")
    }

    fn p(input: &str) -> Vec<Segment> {
        parse(input, &funcs)
    }

    #[test]
    fn plain_text_is_one_segment() {
        assert_eq!(p("1px solid"), vec![Segment::Text("1px solid".into())]);
        assert!(!has_dynamic_parts(&p("1px solid")));
    }

    #[test]
    fn references_in_all_spellings() {
        let segs = p("$base ${colors.primary} var(--text-color)");
        let names: Vec<&str> = segs
            .iter()
            .filter_map(|s| match s {
                Segment::Reference { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["base", "colors.primary", "text-color"]);
    }

    #[test]
    fn var_with_fallback() {
        let segs = p("var(--missing, #fff)");
        match &segs[0] {
            Segment::Reference { name, fallback, .. } => {
                assert_eq!(name, "missing");
                assert_eq!(fallback.as_deref(), Some(&[Segment::Text("#fff".into())][..]));
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn nested_calls_split_arguments() {
        let segs = p("mix(lighten($a, 0.1), $b, 0.5)");
        match &segs[0] {
            Segment::Call { name, args, raw } => {
                assert_eq!(name, "mix");
                assert_eq!(args.len(), 3);
                assert!(matches!(args[0][0], Segment::Call { .. }));
                assert_eq!(raw, "mix(lighten($a, 0.1), $b, 0.5)");
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn unknown_functions_stay_text() {
        let segs = p("url(x.png)");
        assert_eq!(segs, vec![Segment::Text("url(x.png)".into())]);
    }

    #[test]
    fn unbalanced_call_is_text() {
        let segs = p("lighten($a, 0.1");
        assert!(matches!(segs[0], Segment::Text(_)));
        assert!(matches!(segs[1], Segment::Reference { .. }));
    }
}
