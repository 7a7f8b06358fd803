//! logos-based template tokenizer.
//!
//! The grammar is brace-delimited and CSS-like, so the lexer only needs to
//! find structure: braces, colons, semicolons, parentheses, commas, quoted
//! strings, at-keywords and comments. Everything else is a [`Token::Word`].
//! Whitespace is skipped; its presence is recovered from byte spans.

use logos::{Lexer, Logos};

/// Template token produced by the lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\n\r\f]+")]
pub enum Token {
    /// `/* ... */`. An unterminated comment runs to end of input.
    #[token("/*", block_comment)]
    Comment,

    /// `@media`, `@import`, `@font-face`.
    #[regex(r"@[a-zA-Z_-][a-zA-Z0-9_-]*")]
    AtKeyword,

    /// Double-quoted string literal.
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLiteral,

    /// Single-quoted string literal.
    #[regex(r"'([^'\\\n]|\\.)*'")]
    StringLiteralSingle,

    // ── Single-character punctuation ─────────────────────────────────

    #[token("{")]
    BraceOpen,

    #[token("}")]
    BraceClose,

    #[token(":")]
    Colon,

    #[token(";")]
    Semicolon,

    #[token("(")]
    ParenOpen,

    #[token(")")]
    ParenClose,

    #[token(",")]
    Comma,

    #[token("/")]
    Slash,

    /// `${path}` reference; kept whole so its braces are not structure.
    #[regex(r"\$\{[^}]*\}")]
    Interpolation,

    /// Any run of characters without structural meaning.
    #[regex(r#"[^ \t\n\r\f{}:;()"'/@,]+"#)]
    Word,
}

fn block_comment(lex: &mut Lexer<Token>) {
    let rest = lex.remainder();
    match rest.find("*/") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(rest.len()),
    }
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PToken {
    pub token: Token,
    pub byte_start: usize,
    pub byte_end: usize,
}

impl PToken {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.byte_start..self.byte_end]
    }
}

/// Tokenize input with span information preserved.
///
/// Characters logos cannot match (a lone quote, a bare `@`) become `Word`s so
/// no source text is lost.
pub fn tokenize(input: &str) -> Vec<PToken> {
    Token::lexer(input)
        .spanned()
        .map(|(result, span)| PToken {
            token: result.unwrap_or(Token::Word),
            byte_start: span.start,
            byte_end: span.end,
        })
        .collect()
}

/// Inner text of a comment token, without the delimiters.
pub fn comment_body(raw: &str) -> &str {
    let inner = raw.strip_prefix("/*").unwrap_or(raw);
    inner.strip_suffix("*/").unwrap_or(inner).trim()
}

/// Remove `/* */` comments, replacing each with a single space.
pub fn strip_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("/*") {
        result.push_str(&rest[..start]);
        result.push(' ');
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    result.push_str(rest);
    result
}

/// Collapse whitespace runs to single spaces, line by line, dropping blank
/// lines.
pub fn normalize_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
