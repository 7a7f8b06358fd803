//! Best-effort template parser.
//!
//! Parses template text into an [`Ast`]. Malformed fragments never abort the
//! parse: they are skipped or closed implicitly and reported as
//! [`ParseError`] diagnostics next to a partial tree.

use crate::ast::{Ast, NodeData, NodeId};

use super::tokenizer::{comment_body, tokenize, PToken, Token};

/// Deepest block nesting the parser descends into. Deeper blocks are
/// skipped whole and reported as [`ParseError::TooDeep`].
pub const MAX_NESTING: usize = 256;

/// Recoverable problems found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unclosed block opened at byte {position}")]
    UnclosedBlock { position: usize },
    #[error("unexpected '}}' at byte {position}")]
    StrayBrace { position: usize },
    #[error("declaration without ':' at byte {position}: {text}")]
    MissingColon { position: usize, text: String },
    #[error("empty property name at byte {position}")]
    EmptyProperty { position: usize },
    #[error("block without a selector at byte {position}")]
    EmptySelector { position: usize },
    #[error("unterminated comment at byte {position}")]
    UnterminatedComment { position: usize },
    #[error("block at byte {position} nested deeper than {limit} levels; skipped")]
    TooDeep { position: usize, limit: usize },
}

impl ParseError {
    pub fn position(&self) -> usize {
        match self {
            ParseError::UnclosedBlock { position }
            | ParseError::StrayBrace { position }
            | ParseError::MissingColon { position, .. }
            | ParseError::EmptyProperty { position }
            | ParseError::EmptySelector { position }
            | ParseError::UnterminatedComment { position }
            | ParseError::TooDeep { position, .. } => *position,
        }
    }
}

/// Parse template text. Never fails; see [`parse_with_diagnostics`].
pub fn parse(input: &str) -> Ast {
    parse_with_diagnostics(input).0
}

/// Parse template text, returning the tree and every recoverable error.
pub fn parse_with_diagnostics(input: &str) -> (Ast, Vec<ParseError>) {
    let mut parser = Parser {
        src: input,
        tokens: tokenize(input),
        cursor: 0,
        depth: 0,
        errors: Vec::new(),
    };
    let mut ast = Ast::new();
    let root = ast.root();
    parser.parse_block(&mut ast, root, None);
    (ast, parser.errors)
}

/// Parser state.
struct Parser<'a> {
    src: &'a str,
    tokens: Vec<PToken>,
    cursor: usize,
    /// Blocks currently open.
    depth: usize,
    errors: Vec<ParseError>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&PToken> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self) {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
    }

    fn byte_at(&self, index: usize) -> usize {
        self.tokens
            .get(index)
            .map(|t| t.byte_start)
            .unwrap_or(self.src.len())
    }

    /// Parse block contents into `parent` until the matching `}`.
    ///
    /// `opened_at` is the byte offset of the `{` for nested blocks and `None`
    /// at top level.
    fn parse_block(&mut self, ast: &mut Ast, parent: NodeId, opened_at: Option<usize>) {
        loop {
            let Some(tok) = self.peek().cloned() else {
                if let Some(position) = opened_at {
                    self.errors.push(ParseError::UnclosedBlock { position });
                }
                return;
            };
            match tok.token {
                Token::BraceClose => {
                    self.advance();
                    if opened_at.is_some() {
                        return;
                    }
                    self.errors.push(ParseError::StrayBrace {
                        position: tok.byte_start,
                    });
                }
                Token::Semicolon => self.advance(),
                Token::Comment => {
                    let raw = tok.text(self.src);
                    if !raw.ends_with("*/") || raw.len() < 4 {
                        self.errors.push(ParseError::UnterminatedComment {
                            position: tok.byte_start,
                        });
                    }
                    ast.insert_child(parent, NodeData::comment(comment_body(raw)));
                    self.advance();
                }
                _ => self.parse_statement(ast, parent),
            }
        }
    }

    /// Parse one statement: a rule, a condition block, a declaration or an
    /// at-statement.
    fn parse_statement(&mut self, ast: &mut Ast, parent: NodeId) {
        let start = self.cursor;
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            match tok.token {
                Token::ParenOpen => depth += 1,
                Token::ParenClose => depth = depth.saturating_sub(1),
                Token::BraceOpen | Token::Semicolon | Token::BraceClose if depth == 0 => break,
                // Braces always end a statement, even inside unbalanced parens.
                Token::BraceOpen | Token::BraceClose => break,
                _ => {}
            }
            self.advance();
        }
        let end = self.cursor;
        let position = self.byte_at(start);
        let is_at = self.tokens[start].token == Token::AtKeyword;

        match self.peek().map(|t| t.token) {
            Some(Token::BraceOpen) => {
                let brace_at = self.byte_at(end);
                self.advance();
                if self.depth >= MAX_NESTING {
                    self.errors.push(ParseError::TooDeep {
                        position: brace_at,
                        limit: MAX_NESTING,
                    });
                    self.skip_block(brace_at);
                    return;
                }
                if is_at {
                    let name = &self.tokens[start].text(self.src)[1..];
                    let prelude = self.join(start + 1, end);
                    let block = ast.insert_child(parent, NodeData::condition(name, prelude));
                    self.nested_block(ast, block, brace_at);
                } else {
                    let selectors: Vec<String> = self
                        .split_commas(start, end)
                        .into_iter()
                        .map(|(a, b)| self.join(a, b))
                        .filter(|s| !s.is_empty())
                        .collect();
                    let rule = ast.insert_child(parent, NodeData::rule());
                    if selectors.is_empty() {
                        self.errors.push(ParseError::EmptySelector { position });
                        self.nested_block(ast, rule, brace_at);
                        ast.remove(rule);
                        return;
                    }
                    for sel in selectors {
                        ast.insert_child(rule, NodeData::selector(sel));
                    }
                    self.nested_block(ast, rule, brace_at);
                }
            }
            terminator => {
                if terminator == Some(Token::Semicolon) {
                    self.advance();
                }
                if is_at {
                    let name = self.tokens[start].text(self.src);
                    let prelude = self.join(start + 1, end);
                    ast.insert_child(parent, NodeData::declaration(name, prelude));
                    return;
                }
                self.declaration(ast, parent, start, end);
            }
        }
    }

    fn nested_block(&mut self, ast: &mut Ast, parent: NodeId, brace_at: usize) {
        self.depth += 1;
        self.parse_block(ast, parent, Some(brace_at));
        self.depth -= 1;
    }

    /// Consume tokens through the `}` matching an already consumed `{`.
    fn skip_block(&mut self, brace_at: usize) {
        let mut open = 1usize;
        while let Some(tok) = self.peek() {
            match tok.token {
                Token::BraceOpen => open += 1,
                Token::BraceClose => {
                    open -= 1;
                    if open == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
        self.errors.push(ParseError::UnclosedBlock { position: brace_at });
    }

    fn declaration(&mut self, ast: &mut Ast, parent: NodeId, start: usize, end: usize) {
        let position = self.byte_at(start);
        let mut depth = 0usize;
        let colon = (start..end).find(|&i| {
            match self.tokens[i].token {
                Token::ParenOpen => depth += 1,
                Token::ParenClose => depth = depth.saturating_sub(1),
                Token::Colon if depth == 0 => return true,
                _ => {}
            }
            false
        });
        let Some(colon) = colon else {
            let text = self.join(start, end);
            if !text.is_empty() {
                self.errors.push(ParseError::MissingColon { position, text });
            }
            return;
        };
        let property = self.join(start, colon);
        if property.is_empty() {
            self.errors.push(ParseError::EmptyProperty { position });
            return;
        }
        let value = self.join(colon + 1, end);
        ast.insert_child(parent, NodeData::declaration(property, value));
    }

    /// Split tokens `[from, to)` at commas outside parentheses.
    fn split_commas(&self, from: usize, to: usize) -> Vec<(usize, usize)> {
        let mut parts = Vec::new();
        let mut depth = 0usize;
        let mut part_start = from;
        for i in from..to {
            match self.tokens[i].token {
                Token::ParenOpen => depth += 1,
                Token::ParenClose => depth = depth.saturating_sub(1),
                Token::Comma if depth == 0 => {
                    parts.push((part_start, i));
                    part_start = i + 1;
                }
                _ => {}
            }
        }
        parts.push((part_start, to));
        parts
    }

    /// Source text of tokens `[from, to)` with comments dropped and each
    /// whitespace gap collapsed to one space.
    fn join(&self, from: usize, to: usize) -> String {
        let mut out = String::new();
        let mut prev_end: Option<usize> = None;
        let mut gap = false;
        for tok in &self.tokens[from..to.min(self.tokens.len())] {
            if tok.token == Token::Comment {
                gap = true;
                continue;
            }
            if let Some(prev) = prev_end {
                if gap || tok.byte_start > prev {
                    out.push(' ');
                }
            }
            out.push_str(tok.text(self.src));
            prev_end = Some(tok.byte_end);
            gap = false;
        }
        out
    }
}
