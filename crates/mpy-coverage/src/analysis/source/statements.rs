//! Logical statements and which of them carry bytecode.

use super::lexer::{Lexer, SyntaxError, Token, TokenKind};
use crate::tracer::LineNo;
use std::collections::BTreeSet;

/// What a statement contributes to the executable set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Ordinary statement or control-flow header
    Code,
    /// `def` / `class` header
    Definition,
    /// `@decorator` line
    Decorator,
    /// Compiles to no bytecode: docstrings and other bare constants,
    /// `global` / `nonlocal`, `else:` / `try:` / `finally:` headers
    BytecodeFree,
}

impl StatementKind {
    /// Whether the statement's line belongs to the executable set
    #[must_use]
    pub const fn is_executable(self) -> bool {
        !matches!(self, Self::BytecodeFree)
    }
}

/// One statement, located by its first line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement {
    /// First line of the statement
    pub line: LineNo,
    /// Classification
    pub kind: StatementKind,
}

const COMPOUND_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "while", "for", "try", "except", "finally", "with", "def", "class",
];

/// Split source into statements
///
/// # Errors
///
/// Returns the first tokenizer error.
pub fn scan(source: &str) -> Result<Vec<Statement>, SyntaxError> {
    let tokens = Lexer::tokenize(source)?;
    let mut statements = Vec::new();
    for logical in tokens.split(|token| token.kind == TokenKind::Newline) {
        split_logical_line(logical, &mut statements);
    }
    Ok(statements)
}

/// First lines of every statement that carries bytecode
///
/// # Errors
///
/// Returns the first tokenizer error.
pub fn statement_lines(source: &str) -> Result<BTreeSet<LineNo>, SyntaxError> {
    Ok(scan(source)?
        .into_iter()
        .filter(|statement| statement.kind.is_executable())
        .map(|statement| statement.line)
        .collect())
}

/// Lines of `def` and `class` headers
///
/// # Errors
///
/// Returns the first tokenizer error.
pub fn definition_lines(source: &str) -> Result<BTreeSet<LineNo>, SyntaxError> {
    Ok(scan(source)?
        .into_iter()
        .filter(|statement| statement.kind == StatementKind::Definition)
        .map(|statement| statement.line)
        .collect())
}

fn split_logical_line(mut rest: &[Token], out: &mut Vec<Statement>) {
    while let Some(first) = rest.first() {
        if first.kind == TokenKind::Semicolon {
            rest = &rest[1..];
            continue;
        }
        if let Some(colon) = header_colon(rest) {
            out.push(classify_header(&rest[..colon]));
            rest = &rest[colon + 1..];
            continue;
        }
        let end = find_at_depth_zero(rest, |token| token.kind == TokenKind::Semicolon)
            .unwrap_or(rest.len());
        out.push(classify_simple(&rest[..end]));
        rest = &rest[end..];
    }
}

/// Index of the colon ending a compound-statement header
fn header_colon(tokens: &[Token]) -> Option<usize> {
    let keyword = leading_keyword(tokens)?;
    if !COMPOUND_KEYWORDS.contains(&keyword) {
        return None;
    }
    let mut lambdas = 0usize;
    find_at_depth_zero(tokens, |token| {
        if token.is_name("lambda") {
            lambdas += 1;
            return false;
        }
        if token.kind == TokenKind::Colon {
            if lambdas == 0 {
                return true;
            }
            lambdas -= 1;
        }
        false
    })
}

/// First keyword, looking through `async`
fn leading_keyword(tokens: &[Token]) -> Option<&str> {
    let mut names = tokens.iter().map(|token| match &token.kind {
        TokenKind::Name(name) => Some(name.as_str()),
        _ => None,
    });
    match names.next()? {
        Some("async") => names.next().flatten(),
        other => other,
    }
}

fn find_at_depth_zero(tokens: &[Token], mut predicate: impl FnMut(&Token) -> bool) -> Option<usize> {
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Open => depth += 1,
            TokenKind::Close => depth = depth.saturating_sub(1),
            _ if depth == 0 && predicate(token) => return Some(index),
            _ => {}
        }
    }
    None
}

fn classify_header(header: &[Token]) -> Statement {
    let line = header.first().map_or(0, |token| token.line);
    let kind = match leading_keyword(header) {
        Some("def" | "class") => StatementKind::Definition,
        Some("else" | "try" | "finally") => StatementKind::BytecodeFree,
        _ => StatementKind::Code,
    };
    Statement { line, kind }
}

fn classify_simple(tokens: &[Token]) -> Statement {
    let line = tokens.first().map_or(0, |token| token.line);
    let kind = match tokens.first().map(|token| &token.kind) {
        Some(TokenKind::At) => StatementKind::Decorator,
        Some(TokenKind::Name(name)) if name == "global" || name == "nonlocal" => {
            StatementKind::BytecodeFree
        }
        _ if is_bare_constant(tokens) => StatementKind::BytecodeFree,
        _ => StatementKind::Code,
    };
    Statement { line, kind }
}

fn is_bare_constant(tokens: &[Token]) -> bool {
    match tokens {
        [] => false,
        [single] => match &single.kind {
            TokenKind::Str | TokenKind::Number | TokenKind::Ellipsis => true,
            TokenKind::Name(name) => matches!(name.as_str(), "None" | "True" | "False"),
            _ => false,
        },
        _ => tokens.iter().all(|token| token.kind == TokenKind::Str),
    }
}
