//! Python tokenizer, just deep enough to find statement boundaries.
//!
//! Produces names, literals, punctuation and logical `Newline` tokens.
//! Comments, blank lines and indentation are dropped; newlines inside
//! brackets and after a backslash continuation do not end a statement.

use crate::tracer::LineNo;
use thiserror::Error;

/// Source that cannot be tokenized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    /// Line where the problem starts
    pub line: LineNo,
    /// What went wrong
    pub message: String,
}

impl SyntaxError {
    fn new(line: LineNo, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Token categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword
    Name(String),
    /// Numeric literal
    Number,
    /// String or bytes literal (any prefix but `f`, any quoting)
    Str,
    /// Formatted string literal; evaluates its fields at run time
    FString,
    /// `...`
    Ellipsis,
    /// `:` (not part of `:=`)
    Colon,
    /// `;`
    Semicolon,
    /// `@` at the start of a statement is a decorator
    At,
    /// `(`, `[` or `{`
    Open,
    /// `)`, `]` or `}`
    Close,
    /// Any other operator or punctuation
    Op,
    /// End of a logical line
    Newline,
}

/// A token and the line it starts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Category
    pub kind: TokenKind,
    /// Starting line (1-based)
    pub line: LineNo,
}

impl Token {
    /// Whether this is the name `word`
    #[must_use]
    pub fn is_name(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Name(name) if name == word)
    }
}

/// Tokenizer over UTF-8 source bytes
pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: LineNo,
    depth: Vec<(u8, LineNo)>,
    pending: bool,
}

impl<'a> Lexer<'a> {
    /// Create a lexer for `source`
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            depth: Vec::new(),
            pending: false,
        }
    }

    /// Tokenize the whole source. The result always ends with `Newline`
    /// when it holds any token.
    ///
    /// # Errors
    ///
    /// Returns the first unterminated string or unbalanced bracket.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Produce the next token, or `None` at end of input
    ///
    /// # Errors
    ///
    /// Returns the first unterminated string or unbalanced bracket.
    pub fn next_token(&mut self) -> Result<Option<Token>, SyntaxError> {
        loop {
            let Some(ch) = self.peek() else {
                return self.finish();
            };
            let line = self.line;

            let kind = match ch {
                b' ' | b'\t' | b'\r' | b'\x0c' => {
                    self.advance();
                    continue;
                }
                b'#' => {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.advance();
                    }
                    continue;
                }
                b'\\' if self.continuation_follows() => {
                    while self.peek() != Some(b'\n') {
                        self.advance();
                    }
                    self.advance();
                    continue;
                }
                b'\n' => {
                    self.advance();
                    if self.depth.is_empty() && self.pending {
                        self.pending = false;
                        return Ok(Some(Token {
                            kind: TokenKind::Newline,
                            line,
                        }));
                    }
                    continue;
                }
                b'\'' | b'"' => self.lex_string(line)?,
                b'0'..=b'9' => self.lex_number(),
                b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(),
                b'.' if self.peek_at(1) == Some(b'.') && self.peek_at(2) == Some(b'.') => {
                    self.pos += 3;
                    TokenKind::Ellipsis
                }
                c if is_name_start(c) => self.lex_name_or_string(line)?,
                b'(' | b'[' | b'{' => {
                    self.advance();
                    self.depth.push((ch, line));
                    TokenKind::Open
                }
                b')' | b']' | b'}' => {
                    self.advance();
                    match self.depth.pop() {
                        Some((open, _)) if closes(open, ch) => TokenKind::Close,
                        Some((open, open_line)) => {
                            return Err(SyntaxError::new(
                                line,
                                format!(
                                    "closing '{}' does not match '{}' on line {open_line}",
                                    char::from(ch),
                                    char::from(open)
                                ),
                            ));
                        }
                        None => {
                            return Err(SyntaxError::new(
                                line,
                                format!("unmatched '{}'", char::from(ch)),
                            ));
                        }
                    }
                }
                b':' if self.peek_at(1) == Some(b'=') => {
                    self.pos += 2;
                    TokenKind::Op
                }
                b':' => {
                    self.advance();
                    TokenKind::Colon
                }
                b';' => {
                    self.advance();
                    TokenKind::Semicolon
                }
                b'@' => {
                    self.advance();
                    TokenKind::At
                }
                _ => {
                    self.advance();
                    TokenKind::Op
                }
            };

            self.pending = true;
            return Ok(Some(Token { kind, line }));
        }
    }

    fn finish(&mut self) -> Result<Option<Token>, SyntaxError> {
        if let Some((open, line)) = self.depth.first() {
            return Err(SyntaxError::new(
                *line,
                format!("'{}' was never closed", char::from(*open)),
            ));
        }
        if self.pending {
            self.pending = false;
            return Ok(Some(Token {
                kind: TokenKind::Newline,
                line: self.line,
            }));
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn advance(&mut self) {
        if self.peek() == Some(b'\n') {
            self.line += 1;
        }
        self.pos += 1;
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    /// Backslash followed by optional `\r` and a newline
    fn continuation_follows(&self) -> bool {
        match self.peek_at(1) {
            Some(b'\n') => true,
            Some(b'\r') => self.peek_at(2) == Some(b'\n'),
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Literal tokenizers
    // -----------------------------------------------------------------------

    fn lex_name_or_string(&mut self, line: LineNo) -> Result<TokenKind, SyntaxError> {
        let start = self.pos;
        while self.peek().is_some_and(is_name_continue) {
            self.advance();
        }
        let word = &self.src[start..self.pos];
        if word.len() <= 2
            && word.iter().all(|c| b"rRbBuUfF".contains(c))
            && matches!(self.peek(), Some(b'\'' | b'"'))
        {
            let formatted = word.iter().any(|c| matches!(c, b'f' | b'F'));
            let kind = self.lex_string(line)?;
            return Ok(if formatted { TokenKind::FString } else { kind });
        }
        Ok(TokenKind::Name(String::from_utf8_lossy(word).into_owned()))
    }

    fn lex_string(&mut self, line: LineNo) -> Result<TokenKind, SyntaxError> {
        let Some(quote) = self.peek() else {
            return Err(SyntaxError::new(line, "expected string literal"));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let width = if triple { 3 } else { 1 };
        for _ in 0..width {
            self.advance();
        }

        loop {
            match self.peek() {
                None => {
                    let what = if triple { "triple-quoted string" } else { "string" };
                    return Err(SyntaxError::new(line, format!("unterminated {what} literal")));
                }
                Some(b'\\') => {
                    self.advance();
                    if self.peek().is_some() {
                        self.advance();
                    }
                }
                Some(b'\n') if !triple => {
                    return Err(SyntaxError::new(line, "unterminated string literal"));
                }
                Some(c) if c == quote => {
                    if !triple {
                        self.advance();
                        return Ok(TokenKind::Str);
                    }
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        for _ in 0..3 {
                            self.advance();
                        }
                        return Ok(TokenKind::Str);
                    }
                    self.advance();
                }
                Some(_) => self.advance(),
            }
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' {
                let exponent = matches!(c, b'e' | b'E');
                self.advance();
                if exponent
                    && matches!(self.peek(), Some(b'+' | b'-'))
                    && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                {
                    self.advance();
                }
            } else {
                break;
            }
        }
        TokenKind::Number
    }
}

const fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 0x80
}

const fn is_name_continue(c: u8) -> bool {
    is_name_start(c) || c.is_ascii_digit()
}

const fn closes(open: u8, close: u8) -> bool {
    matches!((open, close), (b'(', b')') | (b'[', b']') | (b'{', b'}'))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn newline_lines(source: &str) -> Vec<LineNo> {
        Lexer::tokenize(source)
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .map(|t| t.line)
            .collect()
    }

    mod token_tests {
        use super::*;

        #[test]
        fn test_simple_assignment() {
            assert_eq!(
                kinds("x = 1\n"),
                vec![
                    TokenKind::Name("x".into()),
                    TokenKind::Op,
                    TokenKind::Number,
                    TokenKind::Newline
                ]
            );
        }

        #[test]
        fn test_string_prefixes() {
            for source in ["b'x'", "rb'\\d'", "U'x'", "Rb\"\"\"x\"\"\""] {
                assert_eq!(kinds(source), vec![TokenKind::Str, TokenKind::Newline], "{source}");
            }
            for source in ["f\"{x}\"", "rf'{x}'", "F'''{x}'''"] {
                assert_eq!(kinds(source), vec![TokenKind::FString, TokenKind::Newline], "{source}");
            }
            assert_eq!(
                kinds("bar'x'")[0],
                TokenKind::Name("bar".into()),
                "three-letter word is not a prefix"
            );
        }

        #[test]
        fn test_walrus_is_not_a_colon() {
            let tokens = kinds("if (n := 3):\n    pass\n");
            let colons = tokens.iter().filter(|k| **k == TokenKind::Colon).count();
            assert_eq!(colons, 1);
        }

        #[test]
        fn test_numbers_with_exponents_and_ellipsis() {
            assert_eq!(kinds("1e-5\n"), vec![TokenKind::Number, TokenKind::Newline]);
            assert_eq!(kinds(".5\n"), vec![TokenKind::Number, TokenKind::Newline]);
            assert_eq!(kinds("...\n"), vec![TokenKind::Ellipsis, TokenKind::Newline]);
        }
    }

    mod line_tests {
        use super::*;

        #[test]
        fn test_comments_and_blank_lines_produce_nothing() {
            assert!(kinds("# comment\n\n   \n# another\n").is_empty());
        }

        #[test]
        fn test_brackets_join_lines() {
            let source = "x = [\n    1,\n    2,\n]\ny = 2\n";
            assert_eq!(newline_lines(source), vec![4, 5]);
        }

        #[test]
        fn test_backslash_continuation() {
            let source = "x = 1 + \\\n    2\ny = 3\n";
            assert_eq!(newline_lines(source), vec![2, 3]);
        }

        #[test]
        fn test_triple_quoted_string_spans_lines() {
            let source = "s = \"\"\"a\n# not a comment\nb\"\"\"\nt = 1\n";
            let tokens = Lexer::tokenize(source).unwrap();
            assert_eq!(tokens[2].kind, TokenKind::Str);
            assert_eq!(tokens[2].line, 1);
            assert_eq!(newline_lines(source), vec![3, 4]);
        }

        #[test]
        fn test_missing_final_newline() {
            assert_eq!(newline_lines("x = 1"), vec![1]);
        }

        #[test]
        fn test_crlf_line_endings() {
            assert_eq!(newline_lines("x = 1\r\ny = 2\r\n"), vec![1, 2]);
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_unterminated_string() {
            let err = Lexer::tokenize("x = 'abc\ny = 1\n").unwrap_err();
            assert_eq!(err.line, 1);
            assert!(err.message.contains("unterminated"));
        }

        #[test]
        fn test_unterminated_triple_string() {
            let err = Lexer::tokenize("x = 1\ns = '''abc\n").unwrap_err();
            assert_eq!(err.line, 2);
            assert!(err.message.contains("triple-quoted"));
        }

        #[test]
        fn test_unclosed_bracket() {
            let err = Lexer::tokenize("f(1,\n  2\n").unwrap_err();
            assert_eq!(err.line, 1);
            assert!(err.message.contains("never closed"));
        }

        #[test]
        fn test_mismatched_bracket() {
            let err = Lexer::tokenize("x = (1]\n").unwrap_err();
            assert!(err.message.contains("does not match"));
            let err = Lexer::tokenize(")\n").unwrap_err();
            assert!(err.message.contains("unmatched"));
        }
    }
}
