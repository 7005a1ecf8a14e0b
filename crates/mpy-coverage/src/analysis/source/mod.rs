//! Source-parse analyzer: statement lines from the host grammar.

mod lexer;
mod statements;

pub use lexer::{Lexer, SyntaxError, Token, TokenKind};
pub use statements::{definition_lines, scan, statement_lines, Statement, StatementKind};

use super::{AnalysisError, AnalysisMethod, ExecutableLineAnalyzer, SourceFile};
use crate::tracer::LineNo;
use std::collections::BTreeSet;

/// Scans Python source on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceParseAnalyzer;

impl SourceParseAnalyzer {
    /// Create the analyzer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ExecutableLineAnalyzer for SourceParseAnalyzer {
    fn method(&self) -> AnalysisMethod {
        AnalysisMethod::SourceParse
    }

    fn analyze(&self, file: &SourceFile) -> Result<BTreeSet<LineNo>, AnalysisError> {
        let source = file.read_source()?;
        Ok(statement_lines(&source)?)
    }

    fn limitations(&self) -> Option<&'static str> {
        Some("follows the host grammar; statements the target compiles differently may be miscounted")
    }
}
