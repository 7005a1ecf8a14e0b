//! Executable-line analyzers
//!
//! Each analyzer answers the same question for one file: which lines could
//! execute? Three strategies sit behind [`ExecutableLineAnalyzer`]:
//!
//! | Method    | Strategy                  | Sees uncalled code |
//! |-----------|---------------------------|--------------------|
//! | `co_lines`| runtime introspection     | no                 |
//! | `ast`     | host source parse         | yes                |
//! | `mpy`     | cross-compile + line table| yes (default)      |

mod bytecode;
mod introspection;
mod source;

pub use bytecode::{BytecodeAnalyzer, CodeKind, CrossCompiler, MpyError, MpyModule, RawCode, Signature};
pub use introspection::RuntimeIntrospectionAnalyzer;
pub use source::{
    definition_lines, scan, statement_lines, SourceParseAnalyzer, Statement, StatementKind,
    SyntaxError,
};

use crate::result::{CoverageError, CoverageResult};
use crate::tracer::{LineMap, LineNo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Per-file analysis failure
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Host source file does not exist
    #[error("source not found: {}", path.display())]
    SourceNotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// Source could not be tokenized
    #[error("syntax error at {0}")]
    Syntax(#[from] SyntaxError),

    /// Cross compiler binary is missing
    #[error("cross compiler `{program}` not found; install mpy-cross or pass its path")]
    CompilerNotFound {
        /// Program that was run
        program: String,
    },

    /// Cross compiler exited with an error
    #[error("cross compiler failed ({status}): {stderr}")]
    CompilationFailed {
        /// Exit status
        status: String,
        /// Compiler diagnostics
        stderr: String,
    },

    /// Compiled output could not be read
    #[error("invalid .mpy data: {0}")]
    Bytecode(#[from] MpyError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How executable lines are determined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisMethod {
    /// Pick the best available strategy (bytecode compile)
    #[default]
    #[serde(rename = "auto")]
    Auto,
    /// Line tables of code objects seen while tracing
    #[serde(rename = "co_lines")]
    RuntimeIntrospection,
    /// Parse the source on the host
    #[serde(rename = "ast")]
    SourceParse,
    /// Cross-compile and read the bytecode line tables
    #[serde(rename = "mpy")]
    BytecodeCompile,
}

impl AnalysisMethod {
    /// All method names accepted on the command line
    pub const NAMES: [&'static str; 4] = ["auto", "co_lines", "ast", "mpy"];

    /// Command-line name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::RuntimeIntrospection => "co_lines",
            Self::SourceParse => "ast",
            Self::BytecodeCompile => "mpy",
        }
    }

    /// Concrete strategy (`auto` resolves to bytecode compile)
    #[must_use]
    pub const fn resolve(self) -> Self {
        match self {
            Self::Auto => Self::BytecodeCompile,
            other => other,
        }
    }
}

impl fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMethod {
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "co_lines" => Ok(Self::RuntimeIntrospection),
            "ast" => Ok(Self::SourceParse),
            "mpy" => Ok(Self::BytecodeCompile),
            other => Err(CoverageError::config(format!(
                "unknown analysis method `{other}` (expected one of: {})",
                Self::NAMES.join(", ")
            ))),
        }
    }
}

/// A file to analyze: the name coverage data records it under, and where
/// its source lives on the host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    /// Recorded (device) file name
    pub name: String,
    /// Host path of the source
    pub path: PathBuf,
}

impl SourceFile {
    /// Create a file whose recorded name differs from its host path
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Create a file recorded under its own host path
    #[must_use]
    pub fn local(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::new(path.display().to_string(), path)
    }

    pub(crate) fn read_source(&self) -> Result<String, AnalysisError> {
        if !self.path.exists() {
            return Err(AnalysisError::SourceNotFound {
                path: self.path.clone(),
            });
        }
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

/// Executable lines per recorded file name, from one strategy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutableSet(LineMap);

impl ExecutableSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lines of one file
    pub fn insert(&mut self, file: impl Into<String>, lines: BTreeSet<LineNo>) {
        self.0.insert(file.into(), lines);
    }

    /// Lines of one file
    #[must_use]
    pub fn get(&self, file: &str) -> Option<&BTreeSet<LineNo>> {
        self.0.get(file)
    }

    /// Whether `file` has an entry
    #[must_use]
    pub fn contains_file(&self, file: &str) -> bool {
        self.0.contains_key(file)
    }

    /// Files with an entry
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of files
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no files
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Underlying map
    #[must_use]
    pub const fn as_map(&self) -> &LineMap {
        &self.0
    }

    /// Take the underlying map
    #[must_use]
    pub fn into_inner(self) -> LineMap {
        self.0
    }
}

impl From<LineMap> for ExecutableSet {
    fn from(map: LineMap) -> Self {
        Self(map)
    }
}

/// One strategy for determining executable lines
pub trait ExecutableLineAnalyzer: Send + Sync {
    /// Method this analyzer implements
    fn method(&self) -> AnalysisMethod;

    /// Executable lines of `file`
    ///
    /// # Errors
    ///
    /// Returns an [`AnalysisError`] if the file cannot be analyzed.
    fn analyze(&self, file: &SourceFile) -> Result<BTreeSet<LineNo>, AnalysisError>;

    /// Whether the analyzer can produce data at all
    fn is_available(&self) -> bool {
        true
    }

    /// Structural limitation users should be told about
    fn limitations(&self) -> Option<&'static str> {
        None
    }
}

/// Inputs the analyzers may need
#[derive(Debug, Clone, Default)]
pub struct AnalyzerOptions {
    /// Line tables recorded on the device (for `co_lines`)
    pub runtime_tables: LineMap,
    /// Cross compiler (for `mpy`)
    pub compiler: CrossCompiler,
}

impl AnalyzerOptions {
    /// Create default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the recorded line tables
    #[must_use]
    pub fn with_runtime_tables(mut self, tables: LineMap) -> Self {
        self.runtime_tables = tables;
        self
    }

    /// Set the cross compiler
    #[must_use]
    pub fn with_compiler(mut self, compiler: CrossCompiler) -> Self {
        self.compiler = compiler;
        self
    }
}

/// Build the analyzer for `method`
#[must_use]
pub fn select_analyzer(
    method: AnalysisMethod,
    options: AnalyzerOptions,
) -> Box<dyn ExecutableLineAnalyzer> {
    match method.resolve() {
        AnalysisMethod::RuntimeIntrospection => {
            Box::new(RuntimeIntrospectionAnalyzer::new(options.runtime_tables))
        }
        AnalysisMethod::SourceParse => Box::new(SourceParseAnalyzer::new()),
        AnalysisMethod::Auto | AnalysisMethod::BytecodeCompile => {
            Box::new(BytecodeAnalyzer::new(options.compiler))
        }
    }
}

/// Analyze one file into a single-entry [`ExecutableSet`]
///
/// # Errors
///
/// Returns [`CoverageError::Analysis`] naming the file.
pub fn analyze(
    file: &SourceFile,
    analyzer: &dyn ExecutableLineAnalyzer,
) -> CoverageResult<ExecutableSet> {
    let lines = analyzer
        .analyze(file)
        .map_err(|source| CoverageError::Analysis {
            file: file.name.clone(),
            source,
        })?;
    let mut set = ExecutableSet::new();
    set.insert(file.name.clone(), lines);
    Ok(set)
}

/// A file the analyzer could not handle
#[derive(Debug)]
pub struct AnalysisFailure {
    /// Recorded file name
    pub file: String,
    /// Why
    pub error: AnalysisError,
}

/// Result of analyzing many files
#[derive(Debug, Default)]
pub struct AnalysisReport {
    /// Lines of every file that was analyzed
    pub executable: ExecutableSet,
    /// Files that failed, in input order
    pub failures: Vec<AnalysisFailure>,
}

/// Analyze every file; failures are collected and do not stop the others
#[must_use]
pub fn analyze_files(analyzer: &dyn ExecutableLineAnalyzer, files: &[SourceFile]) -> AnalysisReport {
    let mut report = AnalysisReport::default();
    for file in files {
        match analyzer.analyze(file) {
            Ok(lines) => {
                debug!(
                    file = %file.name,
                    method = %analyzer.method(),
                    lines = lines.len(),
                    "analyzed executable lines"
                );
                report.executable.insert(file.name.clone(), lines);
            }
            Err(error) => {
                warn!(file = %file.name, method = %analyzer.method(), %error, "analysis failed");
                report.failures.push(AnalysisFailure {
                    file: file.name.clone(),
                    error,
                });
            }
        }
    }
    report
}
