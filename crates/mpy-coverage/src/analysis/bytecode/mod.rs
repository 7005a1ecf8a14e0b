//! Bytecode-compile analyzer: cross-compile, then read the line tables of
//! every compiled code object, called or not.

mod compiler;
mod mpy;

pub use compiler::{CrossCompiler, DEFAULT_CROSS_COMPILER};
pub use mpy::{CodeKind, MpyError, MpyModule, RawCode, Signature, MPY_VERSION};

use super::source::definition_lines;
use super::{AnalysisError, AnalysisMethod, ExecutableLineAnalyzer, SourceFile};
use crate::tracer::LineNo;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

/// Cross-compiles sources with `mpy-cross` and decodes the `.mpy` output
#[derive(Debug, Clone, Default)]
pub struct BytecodeAnalyzer {
    compiler: CrossCompiler,
}

impl BytecodeAnalyzer {
    /// Create an analyzer using `compiler`
    #[must_use]
    pub const fn new(compiler: CrossCompiler) -> Self {
        Self { compiler }
    }

    /// The configured compiler
    #[must_use]
    pub const fn compiler(&self) -> &CrossCompiler {
        &self.compiler
    }

    /// Executable lines of an already compiled `.mpy` image
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or native images.
    pub fn lines_from_mpy(data: &[u8]) -> Result<BTreeSet<LineNo>, AnalysisError> {
        Ok(MpyModule::parse(data)?.executable_lines())
    }
}

fn is_precompiled(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "mpy")
}

impl ExecutableLineAnalyzer for BytecodeAnalyzer {
    fn method(&self) -> AnalysisMethod {
        AnalysisMethod::BytecodeCompile
    }

    fn analyze(&self, file: &SourceFile) -> Result<BTreeSet<LineNo>, AnalysisError> {
        if !file.path.exists() {
            return Err(AnalysisError::SourceNotFound {
                path: file.path.clone(),
            });
        }
        if is_precompiled(&file.path) {
            return Self::lines_from_mpy(&std::fs::read(&file.path)?);
        }

        let image = self.compiler.compile_to_bytes(&file.path)?;
        let mut lines = Self::lines_from_mpy(&image)?;

        // The compiler emits no line entry for def/class statements.
        let definitions = file
            .read_source()
            .and_then(|source| definition_lines(&source).map_err(AnalysisError::from));
        match definitions {
            Ok(definitions) => lines.extend(definitions),
            Err(error) => {
                warn!(file = %file.name, %error, "def/class line patch-up failed");
            }
        }
        Ok(lines)
    }

    fn is_available(&self) -> bool {
        self.compiler.is_available()
    }

    fn limitations(&self) -> Option<&'static str> {
        Some("requires an mpy-cross matching the target's bytecode version")
    }
}
