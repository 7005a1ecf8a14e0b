//! Host-side cross compiler invocation.

use crate::analysis::AnalysisError;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Default cross compiler program
pub const DEFAULT_CROSS_COMPILER: &str = "mpy-cross";

/// The `mpy-cross` binary and any extra arguments it needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossCompiler {
    /// Program to run
    pub program: PathBuf,
    /// Arguments placed before `-o <out> <file>`
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for CrossCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_CROSS_COMPILER)
    }
}

impl CrossCompiler {
    /// Use `program` as the cross compiler
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Add an argument (e.g. `-msmall-int-bits=31`)
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Whether the program can be started
    #[must_use]
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .is_ok_and(|output| output.status.success())
    }

    /// Compile `source` into `output`
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::CompilerNotFound`] if the program cannot be
    /// started and [`AnalysisError::CompilationFailed`] on a non-zero exit.
    pub fn compile(&self, source: &Path, output: &Path) -> Result<(), AnalysisError> {
        debug!(
            program = %self.program.display(),
            source = %source.display(),
            "cross compiling"
        );
        let result = Command::new(&self.program)
            .args(&self.extra_args)
            .arg("-o")
            .arg(output)
            .arg(source)
            .output();
        let output = match result {
            Ok(output) => output,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(AnalysisError::CompilerNotFound {
                    program: self.program.display().to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        if !output.status.success() {
            return Err(AnalysisError::CompilationFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }

    /// Compile `source` into a temporary file and return its bytes
    ///
    /// # Errors
    ///
    /// Same as [`CrossCompiler::compile`], plus I/O errors on the temp file.
    pub fn compile_to_bytes(&self, source: &Path) -> Result<Vec<u8>, AnalysisError> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("module.mpy");
        self.compile(source, &output)?;
        Ok(std::fs::read(&output)?)
    }
}
