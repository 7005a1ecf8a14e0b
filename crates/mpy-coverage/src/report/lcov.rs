//! LCOV report
//!
//! ```text
//! TN:<test name>
//! SF:<source file>
//! DA:<line>,<execution count>
//! LF:<lines found>
//! LH:<lines hit>
//! end_of_record
//! ```
//!
//! Execution counts are 0 or 1: sessions record whether a line ran, not
//! how often.

use super::{CoverageSummary, ReportAdapter, ReportFormat};
use crate::result::CoverageResult;
use std::fmt::Write;

/// LCOV tracefile generator
#[derive(Debug, Clone, Default)]
pub struct LcovAdapter {
    test_name: Option<String>,
}

impl LcovAdapter {
    /// Create an LCOV adapter
    #[must_use]
    pub const fn new() -> Self {
        Self { test_name: None }
    }

    /// Set the test name for the report
    #[must_use]
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }
}

impl ReportAdapter for LcovAdapter {
    fn format(&self) -> ReportFormat {
        ReportFormat::Lcov
    }

    fn render(&self, summary: &CoverageSummary) -> CoverageResult<String> {
        let mut output = String::new();

        if let Some(ref name) = self.test_name {
            let _ = writeln!(output, "TN:{name}");
        } else {
            output.push_str("TN:\n");
        }

        for file in &summary.files {
            let _ = writeln!(output, "SF:{}", file.source_path.display());

            for line in &file.statements {
                let hits = u8::from(file.executed.contains(line));
                let _ = writeln!(output, "DA:{line},{hits}");
            }

            let _ = writeln!(output, "LF:{}", file.statement_count());
            let _ = writeln!(output, "LH:{}", file.covered_count());
            output.push_str("end_of_record\n");
        }

        Ok(output)
    }
}
