//! JSON report

use super::{CoverageSummary, FileCoverage, ReportAdapter, ReportFormat, REPORT_ADAPTER_VERSION};
use crate::result::CoverageResult;
use crate::tracer::{ArcEdge, LineNo};
use serde::Serialize;
use std::collections::BTreeMap;

/// Machine-readable report
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAdapter;

impl JsonAdapter {
    /// Create a JSON adapter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    meta: Meta,
    files: BTreeMap<&'a str, JsonFile<'a>>,
    totals: Totals,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<&'a str>,
}

#[derive(Serialize)]
struct Meta {
    version: &'static str,
    adapter_version: u32,
    branch_coverage: bool,
}

#[derive(Serialize)]
struct JsonFile<'a> {
    source_path: String,
    executed_lines: Vec<LineNo>,
    missing_lines: Vec<LineNo>,
    summary: Totals,
    #[serde(skip_serializing_if = "Option::is_none")]
    arcs: Option<Vec<&'a ArcEdge>>,
}

#[derive(Serialize)]
struct Totals {
    num_statements: usize,
    covered_lines: usize,
    missing_lines: usize,
    percent_covered: f64,
}

impl Totals {
    fn new(statements: usize, covered: usize, rate: f64) -> Self {
        Self {
            num_statements: statements,
            covered_lines: covered,
            missing_lines: statements - covered,
            percent_covered: rate * 100.0,
        }
    }
}

impl<'a> From<&'a FileCoverage> for JsonFile<'a> {
    fn from(file: &'a FileCoverage) -> Self {
        Self {
            source_path: file.source_path.display().to_string(),
            executed_lines: file.executed.iter().copied().collect(),
            missing_lines: file.missing().into_iter().collect(),
            summary: Totals::new(file.statement_count(), file.covered_count(), file.line_rate()),
            arcs: file.arcs.as_ref().map(|arcs| arcs.iter().collect()),
        }
    }
}

impl ReportAdapter for JsonAdapter {
    fn format(&self) -> ReportFormat {
        ReportFormat::Json
    }

    fn render(&self, summary: &CoverageSummary) -> CoverageResult<String> {
        let report = JsonReport {
            meta: Meta {
                version: env!("CARGO_PKG_VERSION"),
                adapter_version: REPORT_ADAPTER_VERSION,
                branch_coverage: summary.branch,
            },
            files: summary
                .files
                .iter()
                .map(|file| (file.file.as_str(), JsonFile::from(file)))
                .collect(),
            totals: Totals::new(
                summary.statement_count(),
                summary.covered_count(),
                summary.line_rate(),
            ),
            skipped: summary.skipped.iter().map(|s| s.file.as_str()).collect(),
        };
        let mut json = serde_json::to_string_pretty(&report)?;
        json.push('\n');
        Ok(json)
    }
}
