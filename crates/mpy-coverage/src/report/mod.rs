//! Report adapters
//!
//! A merged dataset is reduced to a [`CoverageSummary`] (per-file
//! statements, hits and misses) which each adapter renders in its format.
//! Adapters declare the interface version they implement; a mismatch is
//! rejected before rendering.

mod cobertura;
mod json;
mod lcov;
mod text;

pub use cobertura::CoberturaAdapter;
pub use json::JsonAdapter;
pub use lcov::LcovAdapter;
pub use text::TextAdapter;

use crate::merge::MergedDataset;
use crate::paths::PathResolver;
use crate::result::{CoverageError, CoverageResult};
use crate::tracer::{ArcEdge, LineNo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Interface version implemented by the adapters in this crate
pub const REPORT_ADAPTER_VERSION: u32 = 1;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Statement/miss/cover table on stdout
    Text,
    /// Machine-readable JSON
    Json,
    /// LCOV tracefile
    Lcov,
    /// Cobertura XML
    Xml,
}

impl ReportFormat {
    /// Every supported format name
    pub const NAMES: [&'static str; 4] = ["text", "json", "lcov", "xml"];

    /// Format name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Lcov => "lcov",
            Self::Xml => "xml",
        }
    }

    /// File written into the output directory (text goes to stdout)
    #[must_use]
    pub const fn file_name(self) -> Option<&'static str> {
        match self {
            Self::Text => None,
            Self::Json => Some("coverage.json"),
            Self::Lcov => Some("coverage.lcov"),
            Self::Xml => Some("coverage.xml"),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "lcov" => Ok(Self::Lcov),
            "xml" => Ok(Self::Xml),
            "html" => Err(CoverageError::config(
                "html reports are not produced; render the json or xml output with an external tool",
            )),
            other => Err(CoverageError::config(format!(
                "unknown report format `{other}` (expected one of: {})",
                Self::NAMES.join(", ")
            ))),
        }
    }
}

/// Coverage of one reported file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCoverage {
    /// Recorded file name
    pub file: String,
    /// Resolved host path
    pub source_path: PathBuf,
    /// Executable lines
    pub statements: BTreeSet<LineNo>,
    /// Executable lines that ran
    pub executed: BTreeSet<LineNo>,
    /// Observed arcs, in branch mode
    pub arcs: Option<BTreeSet<ArcEdge>>,
}

impl FileCoverage {
    /// Executable lines that never ran
    #[must_use]
    pub fn missing(&self) -> BTreeSet<LineNo> {
        self.statements.difference(&self.executed).copied().collect()
    }

    /// Number of executable lines
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Number of executable lines that ran
    #[must_use]
    pub fn covered_count(&self) -> usize {
        self.executed.len()
    }

    /// Covered fraction in `[0, 1]`
    #[must_use]
    pub fn line_rate(&self) -> f64 {
        rate(self.covered_count(), self.statement_count())
    }

    /// Arc totals in branch mode as `(taken, possible)`
    ///
    /// Untaken arcs are never observed; each missing statement stands for
    /// at least one of them.
    #[must_use]
    pub fn arc_counts(&self) -> Option<(usize, usize)> {
        let taken = self.arcs.as_ref()?.len();
        Some((taken, taken + self.missing().len()))
    }

    /// Missing lines folded into ranges over the statement list
    ///
    /// Two missing lines join a range when no executed statement lies
    /// between them, e.g. `3-4, 9`.
    #[must_use]
    pub fn missing_ranges(&self) -> Vec<(LineNo, LineNo)> {
        let mut ranges: Vec<(LineNo, LineNo)> = Vec::new();
        let mut open = false;
        for line in &self.statements {
            if self.executed.contains(line) {
                open = false;
                continue;
            }
            match ranges.last_mut() {
                Some(range) if open => range.1 = *line,
                _ => ranges.push((*line, *line)),
            }
            open = true;
        }
        ranges
    }
}

/// Why a recorded file is absent from the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    /// Recorded file name
    pub file: String,
    /// Human-readable reason
    pub reason: String,
}

/// Everything an adapter renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageSummary {
    /// Reported files, ordered by name
    pub files: Vec<FileCoverage>,
    /// Files left out of every rate
    pub skipped: Vec<SkippedFile>,
    /// Whether arc data is reported
    pub branch: bool,
}

impl CoverageSummary {
    /// Reduce a merged dataset
    ///
    /// Files without executable lines are skipped. Executed lines outside
    /// the executable set do not count.
    #[must_use]
    pub fn from_dataset(dataset: &MergedDataset, resolver: &PathResolver) -> Self {
        let mut summary = Self {
            branch: dataset.has_branch_data,
            ..Self::default()
        };
        for (file, record) in &dataset.records {
            let statements = match &record.executable {
                Some(lines) if !lines.is_empty() => lines.clone(),
                _ => {
                    debug!(file = %file, "no executable lines; skipping");
                    summary.skipped.push(SkippedFile {
                        file: file.clone(),
                        reason: "no executable lines".into(),
                    });
                    continue;
                }
            };
            let executed = record.executed.intersection(&statements).copied().collect();
            summary.files.push(FileCoverage {
                file: file.clone(),
                source_path: resolver.resolve(file),
                statements,
                executed,
                arcs: dataset.has_branch_data.then(|| record.arcs.clone().unwrap_or_default()),
            });
        }
        summary
    }

    /// Total executable lines
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.files.iter().map(FileCoverage::statement_count).sum()
    }

    /// Total executable lines that ran
    #[must_use]
    pub fn covered_count(&self) -> usize {
        self.files.iter().map(FileCoverage::covered_count).sum()
    }

    /// Overall covered fraction
    #[must_use]
    pub fn line_rate(&self) -> f64 {
        rate(self.covered_count(), self.statement_count())
    }

    /// Arc totals across files, in branch mode
    #[must_use]
    pub fn arc_counts(&self) -> Option<(usize, usize)> {
        if !self.branch {
            return None;
        }
        Some(sum_arc_counts(self.files.iter()))
    }

    /// Overall coverage in percent
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.line_rate() * 100.0
    }
}

fn sum_arc_counts<'a>(files: impl Iterator<Item = &'a FileCoverage>) -> (usize, usize) {
    files
        .filter_map(FileCoverage::arc_counts)
        .fold((0, 0), |(taken, possible), (t, p)| (taken + t, possible + p))
}

#[allow(clippy::cast_precision_loss)]
fn rate(covered: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        covered as f64 / total as f64
    }
}

/// Whole-number percentage that reads 0 or 100 only when exact
#[must_use]
pub fn display_percent(covered: usize, total: usize) -> u32 {
    if total == 0 || covered >= total {
        return 100;
    }
    if covered == 0 {
        return 0;
    }
    let percent = rate(covered, total) * 100.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = percent.round() as u32;
    rounded.clamp(1, 99)
}

/// Narrow interface to a report renderer
pub trait ReportAdapter {
    /// Interface version the adapter implements
    fn interface_version(&self) -> u32 {
        REPORT_ADAPTER_VERSION
    }

    /// Format produced
    fn format(&self) -> ReportFormat;

    /// Render the summary
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn render(&self, summary: &CoverageSummary) -> CoverageResult<String>;
}

/// Reject adapters built against another interface version
///
/// # Errors
///
/// Returns [`CoverageError::AdapterVersion`] on mismatch.
pub fn check_adapter(adapter: &dyn ReportAdapter) -> CoverageResult<()> {
    let found = adapter.interface_version();
    if found == REPORT_ADAPTER_VERSION {
        Ok(())
    } else {
        Err(CoverageError::AdapterVersion {
            found,
            expected: REPORT_ADAPTER_VERSION,
        })
    }
}

/// Rendering options shared by the built-in adapters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// List missing line ranges in the text table
    pub show_missing: bool,
}

/// Built-in adapter for `format`
#[must_use]
pub fn adapter_for(format: ReportFormat, options: RenderOptions) -> Box<dyn ReportAdapter> {
    match format {
        ReportFormat::Text => Box::new(TextAdapter::new().with_show_missing(options.show_missing)),
        ReportFormat::Json => Box::new(JsonAdapter::new()),
        ReportFormat::Lcov => Box::new(LcovAdapter::new()),
        ReportFormat::Xml => Box::new(CoberturaAdapter::new()),
    }
}

/// One rendered report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    /// Format
    pub format: ReportFormat,
    /// Where it was written (`None` for text)
    pub path: Option<PathBuf>,
    /// Rendered content
    pub content: String,
}

/// Render through one adapter and write file formats into `output_dir`
///
/// # Errors
///
/// Returns an error on adapter version mismatch, rendering failure or I/O
/// failure.
pub fn write_report(
    adapter: &dyn ReportAdapter,
    summary: &CoverageSummary,
    output_dir: &Path,
) -> CoverageResult<RenderedReport> {
    check_adapter(adapter)?;
    let format = adapter.format();
    let content = adapter.render(summary)?;

    let path = match format.file_name() {
        Some(name) => {
            std::fs::create_dir_all(output_dir)?;
            let path = output_dir.join(name);
            std::fs::write(&path, &content)?;
            info!(format = %format, path = %path.display(), "wrote coverage report");
            Some(path)
        }
        None => None,
    };
    Ok(RenderedReport {
        format,
        path,
        content,
    })
}

/// Render every requested format with the built-in adapters
///
/// # Errors
///
/// Stops at the first format that fails.
pub fn render_all(
    summary: &CoverageSummary,
    formats: &[ReportFormat],
    output_dir: &Path,
    options: RenderOptions,
) -> CoverageResult<Vec<RenderedReport>> {
    formats
        .iter()
        .map(|format| write_report(adapter_for(*format, options).as_ref(), summary, output_dir))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use crate::merge::CoverageRecord;

    /// `app/game.py` 3 of 5, `app/util.py` fully covered, `boot.py` skipped
    pub(crate) fn sample_summary() -> CoverageSummary {
        let mut dataset = MergedDataset::new();
        dataset.records.insert(
            "app/game.py".into(),
            CoverageRecord {
                executed: BTreeSet::from([1, 2, 5, 40]),
                executable: Some(BTreeSet::from([1, 2, 3, 4, 5])),
                ..CoverageRecord::default()
            },
        );
        dataset.records.insert(
            "app/util.py".into(),
            CoverageRecord {
                executed: BTreeSet::from([1, 2]),
                executable: Some(BTreeSet::from([1, 2])),
                ..CoverageRecord::default()
            },
        );
        dataset.records.insert(
            "boot.py".into(),
            CoverageRecord {
                executed: BTreeSet::from([1]),
                ..CoverageRecord::default()
            },
        );
        CoverageSummary::from_dataset(&dataset, &PathResolver::new())
    }

    mod summary_tests {
        use super::*;

        #[test]
        fn test_files_without_executable_lines_are_skipped() {
            let summary = sample_summary();
            assert_eq!(summary.files.len(), 2);
            assert_eq!(summary.skipped.len(), 1);
            assert_eq!(summary.skipped[0].file, "boot.py");
        }

        #[test]
        fn test_lines_outside_executable_set_do_not_count() {
            let summary = sample_summary();
            let game = &summary.files[0];
            assert_eq!(game.covered_count(), 3);
            assert_eq!(game.missing(), BTreeSet::from([3, 4]));
            assert_eq!(summary.statement_count(), 7);
            assert_eq!(summary.covered_count(), 5);
        }

        #[test]
        fn test_missing_ranges_span_non_statement_gaps() {
            let file = FileCoverage {
                file: "m.py".into(),
                source_path: PathBuf::from("m.py"),
                statements: BTreeSet::from([1, 2, 4, 7, 8, 10]),
                executed: BTreeSet::from([1, 8]),
                arcs: None,
            };
            assert_eq!(file.missing_ranges(), vec![(2, 7), (10, 10)]);
        }

        #[test]
        fn test_display_percent_never_rounds_to_bounds() {
            assert_eq!(display_percent(0, 10), 0);
            assert_eq!(display_percent(1, 1000), 1);
            assert_eq!(display_percent(999, 1000), 99);
            assert_eq!(display_percent(3, 5), 60);
            assert_eq!(display_percent(0, 0), 100);
        }

        #[test]
        fn test_source_paths_follow_resolver() {
            let mut dataset = MergedDataset::new();
            dataset.records.insert(
                "/flash/m.py".into(),
                CoverageRecord {
                    executable: Some(BTreeSet::from([1])),
                    ..CoverageRecord::default()
                },
            );
            let resolver = PathResolver::from_specs(&["/flash/=src/"]).unwrap();
            let summary = CoverageSummary::from_dataset(&dataset, &resolver);
            assert_eq!(summary.files[0].source_path, PathBuf::from("src/m.py"));
            assert_eq!(summary.files[0].file, "/flash/m.py");
        }
    }

    mod adapter_tests {
        use super::*;

        struct FutureAdapter;

        impl ReportAdapter for FutureAdapter {
            fn interface_version(&self) -> u32 {
                REPORT_ADAPTER_VERSION + 1
            }

            fn format(&self) -> ReportFormat {
                ReportFormat::Json
            }

            fn render(&self, _summary: &CoverageSummary) -> CoverageResult<String> {
                Ok(String::new())
            }
        }

        #[test]
        fn test_version_mismatch_is_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let err = write_report(&FutureAdapter, &sample_summary(), dir.path()).unwrap_err();
            assert!(matches!(err, CoverageError::AdapterVersion { found: 2, expected: 1 }));
            assert!(!dir.path().join("coverage.json").exists());
        }

        #[test]
        fn test_render_all_writes_file_formats() {
            let dir = tempfile::tempdir().unwrap();
            let out = dir.path().join("out");
            let reports = render_all(
                &sample_summary(),
                &[ReportFormat::Text, ReportFormat::Json, ReportFormat::Lcov, ReportFormat::Xml],
                &out,
                RenderOptions::default(),
            )
            .unwrap();

            assert_eq!(reports.len(), 4);
            assert!(reports[0].path.is_none());
            for name in ["coverage.json", "coverage.lcov", "coverage.xml"] {
                assert!(out.join(name).exists(), "{name} missing");
            }
        }

        #[test]
        fn test_format_names() {
            for name in ReportFormat::NAMES {
                assert_eq!(name.parse::<ReportFormat>().unwrap().as_str(), name);
            }
            assert!("html".parse::<ReportFormat>().unwrap_err().is_configuration());
            assert!("pdf".parse::<ReportFormat>().is_err());
        }
    }
}
