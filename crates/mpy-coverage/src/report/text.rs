//! Text table report
//!
//! ```text
//! Name          Stmts   Miss  Cover   Missing
//! -------------------------------------------
//! app/game.py       5      2    60%   3-4
//! -------------------------------------------
//! TOTAL             5      2    60%
//! ```

use super::{display_percent, CoverageSummary, FileCoverage, ReportAdapter, ReportFormat};
use crate::result::CoverageResult;
use std::fmt::Write;

/// Statement/miss/cover table
#[derive(Debug, Clone, Copy, Default)]
pub struct TextAdapter {
    show_missing: bool,
}

struct Row {
    name: String,
    statements: usize,
    missing: usize,
    arcs: Option<usize>,
    missing_text: Option<String>,
}

impl TextAdapter {
    /// Create a text adapter
    #[must_use]
    pub const fn new() -> Self {
        Self {
            show_missing: false,
        }
    }

    /// Append the missing line ranges of each file
    #[must_use]
    pub const fn with_show_missing(mut self, show_missing: bool) -> Self {
        self.show_missing = show_missing;
        self
    }

    fn row(&self, file: &FileCoverage) -> Row {
        let missing_text = self.show_missing.then(|| {
            file.missing_ranges()
                .iter()
                .map(|(start, end)| {
                    if start == end {
                        start.to_string()
                    } else {
                        format!("{start}-{end}")
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        });
        Row {
            name: file.file.clone(),
            statements: file.statement_count(),
            missing: file.statement_count() - file.covered_count(),
            arcs: file.arcs.as_ref().map(|arcs| arcs.len()),
            missing_text,
        }
    }
}

impl ReportAdapter for TextAdapter {
    fn format(&self) -> ReportFormat {
        ReportFormat::Text
    }

    fn render(&self, summary: &CoverageSummary) -> CoverageResult<String> {
        let mut output = String::new();
        if summary.files.is_empty() {
            output.push_str("No data to report.\n");
            write_skipped(&mut output, summary);
            return Ok(output);
        }

        let rows: Vec<Row> = summary.files.iter().map(|file| self.row(file)).collect();
        let total = Row {
            name: "TOTAL".into(),
            statements: summary.statement_count(),
            missing: summary.statement_count() - summary.covered_count(),
            arcs: summary.branch.then(|| rows.iter().filter_map(|row| row.arcs).sum()),
            missing_text: None,
        };

        let name_width = rows
            .iter()
            .map(|row| row.name.len())
            .chain(["Name".len(), total.name.len()])
            .max()
            .unwrap_or(4);

        let mut header = format!("{:<name_width$}   Stmts   Miss", "Name");
        if summary.branch {
            header.push_str("   Arcs");
        }
        header.push_str("  Cover");
        if self.show_missing {
            header.push_str("   Missing");
        }
        let rule = "-".repeat(header.len());

        let _ = writeln!(output, "{header}");
        let _ = writeln!(output, "{rule}");
        for row in &rows {
            write_row(&mut output, row, name_width);
        }
        let _ = writeln!(output, "{rule}");
        write_row(&mut output, &total, name_width);
        write_skipped(&mut output, summary);
        Ok(output)
    }
}

fn write_row(output: &mut String, row: &Row, name_width: usize) {
    let covered = row.statements - row.missing;
    let _ = write!(
        output,
        "{:<name_width$}   {:>5}  {:>5}",
        row.name, row.statements, row.missing
    );
    if let Some(arcs) = row.arcs {
        let _ = write!(output, "  {arcs:>5}");
    }
    let _ = write!(output, "  {:>4}%", display_percent(covered, row.statements));
    match &row.missing_text {
        Some(text) if !text.is_empty() => {
            let _ = write!(output, "   {text}");
        }
        _ => {}
    }
    output.push('\n');
}

fn write_skipped(output: &mut String, summary: &CoverageSummary) {
    if summary.skipped.is_empty() {
        return;
    }
    let names: Vec<&str> = summary.skipped.iter().map(|s| s.file.as_str()).collect();
    let _ = writeln!(
        output,
        "\n{} file(s) skipped (no executable lines): {}",
        names.len(),
        names.join(", ")
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::report::tests::sample_summary;

    #[test]
    fn test_table_layout() {
        let output = TextAdapter::new().render(&sample_summary()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "Name          Stmts   Miss  Cover");
        assert_eq!(lines[1], "-".repeat(lines[0].len()));
        assert_eq!(lines[2], "app/game.py       5      2    60%");
        assert_eq!(lines[3], "app/util.py       2      0   100%");
        assert_eq!(lines[5], "TOTAL             7      2    71%");
    }

    #[test]
    fn test_show_missing_appends_ranges() {
        let output = TextAdapter::new()
            .with_show_missing(true)
            .render(&sample_summary())
            .unwrap();
        assert!(output.lines().next().unwrap().ends_with("Missing"));
        assert!(output.contains("60%   3-4"));
        assert!(output.contains("app/util.py       2      0   100%\n"));
    }

    #[test]
    fn test_skipped_files_are_listed() {
        let output = TextAdapter::new().render(&sample_summary()).unwrap();
        assert!(output.contains("1 file(s) skipped (no executable lines): boot.py"));
    }

    #[test]
    fn test_empty_summary() {
        let output = TextAdapter::new().render(&CoverageSummary::default()).unwrap();
        assert_eq!(output, "No data to report.\n");
    }

    #[test]
    fn test_branch_mode_adds_arc_column() {
        let mut summary = sample_summary();
        summary.branch = true;
        summary.files[0].arcs = Some([(-1, 1), (1, 2)].into_iter().collect());
        summary.files[1].arcs = Some(std::collections::BTreeSet::new());

        let output = TextAdapter::new().render(&summary).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "Name          Stmts   Miss   Arcs  Cover");
        assert_eq!(lines[2], "app/game.py       5      2      2    60%");
        assert_eq!(lines[5], "TOTAL             7      2      2    71%");
    }
}
