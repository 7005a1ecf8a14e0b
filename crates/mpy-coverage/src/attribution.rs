//! Test attribution: which tests executed which files and lines.

use crate::merge::MergedDataset;
use crate::tracer::LineNo;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// File-level header of the attribution table
pub const FILE_HEADERS: [&str; 2] = ["app_file", "test"];

/// Line-level header of the attribution table
pub const LINE_HEADERS: [&str; 3] = ["app_file", "line", "test"];

/// File → line → tests, derived from a merged dataset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestAttribution {
    lines: BTreeMap<String, BTreeMap<LineNo, BTreeSet<String>>>,
}

/// One row of the file-level view
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileAttribution<'a> {
    /// File name
    pub file: &'a str,
    /// Test identifier
    pub test: &'a str,
}

/// One row of the line-level view
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineAttribution<'a> {
    /// File name
    pub file: &'a str,
    /// Line number
    pub line: LineNo,
    /// Test identifier
    pub test: &'a str,
}

impl TestAttribution {
    /// Collect attribution from the `covering_tests` of every record
    #[must_use]
    pub fn from_dataset(dataset: &MergedDataset) -> Self {
        let lines = dataset
            .records
            .iter()
            .filter(|(_, record)| !record.covering_tests.is_empty())
            .map(|(file, record)| (file.clone(), record.covering_tests.clone()))
            .collect();
        Self { lines }
    }

    /// Whether no test is attributed anywhere
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Tests that executed any line of `file`
    #[must_use]
    pub fn tests_for_file(&self, file: &str) -> BTreeSet<&str> {
        self.lines
            .get(file)
            .into_iter()
            .flat_map(BTreeMap::values)
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Tests that executed `line` of `file`
    #[must_use]
    pub fn tests_for_line(&self, file: &str, line: LineNo) -> BTreeSet<&str> {
        self.lines
            .get(file)
            .and_then(|lines| lines.get(&line))
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// File-level rows ordered by file then test
    #[must_use]
    pub fn file_rows(&self) -> Vec<FileAttribution<'_>> {
        self.lines
            .keys()
            .flat_map(|file| {
                self.tests_for_file(file)
                    .into_iter()
                    .map(move |test| FileAttribution { file, test })
            })
            .collect()
    }

    /// Line-level rows ordered by file, line, then test
    #[must_use]
    pub fn line_rows(&self) -> Vec<LineAttribution<'_>> {
        let mut rows = Vec::new();
        for (file, lines) in &self.lines {
            for (line, tests) in lines {
                rows.extend(tests.iter().map(|test| LineAttribution {
                    file,
                    line: *line,
                    test,
                }));
            }
        }
        rows
    }

    /// Render the file-level view as aligned CSV
    #[must_use]
    pub fn file_table(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .file_rows()
            .into_iter()
            .map(|row| vec![row.file.to_owned(), row.test.to_owned()])
            .collect();
        aligned_csv(&FILE_HEADERS, &rows)
    }

    /// Render the line-level view as aligned CSV
    #[must_use]
    pub fn line_table(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .line_rows()
            .into_iter()
            .map(|row| vec![row.file.to_owned(), row.line.to_string(), row.test.to_owned()])
            .collect();
        aligned_csv(&LINE_HEADERS, &rows)
    }
}

/// Comma-separated rows with every column padded to its widest cell
#[must_use]
pub fn aligned_csv(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", format_row(headers.iter().copied(), &widths));
    for row in rows {
        let _ = writeln!(out, "{}", format_row(row.iter().map(String::as_str), &widths));
    }
    out
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    padded.join(", ").trim_end().to_owned()
}
