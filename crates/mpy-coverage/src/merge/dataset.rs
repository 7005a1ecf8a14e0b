//! Merged coverage: per-file records plus dataset-level flags.

use crate::export::{CoverageDocument, CoveringTests, LineTests};
use crate::tracer::{ArcEdge, ArcMap, LineMap, LineNo};
use std::collections::{BTreeMap, BTreeSet};

/// Coverage of one file across every merged session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageRecord {
    /// Union of executed lines
    pub executed: BTreeSet<LineNo>,
    /// Executable lines from the analyzer, when known
    pub executable: Option<BTreeSet<LineNo>>,
    /// Union of arcs, when any session recorded arcs
    pub arcs: Option<BTreeSet<ArcEdge>>,
    /// Line → tests that executed it
    pub covering_tests: LineTests,
}

impl CoverageRecord {
    /// Executed lines the executable set does not contain
    #[must_use]
    pub fn unexpected_lines(&self) -> BTreeSet<LineNo> {
        self.executable.as_ref().map_or_else(BTreeSet::new, |executable| {
            self.executed.difference(executable).copied().collect()
        })
    }

    /// Executable lines never executed
    #[must_use]
    pub fn missing_lines(&self) -> BTreeSet<LineNo> {
        self.executable.as_ref().map_or_else(BTreeSet::new, |executable| {
            executable.difference(&self.executed).copied().collect()
        })
    }

    /// Tests that executed any line of the file
    #[must_use]
    pub fn tests(&self) -> BTreeSet<&str> {
        self.covering_tests
            .values()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Union `other` into `self`
    pub fn absorb(&mut self, other: &Self) {
        self.executed.extend(other.executed.iter().copied());
        union_option(&mut self.executable, other.executable.as_ref());
        union_option(&mut self.arcs, other.arcs.as_ref());
        for (line, tests) in &other.covering_tests {
            self.covering_tests
                .entry(*line)
                .or_default()
                .extend(tests.iter().cloned());
        }
    }
}

fn union_option<T: Ord + Clone>(into: &mut Option<BTreeSet<T>>, from: Option<&BTreeSet<T>>) {
    if let Some(from) = from {
        into.get_or_insert_with(BTreeSet::new)
            .extend(from.iter().cloned());
    }
}

/// File → record, plus whether branch data exists anywhere
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedDataset {
    /// Records keyed by recorded file name
    pub records: BTreeMap<String, CoverageRecord>,
    /// Whether any input carried arcs
    pub has_branch_data: bool,
}

impl MergedDataset {
    /// Create an empty dataset
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record of one file
    #[must_use]
    pub fn record(&self, file: &str) -> Option<&CoverageRecord> {
        self.records.get(file)
    }

    /// Files in lexicographic order
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Number of files
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no files
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Union of two datasets
    #[must_use]
    pub fn combine(mut self, other: &Self) -> Self {
        for (file, record) in &other.records {
            self.records.entry(file.clone()).or_default().absorb(record);
        }
        self.has_branch_data |= other.has_branch_data;
        self
    }

    /// Export form. Attribution travels in `covering_tests`.
    #[must_use]
    pub fn to_document(&self) -> CoverageDocument {
        let executed: LineMap = self
            .records
            .iter()
            .map(|(file, record)| (file.clone(), record.executed.clone()))
            .collect();
        let executable: LineMap = self
            .records
            .iter()
            .filter_map(|(file, record)| Some((file.clone(), record.executable.clone()?)))
            .collect();
        let arcs: ArcMap = self
            .records
            .iter()
            .filter_map(|(file, record)| Some((file.clone(), record.arcs.clone()?)))
            .collect();
        let covering_tests: CoveringTests = self
            .records
            .iter()
            .filter(|(_, record)| !record.covering_tests.is_empty())
            .map(|(file, record)| (file.clone(), record.covering_tests.clone()))
            .collect();

        CoverageDocument {
            metadata: None,
            executed,
            executable: (!executable.is_empty()).then_some(executable),
            arcs: self.has_branch_data.then_some(arcs),
            covering_tests: (!covering_tests.is_empty()).then_some(covering_tests),
        }
    }

    /// Rebuild a dataset from its export form
    ///
    /// A single-session document with `_metadata` attributes every executed
    /// line to its test.
    #[must_use]
    pub fn from_document(document: &CoverageDocument) -> Self {
        let mut records: BTreeMap<String, CoverageRecord> = BTreeMap::new();
        for (file, lines) in &document.executed {
            let record = records.entry(file.clone()).or_default();
            record.executed.clone_from(lines);
            if let Some(test) = document.test_id() {
                for line in lines {
                    record
                        .covering_tests
                        .entry(*line)
                        .or_default()
                        .insert(test.to_owned());
                }
            }
        }
        for (file, lines) in document.executable.iter().flatten() {
            records.entry(file.clone()).or_default().executable = Some(lines.clone());
        }
        for (file, arcs) in document.arcs.iter().flatten() {
            records.entry(file.clone()).or_default().arcs = Some(arcs.clone());
        }
        for (file, tests) in document.covering_tests.iter().flatten() {
            let record = records.entry(file.clone()).or_default();
            for (line, ids) in tests {
                record
                    .covering_tests
                    .entry(*line)
                    .or_default()
                    .extend(ids.iter().cloned());
            }
        }
        Self {
            records,
            has_branch_data: document.arcs.is_some(),
        }
    }

    /// Drop arcs, keeping line data only
    pub fn strip_branch_data(&mut self) {
        for record in self.records.values_mut() {
            record.arcs = None;
        }
        self.has_branch_data = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(executed: &[LineNo], executable: Option<&[LineNo]>) -> CoverageRecord {
        CoverageRecord {
            executed: executed.iter().copied().collect(),
            executable: executable.map(|lines| lines.iter().copied().collect()),
            ..CoverageRecord::default()
        }
    }

    #[test]
    fn test_missing_and_unexpected_lines() {
        let record = record(&[1, 2, 9], Some(&[1, 2, 3, 4]));
        assert_eq!(record.missing_lines(), BTreeSet::from([3, 4]));
        assert_eq!(record.unexpected_lines(), BTreeSet::from([9]));

        let unknown = CoverageRecord {
            executed: BTreeSet::from([1]),
            ..CoverageRecord::default()
        };
        assert!(unknown.missing_lines().is_empty());
        assert!(unknown.unexpected_lines().is_empty());
    }

    #[test]
    fn test_document_round_trip_keeps_attribution() {
        let mut dataset = MergedDataset::new();
        let mut rec = record(&[1, 5], Some(&[1, 5, 7]));
        rec.arcs = Some(BTreeSet::from([(-1, 1), (1, 5), (5, -1)]));
        rec.covering_tests
            .insert(1, BTreeSet::from(["test_a".to_string(), "test_b".to_string()]));
        rec.covering_tests
            .insert(5, BTreeSet::from(["test_a".to_string()]));
        dataset.records.insert("myapp.py".into(), rec);
        dataset.has_branch_data = true;

        let back = MergedDataset::from_document(&dataset.to_document());
        assert_eq!(back, dataset);
    }

    #[test]
    fn test_single_session_document_attributes_lines() {
        let mut document = CoverageDocument::default().with_test_id("test_io");
        document
            .executed
            .insert("io.py".into(), BTreeSet::from([3, 4]));
        let dataset = MergedDataset::from_document(&document);

        let record = dataset.record("io.py").unwrap();
        assert_eq!(record.tests(), BTreeSet::from(["test_io"]));
        assert!(!dataset.has_branch_data);
    }

    #[test]
    fn test_combine_unions_optional_sets() {
        let mut left = MergedDataset::new();
        left.records.insert("a.py".into(), record(&[1], None));
        let mut right = MergedDataset::new();
        right.records.insert("a.py".into(), record(&[2], Some(&[1, 2])));
        right.has_branch_data = true;

        let combined = left.combine(&right);
        let a = combined.record("a.py").unwrap();
        assert_eq!(a.executed, BTreeSet::from([1, 2]));
        assert_eq!(a.executable, Some(BTreeSet::from([1, 2])));
        assert!(combined.has_branch_data);
    }
}
