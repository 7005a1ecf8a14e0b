//! Merge engine
//!
//! Combines exported sessions and one executable-line analysis into a
//! [`MergedDataset`]. For every file any session mentions, executed lines
//! and arcs are unioned, the analyzer's set is attached as is, and each
//! executed line remembers which tagged sessions ran it. Merging is
//! commutative and associative.

mod dataset;

pub use dataset::{CoverageRecord, MergedDataset};

use crate::analysis::ExecutableSet;
use crate::export::{CoverageDocument, CoveringTests, SessionArtifact};
use crate::tracer::{ArcMap, LineMap, LineNo, Session};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

/// Read-only view of one merge input
pub trait MergeInput {
    /// Executed lines per file
    fn executed(&self) -> &LineMap;

    /// Arcs per file, if recorded
    fn arcs(&self) -> Option<&ArcMap>;

    /// Test the input ran under
    fn test_id(&self) -> Option<&str>;

    /// Line tables collected on the device, if any
    fn executable(&self) -> Option<&LineMap> {
        None
    }

    /// Attribution already carried by the input (merged exports)
    fn covering_tests(&self) -> Option<&CoveringTests> {
        None
    }
}

impl MergeInput for Session {
    fn executed(&self) -> &LineMap {
        Session::executed(self)
    }

    fn arcs(&self) -> Option<&ArcMap> {
        Session::arcs(self)
    }

    fn test_id(&self) -> Option<&str> {
        Session::test_id(self)
    }

    fn executable(&self) -> Option<&LineMap> {
        Session::executable(self)
    }
}

impl MergeInput for CoverageDocument {
    fn executed(&self) -> &LineMap {
        &self.executed
    }

    fn arcs(&self) -> Option<&ArcMap> {
        self.arcs.as_ref()
    }

    fn test_id(&self) -> Option<&str> {
        CoverageDocument::test_id(self)
    }

    fn executable(&self) -> Option<&LineMap> {
        self.executable.as_ref()
    }

    fn covering_tests(&self) -> Option<&CoveringTests> {
        self.covering_tests.as_ref()
    }
}

impl MergeInput for SessionArtifact {
    fn executed(&self) -> &LineMap {
        &self.document.executed
    }

    fn arcs(&self) -> Option<&ArcMap> {
        self.document.arcs.as_ref()
    }

    fn test_id(&self) -> Option<&str> {
        // Merged exports already carry attribution; only single sessions
        // fall back to the file name.
        if self.document.covering_tests.is_some() && self.document.metadata.is_none() {
            return None;
        }
        Some(&self.test_id)
    }

    fn executable(&self) -> Option<&LineMap> {
        self.document.executable.as_ref()
    }

    fn covering_tests(&self) -> Option<&CoveringTests> {
        self.document.covering_tests.as_ref()
    }
}

impl<T: MergeInput + ?Sized> MergeInput for &T {
    fn executed(&self) -> &LineMap {
        (**self).executed()
    }

    fn arcs(&self) -> Option<&ArcMap> {
        (**self).arcs()
    }

    fn test_id(&self) -> Option<&str> {
        (**self).test_id()
    }

    fn executable(&self) -> Option<&LineMap> {
        (**self).executable()
    }

    fn covering_tests(&self) -> Option<&CoveringTests> {
        (**self).covering_tests()
    }
}

/// Merge policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Branch output requested
    pub branch: bool,
}

impl MergeOptions {
    /// Create default options (line coverage)
    #[must_use]
    pub const fn new() -> Self {
        Self { branch: false }
    }

    /// Request branch output
    #[must_use]
    pub const fn with_branch(mut self, branch: bool) -> Self {
        self.branch = branch;
        self
    }
}

/// Degradation noticed while merging. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeWarning {
    /// Branch output requested but no input carried arcs
    NoBranchData,
    /// Lines executed on the device that the analyzer did not list
    ExecutableMismatch {
        /// File name
        file: String,
        /// Executed lines outside the executable set
        lines: BTreeSet<LineNo>,
    },
    /// The analyzer produced nothing for a file that executed
    NoExecutableData {
        /// File name
        file: String,
    },
}

impl fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBranchData => {
                f.write_str("branch coverage requested but no session recorded arcs; reporting line coverage only")
            }
            Self::ExecutableMismatch { file, lines } => {
                let lines: Vec<String> = lines.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "{file}: executed lines {} are not in the executable set",
                    lines.join(", ")
                )
            }
            Self::NoExecutableData { file } => {
                write!(f, "{file}: no executable lines available; file skipped")
            }
        }
    }
}

/// Merged dataset plus the degradations noticed on the way
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Result
    pub dataset: MergedDataset,
    /// Warnings, in file order after any dataset-level warning
    pub warnings: Vec<MergeWarning>,
}

impl MergeOutcome {
    /// Whether the dataset was degraded to line coverage
    #[must_use]
    pub fn branch_degraded(&self) -> bool {
        self.warnings.contains(&MergeWarning::NoBranchData)
    }
}

/// Merge sessions and attach `executable` verbatim
#[must_use]
pub fn merge<S: MergeInput>(sessions: &[S], executable: Option<&ExecutableSet>) -> MergedDataset {
    let mut dataset = MergedDataset::new();

    for session in sessions {
        let test_id = session.test_id();
        for (file, lines) in session.executed() {
            let record = dataset.records.entry(file.clone()).or_default();
            record.executed.extend(lines.iter().copied());
            if let Some(test_id) = test_id {
                for line in lines {
                    record
                        .covering_tests
                        .entry(*line)
                        .or_default()
                        .insert(test_id.to_owned());
                }
            }
        }
        if let Some(arcs) = session.arcs() {
            dataset.has_branch_data = true;
            for (file, edges) in arcs {
                let record = dataset.records.entry(file.clone()).or_default();
                record
                    .arcs
                    .get_or_insert_with(BTreeSet::new)
                    .extend(edges.iter().copied());
            }
        }
        for (file, tests) in session.covering_tests().into_iter().flatten() {
            let record = dataset.records.entry(file.clone()).or_default();
            for (line, ids) in tests {
                record
                    .covering_tests
                    .entry(*line)
                    .or_default()
                    .extend(ids.iter().cloned());
            }
        }
    }

    if let Some(executable) = executable {
        for (file, record) in &mut dataset.records {
            record.executable = executable.get(file).cloned();
        }
    }
    dataset
}

/// [`merge`] with branch policy and consistency checks
#[must_use]
pub fn merge_with<S: MergeInput>(
    sessions: &[S],
    executable: Option<&ExecutableSet>,
    options: MergeOptions,
) -> MergeOutcome {
    let dataset = merge(sessions, executable);
    let mut warnings = Vec::new();

    if options.branch && !dataset.has_branch_data {
        warn!("branch coverage requested but no session recorded arcs; falling back to line coverage");
        warnings.push(MergeWarning::NoBranchData);
    }

    if executable.is_some() {
        for (file, record) in &dataset.records {
            if record.executable.as_ref().map_or(true, BTreeSet::is_empty) {
                warnings.push(MergeWarning::NoExecutableData { file: file.clone() });
                continue;
            }
            let unexpected = record.unexpected_lines();
            if !unexpected.is_empty() {
                warn!(
                    file = %file,
                    lines = unexpected.len(),
                    "analyzer disagrees with executed lines"
                );
                warnings.push(MergeWarning::ExecutableMismatch {
                    file: file.clone(),
                    lines: unexpected,
                });
            }
        }
    }

    info!(
        sessions = sessions.len(),
        files = dataset.len(),
        branch = dataset.has_branch_data,
        warnings = warnings.len(),
        "merged coverage sessions"
    );
    MergeOutcome { dataset, warnings }
}

/// Union of two merged datasets
#[must_use]
pub fn merge_datasets(left: &MergedDataset, right: &MergedDataset) -> MergedDataset {
    left.clone().combine(right)
}
