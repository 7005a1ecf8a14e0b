//! Canonical structured export format.
//!
//! ```json
//! {
//!   "_metadata": {"test_script": "test_app"},
//!   "executed": {"app.py": [1, 2, 5]},
//!   "executable": {"app.py": [1, 2, 3, 5]},
//!   "arcs": {"app.py": [[-1, 1], [1, 2], [2, 5], [5, -1]]}
//! }
//! ```
//!
//! `_metadata`, `executable` and `arcs` appear only when the session carried
//! a test identifier, collected line tables or collected arcs. Merged
//! datasets may also carry `covering_tests` (file → line → test ids).
//!
//! Device tracers may write entry and exit arcs as the negated first line
//! of the code object (`[-10, 11]`). Every negative endpoint is read as the
//! sentinel.

use crate::result::CoverageResult;
use crate::tracer::{ArcMap, LineMap, LineNo, Session, ARC_SENTINEL};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Line → identifiers of the tests that executed it
pub type LineTests = BTreeMap<LineNo, BTreeSet<String>>;

/// File → per-line test attribution
pub type CoveringTests = BTreeMap<String, LineTests>;

/// `_metadata` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Test identifier the session ran under
    pub test_script: String,
}

/// One exported session or merged dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageDocument {
    /// Test identifier block
    #[serde(rename = "_metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
    /// Executed lines per file
    #[serde(default)]
    pub executed: LineMap,
    /// Executable lines per file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<LineMap>,
    /// Arcs per file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arcs: Option<ArcMap>,
    /// Per-line test attribution of a merged dataset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covering_tests: Option<CoveringTests>,
}

impl CoverageDocument {
    /// Serialize a stopped (or snapshotted) session
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            metadata: session.test_id().map(|test| DocumentMetadata {
                test_script: test.to_owned(),
            }),
            executed: session.executed().clone(),
            executable: session.executable().cloned(),
            arcs: session.arcs().cloned(),
            covering_tests: None,
        }
    }

    /// Set the test identifier
    #[must_use]
    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.metadata = Some(DocumentMetadata {
            test_script: test_id.into(),
        });
        self
    }

    /// Test identifier from `_metadata`
    #[must_use]
    pub fn test_id(&self) -> Option<&str> {
        self.metadata.as_ref().map(|meta| meta.test_script.as_str())
    }

    /// Parse from JSON text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a coverage document.
    pub fn from_json(json: &str) -> CoverageResult<Self> {
        let mut document: Self = serde_json::from_str(json)?;
        document.normalize_sentinels();
        Ok(document)
    }

    /// Rewrite every negative arc endpoint to [`ARC_SENTINEL`]
    pub fn normalize_sentinels(&mut self) {
        for arcs in self.arcs.iter_mut().flat_map(BTreeMap::values_mut) {
            if arcs.iter().any(|&(from, to)| needs_rewrite(from) || needs_rewrite(to)) {
                *arcs = arcs
                    .iter()
                    .map(|&(from, to)| (to_sentinel(from), to_sentinel(to)))
                    .collect();
            }
        }
    }

    /// Compact JSON (used on the wire)
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CoverageResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Indented JSON (used for files)
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> CoverageResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of files with executed lines
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.executed.len()
    }

    /// Executed lines across files
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.executed.values().map(BTreeSet::len).sum()
    }

    /// Check that no line is 0 and that arcs use only lines or the sentinel
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending entry.
    pub fn validate(&self) -> Result<(), String> {
        let line_maps = std::iter::once(("executed", &self.executed))
            .chain(self.executable.iter().map(|map| ("executable", map)));
        for (section, map) in line_maps {
            for (file, lines) in map {
                if lines.contains(&0) {
                    return Err(format!("{section}[{file}] contains line 0"));
                }
            }
        }
        for (file, arcs) in self.arcs.iter().flatten() {
            let bad = arcs
                .iter()
                .find(|(from, to)| !valid_endpoint(*from) || !valid_endpoint(*to));
            if let Some((from, to)) = bad {
                return Err(format!("arcs[{file}] contains invalid arc [{from}, {to}]"));
            }
        }
        Ok(())
    }
}

const fn needs_rewrite(endpoint: i64) -> bool {
    endpoint < ARC_SENTINEL
}

const fn to_sentinel(endpoint: i64) -> i64 {
    if endpoint < 0 {
        ARC_SENTINEL
    } else {
        endpoint
    }
}

const fn valid_endpoint(endpoint: i64) -> bool {
    endpoint == ARC_SENTINEL || endpoint > 0
}
