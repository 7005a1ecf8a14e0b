//! Session configuration and frozen session data.

use super::event::{ArcEdge, LineNo};
use super::filter::FileFilter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// File path → set of line numbers
pub type LineMap = BTreeMap<String, BTreeSet<LineNo>>;

/// File path → set of arcs
pub type ArcMap = BTreeMap<String, BTreeSet<ArcEdge>>;

/// Identity of one trace run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new session ID
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// What a session records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// File filter
    #[serde(default)]
    pub filter: FileFilter,
    /// Record line tables of entered code objects
    #[serde(default)]
    pub collect_executable: bool,
    /// Record control-flow arcs
    #[serde(default)]
    pub collect_arcs: bool,
    /// Test identifier attached to the exported data
    #[serde(default)]
    pub test_id: Option<String>,
}

impl SessionConfig {
    /// Create a default configuration (all files, lines only)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set include patterns
    #[must_use]
    pub fn with_include<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = self.filter.with_include(patterns);
        self
    }

    /// Set exclude patterns
    #[must_use]
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = self.filter.with_exclude(patterns);
        self
    }

    /// Enable executable-line collection
    #[must_use]
    pub const fn with_executable(mut self, enabled: bool) -> Self {
        self.collect_executable = enabled;
        self
    }

    /// Enable arc collection
    #[must_use]
    pub const fn with_arcs(mut self, enabled: bool) -> Self {
        self.collect_arcs = enabled;
        self
    }

    /// Set the test identifier
    #[must_use]
    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = Some(test_id.into());
        self
    }
}

/// Data of one stopped trace run. Read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    executed: LineMap,
    executable: LineMap,
    arcs: ArcMap,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        config: SessionConfig,
        executed: LineMap,
        executable: LineMap,
        arcs: ArcMap,
    ) -> Self {
        Self {
            id,
            config,
            executed,
            executable,
            arcs,
        }
    }

    /// Session identifier
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Configuration the session ran with
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Test identifier, if one was supplied
    #[must_use]
    pub fn test_id(&self) -> Option<&str> {
        self.config.test_id.as_deref()
    }

    /// Executed lines per file
    #[must_use]
    pub const fn executed(&self) -> &LineMap {
        &self.executed
    }

    /// Executed lines of one file
    #[must_use]
    pub fn executed_lines(&self, file: &str) -> Option<&BTreeSet<LineNo>> {
        self.executed.get(file)
    }

    /// Line tables of entered code objects, when collection was enabled
    #[must_use]
    pub fn executable(&self) -> Option<&LineMap> {
        self.config.collect_executable.then_some(&self.executable)
    }

    /// Arcs per file, when collection was enabled
    #[must_use]
    pub fn arcs(&self) -> Option<&ArcMap> {
        self.config.collect_arcs.then_some(&self.arcs)
    }

    /// Arcs of one file
    #[must_use]
    pub fn arcs_for(&self, file: &str) -> Option<&BTreeSet<ArcEdge>> {
        self.arcs().and_then(|arcs| arcs.get(file))
    }

    /// Number of files with executed lines
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.executed.len()
    }

    /// Total number of executed lines across files
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.executed.values().map(BTreeSet::len).sum()
    }
}
