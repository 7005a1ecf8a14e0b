//! File filtering for the recorder.

use serde::{Deserialize, Serialize};

/// Path fragment identifying the tracer's own module on the device.
///
/// Files containing it are never traced, whatever the filter says.
pub const TRACER_MODULE: &str = "mpy_coverage";

/// Substring include/exclude filter over file paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    /// A file must contain at least one of these (empty: no include filter)
    #[serde(default)]
    include: Vec<String>,
    /// A file containing any of these is skipped
    #[serde(default)]
    exclude: Vec<String>,
}

impl FileFilter {
    /// Create a filter that admits every file except the tracer itself
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
        self.include = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set exclude patterns
    #[must_use]
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Include patterns
    #[must_use]
    pub fn include(&self) -> &[String] {
        &self.include
    }

    /// Exclude patterns
    #[must_use]
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Decide whether events from `filename` are recorded
    #[must_use]
    pub fn should_trace(&self, filename: &str) -> bool {
        if filename.contains(TRACER_MODULE) {
            return false;
        }
        if !self.include.is_empty()
            && !self
                .include
                .iter()
                .any(|pattern| filename.contains(pattern.as_str()))
        {
            return false;
        }
        !self
            .exclude
            .iter()
            .any(|pattern| filename.contains(pattern.as_str()))
    }
}
