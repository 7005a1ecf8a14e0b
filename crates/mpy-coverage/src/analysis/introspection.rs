//! Runtime-introspection analyzer: line tables recorded while tracing.

use super::{AnalysisError, AnalysisMethod, ExecutableLineAnalyzer, SourceFile};
use crate::tracer::{LineMap, LineNo};
use std::collections::BTreeSet;

/// Serves the line tables that the recorder collected on the device.
///
/// Only code objects that were entered have tables, so functions that never
/// ran are missing from the result.
#[derive(Debug, Clone, Default)]
pub struct RuntimeIntrospectionAnalyzer {
    tables: LineMap,
}

impl RuntimeIntrospectionAnalyzer {
    /// Create from recorded `executable` data
    #[must_use]
    pub const fn new(tables: LineMap) -> Self {
        Self { tables }
    }
}

impl ExecutableLineAnalyzer for RuntimeIntrospectionAnalyzer {
    fn method(&self) -> AnalysisMethod {
        AnalysisMethod::RuntimeIntrospection
    }

    fn analyze(&self, file: &SourceFile) -> Result<BTreeSet<LineNo>, AnalysisError> {
        Ok(self.tables.get(&file.name).cloned().unwrap_or_default())
    }

    fn is_available(&self) -> bool {
        !self.tables.is_empty()
    }

    fn limitations(&self) -> Option<&'static str> {
        Some("uncalled functions are absent: only code objects entered while tracing have line tables")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_serves_recorded_tables_without_reading_source() {
        let mut tables = LineMap::new();
        tables.insert("app.py".into(), BTreeSet::from([1, 2, 4]));
        let analyzer = RuntimeIntrospectionAnalyzer::new(tables);

        let file = SourceFile::new("app.py", "/does/not/exist.py");
        assert_eq!(analyzer.analyze(&file).unwrap(), BTreeSet::from([1, 2, 4]));
        assert!(analyzer.is_available());
    }

    #[test]
    fn test_no_tables_means_unavailable() {
        let analyzer = RuntimeIntrospectionAnalyzer::default();
        assert!(!analyzer.is_available());
        assert!(analyzer
            .analyze(&SourceFile::local("app.py"))
            .unwrap()
            .is_empty());
    }
}
