//! Report pipeline: sessions in, rendered reports out.
//!
//! collect files → map paths → pick analyzer → analyze → merge → render

use crate::analysis::{
    analyze_files, select_analyzer, AnalysisFailure, AnalysisMethod, AnalyzerOptions,
    CrossCompiler, SourceFile,
};
use crate::merge::{merge_with, MergeInput, MergeOptions, MergeWarning, MergedDataset};
use crate::paths::{PathMapping, PathResolver};
use crate::report::{render_all, CoverageSummary, RenderOptions, RenderedReport, ReportFormat};
use crate::result::{CoverageError, CoverageResult};
use crate::settings::Settings;
use crate::tracer::LineMap;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

/// What to report and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    /// Executable-line method
    pub method: AnalysisMethod,
    /// Cross compiler for the bytecode method
    pub compiler: CrossCompiler,
    /// Path rewrites
    pub path_maps: Vec<PathMapping>,
    /// Root for relative source paths
    pub source_root: Option<PathBuf>,
    /// Formats to render
    pub formats: Vec<ReportFormat>,
    /// Directory for report files
    pub output_dir: PathBuf,
    /// Branch output
    pub branch: bool,
    /// Missing ranges in the text table
    pub show_missing: bool,
}

impl Default for ReportRequest {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ReportRequest {
    /// Create a request with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a request from project settings
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            method: settings.method,
            compiler: settings.compiler(),
            path_maps: settings.path_maps.clone(),
            source_root: settings.source_root.clone(),
            formats: settings.formats.clone(),
            output_dir: settings.output_dir.clone(),
            branch: settings.branch,
            show_missing: settings.show_missing,
        }
    }

    /// Set the analysis method
    #[must_use]
    pub const fn with_method(mut self, method: AnalysisMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the cross compiler
    #[must_use]
    pub fn with_compiler(mut self, compiler: CrossCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Append a path mapping
    #[must_use]
    pub fn with_path_map(mut self, mapping: PathMapping) -> Self {
        self.path_maps.push(mapping);
        self
    }

    /// Set the source root
    #[must_use]
    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Replace the formats
    #[must_use]
    pub fn with_formats(mut self, formats: impl IntoIterator<Item = ReportFormat>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    /// Set the output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Request branch output
    #[must_use]
    pub const fn with_branch(mut self, branch: bool) -> Self {
        self.branch = branch;
        self
    }

    /// List missing ranges in the text table
    #[must_use]
    pub const fn with_show_missing(mut self, show_missing: bool) -> Self {
        self.show_missing = show_missing;
        self
    }

    /// Resolver built from the mappings and source root
    #[must_use]
    pub fn resolver(&self) -> PathResolver {
        let resolver = PathResolver::new().with_mappings(self.path_maps.iter().cloned());
        match &self.source_root {
            Some(root) => resolver.with_source_root(root),
            None => resolver,
        }
    }
}

/// Everything one report run produced
#[derive(Debug)]
pub struct ReportOutcome {
    /// Merged data the reports were built from
    pub dataset: MergedDataset,
    /// Summary handed to the adapters
    pub summary: CoverageSummary,
    /// Rendered reports, in request order
    pub reports: Vec<RenderedReport>,
    /// Merge degradations
    pub warnings: Vec<MergeWarning>,
    /// Files the analyzer could not handle
    pub failures: Vec<AnalysisFailure>,
    /// Structural limitation of the chosen analyzer
    pub limitations: Option<&'static str>,
}

/// Files referenced by any session, with their host paths
#[must_use]
pub fn collect_files<S: MergeInput>(sessions: &[S], resolver: &PathResolver) -> Vec<SourceFile> {
    let names: BTreeSet<&String> = sessions
        .iter()
        .flat_map(|session| {
            session
                .executed()
                .keys()
                .chain(session.arcs().into_iter().flat_map(|arcs| arcs.keys()))
        })
        .collect();
    names
        .into_iter()
        .map(|name| SourceFile::new(name.clone(), resolver.resolve(name)))
        .collect()
}

/// Union of the device-collected line tables
#[must_use]
pub fn runtime_tables<S: MergeInput>(sessions: &[S]) -> LineMap {
    let mut tables = LineMap::new();
    for (file, lines) in sessions.iter().filter_map(MergeInput::executable).flatten() {
        tables
            .entry(file.clone())
            .or_default()
            .extend(lines.iter().copied());
    }
    tables
}

/// Analyze, merge and render
///
/// # Errors
///
/// Returns [`CoverageError::BranchWithoutAnalyzer`] when branch output is
/// requested and the chosen analyzer cannot run, and propagates rendering
/// and I/O failures. Per-file analysis failures are collected in the
/// outcome instead.
pub fn run_report<S: MergeInput>(
    sessions: &[S],
    request: &ReportRequest,
) -> CoverageResult<ReportOutcome> {
    let resolver = request.resolver();
    let files = collect_files(sessions, &resolver);

    let options = AnalyzerOptions::new()
        .with_runtime_tables(runtime_tables(sessions))
        .with_compiler(request.compiler.clone());
    let analyzer = select_analyzer(request.method, options);

    if request.branch && !analyzer.is_available() {
        return Err(CoverageError::BranchWithoutAnalyzer {
            method: request.method.to_string(),
        });
    }
    let limitations = analyzer.limitations();
    if let Some(limitations) = limitations {
        info!(method = %analyzer.method(), "{limitations}");
    }

    let analysis = analyze_files(analyzer.as_ref(), &files);
    let outcome = merge_with(
        sessions,
        Some(&analysis.executable),
        MergeOptions::new().with_branch(request.branch),
    );

    let mut dataset = outcome.dataset;
    if !request.branch {
        dataset.strip_branch_data();
    }

    let summary = CoverageSummary::from_dataset(&dataset, &resolver);
    if summary.files.is_empty() {
        warn!("no files to report on");
    }
    let reports = render_all(
        &summary,
        &request.formats,
        &request.output_dir,
        RenderOptions {
            show_missing: request.show_missing,
        },
    )?;

    info!(
        files = summary.files.len(),
        skipped = summary.skipped.len(),
        percent = summary.percent(),
        "coverage report complete"
    );
    Ok(ReportOutcome {
        dataset,
        summary,
        reports,
        warnings: outcome.warnings,
        failures: analysis.failures,
        limitations,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::export::CoverageDocument;
    use std::fs;

    const APP: &str = "\
def used():
    return 1

def unused():
    return 2

used()
";

    fn session(test: &str, lines: &[u32]) -> CoverageDocument {
        let mut document = CoverageDocument::default().with_test_id(test);
        document
            .executed
            .insert("/flash/app.py".into(), lines.iter().copied().collect());
        document
    }

    mod request_tests {
        use super::*;

        #[test]
        fn test_request_from_settings() {
            let settings = Settings::from_yaml("method: ast\nbranch: true\npath_maps: ['/flash/=src/']\n").unwrap();
            let request = ReportRequest::from_settings(&settings);
            assert_eq!(request.method, AnalysisMethod::SourceParse);
            assert!(request.branch);
            assert_eq!(
                request.resolver().resolve("/flash/a.py"),
                PathBuf::from("src/a.py")
            );
        }

        #[test]
        fn test_collect_files_includes_arc_only_files() {
            let mut document = session("t", &[1]);
            let mut arcs = crate::tracer::ArcMap::new();
            arcs.insert("/flash/other.py".into(), BTreeSet::from([(-1, 1)]));
            document.arcs = Some(arcs);

            let resolver = PathResolver::from_specs(&["/flash/=host/"]).unwrap();
            let files = collect_files(&[document], &resolver);
            let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["/flash/app.py", "/flash/other.py"]);
            assert_eq!(files[0].path, PathBuf::from("host/app.py"));
        }

        #[test]
        fn test_runtime_tables_union() {
            let mut a = session("a", &[1]);
            let mut tables = LineMap::new();
            tables.insert("/flash/app.py".into(), BTreeSet::from([1, 2]));
            a.executable = Some(tables);
            let mut b = session("b", &[1]);
            let mut tables = LineMap::new();
            tables.insert("/flash/app.py".into(), BTreeSet::from([7]));
            b.executable = Some(tables);

            let union = runtime_tables(&[a, b]);
            assert_eq!(union["/flash/app.py"], BTreeSet::from([1, 2, 7]));
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn test_source_parse_report_end_to_end() {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("app.py"), APP).unwrap();
            let out = dir.path().join("reports");

            let request = ReportRequest::new()
                .with_method(AnalysisMethod::SourceParse)
                .with_path_map(PathMapping::new("/flash/", ""))
                .with_source_root(dir.path())
                .with_formats([ReportFormat::Text, ReportFormat::Lcov])
                .with_output_dir(&out);
            let outcome = run_report(&[session("test_a", &[1, 2, 4, 7])], &request).unwrap();

            assert!(outcome.failures.is_empty());
            assert!(outcome.limitations.is_none());
            let file = &outcome.summary.files[0];
            assert_eq!(file.statements, BTreeSet::from([1, 2, 4, 5, 7]));
            assert_eq!(file.missing(), BTreeSet::from([5]));
            assert!(outcome.reports[0].content.contains("/flash/app.py"));
            assert!(out.join("coverage.lcov").exists());
        }

        #[test]
        fn test_missing_source_is_per_file_failure() {
            let dir = tempfile::tempdir().unwrap();
            let request = ReportRequest::new()
                .with_method(AnalysisMethod::SourceParse)
                .with_output_dir(dir.path());
            let outcome = run_report(&[session("t", &[1])], &request).unwrap();

            assert_eq!(outcome.failures.len(), 1);
            assert_eq!(outcome.summary.skipped.len(), 1);
            assert!(outcome.summary.files.is_empty());
        }

        #[test]
        fn test_branch_without_analyzer_is_config_error() {
            let request = ReportRequest::new()
                .with_method(AnalysisMethod::RuntimeIntrospection)
                .with_branch(true);
            let err = run_report(&[session("t", &[1])], &request).unwrap_err();
            assert!(matches!(err, CoverageError::BranchWithoutAnalyzer { .. }));
            assert!(err.is_configuration());
        }

        #[test]
        fn test_branch_without_arcs_degrades() {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("app.py"), APP).unwrap();
            let request = ReportRequest::new()
                .with_method(AnalysisMethod::SourceParse)
                .with_path_map(PathMapping::new("/flash/", ""))
                .with_source_root(dir.path())
                .with_output_dir(dir.path())
                .with_branch(true);

            let outcome = run_report(&[session("t", &[1])], &request).unwrap();
            assert!(outcome.warnings.contains(&MergeWarning::NoBranchData));
            assert!(!outcome.summary.branch);
        }

        #[test]
        fn test_introspection_uses_device_tables() {
            let dir = tempfile::tempdir().unwrap();
            let mut document = session("t", &[1, 2]);
            let mut tables = LineMap::new();
            tables.insert("/flash/app.py".into(), BTreeSet::from([1, 2, 7]));
            document.executable = Some(tables);

            let request = ReportRequest::new()
                .with_method(AnalysisMethod::RuntimeIntrospection)
                .with_formats([ReportFormat::Json])
                .with_output_dir(dir.path());
            let outcome = run_report(&[document], &request).unwrap();

            assert_eq!(outcome.summary.files[0].missing(), BTreeSet::from([7]));
            assert!(dir.path().join("coverage.json").exists());
            assert!(outcome.limitations.unwrap().contains("uncalled functions are absent"));
        }
    }
}
