//! mpy-coverage: line and branch coverage for MicroPython
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────── device ────────────────┐   ┌──────────────────── host ─────────────────────┐
//! │                                        │   │                                               │
//! │  TraceRuntime ──events──► Recorder     │   │  SessionArtifact ─┐                           │
//! │       ▲                     │          │   │                   ├──► merge ──► MergedDataset│
//! │       │ hook            Session        │   │  Analyzer ────────┘        │                  │
//! │    Tracer ◄── start/stop    │          │   │  (co_lines | ast | mpy)    ├──► TestAttribution│
//! │                        export_json ────┼──►│                            └──► ReportAdapter  │
//! │                   (file | framed stream)   │                                 (text/json/  │
//! └────────────────────────────────────────┘   │                                  lcov/xml)    │
//!                                              └───────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use mpy_coverage::{merge, ReplayRuntime, SessionConfig, Tracer};
//!
//! let mut runtime = ReplayRuntime::new();
//! let main = runtime.define("main.py", "<module>", 1, &[1, 2, 3]);
//!
//! let mut tracer = Tracer::new(runtime);
//! let config = SessionConfig::new().with_test_id("test_main");
//! let (ran, session) = tracer
//!     .scoped(config, |rt| rt.call(main, &[1, 3]))
//!     .unwrap();
//! ran.unwrap();
//!
//! let dataset = merge(&[session], None);
//! assert_eq!(dataset.records["main.py"].executed.len(), 2);
//! ```

#![warn(missing_docs)]

pub mod analysis;
pub mod attribution;
pub mod export;
pub mod merge;
pub mod paths;
pub mod pipeline;
pub mod report;
mod result;
pub mod settings;
pub mod tracer;

pub use analysis::{
    analyze, analyze_files, select_analyzer, AnalysisError, AnalysisMethod, AnalysisReport,
    AnalyzerOptions, CrossCompiler, ExecutableLineAnalyzer, ExecutableSet, SourceFile,
};
pub use attribution::TestAttribution;
pub use export::{
    export_json, CoverageDocument, Destination, ExportOutcome, SessionArtifact, TransportError,
    DEFAULT_DATA_DIR,
};
pub use merge::{
    merge, merge_datasets, merge_with, CoverageRecord, MergeInput, MergeOptions, MergeOutcome,
    MergeWarning, MergedDataset,
};
pub use paths::{PathMapping, PathResolver};
pub use pipeline::{run_report, ReportOutcome, ReportRequest};
pub use report::{CoverageSummary, ReportAdapter, ReportFormat, REPORT_ADAPTER_VERSION};
pub use result::{CoverageError, CoverageResult};
pub use settings::{Settings, SETTINGS_FILE};
pub use tracer::{
    ArcEdge, LineNo, ReplayRuntime, Session, SessionConfig, SessionHandle, TraceRuntime, Tracer,
    ARC_SENTINEL,
};
