//! Trace and merge demo
//!
//! Replays two test runs of a small application, streams each session
//! through the framed console transport, merges them with the line tables
//! the device collected, and prints the attribution map and a text report.
//!
//! # Running
//!
//! ```bash
//! cargo run --example trace_and_merge -p mpy-coverage
//! ```

#![allow(clippy::uninlined_format_args)]

use mpy_coverage::analysis::RuntimeIntrospectionAnalyzer;
use mpy_coverage::export::parse_capture;
use mpy_coverage::report::{adapter_for, RenderOptions};
use mpy_coverage::{
    analyze_files, merge_with, CoverageDocument, CoverageResult, CoverageSummary, Destination,
    ExportOutcome, MergeOptions, PathResolver, ReplayRuntime, SessionConfig, SourceFile,
    TestAttribution, Tracer,
};

/// One test run on a fresh runtime; returns what a host would capture
fn run_test(test: &str, branch_taken: bool) -> CoverageResult<String> {
    let mut runtime = ReplayRuntime::new();
    let module = runtime.define("myapp.py", "<module>", 1, &[1, 4, 8]);
    let check = runtime.define("myapp.py", "check", 1, &[2, 3, 5, 6]);

    let mut tracer = Tracer::new(runtime);
    let config = SessionConfig::new()
        .with_test_id(test)
        .with_executable(true)
        .with_arcs(true);
    let handle = tracer.start(config)?;

    let rt = tracer.runtime_mut();
    rt.enter(module)?;
    rt.line(1)?;
    rt.line(8)?;
    if branch_taken {
        rt.call(check, &[2, 3])?;
    } else {
        rt.call(check, &[2, 5, 6])?;
    }
    rt.leave()?;

    tracer.stop(handle)?;
    let ExportOutcome::Framed(text) = tracer.export_json(&Destination::Stream)? else {
        return Ok(String::new());
    };
    Ok(format!("MicroPython v1.22 on unix\n{text}>>> \n"))
}

fn main() -> CoverageResult<()> {
    println!("=== Capturing sessions ===");
    let mut sessions: Vec<CoverageDocument> = Vec::new();
    for (test, taken) in [("test_positive", true), ("test_negative", false)] {
        let capture = run_test(test, taken)?;
        let document = parse_capture(&capture)?;
        println!(
            "  {test}: {} file(s), {} line(s)",
            document.file_count(),
            document.line_count()
        );
        sessions.push(document);
    }

    println!("\n=== Executable lines (co_lines) ===");
    let mut tables = mpy_coverage::tracer::LineMap::new();
    for session in &sessions {
        for (file, lines) in session.executable.iter().flatten() {
            tables.entry(file.clone()).or_default().extend(lines);
        }
    }
    let analyzer = RuntimeIntrospectionAnalyzer::new(tables);
    let analysis = analyze_files(&analyzer, &[SourceFile::new("myapp.py", "myapp.py")]);
    for file in analysis.executable.files() {
        println!("  {file}: {:?}", analysis.executable.get(file));
    }

    println!("\n=== Merge ===");
    let outcome = merge_with(
        &sessions,
        Some(&analysis.executable),
        MergeOptions::new().with_branch(true),
    );
    for warning in &outcome.warnings {
        println!("  warning: {warning}");
    }
    let record = &outcome.dataset.records["myapp.py"];
    println!("  executed: {:?}", record.executed);
    println!("  arcs:     {:?}", record.arcs);

    println!("\n=== Test attribution ===");
    print!("{}", TestAttribution::from_dataset(&outcome.dataset).line_table());

    println!("\n=== Report ===");
    let summary = CoverageSummary::from_dataset(&outcome.dataset, &PathResolver::new());
    let text = adapter_for(
        mpy_coverage::ReportFormat::Text,
        RenderOptions { show_missing: true },
    )
    .render(&summary)?;
    print!("{text}");
    Ok(())
}
