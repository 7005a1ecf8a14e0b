//! Analyze command handler

use crate::commands::AnalyzeArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::StatusReporter;
use mpy_coverage::export::load_artifacts;
use mpy_coverage::pipeline::runtime_tables;
use mpy_coverage::{
    analyze_files, select_analyzer, AnalysisMethod, AnalyzerOptions, CrossCompiler, SourceFile,
};
use std::io::Write;
use std::path::PathBuf;

fn is_pattern(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

/// Expand glob patterns; plain paths are kept even when they do not exist
/// so the analyzer can report them
///
/// # Errors
///
/// Returns an error for malformed patterns and patterns matching nothing.
pub fn expand_inputs(args: &[String]) -> CliResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for arg in args {
        if !is_pattern(arg) {
            paths.push(PathBuf::from(arg));
            continue;
        }
        let matches = glob::glob(arg)
            .map_err(|e| CliError::invalid_argument(format!("bad pattern `{arg}`: {e}")))?;
        let before = paths.len();
        for entry in matches {
            let path = entry.map_err(|e| CliError::invalid_argument(e.to_string()))?;
            if path.is_file() {
                paths.push(path);
            }
        }
        if paths.len() == before {
            return Err(CliError::invalid_argument(format!(
                "no files match `{arg}`"
            )));
        }
    }
    Ok(paths)
}

/// Execute the analyze command
pub fn execute_analyze(
    config: &CliConfig,
    args: &AnalyzeArgs,
    out: &mut impl Write,
) -> CliResult<()> {
    let status = StatusReporter::from_config(config);
    let method = args
        .method
        .map_or(config.settings.method, AnalysisMethod::from);
    let compiler = args
        .mpy_cross
        .as_ref()
        .map_or_else(|| config.settings.compiler(), CrossCompiler::new);

    let mut options = AnalyzerOptions::new().with_compiler(compiler);
    if method == AnalysisMethod::RuntimeIntrospection {
        let set = load_artifacts(config.data_dir())?;
        options = options.with_runtime_tables(runtime_tables(&set.artifacts));
    }
    let analyzer = select_analyzer(method, options);

    let files: Vec<SourceFile> = expand_inputs(&args.files)?
        .iter()
        .map(SourceFile::local)
        .collect();
    let report = analyze_files(analyzer.as_ref(), &files);

    let failed = report.failures.len();
    for failure in &report.failures {
        status.failure(&format!("{}: {}", failure.file, failure.error));
    }

    let executable = report.executable.into_inner();
    if args.json {
        serde_json::to_writer_pretty(&mut *out, &executable)?;
        writeln!(out)?;
    } else {
        for (file, lines) in &executable {
            let lines: Vec<String> = lines.iter().map(ToString::to_string).collect();
            writeln!(out, "{file}: {}", lines.join(", "))?;
        }
    }

    if failed > 0 {
        return Err(CliError::AnalysisFailed { count: failed });
    }
    Ok(())
}
