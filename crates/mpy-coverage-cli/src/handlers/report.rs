//! Report command handler

use super::load_data;
use crate::commands::ReportArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::StatusReporter;
use mpy_coverage::{
    run_report, AnalysisMethod, CrossCompiler, ReportFormat, ReportOutcome, ReportRequest,
};
use std::io::Write;

/// Settings with the command-line overrides applied
///
/// Mappings given on the command line are tried before the ones from the
/// settings file.
#[must_use]
pub fn build_request(config: &CliConfig, args: &ReportArgs) -> ReportRequest {
    let mut request = ReportRequest::from_settings(&config.settings);
    if let Some(method) = args.method {
        request.method = AnalysisMethod::from(method);
    }
    if let Some(program) = &args.mpy_cross {
        request.compiler = CrossCompiler::new(program);
    }
    if let Some(root) = &args.source_root {
        request.source_root = Some(root.clone());
    }
    if !args.path_maps.is_empty() {
        let mut maps = args.path_maps.clone();
        maps.append(&mut request.path_maps);
        request.path_maps = maps;
    }
    if !args.formats.is_empty() {
        request.formats = args.formats.iter().copied().map(ReportFormat::from).collect();
    }
    if let Some(dir) = &args.output_dir {
        request.output_dir = dir.clone();
    }
    request.branch |= args.branch;
    request.show_missing |= args.show_missing;
    request
}

/// Warnings for the user: analyzer limitations, per-file failures and
/// merge degradations
#[must_use]
pub fn report_notes(request: &ReportRequest, outcome: &ReportOutcome) -> Vec<String> {
    let mut notes: Vec<String> = outcome
        .limitations
        .iter()
        .map(|limitations| format!("method {}: {limitations}", request.method))
        .collect();
    notes.extend(
        outcome
            .failures
            .iter()
            .map(|failure| format!("could not analyze {}: {}", failure.file, failure.error)),
    );
    notes.extend(outcome.warnings.iter().map(ToString::to_string));
    notes
}

/// Execute the report command
pub fn execute_report(config: &CliConfig, args: &ReportArgs, out: &mut impl Write) -> CliResult<()> {
    let status = StatusReporter::from_config(config);
    let set = load_data(config, &status)?;
    status.status(&format!(
        "Merging {} data file(s) from {}",
        set.artifacts.len(),
        config.data_dir().display()
    ));

    let request = build_request(config, args);
    let outcome = run_report(&set.artifacts, &request)?;

    for note in report_notes(&request, &outcome) {
        status.warning(&note);
    }
    for report in &outcome.reports {
        match &report.path {
            Some(path) => writeln!(
                out,
                "Wrote {} report to {}",
                report.format.as_str(),
                path.display()
            )?,
            None => write!(out, "{}", report.content)?,
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::commands::{FormatArg, MethodArg};
    use crate::error::CliError;
    use crate::handlers::tests::{config_for, document, seeded, APP};
    use std::collections::BTreeSet;
    use mpy_coverage::{PathMapping, Settings};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    mod request_tests {
        use super::*;

        #[test]
        fn test_defaults_come_from_settings() {
            let settings = Settings {
                method: AnalysisMethod::SourceParse,
                show_missing: true,
                path_maps: vec![PathMapping::new("/flash/", "src/")],
                ..Settings::default()
            };
            let config = CliConfig::new().with_settings(settings);
            let request = build_request(&config, &ReportArgs::default());

            assert_eq!(request.method, AnalysisMethod::SourceParse);
            assert!(request.show_missing);
            assert_eq!(request.formats, vec![ReportFormat::Text]);
            assert_eq!(request.path_maps.len(), 1);
        }

        #[test]
        fn test_arguments_override_settings() {
            let settings = Settings {
                path_maps: vec![PathMapping::new("/flash/", "settings/")],
                ..Settings::default()
            };
            let config = CliConfig::new().with_settings(settings);
            let args = ReportArgs {
                method: Some(MethodArg::CoLines),
                mpy_cross: Some(PathBuf::from("/opt/mpy-cross")),
                path_maps: vec![PathMapping::new("/flash/", "cli/")],
                formats: vec![FormatArg::Json, FormatArg::Lcov],
                output_dir: Some(PathBuf::from("out")),
                branch: true,
                ..ReportArgs::default()
            };
            let request = build_request(&config, &args);

            assert_eq!(request.method, AnalysisMethod::RuntimeIntrospection);
            assert_eq!(request.compiler.program, PathBuf::from("/opt/mpy-cross"));
            assert_eq!(request.path_maps[0].host_prefix, "cli/");
            assert_eq!(request.path_maps[1].host_prefix, "settings/");
            assert_eq!(request.formats, vec![ReportFormat::Json, ReportFormat::Lcov]);
            assert_eq!(request.output_dir, PathBuf::from("out"));
            assert!(request.branch);
        }
    }

    mod execute_tests {
        use super::*;

        #[test]
        fn test_text_report_goes_to_writer() {
            let dir = TempDir::new().unwrap();
            let config = seeded(&dir);
            let src = dir.path().join("src");
            fs::create_dir_all(&src).unwrap();
            fs::write(src.join("app.py"), APP).unwrap();

            let args = ReportArgs {
                method: Some(MethodArg::Ast),
                source_root: Some(src),
                formats: vec![FormatArg::Text, FormatArg::Json],
                output_dir: Some(dir.path().join("reports")),
                show_missing: true,
                ..ReportArgs::default()
            };
            let mut out = Vec::new();
            execute_report(&config, &args, &mut out).unwrap();

            let text = String::from_utf8(out).unwrap();
            assert!(text.contains("app.py"));
            assert!(text.contains("TOTAL"));
            assert!(text.contains("Wrote json report to"));
            assert!(dir.path().join("reports/coverage.json").is_file());
        }

        #[test]
        fn test_runtime_tables_note_uncalled_code() {
            let dir = TempDir::new().unwrap();
            let mut document = document("test_a", "app.py", &[1, 2]);
            let mut tables = std::collections::BTreeMap::new();
            tables.insert("app.py".to_string(), BTreeSet::from([1, 2, 7]));
            document.executable = Some(tables);

            let request = build_request(
                &CliConfig::new(),
                &ReportArgs {
                    method: Some(MethodArg::CoLines),
                    output_dir: Some(dir.path().to_path_buf()),
                    ..ReportArgs::default()
                },
            );
            let outcome = run_report(&[document], &request).unwrap();
            let notes = report_notes(&request, &outcome);

            assert_eq!(notes.len(), 1);
            assert!(notes[0].starts_with("method co_lines: "));
            assert!(notes[0].contains("uncalled functions are absent"));
        }

        #[test]
        fn test_source_parse_has_no_limitation_note() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("app.py"), APP).unwrap();
            let request = build_request(
                &CliConfig::new(),
                &ReportArgs {
                    method: Some(MethodArg::Ast),
                    source_root: Some(dir.path().to_path_buf()),
                    output_dir: Some(dir.path().to_path_buf()),
                    ..ReportArgs::default()
                },
            );
            let outcome = run_report(&[document("t", "app.py", &[1])], &request).unwrap();
            assert!(report_notes(&request, &outcome).is_empty());
        }

        #[test]
        fn test_empty_data_dir_fails() {
            let dir = TempDir::new().unwrap();
            let config = config_for(dir.path());
            let mut out = Vec::new();
            let err = execute_report(&config, &ReportArgs::default(), &mut out).unwrap_err();
            assert!(matches!(err, CliError::NoData { .. }));
            assert!(out.is_empty());
        }
    }
}
