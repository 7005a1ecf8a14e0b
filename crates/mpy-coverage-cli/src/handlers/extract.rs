//! Extract command handler

use crate::commands::ExtractArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use mpy_coverage::export::{parse_capture, store};
use mpy_coverage::CoverageError;
use std::io::{Read, Write};
use std::path::Path;

fn read_input(path: &Path, stdin: &mut impl Read) -> CliResult<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        stdin.read_to_string(&mut text)?;
        return Ok(text);
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Artifact name: `--name`, then the recorded test id, then the log's stem
fn artifact_name(args: &ExtractArgs, test_id: Option<&str>) -> String {
    args.name
        .clone()
        .or_else(|| test_id.map(str::to_owned))
        .or_else(|| {
            args.input
                .file_stem()
                .filter(|_| args.input != Path::new("-"))
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "capture".to_string())
}

/// Execute the extract command
pub fn execute_extract(
    config: &CliConfig,
    args: &ExtractArgs,
    stdin: &mut impl Read,
    out: &mut impl Write,
) -> CliResult<()> {
    let text = read_input(&args.input, stdin)?;
    let document = parse_capture(&text)?;
    document.validate().map_err(|message| {
        CliError::from(CoverageError::invalid_data(
            args.input.display().to_string(),
            message,
        ))
    })?;

    let name = artifact_name(args, document.test_id());
    let path = store(config.data_dir(), &name, &document)?;
    writeln!(
        out,
        "Saved {} ({} files, {} lines)",
        path.display(),
        document.file_count(),
        document.line_count()
    )?;
    Ok(())
}
