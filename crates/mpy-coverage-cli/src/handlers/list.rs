//! List command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use mpy_coverage::export::{list_artifacts, SessionArtifact};
use std::io::Write;

/// Execute the list command
///
/// Unreadable files are listed with their error instead of failing the
/// whole listing.
pub fn execute_list(config: &CliConfig, out: &mut impl Write) -> CliResult<()> {
    let dir = config.data_dir();
    let paths = list_artifacts(dir)?;
    if paths.is_empty() {
        writeln!(out, "No coverage data files in {}", dir.display())?;
        return Ok(());
    }

    writeln!(out, "Coverage data in {}:", dir.display())?;
    for path in &paths {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match SessionArtifact::load(path) {
            Ok(artifact) => {
                let summary = artifact.summary();
                writeln!(
                    out,
                    "  {name}  ({} files, {} lines)",
                    summary.files, summary.lines
                )?;
            }
            Err(error) => writeln!(out, "  {name}  (error: {error})")?,
        }
    }
    Ok(())
}
