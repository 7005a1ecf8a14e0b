//! Clean command handler

use crate::commands::CleanArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use mpy_coverage::export::{clean, list_artifacts};
use std::io::{BufRead, Write};

/// Whether an answer to the prompt confirms
#[must_use]
pub fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Execute the clean command, prompting on `out` and reading the answer
/// from `input` unless `--yes` was given
pub fn execute_clean(
    config: &CliConfig,
    args: &CleanArgs,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> CliResult<()> {
    let dir = config.data_dir();
    let paths = list_artifacts(dir)?;
    if paths.is_empty() {
        writeln!(out, "No coverage data files in {}", dir.display())?;
        return Ok(());
    }

    if !args.yes {
        write!(
            out,
            "Remove {} file(s) from {}? [y/N] ",
            paths.len(),
            dir.display()
        )?;
        out.flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        if !is_confirmation(&answer) {
            writeln!(out, "Cancelled.")?;
            return Ok(());
        }
    }

    let removed = clean(dir)?;
    writeln!(out, "Removed {removed} file(s).")?;
    Ok(())
}
