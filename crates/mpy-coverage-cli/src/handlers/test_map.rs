//! Test-map command handler

use super::load_data;
use crate::commands::TestMapArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::StatusReporter;
use mpy_coverage::{merge, TestAttribution};
use std::io::Write;

/// Execute the test-map command
pub fn execute_test_map(
    config: &CliConfig,
    args: &TestMapArgs,
    out: &mut impl Write,
) -> CliResult<()> {
    let status = StatusReporter::from_config(config);
    let set = load_data(config, &status)?;
    let dataset = merge(&set.artifacts, None);
    let attribution = TestAttribution::from_dataset(&dataset);
    if attribution.is_empty() {
        return Err(CliError::NoData {
            dir: config.data_dir().to_path_buf(),
        });
    }

    let table = if args.line_detail {
        attribution.line_table()
    } else {
        attribution.file_table()
    };
    write!(out, "{table}")?;
    Ok(())
}
