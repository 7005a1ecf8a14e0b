//! mpy-coverage: host-side tooling for MicroPython coverage data
//!
//! ## Usage
//!
//! ```bash
//! mpy-coverage report --format xml --path-map /flash/=src/   # Merge and report
//! mpy-coverage test-map --line-detail                          # Which test hit which line
//! mpy-coverage extract serial.log --name test_uart             # Save a streamed payload
//! mpy-coverage clean -y                                        # Drop collected data
//! ```

use clap::Parser;
use mpy_coverage_cli::{build_config, logging, run_command, Cli, CliResult};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    let config = build_config(&cli, &cwd)?;

    config.color.apply();
    logging::init_tracing(config.verbosity, config.color.should_color());

    run_command(&cli, &config)
}
