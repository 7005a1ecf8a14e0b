//! mpy-coverage CLI library
//!
//! Command-line front end for the `mpy-coverage` crate: merge collected
//! data files, render reports, list and clean the data directory, print
//! test attribution tables, run the analyzers directly, and pull streamed
//! payloads out of captured console logs.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{
    AnalyzeArgs, CleanArgs, Cli, ColorArg, Commands, ExtractArgs, FormatArg, MethodArg,
    ReportArgs, TestMapArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::StatusReporter;

use mpy_coverage::Settings;
use std::io;
use std::path::Path;
use tracing::debug;

/// Resolve the configuration: settings file (explicit, or discovered in
/// `cwd`), then global flag overrides
pub fn build_config(cli: &Cli, cwd: &Path) -> CliResult<CliConfig> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::discover(cwd)?,
    };
    let mut config = CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
        .with_settings(settings);
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    Ok(config)
}

/// Run one parsed command against the process streams
pub fn run_command(cli: &Cli, config: &CliConfig) -> CliResult<()> {
    debug!(data_dir = %config.data_dir().display(), command = ?cli.command, "dispatching");
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &cli.command {
        Commands::Report(args) => handlers::execute_report(config, args, &mut out),
        Commands::List => handlers::execute_list(config, &mut out),
        Commands::TestMap(args) => handlers::execute_test_map(config, args, &mut out),
        Commands::Clean(args) => {
            handlers::execute_clean(config, args, &mut io::stdin().lock(), &mut out)
        }
        Commands::Analyze(args) => handlers::execute_analyze(config, args, &mut out),
        Commands::Extract(args) => {
            handlers::execute_extract(config, args, &mut io::stdin().lock(), &mut out)
        }
    }
}
