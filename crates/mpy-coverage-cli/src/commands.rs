//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use mpy_coverage::{AnalysisMethod, PathMapping, ReportFormat};
use std::path::PathBuf;

/// mpy-coverage: merge, report and attribute MicroPython coverage data
#[derive(Parser, Debug)]
#[command(name = "mpy-coverage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding coverage data files [default: .mpy_coverage]
    #[arg(long, global = true, env = "MPY_COVERAGE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Settings file [default: ./mpy-coverage.yaml when present]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge every data file and generate coverage reports
    Report(ReportArgs),

    /// List collected coverage data files
    List,

    /// Show which tests cover each application file
    TestMap(TestMapArgs),

    /// Remove collected coverage data
    Clean(CleanArgs),

    /// Print the executable lines of source files
    Analyze(AnalyzeArgs),

    /// Store the framed payload of a captured console log as a data file
    Extract(ExtractArgs),
}

/// Arguments for the report command
#[derive(Args, Debug, Default)]
pub struct ReportArgs {
    /// Executable line detection method
    #[arg(long)]
    pub method: Option<MethodArg>,

    /// Root directory for relative source paths
    #[arg(long)]
    pub source_root: Option<PathBuf>,

    /// Path to the mpy-cross binary
    #[arg(long)]
    pub mpy_cross: Option<PathBuf>,

    /// Path mapping device_prefix=host_prefix (repeatable)
    #[arg(long = "path-map", value_name = "DEVICE=HOST")]
    pub path_maps: Vec<PathMapping>,

    /// Output format (repeatable) [default: text]
    #[arg(long = "format", value_name = "FORMAT")]
    pub formats: Vec<FormatArg>,

    /// Output directory for report files
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Show missing line numbers in the text report
    #[arg(long)]
    pub show_missing: bool,

    /// Enable branch coverage reporting
    #[arg(long)]
    pub branch: bool,
}

/// Arguments for the test-map command
#[derive(Args, Debug, Default)]
pub struct TestMapArgs {
    /// Show per-line test associations instead of file-level
    #[arg(long)]
    pub line_detail: bool,
}

/// Arguments for the clean command
#[derive(Args, Debug, Default)]
pub struct CleanArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the analyze command
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Source files or glob patterns
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Executable line detection method
    #[arg(long)]
    pub method: Option<MethodArg>,

    /// Path to the mpy-cross binary
    #[arg(long)]
    pub mpy_cross: Option<PathBuf>,

    /// Print JSON instead of one line per file
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the extract command
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Captured console log (`-` for stdin)
    pub input: PathBuf,

    /// Artifact name [default: the test id, else the log file stem]
    #[arg(long)]
    pub name: Option<String>,
}

/// Executable line detection method
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodArg {
    /// Cross-compile when possible
    Auto,
    /// Line tables collected on the device
    #[value(name = "co_lines")]
    CoLines,
    /// Parse the source on the host
    Ast,
    /// Cross-compile with mpy-cross and read line tables
    Mpy,
}

impl From<MethodArg> for AnalysisMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Auto => Self::Auto,
            MethodArg::CoLines => Self::RuntimeIntrospection,
            MethodArg::Ast => Self::SourceParse,
            MethodArg::Mpy => Self::BytecodeCompile,
        }
    }
}

/// Report output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    /// Table on stdout
    Text,
    /// coverage.json
    Json,
    /// coverage.xml (Cobertura)
    Xml,
    /// coverage.lcov
    Lcov,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
            FormatArg::Xml => Self::Xml,
            FormatArg::Lcov => Self::Lcov,
        }
    }
}

/// Color output argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
