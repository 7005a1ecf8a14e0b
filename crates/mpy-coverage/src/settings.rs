//! Project settings file (`mpy-coverage.yaml`).
//!
//! ```yaml
//! data_dir: .mpy_coverage
//! method: mpy
//! mpy_cross: tools/mpy-cross
//! source_root: firmware
//! path_maps:
//!   - /flash/=src/
//! formats: [text, xml]
//! output_dir: reports
//! branch: false
//! show_missing: true
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use crate::analysis::{AnalysisMethod, CrossCompiler};
use crate::export::DEFAULT_DATA_DIR;
use crate::paths::PathMapping;
use crate::report::ReportFormat;
use crate::result::CoverageResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings file looked up in the working directory
pub const SETTINGS_FILE: &str = "mpy-coverage.yaml";

/// Host-side defaults for collection and reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Artifact directory
    pub data_dir: PathBuf,
    /// Executable-line method
    pub method: AnalysisMethod,
    /// Cross compiler program
    pub mpy_cross: PathBuf,
    /// Root joined onto relative source paths
    pub source_root: Option<PathBuf>,
    /// Device → host path rewrites, first match wins
    pub path_maps: Vec<PathMapping>,
    /// Report formats
    pub formats: Vec<ReportFormat>,
    /// Directory for report files
    pub output_dir: PathBuf,
    /// Branch output
    pub branch: bool,
    /// Missing ranges in the text table
    pub show_missing: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            method: AnalysisMethod::Auto,
            mpy_cross: CrossCompiler::default().program,
            source_root: None,
            path_maps: Vec::new(),
            formats: vec![ReportFormat::Text],
            output_dir: PathBuf::from("."),
            branch: false,
            show_missing: false,
        }
    }
}

impl Settings {
    /// Create default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from YAML text
    ///
    /// # Errors
    ///
    /// Returns an error for malformed YAML, unknown keys or bad values.
    pub fn from_yaml(yaml: &str) -> CoverageResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> CoverageResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml(&text)?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Load `mpy-coverage.yaml` from `dir`, or defaults when absent
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn discover(dir: &Path) -> CoverageResult<Self> {
        let path = dir.join(SETTINGS_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> CoverageResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Cross compiler described by these settings
    #[must_use]
    pub fn compiler(&self) -> CrossCompiler {
        CrossCompiler::new(&self.mpy_cross)
    }
}
