//! Command handlers
//!
//! Each handler takes the resolved configuration, its arguments and the
//! writer that receives the command's primary output. Status lines go to
//! stderr through [`StatusReporter`](crate::output::StatusReporter).

pub mod analyze;
pub mod clean;
pub mod extract;
pub mod list;
pub mod report;
pub mod test_map;

pub use analyze::execute_analyze;
pub use clean::execute_clean;
pub use extract::execute_extract;
pub use list::execute_list;
pub use report::{build_request, execute_report, report_notes};
pub use test_map::execute_test_map;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::StatusReporter;
use mpy_coverage::export::{load_artifacts, ArtifactSet};

/// Load the data directory, reporting rejected files; an empty directory
/// is an error
pub(crate) fn load_data(config: &CliConfig, status: &StatusReporter) -> CliResult<ArtifactSet> {
    let dir = config.data_dir();
    let set = load_artifacts(dir)?;
    for rejected in &set.rejected {
        status.warning(&format!(
            "skipping {}: {}",
            rejected.path.display(),
            rejected.error
        ));
    }
    if set.is_empty() {
        return Err(CliError::NoData {
            dir: dir.to_path_buf(),
        });
    }
    Ok(set)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use mpy_coverage::export::store;
    use mpy_coverage::CoverageDocument;
    use std::collections::BTreeSet;
    use std::path::Path;
    use tempfile::TempDir;

    pub(crate) const APP: &str = "\
import sys

def used():
    return 1

def unused():
    return 2

used()
";

    /// Artifact recording `lines` of `file` under `test_id`
    pub(crate) fn document(test_id: &str, file: &str, lines: &[u32]) -> CoverageDocument {
        let mut document = CoverageDocument::default().with_test_id(test_id);
        document
            .executed
            .insert(file.to_owned(), lines.iter().copied().collect::<BTreeSet<_>>());
        document
    }

    /// Config whose data directory is `dir`, quiet and colorless
    pub(crate) fn config_for(dir: &Path) -> CliConfig {
        CliConfig::new()
            .with_verbosity(crate::config::Verbosity::Quiet)
            .with_color(crate::config::ColorChoice::Never)
            .with_data_dir(dir)
    }

    pub(crate) fn seeded(dir: &TempDir) -> CliConfig {
        let data = dir.path().join("data");
        store(&data, "test_a", &document("test_a", "app.py", &[1, 3, 4])).unwrap();
        store(&data, "test_b", &document("test_b", "app.py", &[1, 3, 9])).unwrap();
        config_for(&data)
    }

    #[test]
    fn test_load_data_missing_dir_is_no_data() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir.path().join("absent"));
        let err = load_data(&config, &StatusReporter::default()).unwrap_err();
        assert!(matches!(err, CliError::NoData { .. }));
        assert!(err.to_string().contains("No coverage data files found in"));
    }

    #[test]
    fn test_load_data_skips_rejected_files() {
        let dir = TempDir::new().unwrap();
        let config = seeded(&dir);
        std::fs::write(config.data_dir().join("broken.json"), "{not json").unwrap();

        let set = load_data(&config, &StatusReporter::new(false, true)).unwrap();
        assert_eq!(set.artifacts.len(), 2);
        assert_eq!(set.rejected.len(), 1);
    }
}
