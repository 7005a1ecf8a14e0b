//! Exporter: sessions and merged datasets to the portable JSON format.
//!
//! Two delivery modes:
//! - storage: a named file, or a timestamped artifact inside a data directory
//! - stream: the payload wrapped in start/end markers for console transports

mod document;
mod framing;
mod storage;

pub use document::{CoverageDocument, CoveringTests, DocumentMetadata, LineTests};
pub use framing::{
    extract_payload, frame, looks_framed, write_framed, TransportError, END_MARKER, START_MARKER,
};
pub use storage::{
    artifact_file_name, clean, derive_test_id, list_artifacts, load_artifacts, parse_capture,
    store, store_at, ArtifactSet, ArtifactSummary, RejectedArtifact, SessionArtifact,
    ARTIFACT_EXTENSION, DEFAULT_DATA_DIR,
};

use crate::result::CoverageResult;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Where an export goes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Destination {
    /// This exact file
    File(PathBuf),
    /// A timestamped artifact named after `name` inside `dir`
    DataDir {
        /// Data directory
        dir: PathBuf,
        /// Artifact name (usually the test script)
        name: String,
    },
    /// Framed text for an output stream
    #[default]
    Stream,
}

/// What an export produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// A file was written
    Written(PathBuf),
    /// Framed text, ready to be written to the stream
    Framed(String),
}

/// Serialize `document` to `destination`
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn export_json(
    document: &CoverageDocument,
    destination: &Destination,
) -> CoverageResult<ExportOutcome> {
    match destination {
        Destination::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, document.to_json_pretty()?)?;
            debug!(path = %path.display(), "exported coverage document");
            Ok(ExportOutcome::Written(path.clone()))
        }
        Destination::DataDir { dir, name } => {
            let name = document.test_id().unwrap_or(name);
            store(dir, name, document).map(ExportOutcome::Written)
        }
        Destination::Stream => Ok(ExportOutcome::Framed(frame(&document.to_json()?))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn sample() -> CoverageDocument {
        let mut document = CoverageDocument::default();
        document
            .executed
            .insert("m.py".into(), BTreeSet::from([1, 3, 5, 7]));
        document
    }

    #[test]
    fn test_stream_export_reimports() {
        let ExportOutcome::Framed(text) = export_json(&sample(), &Destination::Stream).unwrap()
        else {
            panic!("stream export must produce framed text");
        };
        let back = parse_capture(&format!("noise\n{text}noise\n")).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_file_export_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/cov.json");
        let outcome = export_json(&sample(), &Destination::File(path.clone())).unwrap();
        assert_eq!(outcome, ExportOutcome::Written(path.clone()));
        let back = SessionArtifact::load(&path).unwrap();
        assert_eq!(back.document, sample());
    }

    #[test]
    fn test_data_dir_export_uses_test_id_for_name() {
        let dir = TempDir::new().unwrap();
        let destination = Destination::DataDir {
            dir: dir.path().to_path_buf(),
            name: "fallback".into(),
        };
        let document = sample().with_test_id("test_io");
        let ExportOutcome::Written(path) = export_json(&document, &destination).unwrap() else {
            panic!("data dir export must write a file");
        };
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_test_io.json"));
    }
}
