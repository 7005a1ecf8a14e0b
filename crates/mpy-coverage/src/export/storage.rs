//! Data directory: one timestamped JSON artifact per session.

use super::document::CoverageDocument;
use super::framing::{extract_payload, looks_framed};
use crate::result::{CoverageError, CoverageResult};
use chrono::{DateTime, Local};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Default data directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = ".mpy_coverage";

/// Artifact file extension
pub const ARTIFACT_EXTENSION: &str = "json";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

fn timestamp_prefix() -> Option<&'static Regex> {
    static PREFIX: OnceLock<Option<Regex>> = OnceLock::new();
    PREFIX
        .get_or_init(|| Regex::new(r"^\d{8}_\d{6}(?:-\d+)?_").ok())
        .as_ref()
}

/// Test identifier implied by an artifact file name:
/// `20240101_120000_test_app.json` → `test_app`
#[must_use]
pub fn derive_test_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    match timestamp_prefix().and_then(|re| re.find(&stem)) {
        Some(prefix) if prefix.end() < stem.len() => stem[prefix.end()..].to_owned(),
        _ => stem,
    }
}

/// Artifact file name for `name` at `timestamp`; `counter` disambiguates
/// artifacts written within the same second
#[must_use]
pub fn artifact_file_name(timestamp: &DateTime<Local>, name: &str, counter: u32) -> String {
    let stamp = timestamp.format(TIMESTAMP_FORMAT);
    let name = sanitize_name(name);
    if counter == 0 {
        format!("{stamp}_{name}.{ARTIFACT_EXTENSION}")
    } else {
        format!("{stamp}-{counter}_{name}.{ARTIFACT_EXTENSION}")
    }
}

fn sanitize_name(name: &str) -> String {
    let base = Path::new(name)
        .file_stem()
        .map_or_else(|| name.to_owned(), |stem| stem.to_string_lossy().into_owned());
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "session".to_owned()
    } else {
        cleaned
    }
}

/// Write `document` into `dir` under a fresh timestamped name
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file written.
pub fn store(dir: &Path, name: &str, document: &CoverageDocument) -> CoverageResult<PathBuf> {
    store_at(dir, name, document, &Local::now())
}

/// [`store`] with an explicit timestamp
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file written.
pub fn store_at(
    dir: &Path,
    name: &str,
    document: &CoverageDocument,
    timestamp: &DateTime<Local>,
) -> CoverageResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let json = document.to_json_pretty()?;
    let mut counter = 0;
    loop {
        let path = dir.join(artifact_file_name(timestamp, name, counter));
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                std::io::Write::write_all(&mut file, json.as_bytes())?;
                debug!(path = %path.display(), "stored coverage artifact");
                return Ok(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => counter += 1,
            Err(err) => return Err(err.into()),
        }
    }
}

/// Parse captured text: a raw JSON document or a framed console capture
///
/// # Errors
///
/// Returns a transport error for half-framed captures and a JSON error for
/// malformed payloads.
pub fn parse_capture(text: &str) -> CoverageResult<CoverageDocument> {
    if looks_framed(text) {
        let payload = extract_payload(text)?;
        return CoverageDocument::from_json(payload);
    }
    CoverageDocument::from_json(text)
}

/// One loaded artifact with its resolved test identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionArtifact {
    /// File the artifact was read from
    pub path: PathBuf,
    /// Parsed content
    pub document: CoverageDocument,
    /// `_metadata.test_script`, or the identifier derived from the file name
    pub test_id: String,
}

impl SessionArtifact {
    /// Read and validate an artifact
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, half-framed or invalid.
    pub fn load(path: &Path) -> CoverageResult<Self> {
        let text = fs::read_to_string(path)?;
        let document = parse_capture(&text).map_err(|err| match err {
            CoverageError::Json(json) => CoverageError::invalid_data(display(path), json.to_string()),
            other => other,
        })?;
        document
            .validate()
            .map_err(|message| CoverageError::invalid_data(display(path), message))?;
        let test_id = document
            .test_id()
            .map_or_else(|| derive_test_id(path), str::to_owned);
        Ok(Self {
            path: path.to_path_buf(),
            document,
            test_id,
        })
    }

    /// File name without directories
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Counts for listings
    #[must_use]
    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            name: self.file_name(),
            test_id: self.test_id.clone(),
            files: self.document.file_count(),
            lines: self.document.line_count(),
            has_arcs: self.document.arcs.is_some(),
            has_executable: self.document.executable.is_some(),
        }
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Listing entry for one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    /// File name
    pub name: String,
    /// Resolved test identifier
    pub test_id: String,
    /// Files with executed lines
    pub files: usize,
    /// Executed lines across files
    pub lines: usize,
    /// Whether arcs were recorded
    pub has_arcs: bool,
    /// Whether line tables were recorded
    pub has_executable: bool,
}

/// Artifact that could not be loaded
#[derive(Debug)]
pub struct RejectedArtifact {
    /// File path
    pub path: PathBuf,
    /// Why it was rejected
    pub error: CoverageError,
}

/// Every artifact of a data directory
#[derive(Debug, Default)]
pub struct ArtifactSet {
    /// Loaded artifacts, sorted by file name
    pub artifacts: Vec<SessionArtifact>,
    /// Artifacts that failed to load
    pub rejected: Vec<RejectedArtifact>,
}

impl ArtifactSet {
    /// Whether nothing loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Artifact paths of `dir`, sorted; a missing directory has none
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be read.
pub fn list_artifacts(dir: &Path) -> CoverageResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Load every artifact of `dir`, setting aside the ones that fail
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn load_artifacts(dir: &Path) -> CoverageResult<ArtifactSet> {
    let mut set = ArtifactSet::default();
    for path in list_artifacts(dir)? {
        match SessionArtifact::load(&path) {
            Ok(artifact) => set.artifacts.push(artifact),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable coverage artifact");
                set.rejected.push(RejectedArtifact { path, error });
            }
        }
    }
    Ok(set)
}

/// Remove every artifact of `dir`, then the directory itself if empty
///
/// Returns the number of artifacts removed.
///
/// # Errors
///
/// Returns an error if an artifact cannot be removed.
pub fn clean(dir: &Path) -> CoverageResult<usize> {
    let paths = list_artifacts(dir)?;
    for path in &paths {
        fs::remove_file(path)?;
    }
    if dir.is_dir() && fs::read_dir(dir)?.next().is_none() {
        fs::remove_dir(dir)?;
    }
    Ok(paths.len())
}
