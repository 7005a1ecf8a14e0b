//! Result and error types for mpy-coverage.

use crate::analysis::AnalysisError;
use crate::export::TransportError;
use thiserror::Error;

/// Result type for coverage operations
pub type CoverageResult<T> = Result<T, CoverageError>;

/// Errors that can occur while tracing, analyzing, merging or reporting
#[derive(Debug, Error)]
pub enum CoverageError {
    /// The runtime cannot deliver line events
    #[error("Runtime has no line-trace support; coverage hook cannot be installed")]
    TracingUnsupported,

    /// A session is already armed on this tracer
    #[error("A coverage session is already armed (session {active})")]
    AlreadyArmed {
        /// Identifier of the armed session
        active: u64,
    },

    /// The runtime already carries a line hook installed elsewhere
    #[error("A coverage session is already armed: the runtime already has a line hook installed")]
    HookOccupied,

    /// Stop was called with a handle that is not the armed session
    #[error("Session handle {handle} does not refer to the armed session")]
    StaleSession {
        /// Identifier carried by the handle
        handle: u64,
    },

    /// Operation requires an armed session
    #[error("No coverage session is armed")]
    NotArmed,

    /// Branch output needs executable lines but no analyzer can produce them
    #[error("Branch coverage requested but no executable-line analyzer is available for method `{method}`")]
    BranchWithoutAnalyzer {
        /// Requested analysis method
        method: String,
    },

    /// Malformed `device_prefix=host_prefix` mapping
    #[error("Invalid path mapping `{mapping}`: expected device_prefix=host_prefix")]
    InvalidPathMapping {
        /// Mapping as given
        mapping: String,
    },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Report adapter speaks a different interface version
    #[error("Report adapter interface version {found} is not supported (expected {expected})")]
    AdapterVersion {
        /// Version reported by the adapter
        found: u32,
        /// Version this crate implements
        expected: u32,
    },

    /// Coverage artifact could not be interpreted
    #[error("Invalid coverage data in {path}: {message}")]
    InvalidData {
        /// Artifact path
        path: String,
        /// Error message
        message: String,
    },

    /// Streamed payload framing error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Executable-line analysis failed for a file
    #[error("Analysis of {file} failed: {source}")]
    Analysis {
        /// File being analyzed
        file: String,
        /// Underlying failure
        #[source]
        source: AnalysisError,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl CoverageError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid-data error for an artifact
    #[must_use]
    pub fn invalid_data(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidData {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error belongs to the fatal configuration class
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::TracingUnsupported
                | Self::AlreadyArmed { .. }
                | Self::HookOccupied
                | Self::StaleSession { .. }
                | Self::NotArmed
                | Self::BranchWithoutAnalyzer { .. }
                | Self::InvalidPathMapping { .. }
                | Self::InvalidConfig { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_already_armed_message_names_session() {
        let err = CoverageError::AlreadyArmed { active: 3 };
        assert!(err.to_string().contains("already armed"));
        assert!(err.to_string().contains("session 3"));

        assert!(CoverageError::HookOccupied
            .to_string()
            .contains("already armed"));
    }

    #[test]
    fn test_configuration_class() {
        assert!(CoverageError::TracingUnsupported.is_configuration());
        assert!(CoverageError::config("bad").is_configuration());
        assert!(CoverageError::BranchWithoutAnalyzer {
            method: "co_lines".into()
        }
        .is_configuration());
        assert!(!CoverageError::Transport(TransportError::MissingStartMarker).is_configuration());
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let err: CoverageError = TransportError::MissingEndMarker.into();
        assert_eq!(
            err.to_string(),
            TransportError::MissingEndMarker.to_string()
        );
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CoverageError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }
}
