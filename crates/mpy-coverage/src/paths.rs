//! Device path → host path resolution.

use crate::result::{CoverageError, CoverageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One `device_prefix=host_prefix` rewrite rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathMapping {
    /// Prefix of recorded (device) paths
    pub device_prefix: String,
    /// Replacement prefix on the host
    pub host_prefix: String,
}

impl PathMapping {
    /// Create a mapping
    #[must_use]
    pub fn new(device_prefix: impl Into<String>, host_prefix: impl Into<String>) -> Self {
        Self {
            device_prefix: device_prefix.into(),
            host_prefix: host_prefix.into(),
        }
    }

    /// Parse `device_prefix=host_prefix`. Only the first `=` separates.
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::InvalidPathMapping`] when there is no `=` or
    /// the device prefix is empty.
    pub fn parse(text: &str) -> CoverageResult<Self> {
        match text.split_once('=') {
            Some((device, host)) if !device.is_empty() => Ok(Self::new(device, host)),
            _ => Err(CoverageError::InvalidPathMapping {
                mapping: text.to_owned(),
            }),
        }
    }

    /// Rewrite `path` if it starts with the device prefix
    #[must_use]
    pub fn apply(&self, path: &str) -> Option<String> {
        path.strip_prefix(self.device_prefix.as_str())
            .map(|rest| format!("{}{rest}", self.host_prefix))
    }
}

impl fmt::Display for PathMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.device_prefix, self.host_prefix)
    }
}

impl FromStr for PathMapping {
    type Err = CoverageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathMapping {
    type Error = CoverageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PathMapping> for String {
    fn from(mapping: PathMapping) -> Self {
        mapping.to_string()
    }
}

/// Ordered mappings plus an optional root for relative results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathResolver {
    mappings: Vec<PathMapping>,
    source_root: Option<PathBuf>,
}

impl PathResolver {
    /// Create a resolver that returns paths unchanged
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mapping. Earlier mappings win.
    #[must_use]
    pub fn with_mapping(mut self, mapping: PathMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    /// Append several mappings
    #[must_use]
    pub fn with_mappings(mut self, mappings: impl IntoIterator<Item = PathMapping>) -> Self {
        self.mappings.extend(mappings);
        self
    }

    /// Set the root relative results are joined onto
    #[must_use]
    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Parse textual mappings
    ///
    /// # Errors
    ///
    /// Fails on the first malformed mapping.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> CoverageResult<Self> {
        let mappings = specs
            .iter()
            .map(|spec| PathMapping::parse(spec.as_ref()))
            .collect::<CoverageResult<Vec<_>>>()?;
        Ok(Self::new().with_mappings(mappings))
    }

    /// Configured mappings
    #[must_use]
    pub fn mappings(&self) -> &[PathMapping] {
        &self.mappings
    }

    /// Host path for a recorded file name
    #[must_use]
    pub fn resolve(&self, recorded: &str) -> PathBuf {
        let mapped = self
            .mappings
            .iter()
            .find_map(|mapping| mapping.apply(recorded))
            .unwrap_or_else(|| recorded.to_owned());
        let mapped = PathBuf::from(mapped);

        match &self.source_root {
            Some(root) if mapped.is_relative() => root.join(mapped),
            _ => mapped,
        }
    }

    /// Host path for a recorded file name, if it exists
    #[must_use]
    pub fn resolve_existing(&self, recorded: &str) -> Option<PathBuf> {
        let path = self.resolve(recorded);
        path.exists().then_some(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod mapping_tests {
        use super::*;

        #[test]
        fn test_parse_splits_on_first_equals() {
            let mapping = PathMapping::parse("/flash/=src/a=b/").unwrap();
            assert_eq!(mapping.device_prefix, "/flash/");
            assert_eq!(mapping.host_prefix, "src/a=b/");
            assert_eq!(mapping.to_string(), "/flash/=src/a=b/");
        }

        #[test]
        fn test_malformed_mapping_is_config_error() {
            for bad in ["no-separator", "=host"] {
                let err = PathMapping::parse(bad).unwrap_err();
                assert!(err.is_configuration());
                assert!(err.to_string().contains(bad));
            }
        }

        #[test]
        fn test_empty_host_prefix_strips() {
            let mapping: PathMapping = "/lib/=".parse().unwrap();
            assert_eq!(mapping.apply("/lib/util.py").as_deref(), Some("util.py"));
            assert_eq!(mapping.apply("main.py"), None);
        }

        #[test]
        fn test_serde_uses_text_form() {
            let mappings: Vec<PathMapping> = serde_yaml_ng::from_str("- /flash/=src/\n").unwrap();
            assert_eq!(mappings, vec![PathMapping::new("/flash/", "src/")]);
            assert!(serde_yaml_ng::from_str::<Vec<PathMapping>>("- nope\n").is_err());
        }
    }

    mod resolver_tests {
        use super::*;

        #[test]
        fn test_first_matching_mapping_wins() {
            let resolver = PathResolver::from_specs(&["/flash/lib/=vendor/", "/flash/=src/"]).unwrap();
            assert_eq!(resolver.resolve("/flash/lib/x.py"), PathBuf::from("vendor/x.py"));
            assert_eq!(resolver.resolve("/flash/main.py"), PathBuf::from("src/main.py"));
            assert_eq!(resolver.resolve("other.py"), PathBuf::from("other.py"));
        }

        #[test]
        fn test_source_root_joins_relative_results_only() {
            let resolver = PathResolver::new()
                .with_mapping(PathMapping::new("/flash/", "app/"))
                .with_source_root("/work");
            assert_eq!(resolver.resolve("/flash/m.py"), PathBuf::from("/work/app/m.py"));
            assert_eq!(resolver.resolve("/abs/m.py"), PathBuf::from("/abs/m.py"));
        }

        #[test]
        fn test_resolve_existing() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("m.py"), "x = 1\n").unwrap();
            let resolver = PathResolver::new().with_source_root(dir.path());
            assert!(resolver.resolve_existing("m.py").is_some());
            assert!(resolver.resolve_existing("gone.py").is_none());
        }
    }
}
