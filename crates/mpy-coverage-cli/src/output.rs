//! Status messages on stderr

use crate::config::CliConfig;
use console::{style, Term};

/// Writes progress, warnings and failures to stderr; report content goes
/// to the handler's writer instead
#[derive(Debug)]
pub struct StatusReporter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl StatusReporter {
    /// Create a reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            use_color,
            quiet,
        }
    }

    /// Reporter matching the CLI configuration
    #[must_use]
    pub fn from_config(config: &CliConfig) -> Self {
        Self::new(config.color.should_color(), config.verbosity.is_quiet())
    }

    /// Plain progress line
    pub fn status(&self, message: &str) {
        if self.quiet {
            return;
        }
        let _ = self.term.write_line(message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("warning:").yellow().bold().to_string()
        } else {
            "warning:".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure message, even in quiet mode
    pub fn failure(&self, message: &str) {
        let prefix = if self.use_color {
            style("error:").red().bold().to_string()
        } else {
            "error:".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::{ColorChoice, Verbosity};

    #[test]
    fn test_from_config_follows_verbosity_and_color() {
        let config = CliConfig::new()
            .with_verbosity(Verbosity::Quiet)
            .with_color(ColorChoice::Never);
        let reporter = StatusReporter::from_config(&config);
        assert!(reporter.quiet);
        assert!(!reporter.use_color);
    }

    #[test]
    fn test_quiet_reporter_does_not_panic() {
        let reporter = StatusReporter::new(false, true);
        reporter.status("hidden");
        reporter.warning("hidden");
        reporter.failure("shown");
    }
}
