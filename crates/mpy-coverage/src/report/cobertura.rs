//! Cobertura XML report
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <!DOCTYPE coverage SYSTEM "http://cobertura.sourceforge.net/xml/coverage-04.dtd">
//! <coverage line-rate="0.7143" branch-rate="0" branches-covered="0" branches-valid="0" lines-covered="5" lines-valid="7" version="0.1.0">
//!   <packages>
//!     <package name="app" line-rate="0.7143" branch-rate="0" complexity="0">
//!       <classes>
//!         <class name="game.py" filename="app/game.py" line-rate="0.6000" ...>
//!           <lines>
//!             <line number="1" hits="1"/>
//!           </lines>
//!         </class>
//!       </classes>
//!     </package>
//!   </packages>
//! </coverage>
//! ```

use super::{rate, sum_arc_counts, CoverageSummary, FileCoverage, ReportAdapter, ReportFormat};
use crate::result::CoverageResult;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Files grouped by directory
type PackageMap<'a> = BTreeMap<String, Vec<&'a FileCoverage>>;

/// Cobertura XML generator
#[derive(Debug, Clone)]
pub struct CoberturaAdapter {
    version: String,
}

impl Default for CoberturaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CoberturaAdapter {
    /// Create a Cobertura adapter
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Set the version string
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Group files by package (directory)
    fn group_by_package(summary: &CoverageSummary) -> PackageMap<'_> {
        let mut packages: PackageMap<'_> = BTreeMap::new();
        for file in &summary.files {
            let package = file
                .file
                .rsplit_once('/')
                .map_or_else(|| ".".to_string(), |(dir, _)| dir.to_string());
            packages.entry(package).or_default().push(file);
        }
        packages
    }

    /// Class name: file name without directory
    fn class_name(file_path: &str) -> &str {
        file_path.rsplit_once('/').map_or(file_path, |(_, name)| name)
    }
}

#[allow(clippy::cast_precision_loss)]
fn package_rate(files: &[&FileCoverage]) -> f64 {
    let total: usize = files.iter().map(|f| f.statement_count()).sum();
    let covered: usize = files.iter().map(|f| f.covered_count()).sum();
    if total > 0 {
        covered as f64 / total as f64
    } else {
        1.0
    }
}

/// `branch-rate` attribute value; `0` outside branch mode
fn branch_rate(counts: Option<(usize, usize)>) -> String {
    counts.map_or_else(
        || "0".to_string(),
        |(taken, possible)| format!("{:.4}", rate(taken, possible)),
    )
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl ReportAdapter for CoberturaAdapter {
    fn format(&self) -> ReportFormat {
        ReportFormat::Xml
    }

    fn render(&self, summary: &CoverageSummary) -> CoverageResult<String> {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<!DOCTYPE coverage SYSTEM "http://cobertura.sourceforge.net/xml/coverage-04.dtd">"#,
        );
        xml.push('\n');
        let counts = summary.arc_counts();
        let (branches_covered, branches_valid) = counts.unwrap_or_default();
        let _ = writeln!(
            xml,
            r#"<coverage line-rate="{:.4}" branch-rate="{}" branches-covered="{branches_covered}" branches-valid="{branches_valid}" lines-covered="{}" lines-valid="{}" version="{}">"#,
            summary.line_rate(),
            branch_rate(counts),
            summary.covered_count(),
            summary.statement_count(),
            escape(&self.version),
        );

        xml.push_str("  <packages>\n");
        for (package, files) in &Self::group_by_package(summary) {
            let _ = writeln!(
                xml,
                r#"    <package name="{}" line-rate="{:.4}" branch-rate="{}" complexity="0">"#,
                escape(package),
                package_rate(files),
                branch_rate(summary.branch.then(|| sum_arc_counts(files.iter().copied()))),
            );
            xml.push_str("      <classes>\n");

            for file in files {
                let _ = writeln!(
                    xml,
                    r#"        <class name="{}" filename="{}" line-rate="{:.4}" branch-rate="{}" complexity="0">"#,
                    escape(Self::class_name(&file.file)),
                    escape(&file.source_path.display().to_string()),
                    file.line_rate(),
                    branch_rate(file.arc_counts()),
                );
                xml.push_str("          <lines>\n");
                for line in &file.statements {
                    let hits = u8::from(file.executed.contains(line));
                    let _ = writeln!(xml, r#"            <line number="{line}" hits="{hits}"/>"#);
                }
                xml.push_str("          </lines>\n");
                xml.push_str("        </class>\n");
            }

            xml.push_str("      </classes>\n");
            xml.push_str("    </package>\n");
        }
        xml.push_str("  </packages>\n");
        xml.push_str("</coverage>\n");

        Ok(xml)
    }
}
