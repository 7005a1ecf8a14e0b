//! Line-event model delivered by a traced runtime.
//!
//! A runtime reports execution through [`TraceEvent`]s: one `Call` when a
//! code object is entered, one `Line` each time execution reaches a new source
//! line, and one `Return` when the frame is left. Each event carries the
//! [`CodeInfo`] of the frame it belongs to.

use serde::{Deserialize, Serialize};

/// Reserved arc endpoint for call entry and return exit.
///
/// Never a valid line number: runtimes number lines from 1.
pub const ARC_SENTINEL: i64 = -1;

/// Source line number as reported by the runtime (1-based).
pub type LineNo = u32;

/// Directed control-flow edge `(from, to)`. Either end may be [`ARC_SENTINEL`].
pub type ArcEdge = (i64, i64);

/// Identity of one compiled code object inside a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeId(u64);

impl CodeId {
    /// Create a new code ID
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// A compiled code object (module body, function, method, class body).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeInfo {
    /// Runtime identity
    pub id: CodeId,
    /// Source file the code was compiled from
    pub filename: String,
    /// Simple name (`<module>` for module bodies)
    pub name: String,
    /// Line of the defining statement
    pub first_line: LineNo,
    /// Lines present in the code object's line-number table
    #[serde(default)]
    pub line_table: Vec<LineNo>,
}

impl CodeInfo {
    /// Create a code object description with an empty line table
    #[must_use]
    pub fn new(
        id: CodeId,
        filename: impl Into<String>,
        name: impl Into<String>,
        first_line: LineNo,
    ) -> Self {
        Self {
            id,
            filename: filename.into(),
            name: name.into(),
            first_line,
            line_table: Vec::new(),
        }
    }

    /// Set the line-number table
    #[must_use]
    pub fn with_line_table(mut self, lines: impl IntoIterator<Item = LineNo>) -> Self {
        self.line_table = lines.into_iter().collect();
        self
    }

    /// Lines of the table that denote real source lines
    pub fn executable_lines(&self) -> impl Iterator<Item = LineNo> + '_ {
        self.line_table.iter().copied().filter(|line| *line > 0)
    }
}

/// Kind of runtime notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A code object was entered
    Call,
    /// Execution reached a new source line
    Line,
    /// The frame is being left
    Return,
    /// An exception is propagating through the frame
    Exception,
}

/// One notification from the runtime
#[derive(Debug, Clone, Copy)]
pub struct TraceEvent<'a> {
    /// Event kind
    pub kind: EventKind,
    /// Code object of the current frame
    pub code: &'a CodeInfo,
    /// Current line of the frame
    pub line: LineNo,
}

impl<'a> TraceEvent<'a> {
    /// Create a new event
    #[must_use]
    pub const fn new(kind: EventKind, code: &'a CodeInfo, line: LineNo) -> Self {
        Self { kind, code, line }
    }
}

/// Receiver of runtime events, registered with a
/// [`TraceRuntime`](super::TraceRuntime).
pub trait LineHook {
    /// Handle one event. Called synchronously on the traced thread.
    fn on_event(&mut self, event: &TraceEvent<'_>);
}

/// Convert a line number into an arc endpoint.
#[inline]
#[must_use]
pub fn arc_endpoint(line: LineNo) -> i64 {
    i64::from(line)
}
