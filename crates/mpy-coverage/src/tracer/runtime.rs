//! Runtime seam: where line hooks are registered.
//!
//! A [`TraceRuntime`] is the interpreter that executes the program under
//! test. The tracer only ever talks to it through this trait, so the same
//! recorder drives a real embedded interpreter binding or the deterministic
//! [`ReplayRuntime`] used by tests and demos.

use super::event::{CodeId, CodeInfo, EventKind, LineHook, LineNo, TraceEvent};
use crate::result::{CoverageError, CoverageResult};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Hook as held by a runtime. The tracer keeps a second handle to read it back.
pub type SharedHook = Rc<RefCell<dyn LineHook>>;

/// An interpreter able to report line events to one hook at a time
pub trait TraceRuntime {
    /// Whether the runtime was built with line-trace support
    fn supports_tracing(&self) -> bool;

    /// Whether a hook is currently installed
    fn has_hook(&self) -> bool;

    /// Install the hook that receives every subsequent event
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::TracingUnsupported`] when the runtime cannot
    /// deliver events, or [`CoverageError::HookOccupied`] when another hook
    /// is installed.
    fn install_hook(&mut self, hook: SharedHook) -> CoverageResult<()>;

    /// Remove and return the installed hook
    fn remove_hook(&mut self) -> Option<SharedHook>;
}

/// One step of a replay script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayStep {
    /// Enter a code object (push a frame)
    Enter {
        /// Code object identifier
        code: CodeId,
    },
    /// Execute a line in the current frame
    Line {
        /// Line number
        line: LineNo,
    },
    /// Raise an exception in the current frame
    Raise,
    /// Leave the current frame
    Leave,
}

/// Serializable program execution: code objects plus the order they ran in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayScript {
    /// Code objects referenced by the steps
    #[serde(default)]
    pub codes: Vec<CodeInfo>,
    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

impl ReplayScript {
    /// Parse a script from JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a script.
    pub fn from_json(json: &str) -> CoverageResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a script from YAML
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML does not describe a script.
    pub fn from_yaml(yaml: &str) -> CoverageResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }
}

#[derive(Debug, Clone, Copy)]
struct ReplayFrame {
    code: CodeId,
    line: LineNo,
}

/// Deterministic runtime that executes event scripts
pub struct ReplayRuntime {
    codes: HashMap<CodeId, CodeInfo>,
    frames: Vec<ReplayFrame>,
    hook: Option<SharedHook>,
    tracing_supported: bool,
    next_code: u64,
    events_delivered: u64,
}

impl std::fmt::Debug for ReplayRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayRuntime")
            .field("codes", &self.codes.len())
            .field("depth", &self.frames.len())
            .field("hooked", &self.hook.is_some())
            .field("tracing_supported", &self.tracing_supported)
            .finish()
    }
}

impl Default for ReplayRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayRuntime {
    /// Create a runtime with line-trace support
    #[must_use]
    pub fn new() -> Self {
        Self {
            codes: HashMap::new(),
            frames: Vec::new(),
            hook: None,
            tracing_supported: true,
            next_code: 1,
            events_delivered: 0,
        }
    }

    /// Create a runtime built without line-trace support
    #[must_use]
    pub fn without_trace_support() -> Self {
        Self {
            tracing_supported: false,
            ..Self::new()
        }
    }

    /// Register a code object under its own identifier
    pub fn load_code(&mut self, code: CodeInfo) -> CodeId {
        let id = code.id;
        self.next_code = self.next_code.max(id.as_u64().saturating_add(1));
        self.codes.insert(id, code);
        id
    }

    /// Compile a code object, assigning it a fresh identifier
    pub fn define(
        &mut self,
        filename: &str,
        name: &str,
        first_line: LineNo,
        line_table: &[LineNo],
    ) -> CodeId {
        let id = CodeId::new(self.next_code);
        let code =
            CodeInfo::new(id, filename, name, first_line).with_line_table(line_table.iter().copied());
        self.load_code(code)
    }

    /// Registered code object
    #[must_use]
    pub fn code(&self, id: CodeId) -> Option<&CodeInfo> {
        self.codes.get(&id)
    }

    /// Number of open frames
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Number of events handed to a hook so far
    #[must_use]
    pub const fn events_delivered(&self) -> u64 {
        self.events_delivered
    }

    /// Enter a code object
    ///
    /// # Errors
    ///
    /// Returns an error if the code object was never loaded.
    pub fn enter(&mut self, code: CodeId) -> CoverageResult<()> {
        let first_line = self
            .codes
            .get(&code)
            .map(|info| info.first_line)
            .ok_or_else(|| {
                CoverageError::config(format!("code object {} is not loaded", code.as_u64()))
            })?;
        self.frames.push(ReplayFrame {
            code,
            line: first_line,
        });
        self.dispatch(EventKind::Call);
        Ok(())
    }

    /// Execute a line in the current frame
    ///
    /// # Errors
    ///
    /// Returns an error if no frame is open.
    pub fn line(&mut self, line: LineNo) -> CoverageResult<()> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| CoverageError::config("line executed outside of any frame"))?;
        frame.line = line;
        self.dispatch(EventKind::Line);
        Ok(())
    }

    /// Raise an exception in the current frame
    ///
    /// # Errors
    ///
    /// Returns an error if no frame is open.
    pub fn raise_exception(&mut self) -> CoverageResult<()> {
        if self.frames.is_empty() {
            return Err(CoverageError::config("exception raised outside of any frame"));
        }
        self.dispatch(EventKind::Exception);
        Ok(())
    }

    /// Leave the current frame
    ///
    /// # Errors
    ///
    /// Returns an error if no frame is open.
    pub fn leave(&mut self) -> CoverageResult<()> {
        if self.frames.is_empty() {
            return Err(CoverageError::config("return executed outside of any frame"));
        }
        self.dispatch(EventKind::Return);
        self.frames.pop();
        Ok(())
    }

    /// Enter `code`, execute `lines` in order, then leave
    ///
    /// # Errors
    ///
    /// Returns an error if the code object was never loaded.
    pub fn call(&mut self, code: CodeId, lines: &[LineNo]) -> CoverageResult<()> {
        self.enter(code)?;
        for line in lines {
            self.line(*line)?;
        }
        self.leave()
    }

    /// Execute one step
    ///
    /// # Errors
    ///
    /// Returns an error if the step is invalid in the current state.
    pub fn step(&mut self, step: &ReplayStep) -> CoverageResult<()> {
        match step {
            ReplayStep::Enter { code } => self.enter(*code),
            ReplayStep::Line { line } => self.line(*line),
            ReplayStep::Raise => self.raise_exception(),
            ReplayStep::Leave => self.leave(),
        }
    }

    /// Load a script's code objects and execute its steps
    ///
    /// # Errors
    ///
    /// Returns the first invalid step's error.
    pub fn run(&mut self, script: &ReplayScript) -> CoverageResult<()> {
        for code in &script.codes {
            self.load_code(code.clone());
        }
        for step in &script.steps {
            self.step(step)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, kind: EventKind) {
        let Some(hook) = &self.hook else {
            return;
        };
        let Some(frame) = self.frames.last() else {
            return;
        };
        let Some(code) = self.codes.get(&frame.code) else {
            return;
        };
        hook.borrow_mut()
            .on_event(&TraceEvent::new(kind, code, frame.line));
        self.events_delivered += 1;
    }
}

impl TraceRuntime for ReplayRuntime {
    fn supports_tracing(&self) -> bool {
        self.tracing_supported
    }

    fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    fn install_hook(&mut self, hook: SharedHook) -> CoverageResult<()> {
        if !self.tracing_supported {
            return Err(CoverageError::TracingUnsupported);
        }
        if self.hook.is_some() {
            return Err(CoverageError::HookOccupied);
        }
        debug!(depth = self.frames.len(), "line hook installed");
        self.hook = Some(hook);
        Ok(())
    }

    fn remove_hook(&mut self) -> Option<SharedHook> {
        let hook = self.hook.take();
        if hook.is_some() {
            debug!(events = self.events_delivered, "line hook removed");
        }
        hook
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(Vec<(EventKind, String, LineNo)>);

    impl LineHook for Log {
        fn on_event(&mut self, event: &TraceEvent<'_>) {
            self.0
                .push((event.kind, event.code.filename.clone(), event.line));
        }
    }

    fn hooked() -> (ReplayRuntime, Rc<RefCell<Log>>) {
        let mut runtime = ReplayRuntime::new();
        let log = Rc::new(RefCell::new(Log::default()));
        let hook: SharedHook = log.clone();
        runtime.install_hook(hook).unwrap();
        (runtime, log)
    }

    mod dispatch_tests {
        use super::*;

        #[test]
        fn test_call_delivers_call_lines_and_return() {
            let (mut runtime, log) = hooked();
            let f = runtime.define("app.py", "f", 10, &[10, 11]);
            runtime.call(f, &[10, 11]).unwrap();

            let events = &log.borrow().0;
            assert_eq!(events.len(), 4);
            assert_eq!(events[0], (EventKind::Call, "app.py".into(), 10));
            assert_eq!(events[3], (EventKind::Return, "app.py".into(), 11));
            assert_eq!(runtime.events_delivered(), 4);
            assert_eq!(runtime.depth(), 0);
        }

        #[test]
        fn test_no_events_without_hook() {
            let mut runtime = ReplayRuntime::new();
            let f = runtime.define("app.py", "f", 1, &[]);
            runtime.call(f, &[1, 2]).unwrap();
            assert_eq!(runtime.events_delivered(), 0);
        }

        #[test]
        fn test_line_outside_frame_is_error() {
            let mut runtime = ReplayRuntime::new();
            assert!(runtime.line(3).is_err());
            assert!(runtime.leave().is_err());
            assert!(runtime.enter(CodeId::new(99)).is_err());
        }
    }

    mod hook_tests {
        use super::*;

        #[test]
        fn test_second_hook_is_rejected() {
            let (mut runtime, _log) = hooked();
            let other: SharedHook = Rc::new(RefCell::new(Log::default()));
            let err = runtime.install_hook(other).unwrap_err();
            assert!(matches!(err, CoverageError::HookOccupied));
        }

        #[test]
        fn test_unsupported_runtime_rejects_hook() {
            let mut runtime = ReplayRuntime::without_trace_support();
            let hook: SharedHook = Rc::new(RefCell::new(Log::default()));
            let err = runtime.install_hook(hook).unwrap_err();
            assert!(matches!(err, CoverageError::TracingUnsupported));
            assert!(!runtime.has_hook());
        }

        #[test]
        fn test_remove_hook_stops_delivery() {
            let (mut runtime, log) = hooked();
            let f = runtime.define("app.py", "f", 1, &[]);
            assert!(runtime.remove_hook().is_some());
            runtime.call(f, &[1]).unwrap();
            assert!(log.borrow().0.is_empty());
        }
    }

    mod script_tests {
        use super::*;

        #[test]
        fn test_run_yaml_script() {
            let yaml = r"
codes:
  - id: 1
    filename: app.py
    name: main
    first_line: 1
steps:
  - op: enter
    code: 1
  - op: line
    line: 1
  - op: raise
  - op: leave
";
            let script = ReplayScript::from_yaml(yaml).unwrap();
            let (mut runtime, log) = hooked();
            runtime.run(&script).unwrap();

            let kinds: Vec<EventKind> = log.borrow().0.iter().map(|e| e.0).collect();
            assert_eq!(
                kinds,
                vec![
                    EventKind::Call,
                    EventKind::Line,
                    EventKind::Exception,
                    EventKind::Return
                ]
            );
        }

        #[test]
        fn test_define_after_load_does_not_reuse_ids() {
            let mut runtime = ReplayRuntime::new();
            runtime.load_code(CodeInfo::new(CodeId::new(5), "a.py", "a", 1));
            let next = runtime.define("b.py", "b", 1, &[]);
            assert_eq!(next.as_u64(), 6);
        }

        #[test]
        fn test_load_code_with_max_id() {
            let mut runtime = ReplayRuntime::new();
            let id = runtime.load_code(CodeInfo::new(CodeId::new(u64::MAX), "a.py", "a", 1));
            assert_eq!(runtime.code(id).unwrap().filename, "a.py");
        }
    }
}
