//! Trace recorder: the line hook that accumulates a session.
//!
//! The recorder keeps one frame per open call. Frames of filtered files
//! are kept too (marked untraced) so that returns always pop the frame they
//! belong to. Arcs are built per frame: the first line of a frame is entered
//! from [`ARC_SENTINEL`], and the last line before a return exits to it.

use super::event::{arc_endpoint, CodeId, EventKind, LineHook, LineNo, TraceEvent, ARC_SENTINEL};
use super::session::{ArcMap, LineMap, Session, SessionConfig, SessionId};
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Copy)]
struct Frame {
    traced: bool,
    last_line: Option<LineNo>,
}

/// Accumulates executed lines, arcs and line tables while armed
#[derive(Debug, Clone)]
pub struct Recorder {
    id: SessionId,
    config: SessionConfig,
    executed: LineMap,
    executable: LineMap,
    arcs: ArcMap,
    frames: Vec<Frame>,
    seen_codes: HashSet<CodeId>,
}

impl Recorder {
    /// Create an empty recorder for a fresh session
    #[must_use]
    pub fn new(id: SessionId, config: SessionConfig) -> Self {
        Self {
            id,
            config,
            executed: LineMap::new(),
            executable: LineMap::new(),
            arcs: ArcMap::new(),
            frames: Vec::new(),
            seen_codes: HashSet::new(),
        }
    }

    /// Session identifier
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Current call depth as seen by the recorder
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Copy of the data recorded so far
    #[must_use]
    pub fn snapshot(&self) -> Session {
        Session::new(
            self.id,
            self.config.clone(),
            self.executed.clone(),
            self.executable.clone(),
            self.arcs.clone(),
        )
    }

    /// Freeze the recorder into a read-only session
    #[must_use]
    pub fn freeze(self) -> Session {
        Session::new(
            self.id,
            self.config,
            self.executed,
            self.executable,
            self.arcs,
        )
    }

    fn on_call(&mut self, event: &TraceEvent<'_>) {
        let code = event.code;
        let traced = self.config.filter.should_trace(&code.filename);
        self.frames.push(Frame {
            traced,
            last_line: None,
        });

        if traced && self.config.collect_executable && self.seen_codes.insert(code.id) {
            self.executable
                .entry(code.filename.clone())
                .or_default()
                .extend(code.executable_lines());
        }
    }

    fn on_line(&mut self, event: &TraceEvent<'_>) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if !frame.traced || event.line == 0 {
            return;
        }

        let file = event.code.filename.as_str();
        insert_into(&mut self.executed, file, event.line);

        if self.config.collect_arcs {
            let from = frame.last_line.map_or(ARC_SENTINEL, arc_endpoint);
            insert_into(&mut self.arcs, file, (from, arc_endpoint(event.line)));
        }
        frame.last_line = Some(event.line);
    }

    fn on_return(&mut self, event: &TraceEvent<'_>) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if !frame.traced || !self.config.collect_arcs {
            return;
        }
        if let Some(last) = frame.last_line {
            insert_into(
                &mut self.arcs,
                &event.code.filename,
                (arc_endpoint(last), ARC_SENTINEL),
            );
        }
    }
}

impl LineHook for Recorder {
    fn on_event(&mut self, event: &TraceEvent<'_>) {
        match event.kind {
            EventKind::Call => self.on_call(event),
            EventKind::Line => self.on_line(event),
            EventKind::Return => self.on_return(event),
            EventKind::Exception => {}
        }
    }
}

fn insert_into<T: Ord>(map: &mut BTreeMap<String, BTreeSet<T>>, file: &str, value: T) {
    match map.get_mut(file) {
        Some(set) => {
            set.insert(value);
        }
        None => {
            map.insert(file.to_owned(), BTreeSet::from([value]));
        }
    }
}
