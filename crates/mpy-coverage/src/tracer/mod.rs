//! Trace recorder
//!
//! The tracer arms a [`Recorder`] on a [`TraceRuntime`] and hands back a
//! [`SessionHandle`]. While armed, every line event of a traced file is
//! recorded; stopping removes the hook and freezes the data into a
//! read-only [`Session`].
//!
//! ```text
//!   start()          stop(handle)
//! Idle ────────▶ Armed ─────────────▶ Stopped
//!                  ▲                      │
//!                  └────── start() ───────┘  (fresh session)
//! ```
//!
//! At most one session is armed per tracer, and a runtime accepts a single
//! hook, so two tracers cannot arm the same runtime either.

mod event;
mod filter;
mod recorder;
mod runtime;
mod session;

pub use event::{
    arc_endpoint, ArcEdge, CodeId, CodeInfo, EventKind, LineHook, LineNo, TraceEvent,
    ARC_SENTINEL,
};
pub use filter::{FileFilter, TRACER_MODULE};
pub use recorder::Recorder;
pub use runtime::{ReplayRuntime, ReplayScript, ReplayStep, SharedHook, TraceRuntime};
pub use session::{ArcMap, LineMap, Session, SessionConfig, SessionId};

use crate::export::{self, CoverageDocument, Destination, ExportOutcome};
use crate::result::{CoverageError, CoverageResult};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{info, warn};

/// Lifecycle state of a tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerState {
    /// Nothing recorded yet
    Idle,
    /// A session is recording
    Armed,
    /// The last session is frozen and readable
    Stopped,
}

/// Proof of an armed session, consumed by [`Tracer::stop`]
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an armed session stays armed until its handle is passed to stop()"]
pub struct SessionHandle {
    id: SessionId,
}

impl SessionHandle {
    /// Session this handle arms
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }
}

#[derive(Debug)]
struct ActiveSession {
    id: SessionId,
    recorder: Rc<RefCell<Recorder>>,
}

/// Coverage tracer bound to one runtime
#[derive(Debug)]
pub struct Tracer<R: TraceRuntime> {
    runtime: R,
    active: Option<ActiveSession>,
    finished: Option<Session>,
    next_id: u64,
}

impl<R: TraceRuntime> Tracer<R> {
    /// Create an idle tracer
    #[must_use]
    pub const fn new(runtime: R) -> Self {
        Self {
            runtime,
            active: None,
            finished: None,
            next_id: 0,
        }
    }

    /// The traced runtime
    #[must_use]
    pub const fn runtime(&self) -> &R {
        &self.runtime
    }

    /// The traced runtime, mutably (to execute code while armed)
    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    /// Disarm if needed and give the runtime back
    #[must_use]
    pub fn into_runtime(mut self) -> R {
        if let Some(session) = self.disarm() {
            warn!(
                session = session.id().as_u64(),
                lines = session.line_count(),
                "tracer released while armed; session data discarded"
            );
        }
        self.runtime
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> TracerState {
        match (&self.active, &self.finished) {
            (Some(_), _) => TracerState::Armed,
            (None, Some(_)) => TracerState::Stopped,
            (None, None) => TracerState::Idle,
        }
    }

    /// Arm a fresh session
    ///
    /// # Errors
    ///
    /// - [`CoverageError::AlreadyArmed`] if this tracer already records
    /// - [`CoverageError::TracingUnsupported`] if the runtime has no trace support
    /// - [`CoverageError::HookOccupied`] if the runtime carries another hook
    pub fn start(&mut self, config: SessionConfig) -> CoverageResult<SessionHandle> {
        if let Some(active) = &self.active {
            return Err(CoverageError::AlreadyArmed {
                active: active.id.as_u64(),
            });
        }
        if !self.runtime.supports_tracing() {
            return Err(CoverageError::TracingUnsupported);
        }
        if self.runtime.has_hook() {
            return Err(CoverageError::HookOccupied);
        }

        let id = SessionId::new(self.next_id + 1);
        let recorder = Rc::new(RefCell::new(Recorder::new(id, config)));
        let hook: SharedHook = recorder.clone();
        self.runtime.install_hook(hook)?;

        self.next_id = id.as_u64();
        self.finished = None;
        self.active = Some(ActiveSession { id, recorder });
        info!(session = id.as_u64(), "coverage session armed");
        Ok(SessionHandle { id })
    }

    /// Stop the armed session and freeze its data
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::NotArmed`] when nothing is armed and
    /// [`CoverageError::StaleSession`] when `handle` belongs to another
    /// session.
    pub fn stop(&mut self, handle: SessionHandle) -> CoverageResult<&Session> {
        match &self.active {
            None => return Err(CoverageError::NotArmed),
            Some(active) if active.id != handle.id => {
                return Err(CoverageError::StaleSession {
                    handle: handle.id.as_u64(),
                });
            }
            Some(_) => {}
        }
        let session = self.disarm().ok_or(CoverageError::NotArmed)?;
        info!(
            session = session.id().as_u64(),
            files = session.file_count(),
            lines = session.line_count(),
            "coverage session stopped"
        );
        Ok(self.finished.insert(session))
    }

    /// Data of the current session: a snapshot while armed, the frozen
    /// session once stopped
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::NotArmed`] if no session was ever started.
    pub fn get_data(&self) -> CoverageResult<Session> {
        if let Some(active) = &self.active {
            return Ok(active.recorder.borrow().snapshot());
        }
        self.finished.clone().ok_or(CoverageError::NotArmed)
    }

    /// The stopped session, if any
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.finished.as_ref()
    }

    /// Serialize the current session to `destination`
    ///
    /// # Errors
    ///
    /// Returns an error if there is no session or the write fails.
    pub fn export_json(&self, destination: &Destination) -> CoverageResult<ExportOutcome> {
        let session = self.get_data()?;
        export::export_json(&CoverageDocument::from_session(&session), destination)
    }

    /// Arm a session tied to the returned scope; dropping the scope disarms
    ///
    /// # Errors
    ///
    /// Same as [`Tracer::start`].
    pub fn scope(&mut self, config: SessionConfig) -> CoverageResult<TraceScope<'_, R>> {
        let handle = self.start(config)?;
        Ok(TraceScope {
            tracer: self,
            handle: Some(handle),
        })
    }

    /// Run `body` with a session armed and return its result with the session
    ///
    /// The hook is removed even if `body` panics.
    ///
    /// # Errors
    ///
    /// Same as [`Tracer::start`].
    pub fn scoped<T>(
        &mut self,
        config: SessionConfig,
        body: impl FnOnce(&mut R) -> T,
    ) -> CoverageResult<(T, Session)> {
        let mut scope = self.scope(config)?;
        let value = body(scope.runtime());
        let session = scope.finish()?;
        Ok((value, session))
    }

    fn disarm(&mut self) -> Option<Session> {
        let active = self.active.take()?;
        drop(self.runtime.remove_hook());
        let session = match Rc::try_unwrap(active.recorder) {
            Ok(cell) => cell.into_inner().freeze(),
            Err(shared) => {
                warn!(
                    session = active.id.as_u64(),
                    "runtime kept a reference to the line hook after removal"
                );
                let recorder = shared.borrow().clone();
                recorder.freeze()
            }
        };
        Some(session)
    }
}

/// Armed session bound to a lexical scope
#[derive(Debug)]
pub struct TraceScope<'a, R: TraceRuntime> {
    tracer: &'a mut Tracer<R>,
    handle: Option<SessionHandle>,
}

impl<R: TraceRuntime> TraceScope<'_, R> {
    /// The traced runtime
    pub fn runtime(&mut self) -> &mut R {
        self.tracer.runtime_mut()
    }

    /// Snapshot of the data recorded so far
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::NotArmed`] if the session was already stopped.
    pub fn snapshot(&self) -> CoverageResult<Session> {
        self.tracer.get_data()
    }

    /// Stop the session and return its data
    ///
    /// # Errors
    ///
    /// Returns an error if the session was already stopped.
    pub fn finish(mut self) -> CoverageResult<Session> {
        let handle = self.handle.take().ok_or(CoverageError::NotArmed)?;
        self.tracer.stop(handle).cloned()
    }
}

impl<R: TraceRuntime> Drop for TraceScope<'_, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.tracer.stop(handle) {
                warn!(error = %err, "failed to disarm coverage scope");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn tracer() -> Tracer<ReplayRuntime> {
        Tracer::new(ReplayRuntime::new())
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_idle_armed_stopped() {
            let mut tracer = tracer();
            assert_eq!(tracer.state(), TracerState::Idle);

            let handle = tracer.start(SessionConfig::new()).unwrap();
            assert_eq!(tracer.state(), TracerState::Armed);
            assert!(tracer.runtime().has_hook());

            tracer.stop(handle).unwrap();
            assert_eq!(tracer.state(), TracerState::Stopped);
            assert!(!tracer.runtime().has_hook());
        }

        #[test]
        fn test_second_start_is_configuration_error() {
            let mut tracer = tracer();
            let _handle = tracer.start(SessionConfig::new()).unwrap();
            let err = tracer.start(SessionConfig::new()).unwrap_err();
            assert!(matches!(err, CoverageError::AlreadyArmed { active: 1 }));
            assert!(err.is_configuration());
        }

        #[test]
        fn test_unsupported_runtime_fails_immediately() {
            let mut tracer = Tracer::new(ReplayRuntime::without_trace_support());
            let err = tracer.start(SessionConfig::new()).unwrap_err();
            assert!(matches!(err, CoverageError::TracingUnsupported));
            assert_eq!(tracer.state(), TracerState::Idle);
        }

        #[test]
        fn test_occupied_runtime_rejects_second_tracer() {
            let mut first = tracer();
            let _handle = first.start(SessionConfig::new()).unwrap();
            let runtime = first.into_runtime();
            assert!(!runtime.has_hook());

            let mut runtime = runtime;
            let foreign: SharedHook =
                Rc::new(RefCell::new(Recorder::new(SessionId::new(9), SessionConfig::new())));
            runtime.install_hook(foreign).unwrap();
            let mut second = Tracer::new(runtime);
            let err = second.start(SessionConfig::new()).unwrap_err();
            assert!(matches!(err, CoverageError::HookOccupied));
        }

        #[test]
        fn test_release_while_armed_removes_hook() {
            let mut tracer = tracer();
            let f = tracer.runtime_mut().define("app.py", "f", 1, &[]);
            let _handle = tracer.start(SessionConfig::new()).unwrap();
            tracer.runtime_mut().call(f, &[1]).unwrap();

            let mut runtime = tracer.into_runtime();
            assert!(!runtime.has_hook());
            runtime.call(f, &[2]).unwrap();

            let mut again = Tracer::new(runtime);
            let handle = again.start(SessionConfig::new()).unwrap();
            assert_eq!(handle.id(), SessionId::new(1));
            assert_eq!(again.stop(handle).unwrap().line_count(), 0);
        }

        #[test]
        fn test_stale_handle_is_rejected() {
            let mut tracer = tracer();
            let first = tracer.start(SessionConfig::new()).unwrap();
            tracer.stop(first).unwrap();
            let _second = tracer.start(SessionConfig::new()).unwrap();

            let forged = SessionHandle {
                id: SessionId::new(1),
            };
            let err = tracer.stop(forged).unwrap_err();
            assert!(matches!(err, CoverageError::StaleSession { handle: 1 }));
        }

        #[test]
        fn test_restart_creates_fresh_session() {
            let mut tracer = tracer();
            let f = tracer.runtime_mut().define("app.py", "f", 1, &[]);

            let handle = tracer.start(SessionConfig::new()).unwrap();
            tracer.runtime_mut().call(f, &[1, 2]).unwrap();
            tracer.stop(handle).unwrap();

            let handle = tracer.start(SessionConfig::new()).unwrap();
            tracer.runtime_mut().call(f, &[3]).unwrap();
            let session = tracer.stop(handle).unwrap();

            assert_eq!(session.id(), SessionId::new(2));
            assert_eq!(session.executed_lines("app.py"), Some(&BTreeSet::from([3])));
        }
    }

    mod data_tests {
        use super::*;

        #[test]
        fn test_get_data_while_armed_and_after_stop() {
            let mut tracer = tracer();
            assert!(matches!(tracer.get_data(), Err(CoverageError::NotArmed)));

            let f = tracer.runtime_mut().define("app.py", "f", 1, &[]);
            let handle = tracer.start(SessionConfig::new()).unwrap();
            tracer.runtime_mut().call(f, &[1]).unwrap();
            assert_eq!(tracer.get_data().unwrap().line_count(), 1);

            tracer.runtime_mut().call(f, &[2]).unwrap();
            tracer.stop(handle).unwrap();
            assert_eq!(tracer.get_data().unwrap().line_count(), 2);
        }

        #[test]
        fn test_events_after_stop_are_not_recorded() {
            let mut tracer = tracer();
            let f = tracer.runtime_mut().define("app.py", "f", 1, &[]);
            let handle = tracer.start(SessionConfig::new()).unwrap();
            tracer.runtime_mut().call(f, &[1]).unwrap();
            tracer.stop(handle).unwrap();
            tracer.runtime_mut().call(f, &[5]).unwrap();

            let lines = tracer.session().unwrap().executed_lines("app.py").unwrap();
            assert!(!lines.contains(&5));
        }

        #[test]
        fn test_arc_sentinels_for_function_at_line_ten() {
            let mut tracer = tracer();
            let f = tracer.runtime_mut().define("app.py", "f", 9, &[]);
            let config = SessionConfig::new().with_arcs(true);
            let ((), session) = tracer
                .scoped(config, |runtime| runtime.call(f, &[10, 11, 12]).unwrap())
                .unwrap();

            let arcs = session.arcs_for("app.py").unwrap();
            assert!(arcs.contains(&(ARC_SENTINEL, 10)));
            assert!(arcs.contains(&(12, ARC_SENTINEL)));
        }
    }

    mod scope_tests {
        use super::*;
        use std::panic::{catch_unwind, AssertUnwindSafe};

        #[test]
        fn test_dropped_scope_disarms() {
            let mut tracer = tracer();
            {
                let mut scope = tracer.scope(SessionConfig::new()).unwrap();
                assert!(scope.runtime().has_hook());
            }
            assert!(!tracer.runtime().has_hook());
            assert_eq!(tracer.state(), TracerState::Stopped);
        }

        #[test]
        fn test_hook_removed_when_traced_code_panics() {
            let mut tracer = tracer();
            let f = tracer.runtime_mut().define("app.py", "f", 1, &[]);

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                tracer.scoped(SessionConfig::new(), |runtime| {
                    runtime.call(f, &[1]).unwrap();
                    panic!("traced code aborted");
                })
            }));

            assert!(outcome.is_err());
            assert!(!tracer.runtime().has_hook());
            let session = tracer.session().unwrap();
            assert_eq!(session.executed_lines("app.py"), Some(&BTreeSet::from([1])));
        }

        #[test]
        fn test_traced_exception_still_records_lines() {
            let mut tracer = tracer();
            let f = tracer.runtime_mut().define("app.py", "f", 1, &[]);
            let (result, session) = tracer
                .scoped(SessionConfig::new(), |runtime| {
                    runtime.enter(f)?;
                    runtime.line(1)?;
                    runtime.raise_exception()?;
                    runtime.leave()
                })
                .unwrap();

            assert!(result.is_ok());
            assert_eq!(session.line_count(), 1);
        }
    }
}
