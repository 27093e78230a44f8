//! Scheduled units of work and their per-tick execution.
//!
//! An entry is bound to the (state, phase) pair that was current when it was
//! pushed. Non-blocking entries finish in the tick that runs them (unless
//! repeating); blocking entries stay outstanding - and gate everything
//! scheduled after them - until their completion callback fires or their
//! polled condition becomes true.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use serde::Serialize;

use stageflow_types::{EntryStatus, Phase, StateTag, SyncId};

use crate::diag::EntryTrace;

/// Non-blocking unit of work. Runs to completion within a single tick.
pub type ActionWork = Box<dyn FnMut() -> anyhow::Result<()>>;

/// Blocking unit of work. Receives a [`CompletionHandle`]; the entry stays
/// outstanding until some clone of that handle fires.
pub type BlockingWork = Box<dyn FnOnce(CompletionHandle) -> anyhow::Result<()>>;

/// One-shot work for the until-form of blocking entries.
pub type UntilWork = Box<dyn FnOnce() -> anyhow::Result<()>>;

/// Completion condition polled once per tick.
pub type UntilCondition = Box<dyn FnMut() -> bool>;

/// Completion callback handed to blocking work.
///
/// Cheap to clone; the owning entry completes once any clone calls
/// [`CompletionHandle::complete`]. Suspension state lives here rather than in
/// call-stack locals - the scheduler re-polls the flag every tick.
#[derive(Debug, Clone)]
pub struct CompletionHandle(Rc<Cell<bool>>);

impl CompletionHandle {
    pub(crate) fn new() -> Self {
        Self(Rc::new(Cell::new(false)))
    }

    /// Marks the owning blocking entry as finished.
    pub fn complete(&self) {
        self.0.set(true);
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.0.get()
    }
}

/// The work variant carried by an entry.
pub(crate) enum WorkKind {
    /// Always completes in the tick that runs it, unless repeating.
    Action { work: ActionWork, repeating: bool },
    /// Runs once, then stays outstanding until the handle fires.
    Blocking {
        work: Option<BlockingWork>,
        done: CompletionHandle,
    },
    /// Runs once, then stays outstanding until the condition is true.
    BlockingUntil {
        work: Option<UntilWork>,
        until: UntilCondition,
    },
}

impl fmt::Debug for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action { repeating, .. } => {
                f.debug_struct("Action").field("repeating", repeating).finish_non_exhaustive()
            }
            Self::Blocking { work, done } => f
                .debug_struct("Blocking")
                .field("ran", &work.is_none())
                .field("done", &done.is_complete())
                .finish_non_exhaustive(),
            Self::BlockingUntil { work, .. } => f
                .debug_struct("BlockingUntil")
                .field("ran", &work.is_none())
                .finish_non_exhaustive(),
        }
    }
}

/// Outcome of running an entry for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecOutcome {
    /// Finished; remove from the live set.
    Done,
    /// Repeating action; keep it for the next tick without blocking.
    Retain,
    /// Still outstanding; keep it and gate later entries.
    Blocked,
}

/// An entry in the scheduler's queued or live set.
#[derive(Debug)]
pub(crate) struct LiveEntry {
    pub(crate) tag: StateTag,
    pub(crate) phase: Phase,
    pub(crate) sync_id: Option<SyncId>,
    /// Diagnostic only; never read back for control decisions.
    pub(crate) status: EntryStatus,
    pub(crate) work: WorkKind,
    pub(crate) trace: Option<EntryTrace>,
}

impl LiveEntry {
    pub(crate) fn action(
        tag: StateTag,
        phase: Phase,
        work: ActionWork,
        repeating: bool,
        sync_id: Option<SyncId>,
        trace: Option<EntryTrace>,
    ) -> Self {
        Self {
            tag,
            phase,
            sync_id,
            status: EntryStatus::Queued,
            work: WorkKind::Action { work, repeating },
            trace,
        }
    }

    pub(crate) fn blocking(
        tag: StateTag,
        phase: Phase,
        work: BlockingWork,
        sync_id: Option<SyncId>,
        trace: Option<EntryTrace>,
    ) -> Self {
        Self {
            tag,
            phase,
            sync_id,
            status: EntryStatus::Queued,
            work: WorkKind::Blocking {
                work: Some(work),
                done: CompletionHandle::new(),
            },
            trace,
        }
    }

    pub(crate) fn blocking_until(
        tag: StateTag,
        phase: Phase,
        work: UntilWork,
        until: UntilCondition,
        sync_id: Option<SyncId>,
        trace: Option<EntryTrace>,
    ) -> Self {
        Self {
            tag,
            phase,
            sync_id,
            status: EntryStatus::Queued,
            work: WorkKind::BlockingUntil {
                work: Some(work),
                until,
            },
            trace,
        }
    }

    /// Runs (or re-polls) this entry for the current tick.
    ///
    /// Faults inside work - `Err` returns and panics alike - are caught here,
    /// logged, and never abort the tick. A faulted non-blocking action counts
    /// as done; faulted blocking work is never retried and the entry stays
    /// outstanding until its handle or condition resolves it.
    pub(crate) fn execute(&mut self) -> ExecOutcome {
        self.status = EntryStatus::Calling;
        match &mut self.work {
            WorkKind::Action { work, repeating } => {
                if let Err(fault) = run_caught(|| work()) {
                    tracing::warn!(
                        state = %self.tag,
                        phase = %self.phase,
                        fault = %fault,
                        "scheduled action failed; treating as complete"
                    );
                }
                if *repeating {
                    ExecOutcome::Retain
                } else {
                    ExecOutcome::Done
                }
            }
            WorkKind::Blocking { work, done } => {
                if let Some(work) = work.take() {
                    let handle = done.clone();
                    if let Err(fault) = run_caught(move || work(handle)) {
                        tracing::warn!(
                            state = %self.tag,
                            phase = %self.phase,
                            fault = %fault,
                            "blocking work failed; entry stays outstanding and is not retried"
                        );
                    }
                }
                if done.is_complete() {
                    ExecOutcome::Done
                } else {
                    ExecOutcome::Blocked
                }
            }
            WorkKind::BlockingUntil { work, until } => {
                if let Some(work) = work.take() {
                    if let Err(fault) = run_caught(work) {
                        tracing::warn!(
                            state = %self.tag,
                            phase = %self.phase,
                            fault = %fault,
                            "blocking work failed; completion condition still polled"
                        );
                    }
                }
                if until() {
                    ExecOutcome::Done
                } else {
                    ExecOutcome::Blocked
                }
            }
        }
    }

    pub(crate) fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            state: self.tag,
            phase: self.phase,
            status: self.status,
            blocking: matches!(
                self.work,
                WorkKind::Blocking { .. } | WorkKind::BlockingUntil { .. }
            ),
            sync_id: self.sync_id,
            trace: self.trace.clone(),
        }
    }
}

/// Read-only view of a queued or live entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub state: StateTag,
    pub phase: Phase,
    pub status: EntryStatus,
    pub blocking: bool,
    pub sync_id: Option<SyncId>,
    pub trace: Option<EntryTrace>,
}

/// Runs work at the execution boundary, converting both `Err` results and
/// panics into a loggable fault message.
fn run_caught(work: impl FnOnce() -> anyhow::Result<()>) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

/// Best-effort rendering of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
