//! The mode state protocol and the scheduler's transition slot.

use stageflow_types::{Phase, StateTag};

use crate::scheduler::PhaseCtx;

/// Contract implemented by each application mode.
///
/// The payload type `P` is the application's tagged union of per-mode entry
/// data; each state accepts exactly one variant and matches on it
/// exhaustively.
pub trait ModeState<P> {
    /// Identity of this state; unique within a catalog.
    fn tag(&self) -> StateTag;

    /// Acceptance predicate used by transition resolution. Resolution walks
    /// the catalog in registration order and first match wins.
    fn accepts(&self, payload: &P) -> bool;

    /// Called with the accepted payload before `Begin` fires. An error here
    /// aborts the activation.
    fn initialize(&mut self, payload: &P) -> anyhow::Result<()> {
        let _ = payload;
        Ok(())
    }

    /// Phase hook. `Begin` and `End` fire once per activation; `Idle` fires
    /// every tick in between. Timed or multi-tick work belongs in entries
    /// pushed through `ctx`, never in a loop here.
    fn on_phase(&mut self, phase: Phase, ctx: &mut PhaseCtx<'_, P>) {
        let _ = (phase, ctx);
    }
}

/// The state activation currently driving callbacks.
#[derive(Debug)]
pub(crate) struct Activation<P> {
    /// Index into the scheduler's state catalog.
    pub(crate) index: usize,
    pub(crate) tag: StateTag,
    pub(crate) phase: Phase,
    pub(crate) payload: P,
}

/// A resolved transition that has not yet swapped in.
#[derive(Debug)]
pub(crate) struct PendingTransition<P> {
    pub(crate) index: usize,
    pub(crate) tag: StateTag,
    pub(crate) payload: P,
}

/// Current and pending activation records.
///
/// `pending` is populated only while a transition is outstanding; once a
/// transition completes it is cleared, so "pending references the same state
/// as current" is encoded as `None`.
#[derive(Debug)]
pub(crate) struct TransitionSlot<P> {
    pub(crate) current: Option<Activation<P>>,
    pub(crate) pending: Option<PendingTransition<P>>,
}

impl<P> TransitionSlot<P> {
    pub(crate) fn new() -> Self {
        Self {
            current: None,
            pending: None,
        }
    }
}
