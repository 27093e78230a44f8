//! The cooperative scheduler core and its per-tick algorithm.
//!
//! Strictly single-threaded and non-preemptive: one external driver invokes
//! [`Scheduler::tick`] once per tick, and every mutation of the entry lists
//! and the transition slot happens synchronously inside that call (or inside
//! the public push/request methods between ticks). Suspension is emulated by
//! re-polling blocking entries each tick; nothing here ever parks a thread.

use std::mem;
use std::panic::Location;

use stageflow_types::{
    CatalogError, EntryStatus, Phase, ScheduleError, StateTag, SyncId, TransitionError,
};

use crate::config::SchedulerConfig;
use crate::diag;
use crate::entry::{EntrySnapshot, ExecOutcome, LiveEntry};
use crate::notify::{Listeners, StateChange};
use crate::state::{Activation, ModeState, PendingTransition, TransitionSlot};

/// Result of a transition request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A transition is now outstanding; for the very first request the
    /// target's `Begin` phase has already fired synchronously.
    Started,
    /// The target is already the current state; nothing to do.
    AlreadyCurrent,
    /// The target is already the pending transition target; nothing to do.
    AlreadyPending,
}

/// Cooperative action scheduler and mode lifecycle controller.
///
/// Owns a fixed catalog of [`ModeState`]s, the live/queued entry lists, and
/// the transition slot. `P` is the application's payload type - normally an
/// enum with one variant per mode.
pub struct Scheduler<P: 'static> {
    states: Vec<Box<dyn ModeState<P>>>,
    slot: TransitionSlot<P>,
    live: Vec<LiveEntry>,
    queued: Vec<LiveEntry>,
    /// Transition requests staged by phase callbacks, applied afterwards.
    staged_requests: Vec<P>,
    listeners: Listeners<P>,
    config: SchedulerConfig,
    ticks: u64,
}

impl<P: 'static> Scheduler<P> {
    /// Creates a scheduler over a fixed state catalog.
    ///
    /// Registration order is significant: transition resolution walks the
    /// catalog in this order and the first accepting state wins.
    pub fn new(
        states: Vec<Box<dyn ModeState<P>>>,
        config: SchedulerConfig,
    ) -> Result<Self, CatalogError> {
        if states.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (i, state) in states.iter().enumerate() {
            let tag = state.tag();
            if states[..i].iter().any(|earlier| earlier.tag() == tag) {
                return Err(CatalogError::DuplicateTag(tag));
            }
        }
        Ok(Self {
            states,
            slot: TransitionSlot::new(),
            live: Vec::new(),
            queued: Vec::new(),
            staged_requests: Vec::new(),
            listeners: Listeners::new(),
            config,
            ticks: 0,
        })
    }

    // ------------------------------------------------------------------
    // Transition requests
    // ------------------------------------------------------------------

    /// Requests a transition to the first registered state accepting
    /// `payload`.
    ///
    /// At most one transition can be outstanding: a request for a different
    /// target while one is pending is rejected, while re-requesting the
    /// current or pending target is a no-op. When no state has ever been
    /// activated the target's `Begin` phase fires synchronously inside this
    /// call.
    pub fn request_transition(&mut self, payload: P) -> Result<Transition, TransitionError> {
        let index = self
            .resolve(&payload)
            .ok_or(TransitionError::NoAcceptingState)?;
        let tag = self.states[index].tag();

        if let Some(pending) = &self.slot.pending {
            if pending.tag == tag {
                return Ok(Transition::AlreadyPending);
            }
            return Err(TransitionError::Concurrent {
                requested: tag,
                pending: pending.tag,
            });
        }

        if let Some(current) = &self.slot.current {
            if current.tag == tag {
                return Ok(Transition::AlreadyCurrent);
            }
            tracing::debug!(from = %current.tag, to = %tag, "transition pending");
            self.slot.pending = Some(PendingTransition {
                index,
                tag,
                payload,
            });
            return Ok(Transition::Started);
        }

        // First activation ever: begin synchronously.
        if let Err(err) = self.states[index].initialize(&payload) {
            return Err(TransitionError::InitializeFailed {
                state: tag,
                message: format!("{err:#}"),
            });
        }
        self.slot.current = Some(Activation {
            index,
            tag,
            phase: Phase::Begin,
            payload,
        });
        self.fire_phase(Phase::Begin, true);
        Ok(Transition::Started)
    }

    /// First-match-wins resolution over the catalog.
    fn resolve(&self, payload: &P) -> Option<usize> {
        self.states.iter().position(|state| state.accepts(payload))
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Enqueues a non-blocking action bound to the current (state, phase).
    #[track_caller]
    pub fn push_action(
        &mut self,
        work: impl FnMut() -> anyhow::Result<()> + 'static,
    ) -> Result<(), ScheduleError> {
        self.push_action_with(work, false, None)
    }

    /// Enqueues a non-blocking action with an explicit repeat flag and
    /// synchronization group.
    #[track_caller]
    pub fn push_action_with(
        &mut self,
        work: impl FnMut() -> anyhow::Result<()> + 'static,
        repeating: bool,
        sync_id: Option<SyncId>,
    ) -> Result<(), ScheduleError> {
        let origin = Location::caller();
        let (tag, phase) = self.binding()?;
        let trace = diag::capture(&self.config, origin);
        self.queued
            .push(LiveEntry::action(tag, phase, Box::new(work), repeating, sync_id, trace));
        Ok(())
    }

    /// Enqueues a blocking entry; it stays outstanding (and gates every entry
    /// scheduled after it) until the handle passed to `work` fires.
    #[track_caller]
    pub fn push_blocking_action(
        &mut self,
        work: impl FnOnce(crate::CompletionHandle) -> anyhow::Result<()> + 'static,
    ) -> Result<(), ScheduleError> {
        self.push_blocking_action_with(work, None)
    }

    #[track_caller]
    pub fn push_blocking_action_with(
        &mut self,
        work: impl FnOnce(crate::CompletionHandle) -> anyhow::Result<()> + 'static,
        sync_id: Option<SyncId>,
    ) -> Result<(), ScheduleError> {
        let origin = Location::caller();
        let (tag, phase) = self.binding()?;
        let trace = diag::capture(&self.config, origin);
        self.queued
            .push(LiveEntry::blocking(tag, phase, Box::new(work), sync_id, trace));
        Ok(())
    }

    /// Enqueues a blocking entry that runs `work` once and then suspends
    /// until `until` returns true, polled once per tick.
    #[track_caller]
    pub fn push_blocking_until(
        &mut self,
        work: impl FnOnce() -> anyhow::Result<()> + 'static,
        until: impl FnMut() -> bool + 'static,
    ) -> Result<(), ScheduleError> {
        self.push_blocking_until_with(work, until, None)
    }

    #[track_caller]
    pub fn push_blocking_until_with(
        &mut self,
        work: impl FnOnce() -> anyhow::Result<()> + 'static,
        until: impl FnMut() -> bool + 'static,
        sync_id: Option<SyncId>,
    ) -> Result<(), ScheduleError> {
        let origin = Location::caller();
        let (tag, phase) = self.binding()?;
        let trace = diag::capture(&self.config, origin);
        self.queued.push(LiveEntry::blocking_until(
            tag,
            phase,
            Box::new(work),
            Box::new(until),
            sync_id,
            trace,
        ));
        Ok(())
    }

    fn binding(&self) -> Result<(StateTag, Phase), ScheduleError> {
        self.slot
            .current
            .as_ref()
            .map(|current| (current.tag, current.phase))
            .ok_or(ScheduleError::NoCurrentState)
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Registers a listener invoked synchronously on every phase transition.
    ///
    /// A listener must not re-enter [`Scheduler::request_transition`] through
    /// a captured handle; stage follow-up requests from application code
    /// instead.
    pub fn on_state_change(&mut self, listener: impl FnMut(&StateChange<'_, P>) + 'static) {
        self.listeners.subscribe(listener);
    }

    #[must_use]
    pub fn current_state(&self) -> Option<StateTag> {
        self.slot.current.as_ref().map(|current| current.tag)
    }

    #[must_use]
    pub fn current_phase(&self) -> Option<Phase> {
        self.slot.current.as_ref().map(|current| current.phase)
    }

    /// Target of the outstanding transition, if any.
    #[must_use]
    pub fn pending_state(&self) -> Option<StateTag> {
        self.slot.pending.as_ref().map(|pending| pending.tag)
    }

    #[must_use]
    pub fn is(&self, tag: StateTag, phase: Phase) -> bool {
        self.slot
            .current
            .as_ref()
            .is_some_and(|current| current.tag == tag && current.phase == phase)
    }

    /// Read-only snapshots of the live set followed by the not-yet-promoted
    /// queue.
    #[must_use]
    pub fn live_entries(&self) -> Vec<EntrySnapshot> {
        self.live
            .iter()
            .chain(self.queued.iter())
            .map(LiveEntry::snapshot)
            .collect()
    }

    /// Ticks elapsed since construction.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    // ------------------------------------------------------------------
    // The tick
    // ------------------------------------------------------------------

    /// Runs one scheduler tick: promote queued entries, execute the live set
    /// under blocking/synchronization rules, then - only if nothing blocked -
    /// advance the lifecycle phase.
    pub fn tick(&mut self) {
        self.ticks += 1;

        // 1. Promote queued entries into the live set, preserving FIFO order.
        if !self.queued.is_empty() {
            let promoted = mem::take(&mut self.queued);
            tracing::debug!(count = promoted.len(), tick = self.ticks, "promoting queued entries");
            self.live.extend(promoted);
        }

        // 2. Walk the live set in scheduling order.
        let current = self
            .slot
            .current
            .as_ref()
            .map(|current| (current.tag, current.phase));
        let pending_tag = self.slot.pending.as_ref().map(|pending| pending.tag);

        let mut blocked = false;
        let mut blocking_sync: Option<SyncId> = None;
        let mut retained = Vec::with_capacity(self.live.len());

        for mut entry in mem::take(&mut self.live) {
            // An earlier blocker gates this entry unless it shares the
            // blocker's synchronization group.
            if blocked && blocking_sync.is_none_or(|sync| entry.sync_id != Some(sync)) {
                entry.status = EntryStatus::Blocked;
                retained.push(entry);
                continue;
            }

            let Some((current_tag, current_phase)) = current else {
                tracing::warn!(state = %entry.tag, "dropping entry: no state is active");
                continue;
            };

            if entry.tag != current_tag {
                if Some(entry.tag) == pending_tag {
                    // Target state hasn't arrived yet; hold the entry.
                    entry.status = EntryStatus::Waiting;
                    retained.push(entry);
                } else {
                    tracing::warn!(
                        state = %entry.tag,
                        phase = %entry.phase,
                        "dropping entry bound to a departed state"
                    );
                }
                continue;
            }

            if entry.phase != current_phase {
                tracing::debug!(
                    state = %entry.tag,
                    phase = %entry.phase,
                    "dropping entry bound to a completed phase"
                );
                continue;
            }

            match entry.execute() {
                ExecOutcome::Done => {}
                ExecOutcome::Retain => {
                    retained.push(entry);
                }
                ExecOutcome::Blocked => {
                    blocked = true;
                    blocking_sync = entry.sync_id;
                    entry.status = EntryStatus::Blocking;
                    retained.push(entry);
                }
            }
        }

        // 3. The retained entries become the new live set.
        self.live = retained;

        // 4. A blocked tick never advances the phase.
        if blocked {
            return;
        }

        // 5./6. Advance the lifecycle.
        self.advance_phase();
    }

    fn advance_phase(&mut self) {
        let Some(phase) = self.slot.current.as_ref().map(|current| current.phase) else {
            return;
        };
        let transition_pending = self.slot.pending.is_some();

        match (phase, transition_pending) {
            (Phase::Begin, _) => {
                self.set_phase(Phase::Idle);
                self.fire_phase(Phase::Idle, true);
            }
            (Phase::Idle, true) => {
                self.set_phase(Phase::End);
                self.fire_phase(Phase::End, true);
            }
            (Phase::Idle, false) => {
                // Idle repeats every tick; not a transition, so no broadcast.
                self.fire_phase(Phase::Idle, false);
            }
            (Phase::End, true) => {
                if let Some(pending) = self.slot.pending.take() {
                    self.swap_to(pending);
                }
            }
            (Phase::End, false) => {
                // Parked after an abandoned swap; already reported by
                // `swap_to`. A new transition request resumes the handoff.
            }
        }
    }

    /// Completes the two-tick handoff: the old state's End phase has already
    /// run (and drained), so the next state can come up.
    fn swap_to(&mut self, pending: PendingTransition<P>) {
        if let Err(err) = self.states[pending.index].initialize(&pending.payload) {
            tracing::error!(
                state = %pending.tag,
                error = %format!("{err:#}"),
                "state failed to initialize; transition abandoned, parking in End"
            );
            return;
        }
        let from = self.slot.current.as_ref().map(|current| current.tag);
        tracing::debug!(from = from.map(|tag| tag.as_str()), to = %pending.tag, "state swap");
        self.slot.current = Some(Activation {
            index: pending.index,
            tag: pending.tag,
            phase: Phase::Begin,
            payload: pending.payload,
        });
        self.fire_phase(Phase::Begin, true);
    }

    fn set_phase(&mut self, phase: Phase) {
        if let Some(current) = self.slot.current.as_mut() {
            current.phase = phase;
        }
    }

    /// Invokes the current state's phase hook, optionally broadcasts the
    /// change, then applies any transition requests the hook staged.
    fn fire_phase(&mut self, phase: Phase, broadcast: bool) {
        let Some((index, tag)) = self
            .slot
            .current
            .as_ref()
            .map(|current| (current.index, current.tag))
        else {
            tracing::warn!(phase = %phase, "phase fired with no current state");
            return;
        };

        let mut ctx = PhaseCtx {
            tag,
            phase,
            tick: self.ticks,
            queued: &mut self.queued,
            staged: &mut self.staged_requests,
            config: &self.config,
        };
        self.states[index].on_phase(phase, &mut ctx);

        if broadcast {
            if let Some(current) = self.slot.current.as_ref() {
                self.listeners.broadcast(&StateChange {
                    state: tag,
                    phase,
                    payload: &current.payload,
                });
            }
        }

        self.drain_staged_requests();
    }

    fn drain_staged_requests(&mut self) {
        while !self.staged_requests.is_empty() {
            let batch = mem::take(&mut self.staged_requests);
            for payload in batch {
                if let Err(err) = self.request_transition(payload) {
                    tracing::warn!(error = %err, "staged transition request rejected");
                }
            }
        }
    }
}

/// Scheduling surface handed to [`ModeState::on_phase`].
///
/// Pushes are bound to the (state, phase) that is running the hook, and
/// transition requests are staged and applied once the hook returns - which
/// is what makes re-entrant callback cycles structurally impossible.
pub struct PhaseCtx<'a, P> {
    tag: StateTag,
    phase: Phase,
    tick: u64,
    queued: &'a mut Vec<LiveEntry>,
    staged: &'a mut Vec<P>,
    config: &'a SchedulerConfig,
}

impl<P> PhaseCtx<'_, P> {
    #[must_use]
    pub fn state(&self) -> StateTag {
        self.tag
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Enqueues a non-blocking action bound to the running (state, phase).
    #[track_caller]
    pub fn push_action(&mut self, work: impl FnMut() -> anyhow::Result<()> + 'static) {
        self.push_action_with(work, false, None);
    }

    #[track_caller]
    pub fn push_action_with(
        &mut self,
        work: impl FnMut() -> anyhow::Result<()> + 'static,
        repeating: bool,
        sync_id: Option<SyncId>,
    ) {
        let trace = diag::capture(self.config, Location::caller());
        self.queued.push(LiveEntry::action(
            self.tag,
            self.phase,
            Box::new(work),
            repeating,
            sync_id,
            trace,
        ));
    }

    /// Enqueues a blocking entry outstanding until its handle fires.
    #[track_caller]
    pub fn push_blocking_action(
        &mut self,
        work: impl FnOnce(crate::CompletionHandle) -> anyhow::Result<()> + 'static,
    ) {
        self.push_blocking_action_with(work, None);
    }

    #[track_caller]
    pub fn push_blocking_action_with(
        &mut self,
        work: impl FnOnce(crate::CompletionHandle) -> anyhow::Result<()> + 'static,
        sync_id: Option<SyncId>,
    ) {
        let trace = diag::capture(self.config, Location::caller());
        self.queued.push(LiveEntry::blocking(
            self.tag,
            self.phase,
            Box::new(work),
            sync_id,
            trace,
        ));
    }

    /// Enqueues a blocking entry that runs `work` once and suspends until
    /// `until` is true, polled once per tick.
    #[track_caller]
    pub fn push_blocking_until(
        &mut self,
        work: impl FnOnce() -> anyhow::Result<()> + 'static,
        until: impl FnMut() -> bool + 'static,
    ) {
        self.push_blocking_until_with(work, until, None);
    }

    #[track_caller]
    pub fn push_blocking_until_with(
        &mut self,
        work: impl FnOnce() -> anyhow::Result<()> + 'static,
        until: impl FnMut() -> bool + 'static,
        sync_id: Option<SyncId>,
    ) {
        let trace = diag::capture(self.config, Location::caller());
        self.queued.push(LiveEntry::blocking_until(
            self.tag,
            self.phase,
            Box::new(work),
            Box::new(until),
            sync_id,
            trace,
        ));
    }

    /// Stages a transition request, applied after this hook returns.
    ///
    /// Failures (no accepting state, concurrent transition) are logged rather
    /// than returned; a hook has no caller to hand them to.
    pub fn request_transition(&mut self, payload: P) {
        self.staged.push(payload);
    }
}
