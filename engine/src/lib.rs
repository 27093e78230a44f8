//! Core engine for Stageflow - cooperative scheduler and mode lifecycle.
//!
//! A non-preemptive, tick-driven action scheduler layered under a
//! Begin/Idle/End mode state machine. Application modes implement
//! [`ModeState`] and perform timed or multi-tick work by pushing entries;
//! blocking entries emulate suspension by being re-polled every tick until
//! their completion callback fires or their condition becomes true. Everything
//! runs on one logical executor; the types here are deliberately not `Send`.

mod config;
mod diag;
mod entry;
mod notify;
mod scheduler;
mod state;
mod tick;


pub use config::SchedulerConfig;
pub use diag::{CallSiteCollector, EntryTrace, TraceCollector};
pub use entry::{CompletionHandle, EntrySnapshot};
pub use notify::StateChange;
pub use scheduler::{PhaseCtx, Scheduler, Transition};
pub use state::ModeState;
pub use tick::{CountedTicks, FixedStep, TickDriver, TickSource};

// Re-export the domain types so downstream crates only need one dependency.
pub use stageflow_types::{
    CatalogError, EntryStatus, Phase, ScheduleError, StateTag, SyncId, TransitionError,
};
