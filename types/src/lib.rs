//! Core domain types for Stageflow.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Lifecycle Phase
// ============================================================================

/// Lifecycle phase within a single mode activation.
///
/// `Begin` and `End` fire exactly once per activation; `Idle` repeats every
/// tick between them. The only observable order is `Begin`, then `Idle` zero
/// or more times, then `End`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Begin,
    Idle,
    End,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Idle => "idle",
            Self::End => "end",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Identity Newtypes
// ============================================================================

/// Identity of a registered mode state.
///
/// Used purely as a key into the state catalog; it never carries payload
/// data. Tags are expected to be unique within a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StateTag(&'static str);

impl StateTag {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Synchronization-group label for blocking entries.
///
/// Blocking entries sharing a `SyncId` execute independently of each other,
/// while the group as a whole still blocks unrelated later entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SyncId(&'static str);

impl SyncId {
    #[must_use]
    pub const fn new(label: &'static str) -> Self {
        Self(label)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

// ============================================================================
// Entry Status
// ============================================================================

/// Diagnostic status of a live entry.
///
/// Purely observational: the scheduler never reads this back for control
/// decisions. Exposed through live-entry snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Pushed this tick; promoted into the live set on the next tick.
    Queued,
    /// Target state is the pending transition target; retained until it arrives.
    Waiting,
    /// Work executed this tick.
    Calling,
    /// This entry is the one holding the tick open.
    Blocking,
    /// Skipped because an earlier entry is blocking.
    Blocked,
}

impl EntryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Waiting => "waiting",
            Self::Calling => "calling",
            Self::Blocking => "blocking",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Failure constructing a scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("state catalog must contain at least one state")]
    Empty,
    #[error("state catalog registers tag {0} more than once")]
    DuplicateTag(StateTag),
}

/// Failure requesting a mode transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// No registered state accepts the payload.
    #[error("no registered state accepts the requested payload")]
    NoAcceptingState,
    /// A different transition is already outstanding.
    #[error("transition to {requested} rejected: transition to {pending} already outstanding")]
    Concurrent {
        requested: StateTag,
        pending: StateTag,
    },
    /// The accepting state rejected its payload during initialization.
    #[error("state {state} failed to initialize: {message}")]
    InitializeFailed { state: StateTag, message: String },
}

/// Failure scheduling an entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Entries bind to the current (state, phase); without a current state
    /// there is nothing to bind to.
    #[error("cannot schedule work: no state is currently active")]
    NoCurrentState,
}
