//! Scheduler configuration.
//!
//! All diagnostics toggles are injected here at construction; there is no
//! ambient global state to flip at runtime.

use std::fmt;

use crate::diag::{CallSiteCollector, TraceCollector};

/// Options injected into [`crate::Scheduler::new`].
pub struct SchedulerConfig {
    /// Capture call-site traces for pushed entries. Off by default.
    pub capture_traces: bool,
    /// Collector used when `capture_traces` is set.
    pub collector: Box<dyn TraceCollector>,
}

impl SchedulerConfig {
    /// Configuration with call-site capture enabled via the default
    /// collector.
    #[must_use]
    pub fn with_traces() -> Self {
        Self {
            capture_traces: true,
            ..Self::default()
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capture_traces: false,
            collector: Box::new(CallSiteCollector),
        }
    }
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("capture_traces", &self.capture_traces)
            .finish_non_exhaustive()
    }
}
