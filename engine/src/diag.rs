//! Optional per-entry diagnostics capture.
//!
//! Trace capture is best-effort and read-only: a collector that fails or
//! panics yields an entry with no trace, never a scheduling difference.

use std::panic::{AssertUnwindSafe, Location, catch_unwind};

use serde::Serialize;

use crate::config::SchedulerConfig;

/// Call-site identity recorded for a pushed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryTrace {
    /// Where the entry was pushed from, `file:line:column`.
    pub pushed_from: String,
}

/// Injectable collector for entry traces.
///
/// The scheduler records the Rust caller location of every push and hands it
/// to the configured collector; implementations may enrich or discard it.
pub trait TraceCollector {
    /// Produce a trace for an entry pushed at `origin`, or `None` when
    /// capture is unavailable.
    fn capture(&self, origin: &'static Location<'static>) -> Option<EntryTrace>;
}

/// Default collector: formats the caller location verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallSiteCollector;

impl TraceCollector for CallSiteCollector {
    fn capture(&self, origin: &'static Location<'static>) -> Option<EntryTrace> {
        Some(EntryTrace {
            pushed_from: format!("{}:{}:{}", origin.file(), origin.line(), origin.column()),
        })
    }
}

/// Runs the configured collector, shielding the scheduler from capture
/// failures.
pub(crate) fn capture(
    config: &SchedulerConfig,
    origin: &'static Location<'static>,
) -> Option<EntryTrace> {
    if !config.capture_traces {
        return None;
    }
    match catch_unwind(AssertUnwindSafe(|| config.collector.capture(origin))) {
        Ok(trace) => trace,
        Err(_) => {
            tracing::debug!("trace collector panicked; entry scheduled without a trace");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_site_collector_formats_location() {
        let trace = CallSiteCollector
            .capture(Location::caller())
            .map_or_else(|| panic!("default collector always captures"), |t| t);
        assert!(trace.pushed_from.contains("diag.rs"));
    }

    #[test]
    fn capture_is_off_by_default() {
        let config = SchedulerConfig::default();
        assert!(capture(&config, Location::caller()).is_none());
    }

    #[test]
    fn panicking_collector_yields_no_trace() {
        struct Exploding;
        impl TraceCollector for Exploding {
            fn capture(&self, _origin: &'static Location<'static>) -> Option<EntryTrace> {
                panic!("capture unavailable")
            }
        }
        let config = SchedulerConfig {
            capture_traces: true,
            collector: Box::new(Exploding),
        };
        assert!(capture(&config, Location::caller()).is_none());
    }
}
