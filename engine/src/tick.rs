//! Tick sources and the driver loop.
//!
//! The scheduler itself never waits; a [`TickDriver`] pairs it with exactly
//! one [`TickSource`] and invokes [`crate::Scheduler::tick`] once per tick
//! edge. Constructing a driver requires a source, so "no tick source" is a
//! compile error rather than a runtime one. Re-entrant or multi-threaded
//! driving is unsupported.

use std::thread;
use std::time::{Duration, Instant};

use crate::Scheduler;

/// Produces tick edges for a [`TickDriver`].
pub trait TickSource {
    /// Blocks until the next tick edge. Returns `false` once the source is
    /// exhausted, which stops [`TickDriver::run`].
    fn next_tick(&mut self) -> bool;
}

/// Fixed-cadence wall-clock source.
///
/// Deadlines advance by whole periods, so a stall is followed by immediate
/// catch-up ticks rather than accumulated drift.
#[derive(Debug)]
pub struct FixedStep {
    period: Duration,
    deadline: Option<Instant>,
}

impl FixedStep {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
        }
    }
}

impl TickSource for FixedStep {
    fn next_tick(&mut self) -> bool {
        let deadline = self
            .deadline
            .get_or_insert_with(|| Instant::now() + self.period);
        let now = Instant::now();
        if *deadline > now {
            thread::sleep(*deadline - now);
        }
        *deadline += self.period;
        true
    }
}

/// Finite source yielding a fixed number of immediate ticks.
#[derive(Debug)]
pub struct CountedTicks {
    remaining: u64,
}

impl CountedTicks {
    #[must_use]
    pub fn new(count: u64) -> Self {
        Self { remaining: count }
    }
}

impl TickSource for CountedTicks {
    fn next_tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Owns a scheduler and the single source that drives it.
pub struct TickDriver<P: 'static> {
    scheduler: Scheduler<P>,
    source: Box<dyn TickSource>,
}

impl<P> TickDriver<P> {
    pub fn new(source: Box<dyn TickSource>, scheduler: Scheduler<P>) -> Self {
        Self { scheduler, source }
    }

    /// Waits for the next tick edge and runs one scheduler tick. Returns
    /// `false` once the source is exhausted.
    pub fn step(&mut self) -> bool {
        if self.source.next_tick() {
            self.scheduler.tick();
            true
        } else {
            false
        }
    }

    /// Drives the scheduler until the source is exhausted.
    pub fn run(&mut self) {
        while self.step() {}
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<P> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<P> {
        &mut self.scheduler
    }

    #[must_use]
    pub fn into_scheduler(self) -> Scheduler<P> {
        self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counted_source_exhausts() {
        let mut source = CountedTicks::new(2);
        assert!(source.next_tick());
        assert!(source.next_tick());
        assert!(!source.next_tick());
        assert!(!source.next_tick());
    }

    #[test]
    fn fixed_step_waits_at_least_one_period() {
        let mut source = FixedStep::new(Duration::from_millis(2));
        let start = Instant::now();
        assert!(source.next_tick());
        assert!(source.next_tick());
        assert!(start.elapsed() >= Duration::from_millis(4));
    }
}
