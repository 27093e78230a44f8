//! Stageflow demo binary.
//!
//! Drives splash -> gameplay -> results over a fixed tick cadence and dumps
//! the final live-entry snapshot. `RUST_LOG=debug` shows entry promotion and
//! drop decisions.

mod modes;

use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use modes::{Gameplay, ModePayload, Results, Splash};
use stageflow_engine::{
    FixedStep, ModeState, Phase, Scheduler, SchedulerConfig, TickDriver,
};

/// Ticks to give up after if the demo never settles (scheduler bug guard).
const MAX_TICKS: u64 = 2_000;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(env_filter)
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let states: Vec<Box<dyn ModeState<ModePayload>>> = vec![
        Box::new(Splash { hold_ticks: 30 }),
        Box::new(Gameplay::new(120)),
        Box::new(Results::default()),
    ];
    let mut scheduler = Scheduler::new(states, SchedulerConfig::with_traces())?;
    scheduler.on_state_change(|change| {
        tracing::info!(state = %change.state, phase = %change.phase, "mode changed");
    });
    scheduler.request_transition(ModePayload::Splash)?;

    let source = FixedStep::new(Duration::from_millis(8));
    let mut driver = TickDriver::new(Box::new(source), scheduler);
    while !driver.scheduler().is(modes::RESULTS, Phase::Idle)
        && driver.scheduler().tick_count() < MAX_TICKS
    {
        driver.step();
    }

    let scheduler = driver.into_scheduler();
    tracing::info!(
        ticks = scheduler.tick_count(),
        entries = %serde_json::to_string(&scheduler.live_entries())?,
        "demo finished"
    );
    Ok(())
}
