//! Demo application modes: splash, gameplay, results.
//!
//! Each mode performs its timed work through scheduled entries rather than
//! loops of its own: the splash screen holds its Begin phase open with a
//! blocking entry, gameplay simulates frames with a repeating action, and
//! the end-of-run save drains through an End-phase blocking entry.

use std::cell::Cell;
use std::rc::Rc;

use stageflow_engine::{ModeState, Phase, PhaseCtx, StateTag};

pub const SPLASH: StateTag = StateTag::new("splash");
pub const GAMEPLAY: StateTag = StateTag::new("gameplay");
pub const RESULTS: StateTag = StateTag::new("results");

/// Payload variants, one per mode.
#[derive(Debug, Clone)]
pub enum ModePayload {
    Splash,
    Gameplay { level: u32 },
    Results { score: u32 },
}

/// Shows a splash for a fixed number of ticks, then hands off to gameplay.
pub struct Splash {
    pub hold_ticks: u32,
}

impl ModeState<ModePayload> for Splash {
    fn tag(&self) -> StateTag {
        SPLASH
    }

    fn accepts(&self, payload: &ModePayload) -> bool {
        matches!(payload, ModePayload::Splash)
    }

    fn on_phase(&mut self, phase: Phase, ctx: &mut PhaseCtx<'_, ModePayload>) {
        match phase {
            Phase::Begin => {
                tracing::info!(hold_ticks = self.hold_ticks, "splash up");
                // Hold the Begin phase open until the splash has been shown
                // long enough.
                let hold = self.hold_ticks;
                let mut shown = 0u32;
                ctx.push_blocking_until(
                    || Ok(()),
                    move || {
                        shown += 1;
                        shown >= hold
                    },
                );
            }
            Phase::Idle => ctx.request_transition(ModePayload::Gameplay { level: 1 }),
            Phase::End => tracing::info!("splash done"),
        }
    }
}

/// Simulates a level as one repeating frame action per tick.
pub struct Gameplay {
    frames_per_level: u32,
    level: u32,
    running: bool,
    frames: Rc<Cell<u32>>,
    score: Rc<Cell<u32>>,
}

impl Gameplay {
    #[must_use]
    pub fn new(frames_per_level: u32) -> Self {
        Self {
            frames_per_level,
            level: 0,
            running: false,
            frames: Rc::new(Cell::new(0)),
            score: Rc::new(Cell::new(0)),
        }
    }
}

impl ModeState<ModePayload> for Gameplay {
    fn tag(&self) -> StateTag {
        GAMEPLAY
    }

    fn accepts(&self, payload: &ModePayload) -> bool {
        matches!(payload, ModePayload::Gameplay { .. })
    }

    fn initialize(&mut self, payload: &ModePayload) -> anyhow::Result<()> {
        match payload {
            ModePayload::Gameplay { level } => {
                self.level = *level;
                Ok(())
            }
            other => Err(anyhow::anyhow!("gameplay cannot start from {other:?}")),
        }
    }

    fn on_phase(&mut self, phase: Phase, ctx: &mut PhaseCtx<'_, ModePayload>) {
        match phase {
            Phase::Begin => {
                self.frames.set(0);
                self.score.set(0);
                self.running = false;
                tracing::info!(level = self.level, "level started");
            }
            Phase::Idle => {
                if !self.running {
                    // The frame action binds to the Idle phase, so it stops
                    // firing once End has run.
                    self.running = true;
                    let frames = Rc::clone(&self.frames);
                    let score = Rc::clone(&self.score);
                    ctx.push_action_with(
                        move || {
                            frames.set(frames.get() + 1);
                            score.set(score.get() + 10);
                            Ok(())
                        },
                        true,
                        None,
                    );
                }
                if self.frames.get() >= self.frames_per_level {
                    ctx.request_transition(ModePayload::Results {
                        score: self.score.get(),
                    });
                }
            }
            Phase::End => {
                self.running = false;
                tracing::info!(score = self.score.get(), "saving run");
                let mut flushed = 0u32;
                ctx.push_blocking_until(
                    || Ok(()),
                    move || {
                        flushed += 1;
                        flushed >= 3
                    },
                );
            }
        }
    }
}

/// Shows the final score.
#[derive(Default)]
pub struct Results {
    score: u32,
}

impl ModeState<ModePayload> for Results {
    fn tag(&self) -> StateTag {
        RESULTS
    }

    fn accepts(&self, payload: &ModePayload) -> bool {
        matches!(payload, ModePayload::Results { .. })
    }

    fn initialize(&mut self, payload: &ModePayload) -> anyhow::Result<()> {
        match payload {
            ModePayload::Results { score } => {
                self.score = *score;
                Ok(())
            }
            other => Err(anyhow::anyhow!("results cannot start from {other:?}")),
        }
    }

    fn on_phase(&mut self, phase: Phase, _ctx: &mut PhaseCtx<'_, ModePayload>) {
        if phase == Phase::Begin {
            tracing::info!(score = self.score, "final score");
        }
    }
}
