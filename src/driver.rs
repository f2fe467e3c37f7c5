//! Frame driver - runs the simulation cadence against wall-clock frames.
//!
//! Simulation advances in fixed ticks of `steps_per_tick` steps. Display
//! frames arrive at a variable rate; each frame runs the ticks that fit in the
//! elapsed time and refreshes the display once, only if something changed.

use std::time::Duration;

use log::warn;

use crate::compute::{ComputeProgram, Simulation, SimulationError};
use crate::schema::{SimulationConfig, SimulationParameters};

/// What happened during one display frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    /// Fixed ticks run.
    pub ticks: u32,
    /// Simulation steps run across those ticks.
    pub steps: u32,
    /// Ticks discarded because the frame fell too far behind.
    pub dropped_ticks: u32,
    /// Whether the Display buffer was refreshed.
    pub refreshed: bool,
}

/// Fixed-tick accumulator driving a [`Simulation`].
#[derive(Debug, Clone)]
pub struct FrameDriver {
    steps_per_tick: u32,
    tick_interval: f64,
    max_ticks_per_frame: u32,
    accumulator: f64,
    total_ticks: u64,
}

impl FrameDriver {
    /// `tick_rate` is in ticks per second and must be positive.
    pub fn new(steps_per_tick: u32, tick_rate: f32, max_ticks_per_frame: u32) -> Self {
        Self {
            steps_per_tick,
            tick_interval: 1.0 / tick_rate as f64,
            max_ticks_per_frame: max_ticks_per_frame.max(1),
            accumulator: 0.0,
            total_ticks: 0,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            config.steps_per_tick,
            config.tick_rate,
            config.max_ticks_per_frame,
        )
    }

    #[inline]
    pub fn steps_per_tick(&self) -> u32 {
        self.steps_per_tick
    }

    /// Change the steps run per tick; 0 pauses the simulation.
    pub fn set_steps_per_tick(&mut self, steps: u32) {
        self.steps_per_tick = steps;
    }

    #[inline]
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Forget any accumulated frame time.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    /// Run one fixed tick. Returns the number of steps taken.
    pub fn tick<P: ComputeProgram>(
        &mut self,
        sim: &mut Simulation<P>,
        params: &SimulationParameters,
    ) -> Result<u32, SimulationError> {
        sim.run(params, self.steps_per_tick)?;
        self.total_ticks += 1;
        Ok(self.steps_per_tick)
    }

    /// Advance by `elapsed` wall-clock time and refresh the display if stale.
    pub fn frame<P: ComputeProgram>(
        &mut self,
        sim: &mut Simulation<P>,
        params: &SimulationParameters,
        elapsed: Duration,
    ) -> Result<FrameReport, SimulationError> {
        self.accumulator += elapsed.as_secs_f64();
        let due = (self.accumulator / self.tick_interval).floor();
        self.accumulator -= due * self.tick_interval;

        let due = due.min(u32::MAX as f64) as u32;
        let ticks = due.min(self.max_ticks_per_frame);
        let dropped_ticks = due - ticks;
        if dropped_ticks > 0 {
            warn!("frame fell behind, dropping {dropped_ticks} ticks");
        }

        let mut report = FrameReport {
            ticks,
            dropped_ticks,
            ..Default::default()
        };
        for _ in 0..ticks {
            report.steps += self.tick(sim, params)?;
        }

        if sim.needs_refresh(params) {
            sim.refresh(params)?;
            report.refreshed = true;
        }
        Ok(report)
    }
}
