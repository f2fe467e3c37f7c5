//! Configuration types for reaction-diffusion simulation parameters.

use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Seed;
use crate::compute::{BufferExchange, FilterMode, PixelFormat};

/// Declared range of the feed rate.
pub const FEED_RATE_RANGE: RangeInclusive<f32> = 0.0..=0.1;
/// Declared range of the removal (kill) rate.
pub const REMOVE_RATE_RANGE: RangeInclusive<f32> = 0.0..=0.1;
/// Declared range of both diffusion rates.
pub const DIFFUSE_RATE_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Declared range of the diffusion radius in cells.
pub const DIFFUSE_RADIUS_RANGE: RangeInclusive<i32> = 2..=8;
/// Upper bound on simulation steps per fixed tick.
pub const MAX_STEPS_PER_TICK: u32 = 10;

/// Visualization applied by the Display kernel.
///
/// Discriminants are the values written to the `displayMode` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum DisplayMode {
    /// Chemical A in red, chemical B in green.
    RawChannelsAB = 0,
    /// `A - B` as a grey level.
    Greyscale = 1,
    /// Signed per-step change of A.
    Delta1 = 2,
    /// Signed per-step change of B.
    Delta2 = 3,
    /// Blend between `color_b` and `color_a` weighted by `A - B`.
    #[default]
    Colored = 4,
}

impl DisplayMode {
    /// All modes in discriminant order.
    pub const ALL: [DisplayMode; 5] = [
        DisplayMode::RawChannelsAB,
        DisplayMode::Greyscale,
        DisplayMode::Delta1,
        DisplayMode::Delta2,
        DisplayMode::Colored,
    ];

    #[inline]
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Linear RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(default = "default_alpha")]
    pub a: f32,
}

fn default_alpha() -> f32 {
    1.0
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Tunable parameters read by the compute kernels every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Rate at which chemical A is replenished (0.0-0.1).
    pub feed_rate: f32,
    /// Rate at which chemical B is removed (0.0-0.1).
    pub remove_rate: f32,
    /// Diffusion rate of chemical A (0.0-1.0).
    pub diffuse_rate_a: f32,
    /// Diffusion rate of chemical B (0.0-1.0).
    pub diffuse_rate_b: f32,
    /// Half-width of the diffusion neighbourhood in cells (2-8).
    pub diffuse_radius: i32,
    /// Color for cells dominated by A in [`DisplayMode::Colored`].
    pub color_a: Color,
    /// Color for cells dominated by B in [`DisplayMode::Colored`].
    pub color_b: Color,
    /// Active visualization.
    #[serde(default)]
    pub display_mode: DisplayMode,
    /// Domain width in cells.
    pub width: u32,
    /// Domain height in cells.
    pub height: u32,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            feed_rate: 0.055,
            remove_rate: 0.062,
            diffuse_rate_a: 1.0,
            diffuse_rate_b: 0.5,
            diffuse_radius: 2,
            color_a: Color::rgb(0.02, 0.03, 0.08),
            color_b: Color::rgb(0.95, 0.75, 0.3),
            display_mode: DisplayMode::default(),
            width: 256,
            height: 256,
        }
    }
}

impl SimulationParameters {
    /// Clamp every ranged value to its declared range.
    pub fn clamped(mut self) -> Self {
        self.feed_rate = clamp_f32(self.feed_rate, &FEED_RATE_RANGE);
        self.remove_rate = clamp_f32(self.remove_rate, &REMOVE_RATE_RANGE);
        self.diffuse_rate_a = clamp_f32(self.diffuse_rate_a, &DIFFUSE_RATE_RANGE);
        self.diffuse_rate_b = clamp_f32(self.diffuse_rate_b, &DIFFUSE_RATE_RANGE);
        self.diffuse_radius = self
            .diffuse_radius
            .clamp(*DIFFUSE_RADIUS_RANGE.start(), *DIFFUSE_RADIUS_RANGE.end());
        self
    }

    /// Domain size as `(width, height)`.
    #[inline]
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn clamp_f32(value: f32, range: &RangeInclusive<f32>) -> f32 {
    // NaN collapses to the lower bound
    if value.is_nan() {
        return *range.start();
    }
    value.clamp(*range.start(), *range.end())
}

fn default_steps_per_tick() -> u32 {
    4
}

fn default_tick_rate() -> f32 {
    50.0
}

fn default_max_ticks_per_frame() -> u32 {
    8
}

/// Top-level configuration: parameters, buffer settings, cadence and seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Kernel parameters and domain size.
    pub parameters: SimulationParameters,
    /// Simulation steps per fixed tick (0 pauses the simulation).
    #[serde(default = "default_steps_per_tick")]
    pub steps_per_tick: u32,
    /// Fixed ticks per second.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: f32,
    /// Upper bound on fixed ticks run for a single display frame.
    #[serde(default = "default_max_ticks_per_frame")]
    pub max_ticks_per_frame: u32,
    /// Pixel format shared by the grid buffers.
    #[serde(default)]
    pub pixel_format: PixelFormat,
    /// Filter mode recorded on the grid buffers for presentation.
    #[serde(default)]
    pub filter_mode: FilterMode,
    /// How Next becomes Current after a step.
    #[serde(default)]
    pub buffer_exchange: BufferExchange,
    /// Initial-state image generator.
    #[serde(default)]
    pub seed: Seed,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            parameters: SimulationParameters::default(),
            steps_per_tick: default_steps_per_tick(),
            tick_rate: default_tick_rate(),
            max_ticks_per_frame: default_max_ticks_per_frame(),
            pixel_format: PixelFormat::default(),
            filter_mode: FilterMode::default(),
            buffer_exchange: BufferExchange::default(),
            seed: Seed::default(),
        }
    }
}

impl SimulationConfig {
    /// Read, parse and sanitize a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse and sanitize a JSON configuration string.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_json::from_str(text)?;
        config.sanitized()
    }

    /// Clamp ranged values and reject configurations the simulation cannot run.
    ///
    /// This is the only place parameter ranges are enforced; the compute core
    /// trusts whatever it is handed.
    pub fn sanitized(mut self) -> Result<Self, ConfigError> {
        if self.parameters.width == 0 || self.parameters.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return Err(ConfigError::InvalidTickRate(self.tick_rate));
        }
        self.parameters = self.parameters.clamped();
        self.steps_per_tick = self.steps_per_tick.min(MAX_STEPS_PER_TICK);
        self.max_ticks_per_frame = self.max_ticks_per_frame.max(1);
        Ok(self)
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Domain dimensions (width, height) must be non-zero")]
    InvalidDimensions,
    #[error("Tick rate must be positive and finite, got {0}")]
    InvalidTickRate(f32),
}
