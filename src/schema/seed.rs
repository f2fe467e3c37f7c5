//! Seed types for generating the initial-state image.
//!
//! The image stores chemical A in the red channel and chemical B in the green
//! channel; blue and alpha are ignored by the Init kernel.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// Red channel (chemical A).
pub const CHANNEL_A: usize = 0;
/// Green channel (chemical B).
pub const CHANNEL_B: usize = 1;

/// Initial-state image read by the Init kernel.
///
/// Externally owned and read-only from the simulation's point of view; its size
/// need not match the domain.
#[derive(Debug, Clone, PartialEq)]
pub struct InitMap {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA pixels.
    pub pixels: Vec<[f32; 4]>,
}

impl InitMap {
    /// Image filled with a single value.
    pub fn filled(width: u32, height: u32, value: [f32; 4]) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width as usize * height as usize],
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y * self.width + x) as usize]
    }
}

/// Complete seed specification for simulation initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seed {
    /// Value every pixel starts from before the pattern is applied.
    #[serde(default = "default_base")]
    pub base: [f32; 4],
    /// Pattern added on top of the base fill.
    pub pattern: Pattern,
}

fn default_base() -> [f32; 4] {
    [1.0, 0.0, 0.0, 0.0]
}

impl Default for Seed {
    fn default() -> Self {
        Self {
            base: default_base(),
            pattern: Pattern::GaussianBlob {
                center: (0.5, 0.5),
                radius: 0.08,
                amplitude: 1.0,
                channel: CHANNEL_B,
            },
        }
    }
}

/// Predefined patterns for initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Pattern {
    /// Base fill only.
    Empty,
    /// Single Gaussian blob.
    GaussianBlob {
        /// Center position as fraction of image size (0.0-1.0).
        center: (f32, f32),
        /// Radius as fraction of the smaller image dimension.
        radius: f32,
        /// Peak amplitude.
        amplitude: f32,
        /// Target channel.
        channel: usize,
    },
    /// Multiple Gaussian blobs.
    MultiBlob {
        blobs: Vec<BlobSpec>,
    },
    /// Uniform random noise in [0, amplitude].
    Noise {
        amplitude: f32,
        /// Optional channel (None = A and B).
        channel: Option<usize>,
        /// Random seed.
        seed: u64,
    },
    /// Ring with softened edges.
    Ring {
        center: (f32, f32),
        inner_radius: f32,
        outer_radius: f32,
        amplitude: f32,
        channel: usize,
    },
    /// Sparse (x, y, channel, value) entries, written verbatim.
    Custom {
        values: Vec<(u32, u32, usize, f32)>,
    },
}

/// Specification for a single blob in MultiBlob pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobSpec {
    pub center: (f32, f32),
    pub radius: f32,
    pub amplitude: f32,
    pub channel: usize,
}

impl Seed {
    /// Render the seed into an image of the given size.
    ///
    /// Additive patterns saturate at 1.0 so the initial state stays in the
    /// concentration range the kernels expect.
    pub fn generate(&self, width: u32, height: u32) -> InitMap {
        let mut map = InitMap::filled(width, height, self.base);
        let (w, h) = (width as f32, height as f32);
        let min_dim = w.min(h);

        match &self.pattern {
            Pattern::Empty => {}
            Pattern::GaussianBlob {
                center,
                radius,
                amplitude,
                channel,
            } => {
                apply_gaussian(
                    &mut map,
                    *channel,
                    center.0 * w,
                    center.1 * h,
                    radius * min_dim,
                    *amplitude,
                );
            }
            Pattern::MultiBlob { blobs } => {
                for blob in blobs {
                    apply_gaussian(
                        &mut map,
                        blob.channel,
                        blob.center.0 * w,
                        blob.center.1 * h,
                        blob.radius * min_dim,
                        blob.amplitude,
                    );
                }
            }
            Pattern::Noise {
                amplitude,
                channel,
                seed,
            } => apply_noise(&mut map, *channel, *amplitude, *seed),
            Pattern::Ring {
                center,
                inner_radius,
                outer_radius,
                amplitude,
                channel,
            } => {
                apply_ring(
                    &mut map,
                    *channel,
                    center.0 * w,
                    center.1 * h,
                    inner_radius * min_dim,
                    outer_radius * min_dim,
                    *amplitude,
                );
            }
            Pattern::Custom { values } => {
                for &(x, y, c, v) in values {
                    if c < 4 && x < width && y < height {
                        map.pixels[(y * width + x) as usize][c] = v;
                    }
                }
            }
        }

        map
    }
}

fn add_saturating(pixel: &mut [f32; 4], channel: usize, value: f32) {
    pixel[channel] = (pixel[channel] + value).clamp(0.0, 1.0);
}

fn apply_gaussian(map: &mut InitMap, channel: usize, cx: f32, cy: f32, radius: f32, amplitude: f32) {
    if channel >= 4 || radius <= 0.0 {
        return;
    }
    let sigma_sq = (radius / 2.0).powi(2);
    let width = map.width as usize;

    for (i, pixel) in map.pixels.iter_mut().enumerate() {
        let dx = (i % width) as f32 + 0.5 - cx;
        let dy = (i / width) as f32 + 0.5 - cy;
        let value = amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma_sq)).exp();
        add_saturating(pixel, channel, value);
    }
}

fn apply_noise(map: &mut InitMap, channel: Option<usize>, amplitude: f32, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let channels = match channel {
        Some(c) if c < 4 => c..c + 1,
        Some(_) => return,
        None => CHANNEL_A..CHANNEL_B + 1,
    };

    for pixel in map.pixels.iter_mut() {
        for c in channels.clone() {
            let value = amplitude * rng.gen_range(0.0f32..1.0);
            add_saturating(pixel, c, value);
        }
    }
}

fn apply_ring(
    map: &mut InitMap,
    channel: usize,
    cx: f32,
    cy: f32,
    inner_radius: f32,
    outer_radius: f32,
    amplitude: f32,
) {
    if channel >= 4 || outer_radius <= inner_radius {
        return;
    }
    let width = map.width as usize;
    let edge_width = (outer_radius - inner_radius) * 0.2;

    for (i, pixel) in map.pixels.iter_mut().enumerate() {
        let dx = (i % width) as f32 + 0.5 - cx;
        let dy = (i / width) as f32 + 0.5 - cy;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist >= inner_radius && dist <= outer_radius {
            let inner_falloff = ((dist - inner_radius) / edge_width).min(1.0);
            let outer_falloff = ((outer_radius - dist) / edge_width).min(1.0);
            add_saturating(pixel, channel, amplitude * inner_falloff.min(outer_falloff));
        }
    }
}
