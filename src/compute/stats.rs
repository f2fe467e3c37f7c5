//! Summary statistics over a buffer's pixels.

/// Per-channel mean, minimum and maximum of an RGBA buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridStats {
    pub mean: [f32; 4],
    pub min: [f32; 4],
    pub max: [f32; 4],
    pub pixels: usize,
}

impl GridStats {
    pub fn from_pixels(pixels: &[[f32; 4]]) -> Self {
        if pixels.is_empty() {
            return Self {
                mean: [0.0; 4],
                min: [0.0; 4],
                max: [0.0; 4],
                pixels: 0,
            };
        }

        let mut sum = [0.0f64; 4];
        let mut min = [f32::INFINITY; 4];
        let mut max = [f32::NEG_INFINITY; 4];
        for pixel in pixels {
            for c in 0..4 {
                sum[c] += pixel[c] as f64;
                min[c] = min[c].min(pixel[c]);
                max[c] = max[c].max(pixel[c]);
            }
        }

        let n = pixels.len() as f64;
        Self {
            mean: sum.map(|s| (s / n) as f32),
            min,
            max,
            pixels: pixels.len(),
        }
    }
}
