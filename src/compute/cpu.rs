//! CPU reference program.
//!
//! Runs the Init, Step and Display kernels on the host with the same math as
//! the WGSL module. Dispatches are emulated faithfully: the group grid is
//! expanded to threads and threads outside the domain do nothing. Useful for
//! headless runs and as a deterministic reference in tests.

use std::collections::VecDeque;

use rayon::prelude::*;

use super::{
    BindingTable, ComputeProgram, FilterMode, GroupCount, INIT_MAP, KernelHandle, KernelUniforms,
    ParamName, ParamValue, PixelFormat, SimulationError, TextureSpec, WorkgroupSize, WrapMode,
};
use crate::schema::InitMap;

/// Gain applied to per-step deltas in the Delta display modes.
pub const DELTA_GAIN: f32 = 64.0;

/// Largest texture edge the CPU program will allocate.
pub const MAX_CPU_DIMENSION: u32 = 16384;

/// Most recent dispatches kept by [`CpuProgram::dispatch_log`].
pub const DISPATCH_LOG_CAPACITY: usize = 1024;

const DEFAULT_GROUP_SIZE: WorkgroupSize = WorkgroupSize::new(8, 8, 1);

/// Handle to a texture owned by a [`CpuProgram`].
///
/// Slots are reused after release; the generation tells a stale handle
/// apart from the texture that took its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuTexture {
    index: usize,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    image: Option<CpuImage>,
}

#[derive(Debug, Clone)]
struct CpuImage {
    spec: TextureSpec,
    pixels: Vec<[f32; 4]>,
}

impl CpuImage {
    #[inline]
    fn load(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y * self.spec.width + x) as usize]
    }
}

/// One dispatch issued to the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    pub kernel: KernelHandle,
    pub groups: GroupCount,
}

/// Host implementation of the compute program.
#[derive(Debug)]
pub struct CpuProgram {
    group_size: WorkgroupSize,
    textures: Vec<Slot>,
    uniforms: KernelUniforms,
    bindings: BindingTable<CpuTexture>,
    allocations: usize,
    dispatches: VecDeque<DispatchRecord>,
    dispatch_count: u64,
}

impl Default for CpuProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuProgram {
    /// Program whose kernels all use 8x8x1 groups.
    pub fn new() -> Self {
        Self::with_group_size(DEFAULT_GROUP_SIZE)
    }

    /// Program whose kernels all declare `group_size`.
    pub fn with_group_size(group_size: WorkgroupSize) -> Self {
        Self {
            group_size,
            textures: Vec::new(),
            uniforms: KernelUniforms::default(),
            bindings: BindingTable::default(),
            allocations: 0,
            dispatches: VecDeque::new(),
            dispatch_count: 0,
        }
    }

    /// Textures allocated through `create_texture` so far.
    #[inline]
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Textures currently alive (including uploaded images).
    pub fn live_textures(&self) -> usize {
        self.textures.iter().filter(|t| t.image.is_some()).count()
    }

    /// The most recent dispatches (up to [`DISPATCH_LOG_CAPACITY`]), oldest first.
    #[inline]
    pub fn dispatch_log(&self) -> &VecDeque<DispatchRecord> {
        &self.dispatches
    }

    /// Dispatches issued over the program's lifetime.
    #[inline]
    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count
    }

    /// Currently bound parameter values.
    #[inline]
    pub fn params(&self) -> &KernelUniforms {
        &self.uniforms
    }

    /// Allocation request a texture was created from.
    pub fn texture_spec(&self, texture: &CpuTexture) -> Option<TextureSpec> {
        self.image(texture).ok().map(|image| image.spec)
    }

    fn image(&self, texture: &CpuTexture) -> Result<&CpuImage, SimulationError> {
        self.textures
            .get(texture.index)
            .filter(|slot| slot.generation == texture.generation)
            .and_then(|slot| slot.image.as_ref())
            .ok_or(SimulationError::ReleasedTexture)
    }

    /// Source image and mutable target image of a kernel or copy.
    fn pair_mut(
        &mut self,
        source: &CpuTexture,
        target: &CpuTexture,
    ) -> Result<(&CpuImage, &mut CpuImage), SimulationError> {
        self.image(source)?;
        self.image(target)?;
        let (s, t) = (source.index, target.index);
        let (src, dst) = match s.cmp(&t) {
            std::cmp::Ordering::Less => {
                let (lo, hi) = self.textures.split_at_mut(t);
                (&lo[s], &mut hi[0])
            }
            std::cmp::Ordering::Greater => {
                let (lo, hi) = self.textures.split_at_mut(s);
                (&hi[0], &mut lo[t])
            }
            std::cmp::Ordering::Equal => return Err(SimulationError::AliasedTextures),
        };
        match (src.image.as_ref(), dst.image.as_mut()) {
            (Some(src), Some(dst)) => Ok((src, dst)),
            _ => Err(SimulationError::ReleasedTexture),
        }
    }

    fn insert(&mut self, image: CpuImage) -> CpuTexture {
        let index = match self.textures.iter().position(|slot| slot.image.is_none()) {
            Some(index) => index,
            None => {
                self.textures.push(Slot::default());
                self.textures.len() - 1
            }
        };
        let slot = &mut self.textures[index];
        slot.image = Some(image);
        CpuTexture {
            index,
            generation: slot.generation,
        }
    }

    fn record(&mut self, record: DispatchRecord) {
        if self.dispatches.len() == DISPATCH_LOG_CAPACITY {
            self.dispatches.pop_front();
        }
        self.dispatches.push_back(record);
        self.dispatch_count += 1;
    }
}

fn check_extent(name: &str, width: u32, height: u32) -> Result<(), SimulationError> {
    if width == 0 || height == 0 || width > MAX_CPU_DIMENSION || height > MAX_CPU_DIMENSION {
        return Err(SimulationError::Allocation {
            name: name.to_string(),
            width,
            height,
            reason: format!("dimensions must be within 1..={MAX_CPU_DIMENSION}"),
        });
    }
    Ok(())
}

impl ComputeProgram for CpuProgram {
    type Texture = CpuTexture;

    fn create_texture(&mut self, spec: &TextureSpec) -> Result<CpuTexture, SimulationError> {
        check_extent(spec.name, spec.width, spec.height)?;
        self.allocations += 1;
        let pixels = vec![[0.0; 4]; spec.width as usize * spec.height as usize];
        Ok(self.insert(CpuImage {
            spec: *spec,
            pixels,
        }))
    }

    fn release_texture(&mut self, texture: CpuTexture) {
        if let Some(slot) = self.textures.get_mut(texture.index) {
            if slot.generation == texture.generation && slot.image.is_some() {
                slot.image = None;
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
    }

    fn is_realized(&self, texture: &CpuTexture) -> bool {
        self.image(texture).is_ok()
    }

    fn upload_image(&mut self, image: &InitMap) -> Result<CpuTexture, SimulationError> {
        check_extent(INIT_MAP, image.width, image.height)?;
        if image.pixels.len() != image.width as usize * image.height as usize {
            return Err(SimulationError::Allocation {
                name: INIT_MAP.to_string(),
                width: image.width,
                height: image.height,
                reason: format!("expected {} pixels, got {}", image.width * image.height, image.pixels.len()),
            });
        }
        let spec = TextureSpec {
            name: INIT_MAP,
            width: image.width,
            height: image.height,
            format: PixelFormat::Rgba32Float,
            filter: FilterMode::Point,
            wrap: WrapMode::Clamp,
            random_write: false,
            mipmaps: false,
        };
        Ok(self.insert(CpuImage {
            spec,
            pixels: image.pixels.clone(),
        }))
    }

    fn workgroup_size(&self, _kernel: KernelHandle) -> WorkgroupSize {
        self.group_size
    }

    fn set_param(&mut self, name: ParamName, value: ParamValue) {
        if !self.uniforms.set(name, value) {
            log::warn!("ignoring {value:?} for parameter '{name}'");
        }
    }

    fn set_texture(
        &mut self,
        kernel: KernelHandle,
        name: &str,
        texture: &CpuTexture,
    ) -> Result<(), SimulationError> {
        self.bindings.bind(kernel, name, texture)
    }

    fn dispatch(&mut self, kernel: KernelHandle, groups: GroupCount) -> Result<(), SimulationError> {
        let (source, target) = self.bindings.resolve(kernel)?;
        let (source, target) = (*source, *target);
        self.record(DispatchRecord { kernel, groups });

        if groups.total() == 0 {
            return Ok(());
        }

        let uniforms = self.uniforms;
        let group_size = self.group_size;
        let (src, dst) = self.pair_mut(&source, &target)?;

        // Threads launched along each axis, clipped to the domain and to the target
        let max_x = (groups.x as u64 * group_size.x as u64)
            .min(uniforms.width as u64)
            .min(dst.spec.width as u64) as u32;
        let max_y = (groups.y as u64 * group_size.y as u64)
            .min(uniforms.height as u64)
            .min(dst.spec.height as u64) as u32;

        let row_width = dst.spec.width as usize;
        dst.pixels
            .par_chunks_mut(row_width)
            .enumerate()
            .take(max_y as usize)
            .for_each(|(y, row)| {
                for (x, pixel) in row.iter_mut().enumerate().take(max_x as usize) {
                    let (x, y) = (x as u32, y as u32);
                    *pixel = match kernel {
                        KernelHandle::Init => init_cell(src, &uniforms, x, y),
                        KernelHandle::Step => step_cell(src, &uniforms, x, y),
                        KernelHandle::Display => display_cell(src, &uniforms, x, y),
                    };
                }
            });
        Ok(())
    }

    fn copy_texture(
        &mut self,
        source: &CpuTexture,
        destination: &CpuTexture,
    ) -> Result<(), SimulationError> {
        if source == destination {
            return self.image(source).map(|_| ());
        }
        let (src, dst) = self.pair_mut(source, destination)?;
        if src.spec.width != dst.spec.width
            || src.spec.height != dst.spec.height
            || src.spec.format != dst.spec.format
        {
            return Err(SimulationError::CopyMismatch);
        }
        dst.pixels.copy_from_slice(&src.pixels);
        Ok(())
    }

    fn read_texture(&self, texture: &CpuTexture) -> Result<Vec<[f32; 4]>, SimulationError> {
        Ok(self.image(texture)?.pixels.clone())
    }
}

/// Source texel with coordinates clamped to the readable area.
#[inline]
fn load_clamped(src: &CpuImage, u: &KernelUniforms, x: i32, y: i32) -> [f32; 4] {
    let max_x = u.width.min(src.spec.width) as i32 - 1;
    let max_y = u.height.min(src.spec.height) as i32 - 1;
    src.load(x.clamp(0, max_x) as u32, y.clamp(0, max_y) as u32)
}

fn init_cell(src: &CpuImage, u: &KernelUniforms, x: u32, y: u32) -> [f32; 4] {
    // Nearest-neighbour resample of the init image onto the domain
    let sx = (x as u64 * src.spec.width as u64 / u.width as u64).min(src.spec.width as u64 - 1);
    let sy = (y as u64 * src.spec.height as u64 / u.height as u64).min(src.spec.height as u64 - 1);
    let seed = src.load(sx as u32, sy as u32);
    [seed[0], seed[1], 0.0, 0.0]
}

fn step_cell(src: &CpuImage, u: &KernelUniforms, x: u32, y: u32) -> [f32; 4] {
    let (x, y) = (x as i32, y as i32);
    let here = load_clamped(src, u, x, y);
    let r = u.diffuse_radius.max(0);

    let mut sum_a = 0.0f32;
    let mut sum_b = 0.0f32;
    for dy in -r..=r {
        for dx in -r..=r {
            let cell = load_clamped(src, u, x + dx, y + dy);
            sum_a += cell[0];
            sum_b += cell[1];
        }
    }
    let n = ((2 * r + 1) * (2 * r + 1)) as f32;
    let lap_a = sum_a / n - here[0];
    let lap_b = sum_b / n - here[1];

    let a = here[0];
    let b = here[1];
    let reaction = a * b * b;
    let delta_a = u.diffuse_rate_a * lap_a - reaction + u.feed_rate * (1.0 - a);
    let delta_b = u.diffuse_rate_b * lap_b + reaction - (u.remove_rate + u.feed_rate) * b;

    let new_a = (a + delta_a).clamp(0.0, 1.0);
    let new_b = (b + delta_b).clamp(0.0, 1.0);
    [new_a, new_b, new_a - a, new_b - b]
}

#[inline]
fn signed_delta(delta: f32) -> [f32; 4] {
    let scaled = delta * DELTA_GAIN;
    [scaled.clamp(0.0, 1.0), 0.0, (-scaled).clamp(0.0, 1.0), 1.0]
}

fn display_cell(src: &CpuImage, u: &KernelUniforms, x: u32, y: u32) -> [f32; 4] {
    let cell = load_clamped(src, u, x as i32, y as i32);
    match u.display_mode {
        0 => [cell[0], cell[1], 0.0, 1.0],
        1 => {
            let v = (cell[0] - cell[1]).clamp(0.0, 1.0);
            [v, v, v, 1.0]
        }
        2 => signed_delta(cell[2]),
        3 => signed_delta(cell[3]),
        _ => {
            let t = (cell[0] - cell[1]).clamp(0.0, 1.0);
            let mut color = [0.0; 4];
            for (i, c) in color.iter_mut().enumerate() {
                *c = u.color_b[i] * (1.0 - t) + u.color_a[i] * t;
            }
            color
        }
    }
}
