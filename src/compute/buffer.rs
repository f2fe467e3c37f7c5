//! Grid buffers - the Current, Next and Display textures.

use log::debug;
use serde::{Deserialize, Serialize};

use super::{ComputeProgram, DISPLAY_MAP, MAP, NEW_MAP, SimulationError, TextureSpec, WrapMode};

/// Texel format of the grid buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Four half-precision floats per texel.
    Rgba16Float,
    /// Four single-precision floats per texel.
    #[default]
    Rgba32Float,
}

impl PixelFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba16Float => 8,
            PixelFormat::Rgba32Float => 16,
        }
    }
}

/// Sampling filter recorded for presentation of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterMode {
    #[default]
    Point,
    Bilinear,
}

/// How the Step output becomes the Current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BufferExchange {
    /// Full-frame copy Next -> Current; texture identities never change.
    #[default]
    Copy,
    /// Exchange the textures behind Current and Next; bind names stay with roles.
    Swap,
}

/// Logical role of a grid buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    Current,
    Next,
    Display,
}

impl BufferRole {
    pub const ALL: [BufferRole; 3] = [BufferRole::Current, BufferRole::Next, BufferRole::Display];

    /// Stable name the buffer is bound under.
    pub fn bind_name(self) -> &'static str {
        match self {
            BufferRole::Current => MAP,
            BufferRole::Next => NEW_MAP,
            BufferRole::Display => DISPLAY_MAP,
        }
    }
}

/// A lazily allocated 2D RGBA buffer with its current metadata.
#[derive(Debug)]
pub struct GridBuffer<T> {
    role: BufferRole,
    texture: Option<T>,
    name: &'static str,
    width: u32,
    height: u32,
    format: PixelFormat,
    filter: FilterMode,
    wrap: WrapMode,
}

impl<T: Clone> GridBuffer<T> {
    /// Unallocated buffer for `role`.
    pub fn new(role: BufferRole) -> Self {
        Self {
            role,
            texture: None,
            name: role.bind_name(),
            width: 0,
            height: 0,
            format: PixelFormat::default(),
            filter: FilterMode::default(),
            wrap: WrapMode::Clamp,
        }
    }

    /// Make sure the buffer is allocated with the requested geometry.
    ///
    /// Reallocates when the texture is absent, no longer realized, or differs
    /// in width, height or format. Metadata is re-applied either way. Returns
    /// whether a new texture was allocated.
    pub fn ensure<P>(
        &mut self,
        program: &mut P,
        width: u32,
        height: u32,
        format: PixelFormat,
        filter: FilterMode,
        name: &'static str,
    ) -> Result<bool, SimulationError>
    where
        P: ComputeProgram<Texture = T>,
    {
        let stale = match &self.texture {
            None => true,
            Some(texture) => {
                !program.is_realized(texture)
                    || self.width != width
                    || self.height != height
                    || self.format != format
            }
        };

        if stale {
            if let Some(old) = self.texture.take() {
                program.release_texture(old);
            }
            let spec = TextureSpec {
                name,
                width,
                height,
                format,
                filter,
                wrap: WrapMode::Clamp,
                random_write: true,
                mipmaps: false,
            };
            self.texture = Some(program.create_texture(&spec)?);
            debug!(
                "allocated {:?} buffer '{}' {}x{} {:?}",
                self.role, name, width, height, format
            );
        }

        self.name = name;
        self.width = width;
        self.height = height;
        self.format = format;
        self.filter = filter;
        self.wrap = WrapMode::Clamp;
        Ok(stale)
    }

    #[inline]
    pub fn role(&self) -> BufferRole {
        self.role
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    #[inline]
    pub fn wrap(&self) -> WrapMode {
        self.wrap
    }

    /// Backing texture, if allocated.
    #[inline]
    pub fn texture(&self) -> Option<&T> {
        self.texture.as_ref()
    }

    pub(crate) fn texture_or_err(&self) -> Result<&T, SimulationError> {
        self.texture
            .as_ref()
            .ok_or(SimulationError::Unallocated(self.role))
    }

    /// Release the backing texture.
    pub fn release<P>(&mut self, program: &mut P)
    where
        P: ComputeProgram<Texture = T>,
    {
        if let Some(texture) = self.texture.take() {
            program.release_texture(texture);
        }
    }
}

/// The three grid buffers, always kept at identical geometry.
#[derive(Debug)]
pub struct GridBuffers<T> {
    pub current: GridBuffer<T>,
    pub next: GridBuffer<T>,
    pub display: GridBuffer<T>,
}

impl<T: Clone> Default for GridBuffers<T> {
    fn default() -> Self {
        Self {
            current: GridBuffer::new(BufferRole::Current),
            next: GridBuffer::new(BufferRole::Next),
            display: GridBuffer::new(BufferRole::Display),
        }
    }
}

impl<T: Clone> GridBuffers<T> {
    /// Ensure all three buffers; returns how many were reallocated.
    pub fn ensure_all<P>(
        &mut self,
        program: &mut P,
        width: u32,
        height: u32,
        format: PixelFormat,
        filter: FilterMode,
    ) -> Result<usize, SimulationError>
    where
        P: ComputeProgram<Texture = T>,
    {
        let mut reallocated = 0;
        for role in BufferRole::ALL {
            let buffer = self.get_mut(role);
            if buffer.ensure(program, width, height, format, filter, role.bind_name())? {
                reallocated += 1;
            }
        }
        Ok(reallocated)
    }

    pub fn get(&self, role: BufferRole) -> &GridBuffer<T> {
        match role {
            BufferRole::Current => &self.current,
            BufferRole::Next => &self.next,
            BufferRole::Display => &self.display,
        }
    }

    pub fn get_mut(&mut self, role: BufferRole) -> &mut GridBuffer<T> {
        match role {
            BufferRole::Current => &mut self.current,
            BufferRole::Next => &mut self.next,
            BufferRole::Display => &mut self.display,
        }
    }

    /// Geometry shared by the buffers, or `None` before the first allocation.
    pub fn extent(&self) -> Option<(u32, u32)> {
        self.current
            .texture()
            .map(|_| (self.current.width(), self.current.height()))
    }

    /// Exchange the textures behind Current and Next, keeping role names.
    pub fn swap_current_next(&mut self) {
        std::mem::swap(&mut self.current.texture, &mut self.next.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::CpuProgram;

    #[test]
    fn test_lazy_allocation() {
        let mut program = CpuProgram::new();
        let mut buffer = GridBuffer::new(BufferRole::Current);
        assert!(buffer.texture().is_none());

        let allocated = buffer
            .ensure(&mut program, 32, 16, PixelFormat::Rgba32Float, FilterMode::Point, MAP)
            .unwrap();
        assert!(allocated);
        assert_eq!(program.allocations(), 1);
        assert_eq!((buffer.width(), buffer.height()), (32, 16));
        assert_eq!(buffer.wrap(), WrapMode::Clamp);

        let spec = program.texture_spec(buffer.texture().unwrap()).unwrap();
        assert!(spec.random_write);
        assert!(!spec.mipmaps);
        assert_eq!(spec.wrap, WrapMode::Clamp);
    }

    #[test]
    fn test_identical_request_reuses() {
        let mut program = CpuProgram::new();
        let mut buffer = GridBuffer::new(BufferRole::Next);

        buffer
            .ensure(&mut program, 64, 64, PixelFormat::Rgba32Float, FilterMode::Point, NEW_MAP)
            .unwrap();
        let first = *buffer.texture().unwrap();

        let reallocated = buffer
            .ensure(&mut program, 64, 64, PixelFormat::Rgba32Float, FilterMode::Point, NEW_MAP)
            .unwrap();
        assert!(!reallocated);
        assert_eq!(*buffer.texture().unwrap(), first);
        assert_eq!(program.allocations(), 1);
    }

    #[test]
    fn test_metadata_reapplied_on_reuse() {
        let mut program = CpuProgram::new();
        let mut buffer = GridBuffer::new(BufferRole::Display);

        buffer
            .ensure(&mut program, 8, 8, PixelFormat::Rgba32Float, FilterMode::Point, "Scratch")
            .unwrap();
        let reallocated = buffer
            .ensure(&mut program, 8, 8, PixelFormat::Rgba32Float, FilterMode::Bilinear, DISPLAY_MAP)
            .unwrap();

        assert!(!reallocated);
        assert_eq!(buffer.filter(), FilterMode::Bilinear);
        assert_eq!(buffer.name(), DISPLAY_MAP);
    }

    #[test]
    fn test_each_geometry_change_reallocates() {
        let mut program = CpuProgram::new();
        let mut buffer = GridBuffer::new(BufferRole::Current);
        let format = PixelFormat::Rgba32Float;

        buffer.ensure(&mut program, 16, 16, format, FilterMode::Point, MAP).unwrap();
        assert!(buffer.ensure(&mut program, 17, 16, format, FilterMode::Point, MAP).unwrap());
        assert!(buffer.ensure(&mut program, 17, 15, format, FilterMode::Point, MAP).unwrap());
        assert!(
            buffer
                .ensure(&mut program, 17, 15, PixelFormat::Rgba16Float, FilterMode::Point, MAP)
                .unwrap()
        );

        assert_eq!(program.allocations(), 4);
        // Replaced textures are released, not leaked
        assert_eq!(program.live_textures(), 1);
    }

    #[test]
    fn test_unrealized_texture_reallocates() {
        let mut program = CpuProgram::new();
        let mut buffer = GridBuffer::new(BufferRole::Current);
        let format = PixelFormat::Rgba32Float;

        buffer.ensure(&mut program, 4, 4, format, FilterMode::Point, MAP).unwrap();
        let texture = *buffer.texture().unwrap();
        program.release_texture(texture);

        assert!(buffer.ensure(&mut program, 4, 4, format, FilterMode::Point, MAP).unwrap());
        assert_eq!(program.allocations(), 2);
    }

    #[test]
    fn test_only_mismatched_buffer_reallocates() {
        let mut program = CpuProgram::new();
        let mut buffers = GridBuffers::default();
        let format = PixelFormat::Rgba32Float;

        assert_eq!(
            buffers.ensure_all(&mut program, 32, 32, format, FilterMode::Point).unwrap(),
            3
        );
        assert_eq!(
            buffers.ensure_all(&mut program, 32, 32, format, FilterMode::Point).unwrap(),
            0
        );

        let current = *buffers.current.texture().unwrap();
        let display = *buffers.display.texture().unwrap();
        buffers
            .next
            .ensure(&mut program, 32, 32, PixelFormat::Rgba16Float, FilterMode::Point, NEW_MAP)
            .unwrap();

        // Bring Next back in line; the other two stay untouched
        assert_eq!(
            buffers.ensure_all(&mut program, 32, 32, format, FilterMode::Point).unwrap(),
            1
        );
        assert_eq!(*buffers.current.texture().unwrap(), current);
        assert_eq!(*buffers.display.texture().unwrap(), display);
        assert_eq!(program.allocations(), 5);
    }

    #[test]
    fn test_allocation_failure_surfaces() {
        let mut program = CpuProgram::new();
        let mut buffer = GridBuffer::new(BufferRole::Current);
        let result = buffer.ensure(&mut program, 0, 16, PixelFormat::Rgba32Float, FilterMode::Point, MAP);
        assert!(matches!(result, Err(SimulationError::Allocation { .. })));
        assert!(buffer.texture().is_none());
    }

    #[test]
    fn test_swap_keeps_role_names() {
        let mut program = CpuProgram::new();
        let mut buffers = GridBuffers::default();
        buffers
            .ensure_all(&mut program, 4, 4, PixelFormat::Rgba32Float, FilterMode::Point)
            .unwrap();

        let current = *buffers.current.texture().unwrap();
        let next = *buffers.next.texture().unwrap();
        buffers.swap_current_next();

        assert_eq!(*buffers.current.texture().unwrap(), next);
        assert_eq!(*buffers.next.texture().unwrap(), current);
        assert_eq!(buffers.current.name(), MAP);
        assert_eq!(buffers.next.name(), NEW_MAP);
    }
}
