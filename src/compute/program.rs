//! Compute program contract.
//!
//! A program exposes three entry points with fixed indices. Each reads one
//! named buffer and writes another:
//!
//! | Kernel  | Source    | Target       |
//! |---------|-----------|--------------|
//! | Init    | `InitMap` | `Map`        |
//! | Step    | `Map`     | `NewMap`     |
//! | Display | `Map`     | `DisplayMap` |

use super::{FilterMode, GroupCount, ParamName, ParamValue, PixelFormat, SimulationError, WorkgroupSize};
use crate::schema::InitMap;

/// Bind name of the externally supplied initial-state image.
pub const INIT_MAP: &str = "InitMap";
/// Bind name of the Current buffer.
pub const MAP: &str = "Map";
/// Bind name of the Next buffer.
pub const NEW_MAP: &str = "NewMap";
/// Bind name of the Display buffer.
pub const DISPLAY_MAP: &str = "DisplayMap";

/// One of the three fixed compute entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelHandle {
    Init = 0,
    Step = 1,
    Display = 2,
}

impl KernelHandle {
    pub const ALL: [KernelHandle; 3] = [KernelHandle::Init, KernelHandle::Step, KernelHandle::Display];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Entry point name in the shader module.
    pub fn entry_point(self) -> &'static str {
        match self {
            KernelHandle::Init => "initialize",
            KernelHandle::Step => "simulate",
            KernelHandle::Display => "display",
        }
    }

    /// Name of the buffer the kernel reads.
    pub fn source_name(self) -> &'static str {
        match self {
            KernelHandle::Init => INIT_MAP,
            KernelHandle::Step | KernelHandle::Display => MAP,
        }
    }

    /// Name of the buffer the kernel writes.
    pub fn target_name(self) -> &'static str {
        match self {
            KernelHandle::Init => MAP,
            KernelHandle::Step => NEW_MAP,
            KernelHandle::Display => DISPLAY_MAP,
        }
    }

    /// Resolve a bind name to this kernel's slot.
    pub fn slot(self, name: &str) -> Option<BindingSlot> {
        if name == self.source_name() {
            Some(BindingSlot::Source)
        } else if name == self.target_name() {
            Some(BindingSlot::Target)
        } else {
            None
        }
    }
}

/// Position of a buffer in a kernel's binding list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSlot {
    Source = 0,
    Target = 1,
}

/// Edge addressing of a grid buffer. Grid buffers always clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    Clamp,
}

/// Allocation request for a grid buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSpec {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub filter: FilterMode,
    pub wrap: WrapMode,
    /// Kernels may write the texture directly.
    pub random_write: bool,
    /// Generate mip levels after writes.
    pub mipmaps: bool,
}

/// A compute program with the Init/Step/Display entry points.
///
/// Implementations enqueue work in submission order; `dispatch` and
/// `copy_texture` never wait for completion. Only `read_texture` blocks.
pub trait ComputeProgram {
    /// Handle to a program-owned 2D RGBA texture.
    type Texture: Clone;

    fn create_texture(&mut self, spec: &TextureSpec) -> Result<Self::Texture, SimulationError>;

    fn release_texture(&mut self, texture: Self::Texture);

    /// Whether the texture is still backed by a live resource.
    fn is_realized(&self, texture: &Self::Texture) -> bool;

    /// Create a read-only texture holding an initial-state image.
    fn upload_image(&mut self, image: &InitMap) -> Result<Self::Texture, SimulationError>;

    /// Threads per group declared by `kernel`.
    fn workgroup_size(&self, kernel: KernelHandle) -> WorkgroupSize;

    fn set_param(&mut self, name: ParamName, value: ParamValue);

    /// Bind `texture` to `kernel` under `name`.
    fn set_texture(
        &mut self,
        kernel: KernelHandle,
        name: &str,
        texture: &Self::Texture,
    ) -> Result<(), SimulationError>;

    fn dispatch(&mut self, kernel: KernelHandle, groups: GroupCount) -> Result<(), SimulationError>;

    /// Full-frame copy between two textures of identical size and format.
    fn copy_texture(
        &mut self,
        source: &Self::Texture,
        destination: &Self::Texture,
    ) -> Result<(), SimulationError>;

    /// Read back every pixel of a texture, row-major.
    fn read_texture(&self, texture: &Self::Texture) -> Result<Vec<[f32; 4]>, SimulationError>;
}

/// Per-kernel source/target bindings shared by program implementations.
#[derive(Debug, Clone)]
pub struct BindingTable<T> {
    slots: [[Option<T>; 2]; 3],
}

impl<T> Default for BindingTable<T> {
    fn default() -> Self {
        Self {
            slots: Default::default(),
        }
    }
}

impl<T: Clone> BindingTable<T> {
    pub fn bind(&mut self, kernel: KernelHandle, name: &str, texture: &T) -> Result<(), SimulationError> {
        let slot = kernel.slot(name).ok_or_else(|| SimulationError::UnknownBinding {
            kernel,
            name: name.to_string(),
        })?;
        self.slots[kernel.index()][slot as usize] = Some(texture.clone());
        Ok(())
    }

    /// Both bound textures of `kernel` as `(source, target)`.
    pub fn resolve(&self, kernel: KernelHandle) -> Result<(&T, &T), SimulationError> {
        let [source, target] = &self.slots[kernel.index()];
        let missing = |name: &str| SimulationError::MissingBinding {
            kernel,
            name: name.to_string(),
        };
        let source = source.as_ref().ok_or_else(|| missing(kernel.source_name()))?;
        let target = target.as_ref().ok_or_else(|| missing(kernel.target_name()))?;
        Ok((source, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_indices_fixed() {
        assert_eq!(KernelHandle::Init.index(), 0);
        assert_eq!(KernelHandle::Step.index(), 1);
        assert_eq!(KernelHandle::Display.index(), 2);
    }

    #[test]
    fn test_binding_names() {
        assert_eq!(KernelHandle::Init.slot("InitMap"), Some(BindingSlot::Source));
        assert_eq!(KernelHandle::Init.slot("Map"), Some(BindingSlot::Target));
        assert_eq!(KernelHandle::Step.slot("Map"), Some(BindingSlot::Source));
        assert_eq!(KernelHandle::Step.slot("NewMap"), Some(BindingSlot::Target));
        assert_eq!(KernelHandle::Display.slot("DisplayMap"), Some(BindingSlot::Target));
        assert_eq!(KernelHandle::Display.slot("NewMap"), None);
    }

    #[test]
    fn test_binding_table_reports_missing_and_unknown() {
        let mut table = BindingTable::<u32>::default();

        assert!(matches!(
            table.bind(KernelHandle::Step, "DisplayMap", &1),
            Err(SimulationError::UnknownBinding { .. })
        ));

        table.bind(KernelHandle::Step, "Map", &1).unwrap();
        match table.resolve(KernelHandle::Step) {
            Err(SimulationError::MissingBinding { kernel, name }) => {
                assert_eq!(kernel, KernelHandle::Step);
                assert_eq!(name, "NewMap");
            }
            other => panic!("expected missing binding, got {other:?}"),
        }

        table.bind(KernelHandle::Step, "NewMap", &2).unwrap();
        assert_eq!(table.resolve(KernelHandle::Step).unwrap(), (&1, &2));
    }
}
