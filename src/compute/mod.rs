//! Compute module - grid buffers, kernel dispatch and the simulation controller.

mod buffer;
mod controller;
mod cpu;
mod dispatch;
mod params;
mod program;
mod stats;

pub mod gpu;

pub use buffer::*;
pub use controller::*;
pub use cpu::*;
pub use dispatch::*;
pub use params::*;
pub use program::*;
pub use stats::*;

/// Error type for simulation operations.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Failed to allocate {width}x{height} texture '{name}': {reason}")]
    Allocation {
        name: String,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("Kernel {kernel:?} has no texture binding named '{name}'")]
    UnknownBinding { kernel: KernelHandle, name: String },

    #[error("Kernel {kernel:?} dispatched without '{name}' bound")]
    MissingBinding { kernel: KernelHandle, name: String },

    #[error("Kernel {kernel:?} declares invalid group size {size:?}")]
    InvalidGroupSize {
        kernel: KernelHandle,
        size: WorkgroupSize,
    },

    #[error("Texture was released")]
    ReleasedTexture,

    #[error("Copy between textures of different size or format")]
    CopyMismatch,

    #[error("Kernel source and target are the same texture")]
    AliasedTextures,

    #[error("Simulation has not been initialized")]
    Uninitialized,

    #[error("{0:?} buffer is not allocated")]
    Unallocated(BufferRole),

    #[error(transparent)]
    Gpu(#[from] gpu::GpuError),
}
