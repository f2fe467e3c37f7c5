//! GPU Compute Backend
//!
//! Runs the reaction-diffusion kernels as WebGPU (wgpu) compute shaders over
//! storage textures.

mod program;

pub use program::{GpuProgram, GpuTexture, WORKGROUP_SIZE};

/// Error type for GPU operations.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("Device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("Readback channel closed before the buffer was mapped")]
    ReadbackChannel,

    #[error("Cannot read back {0:?} textures")]
    UnreadableFormat(crate::compute::PixelFormat),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::SimulationError;

    #[test]
    fn test_poll_failure_propagates() {
        let result: Result<(), wgpu::PollError> = Err(wgpu::PollError::Timeout);
        let propagated = (|| -> Result<(), SimulationError> {
            result.map_err(GpuError::from)?;
            Ok(())
        })();
        assert!(matches!(
            propagated,
            Err(SimulationError::Gpu(GpuError::Poll(_)))
        ));
    }
}
