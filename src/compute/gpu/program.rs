//! GPU Program - the Init/Step/Display kernels on WebGPU.

use super::GpuError;
use crate::compute::{
    BindingTable, ComputeProgram, FilterMode, GroupCount, INIT_MAP, KernelHandle, KernelUniforms,
    ParamName, ParamValue, PixelFormat, SimulationError, TextureSpec, WorkgroupSize, WrapMode,
};
use crate::schema::InitMap;

// Embed shader source at compile time
const REACTION_DIFFUSION_SHADER: &str = include_str!("shaders/reaction_diffusion.wgsl");

/// Group size declared by every entry point in the shader.
pub const WORKGROUP_SIZE: WorkgroupSize = WorkgroupSize::new(8, 8, 1);

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        PixelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

fn shader_source(format: PixelFormat) -> String {
    match format {
        PixelFormat::Rgba32Float => REACTION_DIFFUSION_SHADER.to_string(),
        PixelFormat::Rgba16Float => REACTION_DIFFUSION_SHADER.replace("rgba32float", "rgba16float"),
    }
}

/// A texture owned by a [`GpuProgram`].
#[derive(Debug, Clone)]
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    spec: TextureSpec,
}

impl GpuTexture {
    #[inline]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    #[inline]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    #[inline]
    pub fn spec(&self) -> &TextureSpec {
        &self.spec
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.spec.width,
            height: self.spec.height,
            depth_or_array_layers: 1,
        }
    }
}

/// Compute program running on a wgpu device.
///
/// Every dispatch and copy is submitted to the queue immediately; the queue
/// executes submissions in order. Only [`ComputeProgram::read_texture`] waits.
pub struct GpuProgram {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: PixelFormat,
    pipelines: Vec<wgpu::ComputePipeline>,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniforms: KernelUniforms,
    bindings: BindingTable<GpuTexture>,
}

impl GpuProgram {
    /// Create a program on the default high-performance adapter.
    pub async fn new(format: PixelFormat) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| GpuError::NoAdapter)?;

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Reaction Diffusion GPU"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await?;

        log::info!("using GPU adapter {:?}", adapter.get_info().name);
        Ok(Self::from_device(device, queue, format))
    }

    /// Create a program on an existing device, e.g. one shared with a renderer.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, format: PixelFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Reaction Diffusion Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source(format).into()),
        });

        let bind_group_layout = create_bind_group_layout(&device, format);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Reaction Diffusion Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            ..Default::default()
        });

        let pipelines = KernelHandle::ALL
            .iter()
            .map(|kernel| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(kernel.entry_point()),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(kernel.entry_point()),
                    compilation_options: Default::default(),
                    cache: None,
                })
            })
            .collect();

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Uniforms"),
            size: std::mem::size_of::<KernelUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            format,
            pipelines,
            bind_group_layout,
            uniform_buffer,
            uniforms: KernelUniforms::default(),
            bindings: BindingTable::default(),
        }
    }

    /// Storage format the kernels were compiled for.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Sampler matching a texture's filter and wrap settings, for presenting it.
    pub fn sampler(&self, texture: &GpuTexture) -> wgpu::Sampler {
        let filter = match texture.spec.filter {
            FilterMode::Point => wgpu::FilterMode::Nearest,
            FilterMode::Bilinear => wgpu::FilterMode::Linear,
        };
        let address = match texture.spec.wrap {
            WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
        };
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(texture.spec.name),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            ..Default::default()
        })
    }

    fn check_extent(&self, name: &str, width: u32, height: u32) -> Result<(), SimulationError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(SimulationError::Allocation {
                name: name.to_string(),
                width,
                height,
                reason: format!("dimensions must be within 1..={max}"),
            });
        }
        Ok(())
    }

    fn allocate(&self, spec: &TextureSpec, usage: wgpu::TextureUsages) -> GpuTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(spec.name),
            size: wgpu::Extent3d {
                width: spec.width,
                height: spec.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(spec.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture {
            texture,
            view,
            spec: *spec,
        }
    }
}

fn create_bind_group_layout(device: &wgpu::Device, format: PixelFormat) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Reaction Diffusion Bind Group Layout"),
        entries: &[
            // Params
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            // Source map
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            // Target map
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: texture_format(format),
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
        ],
    })
}

impl ComputeProgram for GpuProgram {
    type Texture = GpuTexture;

    fn create_texture(&mut self, spec: &TextureSpec) -> Result<GpuTexture, SimulationError> {
        self.check_extent(spec.name, spec.width, spec.height)?;
        if spec.format != self.format {
            return Err(SimulationError::Allocation {
                name: spec.name.to_string(),
                width: spec.width,
                height: spec.height,
                reason: format!("kernels were compiled for {:?}", self.format),
            });
        }

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;
        if spec.random_write {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        Ok(self.allocate(spec, usage))
    }

    fn release_texture(&mut self, texture: GpuTexture) {
        texture.texture.destroy();
    }

    fn is_realized(&self, _texture: &GpuTexture) -> bool {
        // wgpu keeps a texture alive for as long as a handle exists
        true
    }

    fn upload_image(&mut self, image: &InitMap) -> Result<GpuTexture, SimulationError> {
        self.check_extent(INIT_MAP, image.width, image.height)?;
        if image.pixels.len() != image.width as usize * image.height as usize {
            return Err(SimulationError::Allocation {
                name: INIT_MAP.to_string(),
                width: image.width,
                height: image.height,
                reason: format!(
                    "expected {} pixels, got {}",
                    image.width * image.height,
                    image.pixels.len()
                ),
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
        let texture = self.allocate(
            &spec,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );

        self.queue.write_texture(
            texture.texture.as_image_copy(),
            bytemuck::cast_slice(&image.pixels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.width * PixelFormat::Rgba32Float.bytes_per_pixel()),
                rows_per_image: Some(image.height),
            },
            texture.extent(),
        );
        Ok(texture)
    }

    fn workgroup_size(&self, _kernel: KernelHandle) -> WorkgroupSize {
        WORKGROUP_SIZE
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
        texture: &GpuTexture,
    ) -> Result<(), SimulationError> {
        self.bindings.bind(kernel, name, texture)
    }

    fn dispatch(&mut self, kernel: KernelHandle, groups: GroupCount) -> Result<(), SimulationError> {
        let (source, target) = self.bindings.resolve(kernel)?;

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.entry_point()),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
            ],
        });

        // Uniform writes land before the next submission, so each dispatch
        // sees the values bound for it
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kernel.entry_point()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines[kernel.index()]);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups.x, groups.y, groups.z);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn copy_texture(
        &mut self,
        source: &GpuTexture,
        destination: &GpuTexture,
    ) -> Result<(), SimulationError> {
        if source.spec.width != destination.spec.width
            || source.spec.height != destination.spec.height
            || source.spec.format != destination.spec.format
        {
            return Err(SimulationError::CopyMismatch);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Buffer Exchange"),
            });
        encoder.copy_texture_to_texture(
            source.texture.as_image_copy(),
            destination.texture.as_image_copy(),
            source.extent(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_texture(&self, texture: &GpuTexture) -> Result<Vec<[f32; 4]>, SimulationError> {
        if texture.spec.format != PixelFormat::Rgba32Float {
            return Err(GpuError::UnreadableFormat(texture.spec.format).into());
        }

        let width = texture.spec.width;
        let height = texture.spec.height;
        let unpadded_bytes_per_row = width * PixelFormat::Rgba32Float.bytes_per_pixel();
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback"),
            });
        encoder.copy_texture_to_buffer(
            texture.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            texture.extent(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(GpuError::from)?;
        rx.recv()
            .map_err(|_| GpuError::ReadbackChannel)?
            .map_err(GpuError::from)?;

        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        {
            let data = buffer_slice.get_mapped_range();
            for row in data.chunks_exact(padded_bytes_per_row as usize) {
                let texels: &[f32] = bytemuck::cast_slice(&row[..unpadded_bytes_per_row as usize]);
                pixels.extend(
                    texels
                        .chunks_exact(4)
                        .map(|t| [t[0], t[1], t[2], t[3]]),
                );
            }
        }
        staging_buffer.unmap();

        Ok(pixels)
    }
}
