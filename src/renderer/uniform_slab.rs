use anyhow::{Context, Result};

/// Byte distance between consecutive uniform blocks; the largest alignment wgpu may require.
pub const UNIFORM_STRIDE: u64 = 256;

/// One uniform buffer per frame, addressed with dynamic offsets.
///
/// Blocks are staged on the CPU with [`push`](Self::push) and written in a single upload. The
/// buffer and its bind group are rebuilt only when the staged data outgrows them.
pub struct UniformSlab {
    label: &'static str,
    block_size: u64,
    staging: Vec<u8>,
    buffer: Option<wgpu::Buffer>,
    bind_group: Option<wgpu::BindGroup>,
    capacity: u64,
}

impl UniformSlab {
    pub fn new<T: bytemuck::Pod>(label: &'static str) -> Self {
        let block_size = std::mem::size_of::<T>() as u64;
        debug_assert!(block_size <= UNIFORM_STRIDE);
        Self { label, block_size, staging: Vec::new(), buffer: None, bind_group: None, capacity: 0 }
    }

    pub fn layout_entry() -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: None,
            },
            count: None,
        }
    }

    pub fn clear(&mut self) {
        self.staging.clear();
    }

    /// Stages `value` and returns its dynamic offset.
    pub fn push<T: bytemuck::Pod>(&mut self, value: &T) -> u32 {
        let offset = self.staging.len();
        self.staging.extend_from_slice(bytemuck::bytes_of(value));
        self.staging.resize(offset + UNIFORM_STRIDE as usize, 0);
        offset as u32
    }

    #[cfg(test)]
    pub fn staged_blocks(&self) -> usize {
        self.staging.len() / UNIFORM_STRIDE as usize
    }

    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
    ) -> Result<()> {
        let required = (self.staging.len() as u64).max(UNIFORM_STRIDE);
        if self.buffer.is_none() || required > self.capacity {
            let mut capacity = self.capacity.max(UNIFORM_STRIDE * 16);
            while capacity < required {
                capacity *= 2;
            }
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: capacity,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(self.label),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(self.block_size),
                    }),
                }],
            });
            self.buffer = Some(buffer);
            self.bind_group = Some(bind_group);
            self.capacity = capacity;
        }
        if !self.staging.is_empty() {
            let buffer = self.buffer.as_ref().context("Uniform buffer missing")?;
            queue.write_buffer(buffer, 0, &self.staging);
        }
        Ok(())
    }

    pub fn bind_group(&self) -> Result<&wgpu::BindGroup> {
        self.bind_group.as_ref().context("Uniform bind group missing")
    }
}
