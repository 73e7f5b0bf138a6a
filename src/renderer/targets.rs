use std::collections::HashMap;

use anyhow::{anyhow, Result};
use glam::UVec2;
use tracing::debug;

use crate::draw::{RenderTargetId, TextureId};

use super::{DEPTH_FORMAT, TARGET_FORMAT};

/// Off-screen colour + depth pair. Depth is sampled by the outline program.
pub struct GpuTarget {
    pub color_view: wgpu::TextureView,
    pub depth_view: wgpu::TextureView,
    pub size: UVec2,
    _color: wgpu::Texture,
    _depth: wgpu::Texture,
}

impl GpuTarget {
    fn new(device: &wgpu::Device, id: RenderTargetId, size: UVec2) -> Self {
        let extent = wgpu::Extent3d { width: size.x, height: size.y, depth_or_array_layers: 1 };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Render Target {} Color", id.0)),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Render Target {} Depth", id.0)),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        Self {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            size,
            _color: color,
            _depth: depth,
        }
    }
}

/// Sampled RGBA image such as the font atlas.
pub struct GpuImage {
    pub view: wgpu::TextureView,
    pub size: UVec2,
    _texture: wgpu::Texture,
}

impl GpuImage {
    pub fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        size: UVec2,
        rgba: &[u8],
    ) -> Result<Self> {
        let expected = size.x as usize * size.y as usize * 4;
        if size.x == 0 || size.y == 0 || rgba.len() != expected {
            return Err(anyhow!(
                "texture '{label}' has {} bytes, expected {expected} for {}x{}",
                rgba.len(),
                size.x,
                size.y
            ));
        }
        let extent = wgpu::Extent3d { width: size.x, height: size.y, depth_or_array_layers: 1 };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.x),
                rows_per_image: Some(size.y),
            },
            extent,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self { view, size, _texture: texture })
    }
}

/// Owns every render target and image texture, handing out ids that never repeat.
#[derive(Default)]
pub struct TexturePool {
    targets: HashMap<RenderTargetId, GpuTarget>,
    images: HashMap<TextureId, GpuImage>,
    next_target: u32,
    next_image: u32,
}

impl TexturePool {
    pub fn create_target(&mut self, device: &wgpu::Device, size: UVec2) -> Result<RenderTargetId> {
        let limit = device.limits().max_texture_dimension_2d;
        if size.x == 0 || size.y == 0 || size.x > limit || size.y > limit {
            return Err(anyhow!("render target size {}x{} outside 1..={limit}", size.x, size.y));
        }
        self.next_target += 1;
        let id = RenderTargetId(self.next_target);
        self.targets.insert(id, GpuTarget::new(device, id, size));
        debug!(target_id = id.0, width = size.x, height = size.y, "gpu_target_created");
        Ok(id)
    }

    pub fn destroy_target(&mut self, id: RenderTargetId) -> bool {
        self.targets.remove(&id).is_some()
    }

    pub fn target(&self, id: RenderTargetId) -> Option<&GpuTarget> {
        self.targets.get(&id)
    }

    pub fn insert_image(&mut self, image: GpuImage) -> TextureId {
        self.next_image += 1;
        let id = TextureId(self.next_image);
        self.images.insert(id, image);
        id
    }

    pub fn image(&self, id: TextureId) -> Option<&GpuImage> {
        self.images.get(&id)
    }

    pub fn targets(&self) -> impl Iterator<Item = (RenderTargetId, &GpuTarget)> + '_ {
        self.targets.iter().map(|(id, target)| (*id, target))
    }

    pub fn images(&self) -> impl Iterator<Item = (TextureId, &GpuImage)> + '_ {
        self.images.iter().map(|(id, image)| (*id, image))
    }
}
