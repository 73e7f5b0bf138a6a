use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window};

use crate::config::WindowConfig;

use super::DEPTH_FORMAT;

/// Swapchain image acquired for one frame.
pub struct SurfaceFrame {
    view: wgpu::TextureView,
    texture: wgpu::SurfaceTexture,
}

impl SurfaceFrame {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn present(self) {
        self.texture.present();
    }
}

/// What a failed acquire asks of the caller before the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    Reconfigure,
    WaitForNextFrame,
    Fatal,
}

fn recovery_for(error: &wgpu::SurfaceError) -> Recovery {
    match error {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => Recovery::Reconfigure,
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => Recovery::WaitForNextFrame,
        wgpu::SurfaceError::OutOfMemory => Recovery::Fatal,
    }
}

/// Vsync pins FIFO; otherwise the first tear-allowing mode the adapter offers.
fn present_mode(vsync: bool, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    available.iter().copied().find(|mode| *mode != wgpu::PresentMode::Fifo).unwrap_or(wgpu::PresentMode::Fifo)
}

/// Colours are authored for a gamma-space framebuffer, so a non-sRGB format is preferred.
fn gamma_space_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats.iter().copied().find(|format| !format.is_srgb()).or_else(|| formats.first().copied())
}

fn screen_depth_view(device: &wgpu::Device, size: PhysicalSize<u32>) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Screen Depth"),
        size: wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

/// Device-side state that only exists once the window does.
struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
}

impl Gpu {
    async fn connect(window: Arc<Window>, vsync: bool) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window).context("Failed to create WGPU surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request WGPU adapter")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Tutorial Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
            })
            .await
            .context("Failed to request WGPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = gamma_space_format(&caps.formats).context("Surface reports no formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: present_mode(vsync, &caps.present_modes),
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!(
            adapter = %adapter.get_info().name,
            format = ?format,
            present_mode = ?config.present_mode,
            width = config.width,
            height = config.height,
            "surface_configured"
        );
        let depth_view = screen_depth_view(&device, size);
        Ok(Self { surface, device, queue, config, depth_view })
    }

    fn reconfigure(&mut self, size: PhysicalSize<u32>) {
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth_view = screen_depth_view(&self.device, size);
    }
}

/// Window plus swapchain. Nothing GPU-side exists until [`WindowSurface::ensure_window`].
pub struct WindowSurface {
    title: String,
    vsync: bool,
    fullscreen: bool,
    size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    #[cfg(test)]
    reconfigure_requests: usize,
}

impl WindowSurface {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self {
            title: window_cfg.title.clone(),
            vsync: window_cfg.vsync,
            fullscreen: window_cfg.fullscreen,
            size: PhysicalSize::new(window_cfg.width, window_cfg.height),
            window: None,
            gpu: None,
            #[cfg(test)]
            reconfigure_requests: 0,
        }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }
        let fullscreen = self.fullscreen.then_some(Fullscreen::Borderless(None));
        let attrs = Window::default_attributes()
            .with_title(self.title.as_str())
            .with_inner_size(self.size)
            .with_resizable(true)
            .with_fullscreen(fullscreen);
        let window = Arc::new(event_loop.create_window(attrs).context("Failed to create window")?);
        self.size = window.inner_size();
        self.gpu = Some(pollster::block_on(Gpu::connect(window.clone(), self.vsync))?);
        self.window = Some(window);
        Ok(())
    }

    fn gpu(&self) -> Result<&Gpu> {
        self.gpu.as_ref().context("GPU not initialized")
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        Ok(&self.gpu()?.device)
    }

    pub fn queue(&self) -> Result<&wgpu::Queue> {
        Ok(&self.gpu()?.queue)
    }

    pub fn depth_view(&self) -> Result<&wgpu::TextureView> {
        Ok(&self.gpu()?.depth_view)
    }

    pub fn surface_format(&self) -> Result<wgpu::TextureFormat> {
        Ok(self.gpu()?.config.format)
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    /// Records the new size; the swapchain follows unless the window is minimised.
    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.size = size;
        self.reconfigure();
    }

    fn reconfigure(&mut self) {
        #[cfg(test)]
        {
            self.reconfigure_requests += 1;
        }
        let size = self.size;
        if size.width == 0 || size.height == 0 {
            return;
        }
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.reconfigure(size);
        }
    }

    pub fn acquire_surface_frame(&mut self) -> Result<SurfaceFrame> {
        let acquired = self.gpu()?.surface.get_current_texture();
        match acquired {
            Ok(texture) => {
                let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
                Ok(SurfaceFrame { view, texture })
            }
            Err(err) => Err(self.recover(&err)),
        }
    }

    /// Applies the recovery `error` calls for and describes it for the skipped frame.
    fn recover(&mut self, error: &wgpu::SurfaceError) -> anyhow::Error {
        match recovery_for(error) {
            Recovery::Reconfigure => {
                warn!(error = %error, "surface_reconfigured");
                self.reconfigure();
                anyhow!("Surface lost or outdated; reconfigured")
            }
            Recovery::WaitForNextFrame => anyhow!("Surface not ready: {error}"),
            Recovery::Fatal => anyhow!("Surface out of memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_pins_fifo_and_otherwise_prefers_tearing_modes() {
        let modes = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Mailbox, wgpu::PresentMode::Immediate];
        assert_eq!(present_mode(true, &modes), wgpu::PresentMode::Fifo);
        assert_eq!(present_mode(false, &modes), wgpu::PresentMode::Mailbox);
        assert_eq!(present_mode(false, &[wgpu::PresentMode::Fifo]), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn gamma_space_formats_are_preferred() {
        let formats = [wgpu::TextureFormat::Bgra8UnormSrgb, wgpu::TextureFormat::Bgra8Unorm];
        assert_eq!(gamma_space_format(&formats), Some(wgpu::TextureFormat::Bgra8Unorm));
        let srgb_only = [wgpu::TextureFormat::Rgba8UnormSrgb];
        assert_eq!(gamma_space_format(&srgb_only), Some(wgpu::TextureFormat::Rgba8UnormSrgb));
        assert_eq!(gamma_space_format(&[]), None);
    }

    #[test]
    fn only_lost_or_outdated_surfaces_reconfigure() {
        let cases = [
            (wgpu::SurfaceError::Lost, Recovery::Reconfigure),
            (wgpu::SurfaceError::Outdated, Recovery::Reconfigure),
            (wgpu::SurfaceError::Timeout, Recovery::WaitForNextFrame),
            (wgpu::SurfaceError::Other, Recovery::WaitForNextFrame),
            (wgpu::SurfaceError::OutOfMemory, Recovery::Fatal),
        ];
        for (error, expected) in cases {
            assert_eq!(recovery_for(&error), expected);
        }
    }

    #[test]
    fn lost_surface_requests_reconfigure_before_gpu_exists() {
        let mut surface = WindowSurface::new(&WindowConfig::default());
        let err = surface.recover(&wgpu::SurfaceError::Lost);
        assert_eq!(surface.reconfigure_requests, 1);
        assert!(err.to_string().contains("reconfigured"));

        surface.recover(&wgpu::SurfaceError::Timeout);
        assert_eq!(surface.reconfigure_requests, 1);
    }
}
