//! wgpu device and surface setup.
//!
//! [`GpuContext`] holds the device, the queue and, for windowed use, the surface with
//! its configuration. [`WgpuRenderer`](crate::WgpuRenderer) is built on top of it.
//!
//! # Example
//!
//! ```no_run
//! use postfx::{GpuConfig, GpuContext};
//!
//! // No window: the screen output is an offscreen texture.
//! let gpu = GpuContext::headless(640, 360).unwrap();
//! println!("{}x{} {:?}", gpu.width(), gpu.height(), gpu.config.format);
//! ```

use std::sync::Arc;

use winit::window::Window;

use crate::config::GpuConfig;
use crate::error::GpuError;

/// Core GPU state.
///
/// All fields are public for direct access to the wgpu API.
pub struct GpuContext {
    /// `None` when running headless.
    pub surface: Option<wgpu::Surface<'static>>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Size, format and present mode of the screen output. Headless contexts keep one
    /// too, so that offscreen screens are created the same way.
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Creates a context that presents to `window`.
    pub fn new(window: Arc<Window>, settings: &GpuConfig) -> Result<Self, GpuError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = request_device(&adapter)?;

        let caps = surface.get_capabilities(&adapter);
        // Effects convert to sRGB themselves when asked to, so prefer a linear format.
        let format = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or(GpuError::NoSurfaceFormat)?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: settings.present_mode(),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!(
            "surface configured: {}x{} {:?} {:?}",
            config.width,
            config.height,
            config.format,
            config.present_mode
        );

        Ok(Self {
            surface: Some(surface),
            device,
            queue,
            config,
        })
    }

    /// Creates a context without a window.
    pub fn headless(width: u32, height: u32) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = request_device(&adapter)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: wgpu::TextureFormat::Rgba8Unorm,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        log::info!("headless context {}x{}", config.width, config.height);

        Ok(Self {
            surface: None,
            device,
            queue,
            config,
        })
    }

    /// Resizes the screen output.
    ///
    /// Zero-sized dimensions are ignored; windows report them while minimized.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            if let Some(surface) = &self.surface {
                surface.configure(&self.device, &self.config);
            }
        }
    }

    /// Re-applies the current configuration after the surface was lost.
    pub fn reconfigure(&self) {
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }

    pub fn is_headless(&self) -> bool {
        self.surface.is_none()
    }
}

fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), GpuError> {
    // Optional shader extensions are enabled when the adapter has them.
    let wanted = wgpu::Features::SHADER_F16
        | wgpu::Features::DUAL_SOURCE_BLENDING
        | wgpu::Features::CLIP_DISTANCES;
    let required_features = adapter.features() & wanted;

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("postfx device"),
        required_features,
        required_limits: wgpu::Limits::default(),
        memory_hints: Default::default(),
        trace: Default::default(),
        experimental_features: Default::default(),
    }))?;
    log::debug!("device features: {required_features:?}");
    Ok((device, queue))
}
