//! Pipeline and GPU configuration.

/// Precision of the intermediate color buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrameBufferType {
    /// 8 bits per channel.
    #[default]
    Standard,
    /// 16-bit float per channel.
    Hdr,
}

/// Settings for a [`RenderPipeline`](crate::RenderPipeline).
///
/// ```
/// use postfx::{FrameBufferType, PipelineConfig};
///
/// let config = PipelineConfig::new()
///     .frame_buffer_type(FrameBufferType::Hdr)
///     .time_scale(0.5);
/// assert!(config.auto_render_to_screen);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// The last enabled pass writes to the screen unless a pass is pinned.
    pub auto_render_to_screen: bool,
    /// Forwarded to [`Renderer::set_size`](crate::Renderer::set_size).
    pub update_style: bool,
    pub frame_buffer_type: FrameBufferType,
    /// Seconds per fixed update step.
    pub fixed_delta: f64,
    pub time_scale: f64,
    /// The time uniform wraps around after this many seconds to keep precision.
    pub max_time: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_render_to_screen: true,
            update_style: true,
            frame_buffer_type: FrameBufferType::Standard,
            fixed_delta: 1.0 / 60.0,
            time_scale: 1.0,
            max_time: 1e3,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_render_to_screen(mut self, enabled: bool) -> Self {
        self.auto_render_to_screen = enabled;
        self
    }

    pub fn update_style(mut self, update_style: bool) -> Self {
        self.update_style = update_style;
        self
    }

    pub fn frame_buffer_type(mut self, frame_buffer_type: FrameBufferType) -> Self {
        self.frame_buffer_type = frame_buffer_type;
        self
    }

    pub fn fixed_delta(mut self, seconds: f64) -> Self {
        self.fixed_delta = seconds;
        self
    }

    pub fn time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale;
        self
    }

    pub fn max_time(mut self, seconds: f32) -> Self {
        self.max_time = seconds;
        self
    }
}

/// Window and device settings used by [`GpuContext`](crate::GpuContext) and the demo.
#[derive(Clone, Debug, PartialEq)]
pub struct GpuConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Prefer `Fifo` (vsync). When false, `AutoNoVsync` is requested.
    pub vsync: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            title: "postfx".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
        }
    }
}

impl GpuConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub(crate) fn present_mode(&self) -> wgpu::PresentMode {
        if self.vsync {
            wgpu::PresentMode::Fifo
        } else {
            wgpu::PresentMode::AutoNoVsync
        }
    }
}
