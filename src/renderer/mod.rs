//! The device boundary.
//!
//! Passes never touch wgpu directly. They talk to a [`Renderer`], which hands out opaque
//! [`TargetId`] and [`ProgramId`] handles and executes full-screen [`DrawCall`]s. The
//! production implementation is [`WgpuRenderer`]; tests use
//! [`RecordingRenderer`](crate::testing::RecordingRenderer).

mod wgpu_renderer;

pub use wgpu_renderer::WgpuRenderer;

use std::any::Any;

use crate::error::{CompileError, PassError, ResourceError};
use crate::shader::ShaderProgram;

/// Handle to a render target owned by a renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Handle to a compiled shader program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u64);

impl ProgramId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Rgba8Unorm,
    Rgba16Float,
    R16Float,
    Depth32Float,
}

impl TargetFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TargetFormat::Rgba8Unorm => 4,
            TargetFormat::Rgba16Float => 8,
            TargetFormat::R16Float => 2,
            TargetFormat::Depth32Float => 4,
        }
    }

    pub fn is_depth(self) -> bool {
        self == TargetFormat::Depth32Float
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TargetFormat,
}

impl TargetDescriptor {
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: TargetFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }
}

/// Where a draw writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Output {
    #[default]
    Screen,
    Target(TargetId),
}

/// Values every program receives at `@group(0) @binding(0)`.
///
/// Matches the WGSL `FrameUniforms` struct declared by the shader templates.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    /// `(width, height, 1 / width, 1 / height)`
    pub resolution: [f32; 4],
    /// `(near, far, aspect, perspective)`
    pub camera_params: [f32; 4],
    pub time: f32,
    pub _padding: [f32; 3],
}

impl FrameUniforms {
    pub fn new(width: u32, height: u32, time: f32) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self {
            resolution: [w, h, 1.0 / w, 1.0 / h],
            camera_params: [0.0, 1.0, w / h, 0.0],
            time,
            _padding: [0.0; 3],
        }
    }

    pub fn with_camera_params(mut self, params: [f32; 4]) -> Self {
        self.camera_params = params;
        self
    }
}

/// One full-screen triangle.
///
/// `textures[i]` feeds the i-th texture slot of the program; `None` binds a 1×1 fallback.
#[derive(Clone, Debug)]
pub struct DrawCall<'a> {
    pub label: &'a str,
    pub program: ProgramId,
    pub frame: FrameUniforms,
    pub params: &'a [u8],
    pub input: Option<TargetId>,
    pub textures: &'a [Option<TargetId>],
    pub output: Output,
    pub clear: Option<[f32; 4]>,
}

/// A GPU backend.
pub trait Renderer {
    /// Logical size, as last passed to [`set_size`](Self::set_size).
    fn size(&self) -> (u32, u32);

    /// Physical size of the screen output in pixels.
    fn drawing_buffer_size(&self) -> (u32, u32);

    fn set_size(&mut self, width: u32, height: u32, update_style: bool);

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> Result<TargetId, ResourceError>;

    /// Replaces the contents of a target. `data` must be tightly packed.
    fn write_target(&mut self, target: TargetId, data: &[u8]) -> Result<(), ResourceError>;

    fn destroy_target(&mut self, target: TargetId);

    fn target_size(&self, target: TargetId) -> Option<(u32, u32)>;

    fn compile(&mut self, program: &ShaderProgram) -> Result<ProgramId, CompileError>;

    fn destroy_program(&mut self, program: ProgramId);

    /// Starts a frame. Returns false when there is nothing to render into.
    fn begin_frame(&mut self) -> bool;

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), PassError>;

    /// Clears a color target to `color`, or a depth target to the far plane.
    fn clear(&mut self, output: Output, color: [f32; 4]) -> Result<(), PassError>;

    fn end_frame(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
