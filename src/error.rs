//! Error types.
//!
//! Errors are split by when they can happen:
//!
//! - [`ConfigError`] is raised synchronously while an [`EffectPass`](crate::EffectPass) is built
//!   or a pass is added to a [`RenderPipeline`](crate::RenderPipeline). Nothing is left
//!   half-constructed when it is returned.
//! - [`CompileError`] keeps the merged source that failed so it can be inspected.
//! - [`ResourceError`] covers render target allocation and uploads.
//! - [`PassError`] is what a pass returns from its hooks. The pipeline wraps it in a
//!   [`PipelineError`] together with the pass name and keeps rendering the other passes.
//! - [`TaskError`] is produced by [`BackgroundTask`](crate::BackgroundTask).

use thiserror::Error;

use crate::buffer::BufferKind;
use crate::renderer::TargetId;

/// A programmer error detected while wiring effects and passes together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("effects '{first}' and '{second}' both declare the exclusive {attribute} attribute")]
    AttributeConflict {
        attribute: &'static str,
        first: String,
        second: String,
    },

    #[error("effects '{first}' and '{second}' both convert the output color space")]
    ColorSpaceConflict { first: String, second: String },

    #[error("effect '{effect}' is already attached to another effect pass")]
    EffectAlreadyAttached { effect: String },

    #[error("effect #{index} is mutably borrowed")]
    EffectBorrowed { index: usize },

    #[error("effect '{effect}' uses the reserved identifier '{name}'")]
    ReservedIdentifier { effect: String, name: String },

    #[error("effect '{effect}' uses '{name}' both as a uniform and as a shader declaration")]
    NameCollision { effect: String, name: String },

    #[error("pass '{pass}' reads the {buffer} buffer but no earlier pass produces it")]
    MissingInput { pass: String, buffer: BufferKind },

    #[error("passes '{first}' and '{second}' both write the {buffer} buffer")]
    ConflictingWriters {
        buffer: BufferKind,
        first: String,
        second: String,
    },
}

/// A shader program that failed preprocessing or validation.
///
/// `merged_source` is the complete module that was handed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to compile '{label}': {message}")]
pub struct CompileError {
    pub label: String,
    pub message: String,
    pub merged_source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("failed to allocate '{label}' ({width}x{height}): {reason}")]
    Allocation {
        label: String,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("unknown render target {0:?}")]
    UnknownTarget(TargetId),

    #[error("'{0}' is a depth target and cannot be written from the CPU")]
    DepthUpload(String),

    #[error("upload to '{label}' has {actual} bytes, expected {expected}")]
    UploadSize {
        label: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("draw failed: {0}")]
    Draw(String),

    #[error("effect '{0}' is borrowed while the pass renders")]
    EffectBorrowed(String),

    #[error("'{0}' changed its shader during the frame; draw skipped until it recompiles")]
    StaleProgram(String),
}

impl PassError {
    /// Whether the failing pass should be switched off.
    ///
    /// Draw failures are transient (a lost surface, a skipped frame), and so are a
    /// borrowed effect and a program that the next prepare recompiles. Everything else
    /// would fail again on the next frame.
    pub fn disables_pass(&self) -> bool {
        !matches!(
            self,
            PassError::Draw(_) | PassError::EffectBorrowed(_) | PassError::StaleProgram(_)
        )
    }
}

/// A pass failure reported by [`RenderPipeline`](crate::RenderPipeline).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pass '{pass}': {error}")]
pub struct PipelineError {
    pub pass: String,
    pub error: PassError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("background task '{name}' failed: {reason}")]
    Failed { name: String, reason: String },

    #[error("background task '{name}' panicked")]
    Panicked { name: String },

    #[error("background task '{name}' could not be started: {reason}")]
    Spawn { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Pass(#[from] PassError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid lookup table: {0}")]
    InvalidLut(String),
}

pub type Result<T> = std::result::Result<T, Error>;
