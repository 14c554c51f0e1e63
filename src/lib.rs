//! # postfx
//!
//! **Post-processing for wgpu that merges effects into as few draws as possible.**
//!
//! Effects are small pieces of WGSL (a `main_image`, maybe a `main_uv`) plus uniforms and
//! defines. An [`EffectPass`] merges any number of them into one full-screen program, so
//! a vignette, a LUT and a bloom composite cost a single draw. A [`RenderPipeline`] runs
//! passes in order, ping-pongs the intermediate buffers and hands the last pass the screen.
//!
//! ## Quick Start
//!
//! ```no_run
//! use postfx::*;
//!
//! let gpu = GpuContext::headless(1280, 720).unwrap();
//! let mut pipeline = RenderPipeline::new(Box::new(WgpuRenderer::new(gpu)));
//!
//! pipeline
//!     .add_pass(GeometryPass::new(|scene| {
//!         scene.renderer.clear(scene.color, [0.1, 0.1, 0.15, 1.0])
//!     }))
//!     .unwrap();
//!
//! let bloom = shared(BloomEffect::new());
//! let effects: Vec<EffectRef> = vec![bloom.clone()];
//! pipeline.add_pass(EffectPass::new(None, effects).unwrap()).unwrap();
//!
//! pipeline.render(None);
//! for error in pipeline.take_errors() {
//!     eprintln!("{error}");
//! }
//! ```
//!
//! ## Pieces
//!
//! - **Effects** ([`Effect`], [`EffectDescriptor`]) are data plus optional per-frame
//!   behavior. Changing anything that alters the shader bumps a revision; the owning pass
//!   recompiles once before its next draw.
//! - **Passes** ([`Pass`]) are the schedulable units. [`EffectPass`] is the one that
//!   merges; [`GeometryPass`], [`CopyPass`], [`ClearPass`], [`LuminancePass`] and
//!   [`LambdaPass`] cover the rest of a typical frame.
//! - **Renderers** ([`Renderer`]) execute draws. [`WgpuRenderer`] talks to the GPU,
//!   [`testing::RecordingRenderer`] records draws for tests.

mod blending;
mod buffer;
mod camera;
mod config;
mod effect;
mod effect_pass;
mod error;
mod gpu;
mod math;
mod pass;
mod pipeline;
mod renderer;
mod resolution;
pub mod shader;
mod task;
pub mod testing;
mod timer;
mod uniform;

pub use blending::{BlendFunction, BlendMode};
pub use buffer::{BufferKind, BufferManager};
pub use camera::{Camera, Projection};
pub use config::{FrameBufferType, GpuConfig, PipelineConfig};
pub use effect::{
    BloomEffect, ColorSpace, DepthEffect, Effect, EffectAttribute, EffectContext,
    EffectDescriptor, EffectRef, LutEffect, LutTable, ShaderEffect, shared,
};
pub use effect_pass::{
    DEFAULT_MAX_TIME, EffectPass, MergedEffects, RESERVED_IDENTIFIERS, TextureBinding,
    UniformBinding, merge_effects,
};
pub use error::{
    CompileError, ConfigError, Error, GpuError, PassError, PipelineError, ResourceError,
    Result, TaskError,
};
pub use gpu::GpuContext;
pub use math::{lerp, saturate};
pub use pass::{
    ClearPass, CopyPass, GeometryPass, LambdaPass, LuminancePass, Pass, PassCore, PassId,
    PassInput, PassOutput, PipelineId, RenderContext, ResourceContext, SceneContext,
};
pub use pipeline::RenderPipeline;
pub use renderer::{
    DrawCall, FrameUniforms, Output, ProgramId, Renderer, TargetDescriptor, TargetFormat,
    TargetId, WgpuRenderer,
};
pub use resolution::Resolution;
pub use shader::{Extension, ShaderProgram, ShaderSection, TextureKind, TextureSlot};
pub use task::{BackgroundTask, TaskStatus};
pub use timer::Timer;
pub use uniform::{TextureSource, UniformLayout, UniformType, UniformValue};
