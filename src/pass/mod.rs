//! The schedulable unit of the pipeline.
//!
//! A [`Pass`] performs one draw (or a handful, for passes with private sub-passes)
//! when the pipeline invokes it. Its shared state lives in a [`PassCore`]: enabled
//! flag, own [`Resolution`], declared input and output buffers, and whether it has been
//! registered with a pipeline.
//!
//! # Execution Flow
//!
//! 1. The pipeline wires the default chain: each enabled pass gets the previous
//!    pass's output as `input.default_buffer` and a ping-pong buffer (or the screen)
//!    as `output.default`. Named buffers are resolved from the passes that produce them.
//! 2. `prepare()` runs for every enabled pass. This is where shaders are recompiled.
//! 3. `render()` runs for every enabled pass, in list order.
//!
//! # Implementing Custom Passes
//!
//! ```ignore
//! struct Invert {
//!     core: PassCore,
//!     program: Option<ProgramId>,
//! }
//!
//! impl Pass for Invert {
//!     fn core(&self) -> &PassCore { &self.core }
//!     fn core_mut(&mut self) -> &mut PassCore { &mut self.core }
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn Any { self }
//!
//!     fn initialize(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
//!         self.program = Some(ctx.renderer.compile(&invert_program())?);
//!         Ok(())
//!     }
//!
//!     fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), PassError> {
//!         // one DrawCall from input.default_buffer to output.default
//!         Ok(())
//!     }
//! }
//! ```

mod clear;
mod copy;
mod geometry;
mod lambda;
mod luminance;

pub use clear::ClearPass;
pub use copy::CopyPass;
pub use geometry::{GeometryPass, SceneContext};
pub use lambda::LambdaPass;
pub use luminance::LuminancePass;

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer::{BufferKind, BufferManager};
use crate::error::PassError;
use crate::renderer::{FrameUniforms, Output, Renderer, TargetId};
use crate::resolution::Resolution;
use crate::timer::Timer;

static NEXT_PASS_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a pass for its whole lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(u64);

impl PassId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PASS_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Identifies the pipeline a pass is registered with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(u64);

impl PipelineId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassInput {
    /// Output of the previous pass in the chain. Set by the pipeline.
    pub default_buffer: Option<TargetId>,
    /// Named buffers this pass reads. Validated when the pass is added.
    pub required: BTreeSet<BufferKind>,
    /// Buffers supplied by the caller. They take precedence over resolved ones.
    pub buffers: BTreeMap<BufferKind, TargetId>,
    resolved: BTreeMap<BufferKind, TargetId>,
}

impl PassInput {
    /// The target bound for `kind`, if any.
    pub fn buffer(&self, kind: BufferKind) -> Option<TargetId> {
        self.buffers
            .get(&kind)
            .or_else(|| self.resolved.get(&kind))
            .copied()
    }

    pub(crate) fn set_resolved(&mut self, resolved: BTreeMap<BufferKind, TargetId>) -> bool {
        let changed = self.resolved != resolved;
        self.resolved = resolved;
        changed
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassOutput {
    /// Where the default chain output goes. Set by the pipeline.
    pub default: Output,
    /// Named buffers this pass writes. At most one pass per pipeline may produce a kind.
    pub produces: BTreeSet<BufferKind>,
    /// Targets currently backing the produced buffers.
    pub buffers: BTreeMap<BufferKind, TargetId>,
}

/// State every pass carries.
#[derive(Debug)]
pub struct PassCore {
    name: String,
    id: PassId,
    enabled: bool,
    needs_swap: bool,
    render_to_screen: bool,
    pinned_to_screen: bool,
    resolution: Resolution,
    registration: Option<PipelineId>,
    initialized: bool,
    pub input: PassInput,
    pub output: PassOutput,
}

impl PassCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: PassId::next(),
            enabled: true,
            needs_swap: true,
            render_to_screen: false,
            pinned_to_screen: false,
            resolution: Resolution::default(),
            registration: None,
            initialized: false,
            input: PassInput::default(),
            output: PassOutput::default(),
        }
    }

    /// Core for a pass that writes in place or only to named buffers. The default chain
    /// passes through it unchanged.
    pub fn without_swap(name: impl Into<String>) -> Self {
        let mut core = Self::new(name);
        core.needs_swap = false;
        core
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn id(&self) -> PassId {
        self.id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the pass writes a new default output that the next pass should read.
    pub fn needs_swap(&self) -> bool {
        self.needs_swap
    }

    pub fn set_needs_swap(&mut self, needs_swap: bool) {
        self.needs_swap = needs_swap;
    }

    /// Whether the pass was assigned the screen in the current frame.
    pub fn renders_to_screen(&self) -> bool {
        self.render_to_screen
    }

    pub(crate) fn set_renders_to_screen(&mut self, to_screen: bool) {
        self.render_to_screen = to_screen;
    }

    /// Forces this pass to write to the screen. Pinning any pass turns off automatic
    /// screen assignment for the whole pipeline.
    pub fn pin_to_screen(&mut self, pinned: bool) {
        self.pinned_to_screen = pinned;
    }

    pub fn is_pinned_to_screen(&self) -> bool {
        self.pinned_to_screen
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// The pass's own resolution. Scale and preferred size are the pass's to set; the
    /// base size is pushed by the pipeline.
    pub fn resolution_mut(&mut self) -> &mut Resolution {
        &mut self.resolution
    }

    /// Effective render size.
    pub fn size(&self) -> (u32, u32) {
        self.resolution.size()
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    pub fn pipeline(&self) -> Option<PipelineId> {
        self.registration
    }

    pub(crate) fn register(&mut self, pipeline: PipelineId) {
        self.registration = Some(pipeline);
    }

    /// Drops everything the pipeline injected.
    pub(crate) fn unregister(&mut self) {
        self.registration = None;
        self.initialized = false;
        self.render_to_screen = false;
        self.input.default_buffer = None;
        self.input.resolved.clear();
        self.output.default = Output::Screen;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    /// Frame uniforms at the pass's effective size.
    pub fn frame_uniforms(&self, time: f32) -> FrameUniforms {
        let (w, h) = self.size();
        FrameUniforms::new(w, h, time)
    }

    /// Targets the pass holds across frames: supplied inputs and produced buffers.
    pub(crate) fn held_targets(&self) -> Vec<TargetId> {
        let mut targets: Vec<TargetId> = self.input.buffers.values().copied().collect();
        targets.extend(self.output.buffers.values().copied());
        targets
    }

    /// Every target this core currently refers to, including the wired chain.
    pub(crate) fn referenced_targets(&self) -> Vec<TargetId> {
        let mut targets = self.held_targets();
        targets.extend(self.input.default_buffer);
        targets.extend(self.input.resolved.values().copied());
        if let Output::Target(id) = self.output.default {
            targets.push(id);
        }
        targets
    }
}

/// Access to GPU resources outside of rendering.
pub struct ResourceContext<'a> {
    pub renderer: &'a mut dyn Renderer,
    pub buffers: &'a mut BufferManager,
}

/// Everything a pass needs while it renders.
pub struct RenderContext<'a> {
    pub renderer: &'a mut dyn Renderer,
    pub buffers: &'a mut BufferManager,
    pub timer: &'a Timer,
}

impl RenderContext<'_> {
    pub fn resources(&mut self) -> ResourceContext<'_> {
        ResourceContext {
            renderer: &mut *self.renderer,
            buffers: &mut *self.buffers,
        }
    }
}

/// A schedulable GPU work unit.
///
/// Every hook except [`render`](Pass::render) has a default that does nothing. Hooks
/// are only invoked while the pass is registered with a pipeline that has a renderer,
/// so a pass never runs against a missing device.
pub trait Pass {
    fn core(&self) -> &PassCore;

    fn core_mut(&mut self) -> &mut PassCore;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Allocates owned targets and compiles programs. Called once per renderer.
    fn initialize(&mut self, _ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        Ok(())
    }

    /// Runs before any pass of the frame renders. Recompilation belongs here.
    fn prepare(&mut self, _ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), PassError>;

    /// The effective size in [`PassCore::resolution`] changed.
    fn on_resolution_change(&mut self, _ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        Ok(())
    }

    /// The default input or a resolved named input changed.
    fn on_input_change(&mut self) {}

    /// A target the pass always writes its default output to, instead of a ping-pong
    /// buffer.
    fn owned_output(&self) -> Option<TargetId> {
        None
    }

    /// Frees GPU resources before the renderer is replaced. The pass is initialized
    /// again afterwards.
    fn release(&mut self, renderer: &mut dyn Renderer) {
        self.dispose(renderer);
    }

    /// Frees owned GPU resources.
    fn dispose(&mut self, _renderer: &mut dyn Renderer) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = PassCore::new("a");
        let b = PassCore::new("b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn explicit_buffers_override_resolved_ones() {
        let mut input = PassInput::default();
        let mut resolved = BTreeMap::new();
        resolved.insert(BufferKind::Depth, TargetId::new(1));
        assert!(input.set_resolved(resolved.clone()));
        assert!(!input.set_resolved(resolved));
        assert_eq!(input.buffer(BufferKind::Depth), Some(TargetId::new(1)));

        input.buffers.insert(BufferKind::Depth, TargetId::new(7));
        assert_eq!(input.buffer(BufferKind::Depth), Some(TargetId::new(7)));
    }

    #[test]
    fn unregister_drops_injected_state() {
        let mut core = PassCore::new("blur");
        core.register(PipelineId::next());
        core.set_initialized(true);
        core.input.default_buffer = Some(TargetId::new(3));
        core.output.default = Output::Target(TargetId::new(4));

        core.unregister();
        assert!(!core.is_registered());
        assert!(!core.is_initialized());
        assert_eq!(core.input.default_buffer, None);
        assert_eq!(core.output.default, Output::Screen);
    }
}
