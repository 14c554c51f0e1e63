use std::any::Any;

use super::{Pass, PassCore, RenderContext, ResourceContext};
use crate::buffer::BufferKind;
use crate::error::PassError;
use crate::renderer::{Output, Renderer, TargetDescriptor, TargetId};
use crate::timer::Timer;

/// Targets the scene callback draws into.
pub struct SceneContext<'a> {
    pub renderer: &'a mut dyn Renderer,
    pub timer: &'a Timer,
    /// The pass's own color target, or the screen when it is the final pass.
    pub color: Output,
    pub depth: TargetId,
    pub normal: Option<TargetId>,
    pub width: u32,
    pub height: u32,
}

type SceneCallback = Box<dyn FnMut(&mut SceneContext<'_>) -> Result<(), PassError>>;

/// Renders the scene through a host callback.
///
/// The pass owns its color target and starts the default chain with it. Depth (and
/// normals, when enabled) go to the shared pool so that effects can read them.
/// Targets are cleared before the callback runs.
pub struct GeometryPass {
    core: PassCore,
    scene: SceneCallback,
    color: Option<TargetId>,
    clear_color: [f32; 4],
}

impl GeometryPass {
    pub fn new<F>(scene: F) -> Self
    where
        F: FnMut(&mut SceneContext<'_>) -> Result<(), PassError> + 'static,
    {
        let mut core = PassCore::new("GeometryPass");
        core.output.produces.insert(BufferKind::Depth);
        Self {
            core,
            scene: Box::new(scene),
            color: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Also produces [`BufferKind::Normal`].
    pub fn with_normals(mut self) -> Self {
        self.core.output.produces.insert(BufferKind::Normal);
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn color_target(&self) -> Option<TargetId> {
        self.color
    }

    fn create_targets(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        let (w, h) = self.core.size();

        if let Some(old) = self.color.take() {
            ctx.renderer.destroy_target(old);
        }
        let format = BufferKind::Color(0).format(ctx.buffers.frame_buffer_type());
        let color = ctx
            .renderer
            .create_target(&TargetDescriptor::new("GeometryPass color", w, h, format))?;
        self.color = Some(color);

        for kind in self.core.output.produces.clone() {
            let target = ctx.buffers.acquire(ctx.renderer, kind, w, h)?;
            self.core.output.buffers.insert(kind, target);
        }
        Ok(())
    }
}

impl Pass for GeometryPass {
    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn initialize(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        self.create_targets(ctx)
    }

    fn on_resolution_change(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        self.create_targets(ctx)
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), PassError> {
        let (Some(color), Some(&depth)) = (self.color, self.core.output.buffers.get(&BufferKind::Depth))
        else {
            return Ok(());
        };
        let normal = self.core.output.buffers.get(&BufferKind::Normal).copied();

        let color_output = if self.core.renders_to_screen() {
            Output::Screen
        } else {
            Output::Target(color)
        };

        ctx.renderer.clear(color_output, self.clear_color)?;
        ctx.renderer.clear(Output::Target(depth), [1.0; 4])?;
        if let Some(normal) = normal {
            ctx.renderer.clear(Output::Target(normal), [0.5, 0.5, 1.0, 1.0])?;
        }

        let (width, height) = self.core.size();
        let mut scene = SceneContext {
            renderer: &mut *ctx.renderer,
            timer: ctx.timer,
            color: color_output,
            depth,
            normal,
            width,
            height,
        };
        (self.scene)(&mut scene)
    }

    fn owned_output(&self) -> Option<TargetId> {
        self.color
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        if let Some(color) = self.color.take() {
            renderer.destroy_target(color);
        }
        self.core.output.buffers.clear();
    }
}
