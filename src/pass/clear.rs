use std::any::Any;

use super::{Pass, PassCore, RenderContext};
use crate::error::PassError;

/// Clears the current default buffer, or the screen when it is the last pass.
pub struct ClearPass {
    core: PassCore,
    color: [f32; 4],
}

impl Default for ClearPass {
    fn default() -> Self {
        Self::new([0.0, 0.0, 0.0, 0.0])
    }
}

impl ClearPass {
    pub fn new(color: [f32; 4]) -> Self {
        Self {
            core: PassCore::without_swap("ClearPass"),
            color,
        }
    }

    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    pub fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
    }
}

impl Pass for ClearPass {
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

    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), PassError> {
        ctx.renderer.clear(self.core.output.default, self.color)
    }
}
