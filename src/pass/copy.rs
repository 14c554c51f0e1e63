use std::any::Any;

use super::{Pass, PassCore, RenderContext, ResourceContext};
use crate::error::PassError;
use crate::renderer::{DrawCall, ProgramId, Renderer, TargetId};
use crate::shader::ShaderProgram;
use crate::uniform::UniformLayout;

const COPY_FRAGMENT: &str = r#"
@fragment
fn fs(in: VertexOutput) -> @location(0) vec4f {
    return textureSample(input_buffer, input_sampler, in.uv);
}
"#;

pub(crate) fn copy_program() -> ShaderProgram {
    ShaderProgram::material("CopyMaterial", COPY_FRAGMENT, UniformLayout::new(), Vec::new())
}

/// Copies the default input to its output.
pub struct CopyPass {
    core: PassCore,
    program: Option<ProgramId>,
    target: Option<TargetId>,
}

impl Default for CopyPass {
    fn default() -> Self {
        Self::new()
    }
}

impl CopyPass {
    pub fn new() -> Self {
        Self {
            core: PassCore::new("CopyPass"),
            program: None,
            target: None,
        }
    }

    /// Copies into a caller-owned target instead of a ping-pong buffer.
    pub fn to_target(target: TargetId) -> Self {
        Self {
            target: Some(target),
            ..Self::new()
        }
    }
}

impl Pass for CopyPass {
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
        self.program = Some(ctx.renderer.compile(&copy_program())?);
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), PassError> {
        let Some(program) = self.program else {
            return Ok(());
        };
        ctx.renderer.draw(&DrawCall {
            label: self.core.name(),
            program,
            frame: self.core.frame_uniforms(ctx.timer.elapsed() as f32),
            params: &[],
            input: self.core.input.default_buffer,
            textures: &[],
            output: self.core.output.default,
            clear: None,
        })
    }

    fn owned_output(&self) -> Option<TargetId> {
        self.target
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        if let Some(program) = self.program.take() {
            renderer.destroy_program(program);
        }
    }
}
