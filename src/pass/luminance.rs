use std::any::Any;

use super::{Pass, PassCore, RenderContext, ResourceContext};
use crate::buffer::BufferKind;
use crate::error::PassError;
use crate::renderer::{DrawCall, Output, ProgramId, Renderer};
use crate::shader::ShaderProgram;
use crate::uniform::{UniformLayout, UniformType, UniformValue};

const LUMINANCE_FRAGMENT: &str = r#"
@fragment
fn fs(in: VertexOutput) -> @location(0) vec4f {
    let texel = textureSample(input_buffer, input_sampler, in.uv);
    let l = dot(texel.rgb, vec3f(0.2126, 0.7152, 0.0722));
#ifdef USE_RANGE
    let mapped = smoothstep(params.range.x, params.range.y, l);
#else
    let mapped = l;
#endif
    return vec4f(mapped, mapped, mapped, 1.0);
}
"#;

/// Writes the luminance of its input into [`BufferKind::Luminance`].
///
/// The default chain passes through untouched, so effects further down can combine
/// the luminance buffer with the unmodified color.
pub struct LuminancePass {
    core: PassCore,
    program: Option<ProgramId>,
    range: Option<[f32; 2]>,
}

impl Default for LuminancePass {
    fn default() -> Self {
        Self::new()
    }
}

impl LuminancePass {
    pub fn new() -> Self {
        let mut core = PassCore::without_swap("LuminancePass");
        core.output.produces.insert(BufferKind::Luminance);
        Self {
            core,
            program: None,
            range: None,
        }
    }

    /// Maps luminance through `smoothstep(low, high, l)`.
    pub fn with_range(mut self, low: f32, high: f32) -> Self {
        self.range = Some([low, high]);
        self
    }

    /// Renders at a fraction of the frame size.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.core.resolution_mut().set_scale(scale);
        self
    }

    fn uniforms(&self) -> UniformLayout {
        let mut uniforms = UniformLayout::new();
        if self.range.is_some() {
            uniforms.push("range", UniformType::Vec2);
        }
        uniforms
    }

    fn program(&self) -> ShaderProgram {
        let program = ShaderProgram::material(
            "LuminanceMaterial",
            LUMINANCE_FRAGMENT,
            self.uniforms(),
            Vec::new(),
        );
        if self.range.is_some() {
            program.with_define("USE_RANGE", "")
        } else {
            program
        }
    }

    fn acquire_target(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        let (w, h) = self.core.size();
        let target = ctx.buffers.acquire(ctx.renderer, BufferKind::Luminance, w, h)?;
        self.core.output.buffers.insert(BufferKind::Luminance, target);
        Ok(())
    }
}

impl Pass for LuminancePass {
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
        self.program = Some(ctx.renderer.compile(&self.program())?);
        self.acquire_target(ctx)
    }

    fn on_resolution_change(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        self.acquire_target(ctx)
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), PassError> {
        let (Some(program), Some(&target)) = (
            self.program,
            self.core.output.buffers.get(&BufferKind::Luminance),
        ) else {
            return Ok(());
        };

        let uniforms = self.uniforms();
        let mut params = uniforms.zeroed();
        if let Some(range) = self.range {
            uniforms.write(&mut params, "range", &UniformValue::Vec2(range));
        }

        ctx.renderer.draw(&DrawCall {
            label: self.core.name(),
            program,
            frame: self.core.frame_uniforms(ctx.timer.elapsed() as f32),
            params: &params,
            input: self.core.input.default_buffer,
            textures: &[],
            output: Output::Target(target),
            clear: None,
        })
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        if let Some(program) = self.program.take() {
            renderer.destroy_program(program);
        }
        self.core.output.buffers.clear();
    }
}
