//! Mip-chain bloom.
//!
//! The input is downsampled `levels` times (the first step keeps only bright texels),
//! then upsampled back while blending each level with the matching downsampled one.
//! The merged shader only samples the finished result, so bloom costs one texture
//! read inside the effect pass plus its private draws.

use super::{Effect, EffectAttribute, EffectContext, EffectDescriptor};
use crate::blending::BlendFunction;
use crate::error::PassError;
use crate::pass::ResourceContext;
use crate::renderer::{
    DrawCall, FrameUniforms, Output, ProgramId, Renderer, TargetDescriptor, TargetFormat, TargetId,
};
use crate::shader::{ShaderProgram, TextureSlot};
use crate::uniform::{TextureSource, UniformLayout, UniformType, UniformValue};

const BLOOM_FRAGMENT: &str = r#"
fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {
    let bloom = textureSampleLevel(bloom_texture, input_sampler, uv, 0.0).rgb;
    return vec4f(bloom * intensity, input_color.a);
}
"#;

const DOWNSAMPLE_FRAGMENT: &str = r#"
@fragment
fn fs(in: VertexOutput) -> @location(0) vec4f {
    let t = params.texel_size;
    var c = textureSample(input_buffer, input_sampler, in.uv + vec2f(-t.x, -t.y));
    c += textureSample(input_buffer, input_sampler, in.uv + vec2f(t.x, -t.y));
    c += textureSample(input_buffer, input_sampler, in.uv + vec2f(-t.x, t.y));
    c += textureSample(input_buffer, input_sampler, in.uv + vec2f(t.x, t.y));
    c *= 0.25;
#ifdef THRESHOLD
    let l = dot(c.rgb, vec3f(0.2126, 0.7152, 0.0722));
    let w = smoothstep(params.threshold, params.threshold + max(params.smoothing, 1e-4), l);
    c = vec4f(c.rgb * w, 1.0);
#endif
    return c;
}
"#;

const UPSAMPLE_FRAGMENT: &str = r#"
@fragment
fn fs(in: VertexOutput) -> @location(0) vec4f {
    let t = params.texel_size;
    var c = textureSample(input_buffer, input_sampler, in.uv + vec2f(-t.x, 0.0));
    c += textureSample(input_buffer, input_sampler, in.uv + vec2f(t.x, 0.0));
    c += textureSample(input_buffer, input_sampler, in.uv + vec2f(0.0, -t.y));
    c += textureSample(input_buffer, input_sampler, in.uv + vec2f(0.0, t.y));
    let support = textureSample(support_buffer, input_sampler, in.uv);
    return vec4f(mix(support.rgb, c.rgb * 0.25, params.radius), 1.0);
}
"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Mip {
    target: TargetId,
    width: u32,
    height: u32,
}

#[derive(Clone, Copy, Debug)]
struct Programs {
    threshold: ProgramId,
    downsample: ProgramId,
    upsample: ProgramId,
}

pub struct BloomEffect {
    descriptor: EffectDescriptor,
    levels: usize,
    threshold: f32,
    smoothing: f32,
    radius: f32,
    programs: Option<Programs>,
    size: (u32, u32),
    down: Vec<Mip>,
    up: Vec<Mip>,
}

impl Default for BloomEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl BloomEffect {
    pub fn new() -> Self {
        Self {
            descriptor: EffectDescriptor::new("BloomEffect")
                .with_fragment_shader(BLOOM_FRAGMENT)
                .with_attributes(EffectAttribute::CONVOLUTION)
                .with_blend_function(BlendFunction::Add)
                .with_uniform("intensity", 1.0f32)
                .with_uniform("bloom_texture", TextureSource::None),
            levels: 4,
            threshold: 0.8,
            smoothing: 0.1,
            radius: 0.85,
            programs: None,
            size: (0, 0),
            down: Vec::new(),
            up: Vec::new(),
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.set_intensity(intensity);
        self
    }

    /// Number of downsampling steps. At least one.
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels.max(1);
        self
    }

    /// Luminance threshold and the width of its soft knee.
    pub fn with_threshold(mut self, threshold: f32, smoothing: f32) -> Self {
        self.threshold = threshold;
        self.smoothing = smoothing;
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius.clamp(0.0, 1.0);
        self
    }

    pub fn intensity(&self) -> f32 {
        self.descriptor
            .uniform("intensity")
            .and_then(UniformValue::as_float)
            .unwrap_or(0.0)
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.descriptor.set_uniform("intensity", intensity);
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// The target the merged shader samples, once rendered.
    pub fn result(&self) -> Option<TargetId> {
        self.up.first().or(self.down.first()).map(|mip| mip.target)
    }

    fn texel_uniforms(extra: &[(&str, UniformType)]) -> UniformLayout {
        let mut layout = UniformLayout::new().with("texel_size", UniformType::Vec2);
        for (name, ty) in extra {
            layout.push(*name, *ty);
        }
        layout
    }

    fn downsample_layout() -> UniformLayout {
        Self::texel_uniforms(&[("threshold", UniformType::Float), ("smoothing", UniformType::Float)])
    }

    fn upsample_layout() -> UniformLayout {
        Self::texel_uniforms(&[("radius", UniformType::Float)])
    }

    fn compile(&mut self, renderer: &mut dyn Renderer) -> Result<(), PassError> {
        if self.programs.is_some() {
            return Ok(());
        }
        let threshold = ShaderProgram::material(
            "BloomEffect.threshold",
            DOWNSAMPLE_FRAGMENT,
            Self::downsample_layout(),
            Vec::new(),
        )
        .with_define("THRESHOLD", "");
        let downsample = ShaderProgram::material(
            "BloomEffect.downsample",
            DOWNSAMPLE_FRAGMENT,
            Self::downsample_layout(),
            Vec::new(),
        );
        let upsample = ShaderProgram::material(
            "BloomEffect.upsample",
            UPSAMPLE_FRAGMENT,
            Self::upsample_layout(),
            vec![TextureSlot::color("support_buffer")],
        );

        let mut compiled = Vec::with_capacity(3);
        for program in [&threshold, &downsample, &upsample] {
            match renderer.compile(program) {
                Ok(id) => compiled.push(id),
                Err(err) => {
                    for id in compiled {
                        renderer.destroy_program(id);
                    }
                    return Err(err.into());
                }
            }
        }
        self.programs = Some(Programs {
            threshold: compiled[0],
            downsample: compiled[1],
            upsample: compiled[2],
        });
        Ok(())
    }

    fn destroy_targets(&mut self, renderer: &mut dyn Renderer) {
        for mip in self.down.drain(..).chain(self.up.drain(..)) {
            renderer.destroy_target(mip.target);
        }
        self.size = (0, 0);
    }

    fn resize(&mut self, renderer: &mut dyn Renderer, width: u32, height: u32) -> Result<(), PassError> {
        if self.size == (width, height) && !self.down.is_empty() {
            return Ok(());
        }
        self.destroy_targets(renderer);

        let (mut w, mut h) = (width, height);
        for level in 0..self.levels {
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            let descriptor = TargetDescriptor::new(
                format!("BloomEffect.down{level}"),
                w,
                h,
                TargetFormat::Rgba16Float,
            );
            let target = renderer.create_target(&descriptor)?;
            self.down.push(Mip { target, width: w, height: h });
        }
        for level in 0..self.levels.saturating_sub(1) {
            let mip = self.down[level];
            let descriptor = TargetDescriptor::new(
                format!("BloomEffect.up{level}"),
                mip.width,
                mip.height,
                TargetFormat::Rgba16Float,
            );
            let target = renderer.create_target(&descriptor)?;
            self.up.push(Mip { target, ..mip });
        }

        self.size = (width, height);
        log::debug!("BloomEffect: {} mip levels for {width}x{height}", self.levels);
        Ok(())
    }

    fn draw(renderer: &mut dyn Renderer, step: Step<'_>, time: f32) -> Result<(), PassError> {
        let mut params = step.layout.zeroed();
        let (input, src_w, src_h) = step.source;
        let texel = UniformValue::Vec2([1.0 / src_w.max(1) as f32, 1.0 / src_h.max(1) as f32]);
        step.layout.write(&mut params, "texel_size", &texel);
        for (name, value) in step.values {
            step.layout.write(&mut params, name, value);
        }
        let textures: Vec<Option<TargetId>> = step.support.map(Some).into_iter().collect();

        renderer.draw(&DrawCall {
            label: step.label,
            program: step.program,
            frame: FrameUniforms::new(step.into.width, step.into.height, time),
            params: &params,
            input: Some(input),
            textures: &textures,
            output: Output::Target(step.into.target),
            clear: None,
        })
    }
}

/// One private draw of the mip chain.
struct Step<'a> {
    label: &'a str,
    program: ProgramId,
    layout: &'a UniformLayout,
    values: &'a [(&'a str, UniformValue)],
    source: (TargetId, u32, u32),
    support: Option<TargetId>,
    into: Mip,
}

impl Effect for BloomEffect {
    fn descriptor(&self) -> &EffectDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut EffectDescriptor {
        &mut self.descriptor
    }

    fn initialize(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        self.compile(ctx.renderer)
    }

    fn update(&mut self, ctx: &mut EffectContext<'_>) -> Result<(), PassError> {
        let Some(input) = ctx.input else {
            self.descriptor.set_uniform("bloom_texture", TextureSource::None);
            return Ok(());
        };
        self.compile(ctx.renderer)?;
        self.resize(ctx.renderer, ctx.width, ctx.height)?;
        let Some(programs) = self.programs else {
            return Ok(());
        };

        let time = ctx.timer.elapsed() as f32;
        let down_layout = Self::downsample_layout();
        let knee = [
            ("threshold", UniformValue::Float(self.threshold)),
            ("smoothing", UniformValue::Float(self.smoothing)),
        ];

        let mut source = (input, ctx.width, ctx.height);
        for (level, mip) in self.down.iter().enumerate() {
            let program = if level == 0 { programs.threshold } else { programs.downsample };
            let step = Step {
                label: "BloomEffect.downsample",
                program,
                layout: &down_layout,
                values: &knee,
                source,
                support: None,
                into: *mip,
            };
            Self::draw(ctx.renderer, step, time)?;
            source = (mip.target, mip.width, mip.height);
        }

        let up_layout = Self::upsample_layout();
        let radius = [("radius", UniformValue::Float(self.radius))];
        for (level, mip) in self.up.iter().enumerate().rev() {
            let step = Step {
                label: "BloomEffect.upsample",
                program: programs.upsample,
                layout: &up_layout,
                values: &radius,
                source,
                support: Some(self.down[level].target),
                into: *mip,
            };
            Self::draw(ctx.renderer, step, time)?;
            source = (mip.target, mip.width, mip.height);
        }

        if let Some(result) = self.result() {
            self.descriptor
                .set_uniform("bloom_texture", TextureSource::Target(result));
        }
        Ok(())
    }

    fn on_resolution_change(
        &mut self,
        ctx: &mut ResourceContext<'_>,
        width: u32,
        height: u32,
    ) -> Result<(), PassError> {
        self.resize(ctx.renderer, width, height)
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        self.destroy_targets(renderer);
        if let Some(programs) = self.programs.take() {
            renderer.destroy_program(programs.threshold);
            renderer.destroy_program(programs.downsample);
            renderer.destroy_program(programs.upsample);
        }
        self.descriptor.set_uniform("bloom_texture", TextureSource::None);
    }
}
