//! Merges a list of effects into a single fullscreen draw.
//!
//! An [`EffectPass`] owns an ordered list of [`Effect`]s. Their shader sections are
//! combined into one program (see the `merge` module for the generated layout), so N
//! effects cost one draw instead of N.
//!
//! # Lifecycle
//!
//! - **Construction** validates the list: exclusive attributes, color space converters,
//!   reserved names, and that no effect is attached to another pass. The merged program
//!   is generated right away so it can be inspected before a renderer exists.
//! - **prepare()** runs every effect's [`Effect::prepare`], then compares effect
//!   revisions against the last compile and recompiles when anything that affects the
//!   generated shader changed. Uniform values and opacity are not part of the shader and
//!   never trigger a recompile.
//! - **render()** advances the pass time, lets every effect update (effects with private
//!   sub-passes draw them here), packs the `params` block and issues one draw. If an
//!   update changed the shader, the draw is skipped and the next prepare recompiles.
//!
//! A compile failure disables the pass permanently. The error is kept and can be read
//! through [`EffectPass::compile_error`].
//!
//! # Example
//!
//! ```no_run
//! use postfx::{EffectPass, EffectRef, ShaderEffect, shared};
//!
//! let vignette = shared(ShaderEffect::fragment(
//!     "Vignette",
//!     "fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {
//!          return input_color * (1.0 - distance(uv, vec2f(0.5)));
//!      }",
//! ));
//! let effects: Vec<EffectRef> = vec![vignette.clone()];
//! let pass = EffectPass::new(None, effects).unwrap();
//! ```

mod merge;

pub use merge::{MergedEffects, RESERVED_IDENTIFIERS, TextureBinding, UniformBinding, merge_effects};

use std::any::Any;
use std::cell::{Ref, RefMut};
use std::rc::Rc;

use crate::blending::BlendFunction;
use crate::camera::Camera;
use crate::effect::{ColorSpace, Effect, EffectContext, EffectDescriptor, EffectRef};
use crate::error::{CompileError, ConfigError, PassError};
use crate::pass::{Pass, PassCore, RenderContext, ResourceContext};
use crate::renderer::{DrawCall, ProgramId, Renderer, TargetId};
use crate::shader::ShaderProgram;
use crate::uniform::{TextureSource, UniformValue};

/// Time wraps at this many seconds unless changed with [`EffectPass::set_max_time`].
pub const DEFAULT_MAX_TIME: f32 = 1e3;

/// Shader-affecting state at the last merge.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Snapshot {
    keys: Vec<(u64, BlendFunction)>,
    perspective: Option<bool>,
}

pub struct EffectPass {
    core: PassCore,
    camera: Option<Camera>,
    effects: Vec<EffectRef>,
    merged: MergedEffects,
    snapshot: Snapshot,
    program: Option<ProgramId>,
    compiled: bool,
    failure: Option<CompileError>,
    time: f32,
    max_time: f32,
}

impl EffectPass {
    pub fn new(camera: Option<Camera>, effects: Vec<EffectRef>) -> Result<Self, ConfigError> {
        for (i, a) in effects.iter().enumerate() {
            if effects[..i].iter().any(|b| Rc::ptr_eq(a, b)) {
                let name = a
                    .try_borrow()
                    .map(|e| e.descriptor().name().to_string())
                    .map_err(|_| ConfigError::EffectBorrowed { index: i })?;
                return Err(ConfigError::EffectAlreadyAttached { effect: name });
            }
        }

        let mut core = PassCore::new("EffectPass");
        let id = core.id();

        let (merged, snapshot, names) = {
            let guards = borrow_all(&effects)?;
            for effect in &guards {
                let descriptor = effect.descriptor();
                if descriptor.owner().is_some_and(|owner| owner != id) {
                    return Err(ConfigError::EffectAlreadyAttached {
                        effect: descriptor.name().to_string(),
                    });
                }
            }
            let names: Vec<String> = guards
                .iter()
                .map(|e| e.descriptor().name().to_string())
                .collect();
            let (merged, snapshot) = merge_guards(&pass_label(&names), &guards, camera.as_ref())?;
            (merged, snapshot, names)
        };

        for (index, effect) in effects.iter().enumerate() {
            effect
                .try_borrow_mut()
                .map_err(|_| ConfigError::EffectBorrowed { index })?
                .descriptor_mut()
                .set_owner(Some(id));
        }

        core.set_name(pass_label(&names));
        core.input.required = merged.required_inputs.clone();

        log::debug!(
            "{}: merged {} effect(s), attributes {}",
            core.name(),
            effects.len(),
            merged.attributes
        );

        Ok(Self {
            core,
            camera,
            effects,
            merged,
            snapshot,
            program: None,
            compiled: false,
            failure: None,
            time: 0.0,
            max_time: DEFAULT_MAX_TIME,
        })
    }

    pub fn effects(&self) -> &[EffectRef] {
        &self.effects
    }

    /// The program from the last merge.
    pub fn program(&self) -> &ShaderProgram {
        &self.merged.program
    }

    pub fn merged(&self) -> &MergedEffects {
        &self.merged
    }

    /// Color space of the color this pass writes.
    pub fn output_color_space(&self) -> ColorSpace {
        self.merged.output_color_space
    }

    pub fn compile_error(&self) -> Option<&CompileError> {
        self.failure.as_ref()
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    /// Replacing a perspective camera with an orthographic one (or removing it)
    /// triggers a recompile on the next frame.
    pub fn set_camera(&mut self, camera: Option<Camera>) {
        self.camera = camera;
    }

    /// Seconds elapsed in this pass, wrapped at the max time.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_max_time(&mut self, max_time: f32) {
        self.max_time = max_time;
        if max_time > 0.0 {
            self.time %= max_time;
        }
    }

    /// Whether the compiled program no longer matches the effects.
    pub fn is_stale(&self) -> Result<bool, PassError> {
        if !self.compiled {
            return Ok(true);
        }
        let guards = self.borrow_effects()?;
        Ok(snapshot_of(&guards, self.camera.as_ref()) != self.snapshot)
    }

    /// Re-merges the effects and compiles the result.
    ///
    /// Once a compile has failed this keeps returning that failure.
    pub fn recompile(&mut self, renderer: &mut dyn Renderer) -> Result<(), PassError> {
        if let Some(error) = &self.failure {
            return Err(error.clone().into());
        }

        let (merged, snapshot) = {
            let guards = self.borrow_effects()?;
            merge_guards(self.core.name(), &guards, self.camera.as_ref())?
        };

        if merged.required_inputs != self.merged.required_inputs {
            log::warn!(
                "{}: required inputs changed after the pass was added; missing buffers read as empty",
                self.core.name()
            );
            self.core.input.required = merged.required_inputs.clone();
        }

        match renderer.compile(&merged.program) {
            Ok(program) => {
                if let Some(old) = self.program.replace(program) {
                    renderer.destroy_program(old);
                }
                log::debug!("{}: compiled merged program", self.core.name());
                self.merged = merged;
                self.snapshot = snapshot;
                self.compiled = true;
                Ok(())
            }
            Err(error) => {
                log::error!("{error}");
                if let Some(old) = self.program.take() {
                    renderer.destroy_program(old);
                }
                self.merged = merged;
                self.compiled = false;
                self.failure = Some(error.clone());
                self.core.set_enabled(false);
                Err(error.into())
            }
        }
    }

    fn release_effects(&mut self) {
        let id = self.core.id();
        for effect in &self.effects {
            if let Ok(mut effect) = effect.try_borrow_mut() {
                if effect.descriptor().owner() == Some(id) {
                    effect.descriptor_mut().set_owner(None);
                }
            }
        }
    }

    fn borrow_effects(&self) -> Result<Vec<Ref<'_, dyn Effect>>, PassError> {
        borrow_all(&self.effects).map_err(|error| {
            PassError::EffectBorrowed(format!("{}: {error}", self.core.name()))
        })
    }

    fn borrow_effect_mut(
        &self,
        index: usize,
    ) -> Result<RefMut<'_, dyn Effect + 'static>, PassError> {
        self.effects[index]
            .try_borrow_mut()
            .map_err(|_| PassError::EffectBorrowed(format!("{}: effect {index}", self.core.name())))
    }

    fn pack_params(&self) -> Result<Vec<u8>, PassError> {
        let layout = &self.merged.program.uniforms;
        let mut params = layout.zeroed();
        let guards = self.borrow_effects()?;

        for binding in &self.merged.uniforms {
            let descriptor = guards[binding.effect].descriptor();
            let value = match &binding.uniform {
                Some(name) => descriptor.uniform(name).cloned(),
                None => Some(UniformValue::Float(descriptor.blend_mode().opacity())),
            };
            let Some(value) = value else {
                continue;
            };
            if !layout.write(&mut params, &binding.field, &value) {
                log::warn!(
                    "{}: uniform '{}' changed type, skipping until recompiled",
                    self.core.name(),
                    binding.field
                );
            }
        }
        Ok(params)
    }

    fn resolve_textures(&self) -> Result<Vec<Option<TargetId>>, PassError> {
        let guards = self.borrow_effects()?;
        let input = &self.core.input;

        Ok(self
            .merged
            .textures
            .iter()
            .map(|binding| match binding {
                TextureBinding::Buffer(kind) => input.buffer(*kind),
                TextureBinding::Uniform { effect, name } => {
                    match guards[*effect]
                        .descriptor()
                        .uniform(name)
                        .and_then(UniformValue::texture_source)
                    {
                        Some(TextureSource::Target(id)) => Some(id),
                        Some(TextureSource::Buffer(kind)) => input.buffer(kind),
                        Some(TextureSource::None) | None => None,
                    }
                }
            })
            .collect())
    }
}

impl Pass for EffectPass {
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
        for index in 0..self.effects.len() {
            self.borrow_effect_mut(index)?.initialize(ctx)?;
        }
        self.recompile(ctx.renderer)
    }

    fn prepare(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        if self.failure.is_some() {
            return Ok(());
        }
        for index in 0..self.effects.len() {
            self.borrow_effect_mut(index)?.prepare(ctx)?;
        }
        if self.is_stale()? {
            self.recompile(ctx.renderer)?;
        }
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), PassError> {
        if self.failure.is_some() {
            return Ok(());
        }
        let Some(program) = self.program else {
            return Ok(());
        };

        self.time += ctx.timer.delta() as f32;
        if self.max_time > 0.0 {
            self.time %= self.max_time;
        }

        let (width, height) = self.core.size();
        let input = self.core.input.default_buffer;
        for index in 0..self.effects.len() {
            let mut effect = self.borrow_effect_mut(index)?;
            effect.update(&mut EffectContext {
                renderer: &mut *ctx.renderer,
                timer: ctx.timer,
                input,
                width,
                height,
            })?;
        }
        if self.is_stale()? {
            return Err(PassError::StaleProgram(self.core.name().to_string()));
        }

        let params = self.pack_params()?;
        let textures = self.resolve_textures()?;
        let mut frame = self.core.frame_uniforms(self.time);
        if let Some(camera) = &self.camera {
            frame = frame.with_camera_params(camera.params(width as f32 / height.max(1) as f32));
        }

        ctx.renderer.draw(&DrawCall {
            label: self.core.name(),
            program,
            frame,
            params: &params,
            input,
            textures: &textures,
            output: self.core.output.default,
            clear: None,
        })
    }

    fn on_resolution_change(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        let (width, height) = self.core.size();
        for index in 0..self.effects.len() {
            self.borrow_effect_mut(index)?
                .on_resolution_change(ctx, width, height)?;
        }
        Ok(())
    }

    fn release(&mut self, renderer: &mut dyn Renderer) {
        for effect in &self.effects {
            if let Ok(mut effect) = effect.try_borrow_mut() {
                effect.release(renderer);
            }
        }
        if let Some(program) = self.program.take() {
            renderer.destroy_program(program);
        }
        self.compiled = false;
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        for effect in &self.effects {
            if let Ok(mut effect) = effect.try_borrow_mut() {
                effect.dispose(renderer);
            }
        }
        if let Some(program) = self.program.take() {
            renderer.destroy_program(program);
        }
        self.compiled = false;
    }
}

impl Drop for EffectPass {
    fn drop(&mut self) {
        self.release_effects();
    }
}

fn pass_label(names: &[String]) -> String {
    format!("EffectPass({})", names.join(", "))
}

fn borrow_all(effects: &[EffectRef]) -> Result<Vec<Ref<'_, dyn Effect>>, ConfigError> {
    effects
        .iter()
        .enumerate()
        .map(|(index, effect)| {
            effect
                .try_borrow()
                .map_err(|_| ConfigError::EffectBorrowed { index })
        })
        .collect()
}

fn snapshot_of(guards: &[Ref<'_, dyn Effect>], camera: Option<&Camera>) -> Snapshot {
    Snapshot {
        keys: guards.iter().map(|e| e.descriptor().shader_key()).collect(),
        perspective: camera.map(Camera::is_perspective),
    }
}

fn merge_guards(
    label: &str,
    guards: &[Ref<'_, dyn Effect>],
    camera: Option<&Camera>,
) -> Result<(MergedEffects, Snapshot), ConfigError> {
    let descriptors: Vec<&EffectDescriptor> = guards.iter().map(|e| e.descriptor()).collect();
    let merged = merge_effects(label, &descriptors, camera)?;
    Ok((merged, snapshot_of(guards, camera)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blending::BlendFunction;
    use crate::buffer::BufferManager;
    use crate::config::FrameBufferType;
    use crate::effect::{EffectAttribute, ShaderEffect, shared};
    use crate::renderer::{Output, TargetDescriptor, TargetFormat};
    use crate::testing::RecordingRenderer;
    use crate::timer::Timer;

    const GAIN: &str = "fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {\n    return input_color * gain;\n}\n";

    fn gain(name: &str, value: f32) -> ShaderEffect {
        ShaderEffect::from_descriptor(
            EffectDescriptor::new(name)
                .with_fragment_shader(GAIN)
                .with_uniform("gain", value),
        )
    }

    fn setup(pass: &mut EffectPass, renderer: &mut RecordingRenderer, buffers: &mut BufferManager) {
        pass.core_mut().resolution_mut().set_base_size(64, 32);
        pass.initialize(&mut ResourceContext {
            renderer: &mut *renderer,
            buffers: &mut *buffers,
        })
        .unwrap();
    }

    fn render(pass: &mut EffectPass, renderer: &mut RecordingRenderer, buffers: &mut BufferManager) {
        let mut timer = Timer::new();
        timer.update(Some(0.0));
        pass.prepare(&mut ResourceContext {
            renderer: &mut *renderer,
            buffers: &mut *buffers,
        })
        .unwrap();
        pass.render(&mut RenderContext {
            renderer: &mut *renderer,
            buffers: &mut *buffers,
            timer: &timer,
        })
        .unwrap();
    }

    #[test]
    fn effects_are_claimed_and_released() {
        let effect = shared(gain("Gain", 1.0));
        let pass = EffectPass::new(None, vec![effect.clone()]).unwrap();
        let id = pass.core().id();
        assert_eq!(effect.borrow().descriptor().owner(), Some(id));

        let err = EffectPass::new(None, vec![effect.clone()]).err();
        assert!(matches!(err, Some(ConfigError::EffectAlreadyAttached { .. })));

        drop(pass);
        assert_eq!(effect.borrow().descriptor().owner(), None);
        assert!(EffectPass::new(None, vec![effect]).is_ok());
    }

    #[test]
    fn duplicate_effect_in_one_list_is_rejected() {
        let effect = shared(gain("Gain", 1.0));
        let err = EffectPass::new(None, vec![effect.clone(), effect]).err();
        assert!(matches!(err, Some(ConfigError::EffectAlreadyAttached { .. })));
    }

    #[test]
    fn conflicting_convolutions_fail_construction() {
        let a = shared(ShaderEffect::from_descriptor(
            EffectDescriptor::new("A").with_attributes(EffectAttribute::CONVOLUTION),
        ));
        let b = shared(ShaderEffect::from_descriptor(
            EffectDescriptor::new("B").with_attributes(EffectAttribute::CONVOLUTION),
        ));
        let err = EffectPass::new(None, vec![a.clone(), b]).err();
        assert!(matches!(err, Some(ConfigError::AttributeConflict { .. })));
        assert_eq!(a.borrow().descriptor().owner(), None);
    }

    #[test]
    fn opacity_changes_do_not_recompile() {
        let effect = shared(gain("Gain", 2.0));
        let mut pass = EffectPass::new(None, vec![effect.clone()]).unwrap();
        let mut renderer = RecordingRenderer::new(64, 32);
        let mut buffers = BufferManager::new(FrameBufferType::Standard);
        setup(&mut pass, &mut renderer, &mut buffers);
        assert_eq!(renderer.compiled_labels().len(), 1);

        effect.borrow_mut().descriptor_mut().blend_mode_mut().set_opacity(0.25);
        effect.borrow_mut().descriptor_mut().set_uniform("gain", 3.0f32);
        render(&mut pass, &mut renderer, &mut buffers);
        assert_eq!(renderer.compiled_labels().len(), 1);

        let draw = renderer.draws().last().unwrap();
        let layout = &pass.program().uniforms;
        let read = |field: &str| {
            let offset = layout.field(field).unwrap().offset;
            f32::from_ne_bytes(draw.params[offset..offset + 4].try_into().unwrap())
        };
        assert_eq!(read("e0_gain"), 3.0);
        assert_eq!(read("blend0_opacity"), 0.25);
    }

    #[test]
    fn blend_function_change_recompiles_once() {
        let effect = shared(gain("Gain", 1.0));
        let mut pass = EffectPass::new(None, vec![effect.clone()]).unwrap();
        let mut renderer = RecordingRenderer::new(64, 32);
        let mut buffers = BufferManager::new(FrameBufferType::Standard);
        setup(&mut pass, &mut renderer, &mut buffers);

        effect
            .borrow_mut()
            .descriptor_mut()
            .blend_mode_mut()
            .set_function(BlendFunction::Screen);
        render(&mut pass, &mut renderer, &mut buffers);
        render(&mut pass, &mut renderer, &mut buffers);

        assert_eq!(renderer.compiled_labels().len(), 2);
        assert!(pass.program().source().unwrap().contains("blend_screen("));
        assert_eq!(renderer.draws().len(), 2);
    }

    #[test]
    fn compile_failure_disables_pass_permanently() {
        let broken = shared(ShaderEffect::fragment(
            "Broken",
            "fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {\n    return undefined_thing;\n}\n",
        ));
        let mut pass = EffectPass::new(None, vec![broken]).unwrap();
        let mut renderer = RecordingRenderer::new(64, 32);
        let mut buffers = BufferManager::new(FrameBufferType::Standard);
        pass.core_mut().resolution_mut().set_base_size(64, 32);

        let err = pass
            .initialize(&mut ResourceContext {
                renderer: &mut renderer,
                buffers: &mut buffers,
            })
            .unwrap_err();
        assert!(matches!(err, PassError::Compile(_)));
        assert!(!pass.core().is_enabled());
        let error = pass.compile_error().unwrap();
        assert!(error.merged_source.contains("e0_main_image"));

        pass.core_mut().set_enabled(true);
        render(&mut pass, &mut renderer, &mut buffers);
        assert!(renderer.draws().is_empty());
    }

    #[test]
    fn draws_once_into_assigned_output() {
        let a = shared(gain("A", 1.0));
        let b = shared(gain("B", 0.5));
        let mut pass = EffectPass::new(None, vec![a, b]).unwrap();
        let mut renderer = RecordingRenderer::new(64, 32);
        let mut buffers = BufferManager::new(FrameBufferType::Standard);
        setup(&mut pass, &mut renderer, &mut buffers);

        let mut target = |label: &str| {
            renderer
                .create_target(&TargetDescriptor::new(label, 64, 32, TargetFormat::Rgba8Unorm))
                .unwrap()
        };
        let (input, output) = (target("input"), target("output"));
        pass.core_mut().input.default_buffer = Some(input);
        pass.core_mut().output.default = Output::Target(output);
        render(&mut pass, &mut renderer, &mut buffers);

        let draws = renderer.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].input, Some(input));
        assert_eq!(draws[0].output, Output::Target(output));
        assert_eq!(draws[0].frame.resolution[0], 64.0);
    }

    /// Sets a define on its second frame, from `prepare` or from `update`.
    struct LateDefine {
        descriptor: EffectDescriptor,
        from_update: bool,
        frames: u32,
    }

    impl LateDefine {
        fn new(from_update: bool) -> Self {
            Self {
                descriptor: EffectDescriptor::new("Late").with_fragment_shader(
                    "fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {\n#ifdef READY\n    return input_color.bgra;\n#else\n    return input_color;\n#endif\n}\n",
                ),
                from_update,
                frames: 0,
            }
        }

        fn tick(&mut self) {
            self.frames += 1;
            if self.frames == 2 {
                self.descriptor.set_define("READY", "");
            }
        }
    }

    impl Effect for LateDefine {
        fn descriptor(&self) -> &EffectDescriptor {
            &self.descriptor
        }

        fn descriptor_mut(&mut self) -> &mut EffectDescriptor {
            &mut self.descriptor
        }

        fn prepare(&mut self, _ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
            if !self.from_update {
                self.tick();
            }
            Ok(())
        }

        fn update(&mut self, _ctx: &mut EffectContext<'_>) -> Result<(), PassError> {
            if self.from_update {
                self.tick();
            }
            Ok(())
        }
    }

    fn draws_ready(renderer: &RecordingRenderer, index: usize) -> bool {
        let program = renderer.program(renderer.draws()[index].program).unwrap();
        program.source().unwrap().contains("input_color.bgra")
    }

    #[test]
    fn shader_changes_from_prepare_are_drawn_in_the_same_frame() {
        let mut pass = EffectPass::new(None, vec![shared(LateDefine::new(false))]).unwrap();
        let mut renderer = RecordingRenderer::new(64, 32);
        let mut buffers = BufferManager::new(FrameBufferType::Standard);
        setup(&mut pass, &mut renderer, &mut buffers);

        render(&mut pass, &mut renderer, &mut buffers);
        render(&mut pass, &mut renderer, &mut buffers);

        assert_eq!(renderer.compiled_labels().len(), 2);
        assert!(!draws_ready(&renderer, 0));
        assert!(draws_ready(&renderer, 1));
        assert!(!pass.is_stale().unwrap());
    }

    #[test]
    fn shader_changes_from_update_skip_the_stale_draw() {
        let mut pass = EffectPass::new(None, vec![shared(LateDefine::new(true))]).unwrap();
        let mut renderer = RecordingRenderer::new(64, 32);
        let mut buffers = BufferManager::new(FrameBufferType::Standard);
        setup(&mut pass, &mut renderer, &mut buffers);
        render(&mut pass, &mut renderer, &mut buffers);

        let mut timer = Timer::new();
        timer.update(Some(0.0));
        pass.prepare(&mut ResourceContext {
            renderer: &mut renderer,
            buffers: &mut buffers,
        })
        .unwrap();
        let err = pass
            .render(&mut RenderContext {
                renderer: &mut renderer,
                buffers: &mut buffers,
                timer: &timer,
            })
            .unwrap_err();
        assert!(matches!(err, PassError::StaleProgram(_)));
        assert!(!err.disables_pass());
        assert_eq!(renderer.draws().len(), 1);

        render(&mut pass, &mut renderer, &mut buffers);
        assert_eq!(renderer.draws().len(), 2);
        assert!(draws_ready(&renderer, 1));
    }

    #[test]
    fn time_wraps_at_max_time() {
        let mut pass = EffectPass::new(None, vec![shared(gain("A", 1.0))]).unwrap();
        let mut renderer = RecordingRenderer::new(64, 32);
        let mut buffers = BufferManager::new(FrameBufferType::Standard);
        setup(&mut pass, &mut renderer, &mut buffers);
        pass.set_max_time(1.0);

        let mut timer = Timer::new();
        for ms in [0.0, 600.0, 1200.0] {
            timer.update(Some(ms));
            pass.render(&mut RenderContext {
                renderer: &mut renderer,
                buffers: &mut buffers,
                timer: &timer,
            })
            .unwrap();
        }
        assert!((pass.time() - 0.2).abs() < 1e-4);
    }

    #[test]
    fn switching_camera_kind_recompiles() {
        let effect = shared(gain("A", 1.0));
        let mut pass = EffectPass::new(Some(Camera::default()), vec![effect]).unwrap();
        let mut renderer = RecordingRenderer::new(64, 32);
        let mut buffers = BufferManager::new(FrameBufferType::Standard);
        setup(&mut pass, &mut renderer, &mut buffers);
        assert!(pass.program().defines.contains_key("PERSPECTIVE_CAMERA"));

        pass.set_camera(Some(Camera::default().orthographic(10.0)));
        assert!(pass.is_stale().unwrap());
        render(&mut pass, &mut renderer, &mut buffers);
        assert!(!pass.program().defines.contains_key("PERSPECTIVE_CAMERA"));
    }
}
