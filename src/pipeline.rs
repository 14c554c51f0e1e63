//! Frame driver for an ordered list of passes.
//!
//! A [`RenderPipeline`] owns its passes, the frame [`Timer`], a [`Resolution`] and the
//! [`BufferManager`] its passes borrow shared targets from.
//!
//! # Frame
//!
//! ```text
//! render(timestamp)
//!   ├─ apply pending resolution changes
//!   ├─ begin_frame (skip the frame if the renderer has no output)
//!   ├─ timer.update
//!   ├─ initialize passes added since the last frame
//!   ├─ wire the default chain and named buffers
//!   ├─ prepare every enabled pass (recompiles happen here)
//!   ├─ render every enabled pass, in order
//!   └─ end_frame
//! ```
//!
//! A failing pass never stops the frame. Its error is logged and kept until
//! [`take_errors`](RenderPipeline::take_errors); errors that would repeat every frame
//! also disable the pass.

use std::collections::BTreeMap;

use crate::buffer::{BufferKind, BufferManager};
use crate::config::PipelineConfig;
use crate::effect_pass::EffectPass;
use crate::error::{ConfigError, PassError, PipelineError};
use crate::pass::{Pass, PassId, PipelineId, RenderContext, ResourceContext};
use crate::renderer::{Output, Renderer, TargetId};
use crate::resolution::Resolution;
use crate::timer::Timer;

pub struct RenderPipeline {
    id: PipelineId,
    renderer: Option<Box<dyn Renderer>>,
    passes: Vec<Box<dyn Pass>>,
    timer: Timer,
    resolution: Resolution,
    applied_resolution: Option<u64>,
    buffers: BufferManager,
    config: PipelineConfig,
    errors: Vec<PipelineError>,
}

impl RenderPipeline {
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self::with_config(Some(renderer), PipelineConfig::default())
    }

    /// A pipeline without a renderer. It renders nothing until
    /// [`set_renderer`](Self::set_renderer) is called.
    pub fn detached() -> Self {
        Self::with_config(None, PipelineConfig::default())
    }

    pub fn with_config(renderer: Option<Box<dyn Renderer>>, config: PipelineConfig) -> Self {
        let mut timer = Timer::new();
        timer.set_fixed_delta(config.fixed_delta);
        timer.set_time_scale(config.time_scale);

        let resolution = match &renderer {
            Some(renderer) => {
                let (width, height) = renderer.size();
                Resolution::new(width, height)
            }
            None => Resolution::default(),
        };

        Self {
            id: PipelineId::next(),
            renderer,
            passes: Vec::new(),
            timer,
            applied_resolution: Some(resolution.revision()),
            resolution,
            buffers: BufferManager::new(config.frame_buffer_type),
            config,
            errors: Vec::new(),
        }
    }

    pub fn renderer(&self) -> Option<&dyn Renderer> {
        self.renderer.as_deref()
    }

    pub fn renderer_mut(&mut self) -> Option<&mut (dyn Renderer + 'static)> {
        self.renderer.as_deref_mut()
    }

    /// Replaces the renderer. Resources of the old renderer are released, every pass is
    /// initialized again against the new one and the size is re-applied. The old
    /// renderer is handed back.
    pub fn set_renderer(&mut self, renderer: Box<dyn Renderer>) -> Option<Box<dyn Renderer>> {
        let mut previous = self.renderer.take();
        match previous.as_deref_mut() {
            Some(old) => {
                for pass in &mut self.passes {
                    pass.release(old);
                    pass.core_mut().set_initialized(false);
                }
                self.buffers.dispose(old);
            }
            None => self.buffers.clear(),
        }

        self.renderer = Some(renderer);
        self.applied_resolution = None;
        self.apply_resolution();
        self.initialize_passes();
        log::debug!("renderer replaced, {} pass(es) re-initialized", self.passes.len());
        previous
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }

    /// The logical render size.
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Changes made here are applied at the start of the next frame.
    pub fn resolution_mut(&mut self) -> &mut Resolution {
        &mut self.resolution
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn buffers(&self) -> &BufferManager {
        &self.buffers
    }

    pub fn set_auto_render_to_screen(&mut self, enabled: bool) {
        self.config.auto_render_to_screen = enabled;
    }

    /// Appends a pass.
    pub fn add_pass<P: Pass + 'static>(&mut self, pass: P) -> Result<PassId, ConfigError> {
        self.insert_boxed_pass(self.passes.len(), Box::new(pass))
    }

    pub fn add_boxed_pass(&mut self, pass: Box<dyn Pass>) -> Result<PassId, ConfigError> {
        self.insert_boxed_pass(self.passes.len(), pass)
    }

    /// Inserts a pass at `index`, clamped to the end of the list.
    pub fn insert_pass<P: Pass + 'static>(
        &mut self,
        index: usize,
        pass: P,
    ) -> Result<PassId, ConfigError> {
        self.insert_boxed_pass(index, Box::new(pass))
    }

    /// Validates buffer dependencies, registers and (with a renderer) initializes the
    /// pass. On error the pass is dropped and the pipeline is unchanged.
    pub fn insert_boxed_pass(
        &mut self,
        index: usize,
        mut pass: Box<dyn Pass>,
    ) -> Result<PassId, ConfigError> {
        let index = index.min(self.passes.len());
        self.validate(pass.as_ref(), index)?;

        let (width, height) = self.drawing_buffer_size();
        let core = pass.core_mut();
        core.register(self.id);
        core.resolution_mut().set_base_size(width, height);
        if let Some(effect_pass) = pass.as_any_mut().downcast_mut::<EffectPass>() {
            effect_pass.set_max_time(self.config.max_time);
        }

        if let Some(renderer) = self.renderer.as_deref_mut() {
            initialize_pass(renderer, &mut self.buffers, pass.as_mut(), &mut self.errors);
        }

        let id = pass.core().id();
        log::debug!("registered pass '{}' at {index}", pass.core().name());
        self.passes.insert(index, pass);
        Ok(id)
    }

    /// Removes a pass and hands it back. Its own GPU resources are not released; that
    /// is up to the caller.
    pub fn remove_pass(&mut self, id: PassId) -> Option<Box<dyn Pass>> {
        let index = self.passes.iter().position(|p| p.core().id() == id)?;
        let mut pass = self.passes.remove(index);
        pass.core_mut().unregister();

        for kind in &pass.core().output.produces {
            if let Some(reader) = self.passes.iter().find(|p| p.core().input.required.contains(kind)) {
                log::warn!(
                    "removed '{}' which produced the {kind} buffer read by '{}'",
                    pass.core().name(),
                    reader.core().name()
                );
            }
        }
        log::debug!("removed pass '{}'", pass.core().name());
        Some(pass)
    }

    pub fn remove_all_passes(&mut self) -> Vec<Box<dyn Pass>> {
        let mut passes = std::mem::take(&mut self.passes);
        for pass in &mut passes {
            pass.core_mut().unregister();
        }
        passes
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn pass_ids(&self) -> Vec<PassId> {
        self.passes.iter().map(|p| p.core().id()).collect()
    }

    pub fn passes(&self) -> impl Iterator<Item = &dyn Pass> {
        self.passes.iter().map(|p| p.as_ref())
    }

    pub fn pass(&self, id: PassId) -> Option<&dyn Pass> {
        self.passes
            .iter()
            .find(|p| p.core().id() == id)
            .map(|p| p.as_ref())
    }

    pub fn pass_mut(&mut self, id: PassId) -> Option<&mut (dyn Pass + 'static)> {
        self.passes
            .iter_mut()
            .find(|p| p.core().id() == id)
            .map(|p| p.as_mut())
    }

    /// The pass with this id, if it is a `T`.
    pub fn pass_as<T: Pass + 'static>(&self, id: PassId) -> Option<&T> {
        self.pass(id)?.as_any().downcast_ref::<T>()
    }

    pub fn pass_as_mut<T: Pass + 'static>(&mut self, id: PassId) -> Option<&mut T> {
        self.pass_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    /// Errors recorded since the last call.
    pub fn take_errors(&mut self) -> Vec<PipelineError> {
        std::mem::take(&mut self.errors)
    }

    pub fn errors(&self) -> &[PipelineError] {
        &self.errors
    }

    /// Sets the logical size. The renderer is resized and every pass gets the new
    /// drawing-buffer size before this returns.
    pub fn set_size(&mut self, width: u32, height: u32, update_style: bool) {
        self.config.update_style = update_style;
        self.resolution.set_base_size(width, height);
        self.apply_resolution();
    }

    /// Renders one frame. `timestamp` is in milliseconds; without one the timer uses
    /// wall time.
    pub fn render(&mut self, timestamp: Option<f64>) {
        if self.renderer.is_none() {
            return;
        }
        if self.applied_resolution != Some(self.resolution.revision()) {
            self.apply_resolution();
        }

        let Self {
            renderer,
            passes,
            timer,
            buffers,
            config,
            errors,
            ..
        } = self;
        let Some(renderer) = renderer.as_deref_mut() else {
            return;
        };
        if !renderer.begin_frame() {
            return;
        }

        timer.update(timestamp);

        for pass in passes.iter_mut() {
            if pass.core().is_enabled() && !pass.core().is_initialized() {
                initialize_pass(renderer, buffers, pass.as_mut(), errors);
            }
        }

        wire(renderer, buffers, passes, config, errors);

        // A pass whose prepare failed may hold a stale program; it sits this frame out.
        let mut prepared = vec![false; passes.len()];
        for (pass, prepared) in passes.iter_mut().zip(prepared.iter_mut()) {
            if !pass.core().is_enabled() {
                continue;
            }
            let mut ctx = ResourceContext {
                renderer: &mut *renderer,
                buffers: &mut *buffers,
            };
            match pass.prepare(&mut ctx) {
                Ok(()) => *prepared = true,
                Err(error) => record(errors, pass.as_mut(), error),
            }
        }

        for (pass, prepared) in passes.iter_mut().zip(prepared) {
            if !prepared || !pass.core().is_enabled() {
                continue;
            }
            let mut ctx = RenderContext {
                renderer: &mut *renderer,
                buffers: &mut *buffers,
                timer: &*timer,
            };
            if let Err(error) = pass.render(&mut ctx) {
                record(errors, pass.as_mut(), error);
            }
        }

        renderer.end_frame();
    }

    /// Disposes every pass and every shared buffer, then removes all passes.
    pub fn dispose(&mut self) {
        match self.renderer.as_deref_mut() {
            Some(renderer) => {
                for pass in &mut self.passes {
                    pass.dispose(renderer);
                }
                self.buffers.dispose(renderer);
            }
            None => self.buffers.clear(),
        }
        let removed = self.remove_all_passes();
        self.timer.reset();
        log::debug!("pipeline disposed ({} pass(es))", removed.len());
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        match &self.renderer {
            Some(renderer) => renderer.drawing_buffer_size(),
            None => self.resolution.size(),
        }
    }

    fn validate(&self, pass: &dyn Pass, index: usize) -> Result<(), ConfigError> {
        let core = pass.core();
        for kind in &core.output.produces {
            if let Some(writer) = self.passes.iter().find(|p| p.core().output.produces.contains(kind)) {
                return Err(ConfigError::ConflictingWriters {
                    buffer: *kind,
                    first: writer.core().name().to_string(),
                    second: core.name().to_string(),
                });
            }
        }

        let earlier = &self.passes[..index];
        for kind in &core.input.required {
            let supplied = core.input.buffers.contains_key(kind);
            let produced = earlier.iter().any(|p| p.core().output.produces.contains(kind));
            if !supplied && !produced {
                return Err(ConfigError::MissingInput {
                    pass: core.name().to_string(),
                    buffer: *kind,
                });
            }
        }
        Ok(())
    }

    fn initialize_passes(&mut self) {
        let Some(renderer) = self.renderer.as_deref_mut() else {
            return;
        };
        for pass in &mut self.passes {
            initialize_pass(renderer, &mut self.buffers, pass.as_mut(), &mut self.errors);
        }
    }

    /// Pushes the drawing-buffer size to every pass and sweeps buffers nobody holds.
    fn apply_resolution(&mut self) {
        let revision = self.resolution.revision();
        let (width, height) = self.resolution.size();

        let Self {
            renderer,
            passes,
            buffers,
            config,
            errors,
            ..
        } = self;
        let Some(renderer) = renderer.as_deref_mut() else {
            log::debug!("no renderer, deferring resize to {width}x{height}");
            return;
        };

        if renderer.size() != (width, height) {
            renderer.set_size(width, height, config.update_style);
        }
        let (draw_w, draw_h) = renderer.drawing_buffer_size();

        buffers.begin_generation();
        for pass in passes.iter_mut() {
            let changed = pass.core_mut().resolution_mut().set_base_size(draw_w, draw_h);
            if changed && pass.core().is_initialized() {
                let mut ctx = ResourceContext {
                    renderer: &mut *renderer,
                    buffers: &mut *buffers,
                };
                if let Err(error) = pass.on_resolution_change(&mut ctx) {
                    record(errors, pass.as_mut(), error);
                }
            }
            let held = if changed {
                pass.core().held_targets()
            } else {
                pass.core().referenced_targets()
            };
            for target in held {
                buffers.retain(target);
            }
        }
        let released = buffers.release_stale(renderer);

        self.applied_resolution = Some(revision);
        log::debug!("resized to {draw_w}x{draw_h}, released {released} buffer(s)");
    }
}

fn record(errors: &mut Vec<PipelineError>, pass: &mut dyn Pass, error: PassError) {
    let name = pass.core().name().to_string();
    if error.disables_pass() {
        pass.core_mut().set_enabled(false);
        log::error!("pass '{name}' disabled: {error}");
    } else {
        log::warn!("pass '{name}': {error}");
    }
    errors.push(PipelineError { pass: name, error });
}

fn initialize_pass(
    renderer: &mut dyn Renderer,
    buffers: &mut BufferManager,
    pass: &mut dyn Pass,
    errors: &mut Vec<PipelineError>,
) {
    let mut ctx = ResourceContext { renderer, buffers };
    let result = pass.initialize(&mut ctx);
    pass.core_mut().set_initialized(true);
    if let Err(error) = result {
        record(errors, pass, error);
    }
}

/// Assigns default inputs and outputs for the frame.
///
/// The chain starts empty. A swapping pass writes a fresh ping-pong buffer (or its own
/// target, or the screen) and that becomes the next pass's input. A non-swapping pass
/// writes in place. Named inputs resolve to whatever an earlier pass produced.
fn wire(
    renderer: &mut dyn Renderer,
    buffers: &mut BufferManager,
    passes: &mut [Box<dyn Pass>],
    config: &PipelineConfig,
    errors: &mut Vec<PipelineError>,
) {
    let pinned = passes
        .iter()
        .any(|p| p.core().is_enabled() && p.core().is_pinned_to_screen());
    let last_enabled = passes.iter().rposition(|p| p.core().is_enabled());

    let mut produced: BTreeMap<BufferKind, TargetId> = BTreeMap::new();
    let mut chain: Option<TargetId> = None;
    let mut slot = 0u8;

    for (index, pass) in passes.iter_mut().enumerate() {
        let core = pass.core();
        if !core.is_enabled() {
            continue;
        }

        let to_screen = core.is_pinned_to_screen()
            || (config.auto_render_to_screen && !pinned && Some(index) == last_enabled);
        let in_place = !core.needs_swap();
        let (width, height) = core.size();
        let resolved: BTreeMap<BufferKind, TargetId> = core
            .input
            .required
            .iter()
            .filter_map(|kind| produced.get(kind).map(|target| (*kind, *target)))
            .collect();
        let input = chain;

        let output = match (to_screen, pass.owned_output(), chain) {
            (true, _, _) => {
                chain = None;
                Output::Screen
            }
            (false, Some(owned), _) => {
                chain = Some(owned);
                Output::Target(owned)
            }
            // Writes in place; the chain continues from the same buffer.
            (false, None, Some(current)) if in_place => Output::Target(current),
            (false, None, _) => {
                match buffers.acquire(renderer, BufferKind::Color(slot), width, height) {
                    Ok(target) => {
                        slot ^= 1;
                        chain = Some(target);
                        Output::Target(target)
                    }
                    Err(error) => {
                        record(errors, pass.as_mut(), error.into());
                        continue;
                    }
                }
            }
        };

        let core = pass.core_mut();
        let mut changed = core.input.default_buffer != input;
        core.input.default_buffer = input;
        core.output.default = output;
        core.set_renders_to_screen(to_screen);
        changed |= core.input.set_resolved(resolved);
        produced.extend(core.output.buffers.iter().map(|(kind, target)| (*kind, *target)));

        if changed {
            pass.on_input_change();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{Effect, EffectRef, ShaderEffect, shared};
    use crate::pass::{ClearPass, CopyPass, LambdaPass, LuminancePass};
    use crate::testing::RecordingRenderer;

    fn pipeline(width: u32, height: u32) -> RenderPipeline {
        RenderPipeline::new(Box::new(RecordingRenderer::new(width, height)))
    }

    fn recorder(pipeline: &RenderPipeline) -> &RecordingRenderer {
        pipeline
            .renderer()
            .and_then(|r| r.as_any().downcast_ref::<RecordingRenderer>())
            .unwrap()
    }

    #[test]
    fn last_enabled_pass_renders_to_screen() {
        let mut pipeline = pipeline(32, 32);
        let first = pipeline.add_pass(CopyPass::new()).unwrap();
        let second = pipeline.add_pass(CopyPass::new()).unwrap();
        pipeline.render(Some(0.0));

        let draws = recorder(&pipeline).draws();
        assert_eq!(draws.len(), 2);
        assert!(matches!(draws[0].output, Output::Target(_)));
        assert_eq!(draws[1].output, Output::Screen);
        assert!(!pipeline.pass(first).unwrap().core().renders_to_screen());
        assert!(pipeline.pass(second).unwrap().core().renders_to_screen());

        pipeline.pass_mut(second).unwrap().core_mut().set_enabled(false);
        pipeline.render(Some(16.0));
        assert!(pipeline.pass(first).unwrap().core().renders_to_screen());
    }

    #[test]
    fn chain_alternates_buffers() {
        let mut pipeline = pipeline(16, 16);
        for _ in 0..3 {
            pipeline.add_pass(CopyPass::new()).unwrap();
        }
        pipeline.add_pass(ClearPass::default()).unwrap();
        pipeline.set_auto_render_to_screen(false);
        pipeline.render(Some(0.0));

        let draws = recorder(&pipeline).draws();
        let Output::Target(first) = draws[0].output else {
            panic!("first copy went to the screen");
        };
        assert_eq!(draws[1].input, Some(first));
        assert_ne!(draws[0].output, draws[1].output);
        assert_eq!(draws[0].output, draws[2].output);
    }

    #[test]
    fn pinned_pass_disables_auto_screen() {
        let mut pipeline = pipeline(16, 16);
        let mut pinned = CopyPass::new();
        pinned.core_mut().pin_to_screen(true);
        pipeline.add_pass(pinned).unwrap();
        pipeline.add_pass(CopyPass::new()).unwrap();
        pipeline.render(Some(0.0));

        let draws = recorder(&pipeline).draws();
        assert_eq!(draws[0].output, Output::Screen);
        assert!(matches!(draws[1].output, Output::Target(_)));
    }

    #[test]
    fn second_writer_of_a_buffer_is_rejected() {
        let mut pipeline = pipeline(16, 16);
        pipeline.add_pass(LuminancePass::new()).unwrap();
        let err = pipeline.add_pass(LuminancePass::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingWriters { buffer: BufferKind::Luminance, .. }));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn missing_input_is_rejected_but_explicit_buffers_are_accepted() {
        let mut pipeline = pipeline(16, 16);
        let mut reader = CopyPass::new();
        reader.core_mut().input.required.insert(BufferKind::Depth);
        let err = pipeline.add_pass(reader).unwrap_err();
        assert!(matches!(err, ConfigError::MissingInput { buffer: BufferKind::Depth, .. }));

        let mut supplied = CopyPass::new();
        supplied.core_mut().input.required.insert(BufferKind::Depth);
        supplied
            .core_mut()
            .input
            .buffers
            .insert(BufferKind::Depth, TargetId::new(99));
        assert!(pipeline.add_pass(supplied).is_ok());
    }

    #[test]
    fn named_buffers_resolve_from_producers() {
        let mut pipeline = pipeline(16, 16);
        let luminance = pipeline.add_pass(LuminancePass::new()).unwrap();
        let mut reader = CopyPass::new();
        reader.core_mut().input.required.insert(BufferKind::Luminance);
        let reader = pipeline.add_pass(reader).unwrap();
        pipeline.render(Some(0.0));

        let produced = pipeline.pass(luminance).unwrap().core().output.buffers[&BufferKind::Luminance];
        let core = pipeline.pass(reader).unwrap().core();
        assert_eq!(core.input.buffer(BufferKind::Luminance), Some(produced));
    }

    #[test]
    fn set_size_reaches_every_pass() {
        let mut pipeline = RenderPipeline::new(Box::new(
            RecordingRenderer::new(10, 10).with_pixel_ratio(2.0),
        ));
        let full = pipeline.add_pass(CopyPass::new()).unwrap();
        let half = pipeline.add_pass(LuminancePass::new().with_scale(0.5)).unwrap();

        pipeline.set_size(640, 360, true);
        pipeline.render(Some(0.0));

        assert_eq!(pipeline.resolution().size(), (640, 360));
        assert_eq!(pipeline.pass(full).unwrap().core().size(), (1280, 720));
        assert_eq!(pipeline.pass(half).unwrap().core().size(), (640, 360));
    }

    #[test]
    fn resize_releases_old_buffers() {
        let mut pipeline = pipeline(64, 64);
        pipeline.add_pass(CopyPass::new()).unwrap();
        pipeline.add_pass(LuminancePass::new()).unwrap();
        pipeline.add_pass(CopyPass::new()).unwrap();
        pipeline.render(Some(0.0));
        let before = recorder(&pipeline).live_targets();

        pipeline.set_size(32, 32, false);
        pipeline.render(Some(16.0));
        assert_eq!(recorder(&pipeline).live_targets(), before);
        assert!(pipeline.take_errors().is_empty());
    }

    #[test]
    fn removed_pass_is_not_rendered_or_disposed() {
        let mut pipeline = pipeline(16, 16);
        let kept = pipeline.add_pass(CopyPass::new()).unwrap();
        let removed = pipeline.add_pass(CopyPass::new()).unwrap();

        let pass = pipeline.remove_pass(removed).unwrap();
        assert!(!pass.core().is_registered());
        assert!(pipeline.pass(removed).is_none());

        pipeline.render(Some(0.0));
        pipeline.dispose();
        let renderer = recorder(&pipeline);
        assert_eq!(renderer.draws().len(), 1);
        assert!(pipeline.pass(kept).is_none());
        // The removed pass still owns its program.
        assert_eq!(renderer.live_programs(), 1);
    }

    #[test]
    fn failing_pass_is_recorded_and_siblings_keep_rendering() {
        let mut pipeline = pipeline(16, 16);
        let failing = pipeline
            .add_pass(LambdaPass::new(|_| Err(PassError::Draw("lost surface".into()))))
            .unwrap();
        pipeline.add_pass(CopyPass::new()).unwrap();
        pipeline.render(Some(0.0));
        pipeline.render(Some(16.0));

        let errors = pipeline.take_errors();
        assert_eq!(errors.len(), 2);
        assert!(pipeline.pass(failing).unwrap().core().is_enabled());
        assert_eq!(recorder(&pipeline).draws().len(), 2);
    }

    #[test]
    fn pass_with_failed_prepare_skips_its_draw() {
        let mut pipeline = pipeline(16, 16);
        let effect = shared(ShaderEffect::fragment(
            "Swap",
            "fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {\n    return input_color.bgra;\n}\n",
        ));
        let effects: Vec<EffectRef> = vec![effect.clone()];
        let id = pipeline.add_pass(EffectPass::new(None, effects).unwrap()).unwrap();
        pipeline.render(Some(0.0));
        assert_eq!(recorder(&pipeline).draws().len(), 1);

        effect.borrow_mut().descriptor_mut().set_define("SOFT", "");
        {
            let _held = effect.borrow_mut();
            pipeline.render(Some(16.0));
        }
        let errors = pipeline.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].error, PassError::EffectBorrowed(_)));
        assert_eq!(recorder(&pipeline).draws().len(), 1);
        assert!(pipeline.pass(id).unwrap().core().is_enabled());

        pipeline.render(Some(32.0));
        assert!(pipeline.take_errors().is_empty());
        let renderer = recorder(&pipeline);
        assert_eq!(renderer.draws().len(), 2);
        assert_eq!(renderer.compiled_labels().len(), 2);
    }

    #[test]
    fn nothing_renders_without_output() {
        let mut pipeline = pipeline(16, 16);
        pipeline.add_pass(CopyPass::new()).unwrap();
        pipeline
            .renderer_mut()
            .and_then(|r| r.as_any_mut().downcast_mut::<RecordingRenderer>())
            .unwrap()
            .set_presentable(false);
        pipeline.render(Some(0.0));
        assert!(recorder(&pipeline).draws().is_empty());
        assert_eq!(pipeline.timer().frame(), 0);

        let mut detached = RenderPipeline::detached();
        detached.add_pass(CopyPass::new()).unwrap();
        detached.render(Some(0.0));
        assert_eq!(detached.timer().frame(), 0);
    }

    #[test]
    fn replacing_the_renderer_reinitializes_passes() {
        let mut pipeline = pipeline(16, 16);
        pipeline.add_pass(CopyPass::new()).unwrap();
        pipeline.render(Some(0.0));

        let old = pipeline
            .set_renderer(Box::new(RecordingRenderer::new(16, 16)))
            .unwrap();
        let old = old.as_any().downcast_ref::<RecordingRenderer>().unwrap();
        assert_eq!(old.live_programs(), 0);
        assert_eq!(old.live_targets(), 0);
        assert_eq!(recorder(&pipeline).compiled_labels().len(), 1);

        pipeline.render(Some(16.0));
        assert_eq!(recorder(&pipeline).draws().len(), 1);
    }
}
