use std::time::Duration;

use postfx::testing::RecordingRenderer;
use postfx::{
    BlendFunction, BloomEffect, BufferKind, Camera, ConfigError, CopyPass, DepthEffect, Effect,
    EffectAttribute, EffectDescriptor, EffectPass, EffectRef, GeometryPass, LambdaPass,
    LutEffect, LutTable, LuminancePass, Output, Pass, PassError, RenderPipeline, Renderer,
    ShaderEffect, shared,
};

const TINT: &str = r#"
fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {
    return vec4f(input_color.rgb * tint, input_color.a);
}
"#;

fn tint(name: &str) -> ShaderEffect {
    ShaderEffect::from_descriptor(
        EffectDescriptor::new(name)
            .with_fragment_shader(TINT)
            .with_uniform("tint", [1.0f32, 0.9, 0.8]),
    )
}

fn recorder(pipeline: &RenderPipeline) -> &RecordingRenderer {
    pipeline
        .renderer()
        .and_then(|r| r.as_any().downcast_ref::<RecordingRenderer>())
        .expect("pipeline uses a RecordingRenderer")
}

fn read_f32(params: &[u8], offset: usize) -> f32 {
    f32::from_ne_bytes(params[offset..offset + 4].try_into().unwrap())
}

#[test]
fn geometry_and_bloom_flow_to_the_screen() {
    let mut pipeline = RenderPipeline::new(Box::new(RecordingRenderer::new(800, 600)));
    let geometry = pipeline.add_pass(GeometryPass::new(|_| Ok(()))).unwrap();

    let bloom = shared(BloomEffect::new());
    let effects: Vec<EffectRef> = vec![bloom.clone()];
    let effect_pass = pipeline
        .add_pass(EffectPass::new(None, effects).unwrap())
        .unwrap();

    pipeline.set_size(1920, 1080, true);
    pipeline.render(Some(0.0));
    assert!(pipeline.take_errors().is_empty());

    for id in [geometry, effect_pass] {
        assert_eq!(pipeline.pass(id).unwrap().core().size(), (1920, 1080));
    }

    let color = pipeline
        .pass_as::<GeometryPass>(geometry)
        .and_then(GeometryPass::color_target)
        .unwrap();
    let bloom_result = bloom.borrow().result().unwrap();

    let draws = recorder(&pipeline).draws();
    let last = draws.last().unwrap();
    assert_eq!(last.output, Output::Screen);
    assert_eq!(last.input, Some(color));
    assert!(last.textures.contains(&Some(bloom_result)));
    assert_eq!(last.frame.resolution[0], 1920.0);

    // Threshold, three downsamples, three upsamples, then the merged draw.
    assert_eq!(draws.len(), 8);
    assert!(draws[..7].iter().all(|d| d.output != Output::Screen));
}

#[test]
fn lone_enabled_pass_renders_to_screen_with_normal_blend() {
    let mut pipeline = RenderPipeline::new(Box::new(RecordingRenderer::new(320, 240)));
    let first = pipeline.add_pass(CopyPass::new()).unwrap();
    let second = pipeline.add_pass(CopyPass::new()).unwrap();
    let effect = shared(tint("Tint"));
    let last = pipeline
        .add_pass(EffectPass::new(None, vec![effect.clone() as EffectRef]).unwrap())
        .unwrap();

    for id in [first, second] {
        pipeline.pass_mut(id).unwrap().core_mut().set_enabled(false);
    }
    pipeline.render(Some(0.0));

    let draws = recorder(&pipeline).draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].output, Output::Screen);
    assert!(pipeline.pass(last).unwrap().core().renders_to_screen());

    let blend = effect.borrow().descriptor().blend_mode().clone();
    assert_eq!(blend.function(), BlendFunction::Normal);
    assert_eq!(blend.opacity(), 1.0);

    let pass = pipeline.pass_as::<EffectPass>(last).unwrap();
    let offset = pass.program().uniforms.field("blend0_opacity").unwrap().offset;
    assert_eq!(read_f32(&draws[0].params, offset), 1.0);
}

#[test]
fn scaled_passes_follow_set_size() {
    let mut pipeline = RenderPipeline::new(Box::new(RecordingRenderer::new(100, 100)));
    let full = pipeline.add_pass(CopyPass::new()).unwrap();
    let quarter = pipeline.add_pass(LuminancePass::new().with_scale(0.25)).unwrap();
    let mut third = CopyPass::new();
    third.core_mut().resolution_mut().set_scale(1.0 / 3.0);
    let third = pipeline.add_pass(third).unwrap();

    pipeline.set_size(1001, 499, false);
    pipeline.render(Some(0.0));

    let size = |id| pipeline.pass(id).unwrap().core().size();
    assert_eq!(size(full), (1001, 499));
    assert_eq!(size(quarter), (250, 125));
    assert_eq!(size(third), (334, 166));
    assert_eq!(recorder(&pipeline).size(), (1001, 499));
}

#[test]
fn blend_change_recompiles_before_the_next_draw() {
    let mut pipeline = RenderPipeline::new(Box::new(RecordingRenderer::new(64, 64)));
    let effect = shared(tint("Tint"));
    let id = pipeline
        .add_pass(EffectPass::new(None, vec![effect.clone() as EffectRef]).unwrap())
        .unwrap();
    pipeline.render(Some(0.0));
    let first_program = recorder(&pipeline).draws()[0].program;

    effect
        .borrow_mut()
        .descriptor_mut()
        .blend_mode_mut()
        .set_function(BlendFunction::Multiply);
    assert!(pipeline.pass_as::<EffectPass>(id).unwrap().is_stale().unwrap());

    pipeline.render(Some(16.0));
    let renderer = recorder(&pipeline);
    assert_eq!(renderer.compiled_labels().len(), 2);
    let second_program = renderer.draws()[1].program;
    assert_ne!(first_program, second_program);
    let source = renderer.program(second_program).unwrap().source().unwrap();
    assert!(source.contains("blend_multiply("));
    assert_eq!(renderer.live_programs(), 1);
}

#[test]
fn removed_pass_is_left_alone() {
    let mut pipeline = RenderPipeline::new(Box::new(RecordingRenderer::new(64, 64)));
    pipeline.add_pass(CopyPass::new()).unwrap();
    let effect = shared(tint("Tint"));
    let id = pipeline
        .add_pass(EffectPass::new(None, vec![effect.clone() as EffectRef]).unwrap())
        .unwrap();
    pipeline.render(Some(0.0));
    assert_eq!(recorder(&pipeline).draws().len(), 2);

    let removed = pipeline.remove_pass(id).unwrap();
    assert!(!removed.core().is_registered());

    pipeline.render(Some(16.0));
    pipeline.dispose();
    let renderer = recorder(&pipeline);
    assert_eq!(renderer.draws().len(), 3);
    assert!(renderer.draws()[2].label.starts_with("CopyPass"));
    // The removed pass still holds its program; the caller owns it now.
    assert_eq!(renderer.live_programs(), 1);
    assert!(effect.borrow().descriptor().owner().is_some());
}

#[test]
fn two_convolutions_are_rejected() {
    let a = shared(BloomEffect::new());
    let b = shared(ShaderEffect::from_descriptor(
        EffectDescriptor::new("Blur").with_attributes(EffectAttribute::CONVOLUTION),
    ));
    let result = EffectPass::new(None, vec![a as EffectRef, b as EffectRef]);
    assert!(matches!(
        result.err(),
        Some(ConfigError::AttributeConflict { attribute: "CONVOLUTION", .. })
    ));
}

#[test]
fn compile_error_is_reported_and_siblings_render() {
    let mut pipeline = RenderPipeline::new(Box::new(RecordingRenderer::new(64, 64)));
    let broken = shared(ShaderEffect::fragment(
        "Broken",
        "fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {\n    return input_color * missing;\n}\n",
    ));
    pipeline.add_pass(CopyPass::new()).unwrap();
    let failing = pipeline
        .add_pass(EffectPass::new(None, vec![broken as EffectRef]).unwrap())
        .unwrap();
    pipeline.add_pass(CopyPass::new()).unwrap();

    let errors = pipeline.take_errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].error, PassError::Compile(_)));
    assert!(!pipeline.pass(failing).unwrap().core().is_enabled());

    pipeline.render(Some(0.0));
    pipeline.render(Some(16.0));
    let renderer = recorder(&pipeline);
    assert_eq!(renderer.draws().len(), 4);
    assert!(renderer.draws().iter().all(|d| d.label == "CopyPass"));
    assert!(pipeline.errors().is_empty());
}

#[test]
fn lambda_pass_sees_the_frame_clock() {
    use std::cell::Cell;
    use std::rc::Rc;

    let seen = Rc::new(Cell::new(0.0));
    let sink = seen.clone();
    let mut pipeline = RenderPipeline::new(Box::new(RecordingRenderer::new(8, 8)));
    pipeline
        .add_pass(LambdaPass::new(move |ctx| {
            sink.set(ctx.timer.elapsed());
            Ok(())
        }))
        .unwrap();

    pipeline.render(Some(1000.0));
    pipeline.render(Some(1500.0));
    assert!((seen.get() - 0.5).abs() < 1e-9);
}

#[test]
fn depth_effect_needs_an_earlier_depth_producer() {
    let mut pipeline = RenderPipeline::new(Box::new(RecordingRenderer::new(64, 64)));
    let depth = shared(DepthEffect::new());

    let lone = EffectPass::new(None, vec![depth.clone() as EffectRef]).unwrap();
    assert!(lone.core().input.required.contains(&BufferKind::Depth));
    let err = pipeline.add_pass(lone).unwrap_err();
    assert!(matches!(err, ConfigError::MissingInput { buffer: BufferKind::Depth, .. }));
    assert!(pipeline.is_empty());
    assert!(depth.borrow().descriptor().owner().is_none());

    let geometry = pipeline.add_pass(GeometryPass::new(|_| Ok(()))).unwrap();
    let effects: Vec<EffectRef> = vec![depth.clone()];
    pipeline
        .add_pass(EffectPass::new(Some(Camera::default()), effects).unwrap())
        .unwrap();
    pipeline.render(Some(0.0));
    assert!(pipeline.take_errors().is_empty());

    let core = pipeline.pass(geometry).unwrap().core();
    let depth_target = core.output.buffers[&BufferKind::Depth];
    let last = recorder(&pipeline).draws().last().unwrap().clone();
    assert_eq!(last.output, Output::Screen);
    assert_eq!(last.textures, vec![Some(depth_target)]);
}

#[test]
fn lut_is_never_sampled_by_the_passthrough_program() {
    let mut pipeline = RenderPipeline::new(Box::new(RecordingRenderer::new(32, 32)));
    let lut = shared(LutEffect::expanded(LutTable::identity(2), 8).unwrap());
    pipeline
        .add_pass(EffectPass::new(None, vec![lut.clone() as EffectRef]).unwrap())
        .unwrap();

    let mut ms = 0.0;
    while !lut.borrow().is_ready() && ms < 8000.0 {
        pipeline.render(Some(ms));
        ms += 16.0;
        std::thread::sleep(Duration::from_millis(2));
    }
    pipeline.render(Some(ms));
    assert!(lut.borrow().is_ready());
    assert!(pipeline.take_errors().is_empty());

    let renderer = recorder(&pipeline);
    let graded = renderer.draws().last().unwrap().program;
    assert!(renderer.program(graded).unwrap().defines.contains_key("e0_LUT_READY"));
    for draw in renderer.draws() {
        assert_eq!(draw.textures[0].is_some(), draw.program == graded);
    }
}
