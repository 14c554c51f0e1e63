use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use postfx::{
    BloomEffect, DrawCall, EffectPass, EffectRef, FrameUniforms, GeometryPass, GpuConfig,
    GpuContext, PassError, ProgramId, RenderPipeline, ShaderEffect, ShaderProgram,
    UniformLayout, WgpuRenderer, shared,
};

const SCENE_FRAGMENT: &str = r#"
@fragment
fn fs(in: VertexOutput) -> @location(0) vec4f {
    let aspect = frame.resolution.x / frame.resolution.y;
    let p = (in.uv - 0.5) * vec2f(aspect, 1.0);
    var color = vec3f(0.02, 0.02, 0.05) + vec3f(0.05, 0.04, 0.1) * (1.0 - in.uv.y);
    for (var i = 0; i < 5; i++) {
        let t = frame.time * 0.6 + f32(i) * 1.2566;
        let center = vec2f(cos(t), sin(t * 1.3)) * 0.3;
        let glow = 0.004 / max(dot(p - center, p - center), 1e-4);
        let hue = vec3f(0.5) + 0.5 * cos(vec3f(0.0, 2.1, 4.2) + f32(i));
        color += hue * min(glow, 4.0);
    }
    return vec4f(color, 1.0);
}
"#;

const VIGNETTE: &str = r#"
fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {
    let d = distance(uv, vec2f(0.5));
    return vec4f(input_color.rgb * smoothstep(0.8, 0.3, d), input_color.a);
}
"#;

/// Draws a few glowing orbs with a material program compiled on first use.
fn scene_pass() -> GeometryPass {
    let mut program: Option<ProgramId> = None;
    GeometryPass::new(move |scene| {
        let id = match program {
            Some(id) => id,
            None => {
                let compiled = scene.renderer.compile(&ShaderProgram::material(
                    "DemoScene",
                    SCENE_FRAGMENT,
                    UniformLayout::new(),
                    Vec::new(),
                ))?;
                program = Some(compiled);
                compiled
            }
        };
        scene.renderer.draw(&DrawCall {
            label: "DemoScene",
            program: id,
            frame: FrameUniforms::new(scene.width, scene.height, scene.timer.elapsed() as f32),
            params: &[],
            input: None,
            textures: &[],
            output: scene.color,
            clear: None,
        })
    })
}

fn build_pipeline(gpu: GpuContext) -> Result<RenderPipeline, postfx::Error> {
    let mut pipeline = RenderPipeline::new(Box::new(WgpuRenderer::new(gpu)));
    pipeline.add_pass(scene_pass())?;

    let effects: Vec<EffectRef> = vec![
        shared(BloomEffect::new().with_intensity(1.5)),
        shared(ShaderEffect::fragment("Vignette", VIGNETTE)),
    ];
    pipeline.add_pass(EffectPass::new(None, effects)?)?;
    Ok(pipeline)
}

#[derive(Default)]
struct App {
    window: Option<Arc<Window>>,
    pipeline: Option<RenderPipeline>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let settings = GpuConfig::new().title("postfx demo");
        let attributes = Window::default_attributes()
            .with_title(settings.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(settings.width, settings.height));

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };

        let pipeline = GpuContext::new(window.clone(), &settings)
            .map_err(postfx::Error::from)
            .and_then(build_pipeline);
        match pipeline {
            Ok(pipeline) => {
                self.pipeline = Some(pipeline);
                self.window = Some(window);
            }
            Err(err) => {
                log::error!("{err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(pipeline) = &mut self.pipeline {
                    pipeline.dispose();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(pipeline) = &mut self.pipeline {
                    pipeline.set_size(size.width, size.height, false);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(pipeline) = &mut self.pipeline {
                    pipeline.render(None);
                    for error in pipeline.take_errors() {
                        match &error.error {
                            PassError::Draw(_) => log::warn!("{error}"),
                            _ => log::error!("{error}"),
                        }
                    }
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    event_loop.run_app(&mut app)?;
    Ok(())
}
