use std::any::Any;
use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::{DrawCall, Output, ProgramId, Renderer, TargetDescriptor, TargetFormat, TargetId};
use crate::error::{CompileError, PassError, ResourceError};
use crate::gpu::GpuContext;
use crate::shader::{ShaderProgram, TextureKind, validate_wgsl};

struct GpuTarget {
    descriptor: TargetDescriptor,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuProgram {
    label: String,
    module: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    texture_layout: wgpu::BindGroupLayout,
    textures: Vec<TextureKind>,
    params_size: usize,
    /// One pipeline per output format, created on first use.
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

struct Frame {
    encoder: wgpu::CommandEncoder,
    surface: Option<wgpu::SurfaceTexture>,
    view: wgpu::TextureView,
}

/// [`Renderer`] on top of a [`GpuContext`].
///
/// Every draw is its own render pass recorded into one command encoder per frame. The
/// encoder is submitted and the surface presented in `end_frame`. Headless contexts
/// render the screen output into an offscreen texture.
pub struct WgpuRenderer {
    gpu: GpuContext,
    size: (u32, u32),
    pixel_ratio: f32,
    next_id: u64,
    targets: HashMap<TargetId, GpuTarget>,
    programs: HashMap<ProgramId, GpuProgram>,
    sampler: wgpu::Sampler,
    frame_layout: wgpu::BindGroupLayout,
    frame_params_layout: wgpu::BindGroupLayout,
    fallback_color: wgpu::TextureView,
    fallback_depth: wgpu::TextureView,
    offscreen: Option<wgpu::Texture>,
    frame: Option<Frame>,
}

impl WgpuRenderer {
    pub fn new(gpu: GpuContext) -> Self {
        let device = &gpu.device;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("postfx sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let frame_layout = frame_bind_group_layout(device, false);
        let frame_params_layout = frame_bind_group_layout(device, true);
        let fallback_color = fallback_texture(&gpu, wgpu::TextureFormat::Rgba8Unorm);
        let fallback_depth = fallback_texture(&gpu, wgpu::TextureFormat::Depth32Float);

        let size = (gpu.width(), gpu.height());
        Self {
            gpu,
            size,
            pixel_ratio: 1.0,
            next_id: 1,
            targets: HashMap::new(),
            programs: HashMap::new(),
            sampler,
            frame_layout,
            frame_params_layout,
            fallback_color,
            fallback_depth,
            offscreen: None,
            frame: None,
        }
    }

    /// Physical pixels per logical pixel. Applies from the next `set_size`.
    pub fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio.max(f32::EPSILON);
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut GpuContext {
        &mut self.gpu
    }

    /// View of a live target, for host code that records its own render passes.
    pub fn target_view(&self, target: TargetId) -> Option<&wgpu::TextureView> {
        self.targets.get(&target).map(|t| &t.view)
    }

    pub fn target_texture(&self, target: TargetId) -> Option<&wgpu::Texture> {
        self.targets.get(&target).map(|t| &t.texture)
    }

    /// The screen view of the current frame.
    pub fn screen_view(&self) -> Option<&wgpu::TextureView> {
        self.frame.as_ref().map(|f| &f.view)
    }

    /// The encoder of the current frame. Work recorded here runs in order with draws.
    pub fn frame_encoder(&mut self) -> Option<&mut wgpu::CommandEncoder> {
        self.frame.as_mut().map(|f| &mut f.encoder)
    }

    /// The offscreen texture that stands in for the screen of a headless context.
    pub fn offscreen_texture(&self) -> Option<&wgpu::Texture> {
        self.offscreen.as_ref()
    }

    fn next_raw(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn screen_texture(&mut self) -> wgpu::TextureView {
        let (width, height) = (self.gpu.width(), self.gpu.height());
        let texture = match self.offscreen.take() {
            Some(texture) if texture.width() == width && texture.height() == height => texture,
            _ => self.gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("postfx offscreen screen"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: self.gpu.config.format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            }),
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.offscreen = Some(texture);
        view
    }
}

impl Renderer for WgpuRenderer {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        (self.gpu.width(), self.gpu.height())
    }

    /// `update_style` has no effect: the window owns its size.
    fn set_size(&mut self, width: u32, height: u32, _update_style: bool) {
        self.size = (width, height);
        let physical = |v: u32| ((v as f32 * self.pixel_ratio).round() as u32).max(1);
        self.gpu.resize(physical(width), physical(height));
    }

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> Result<TargetId, ResourceError> {
        let max = self.gpu.device.limits().max_texture_dimension_2d;
        if descriptor.width == 0
            || descriptor.height == 0
            || descriptor.width > max
            || descriptor.height > max
        {
            return Err(ResourceError::Allocation {
                label: descriptor.label.clone(),
                width: descriptor.width,
                height: descriptor.height,
                reason: format!("dimensions must be within 1..={max}"),
            });
        }

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        if !descriptor.format.is_depth() {
            usage |= wgpu::TextureUsages::COPY_DST;
        }

        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&descriptor.label),
            size: wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(descriptor.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = TargetId::new(self.next_raw());
        self.targets.insert(
            id,
            GpuTarget {
                descriptor: descriptor.clone(),
                texture,
                view,
            },
        );
        Ok(id)
    }

    fn write_target(&mut self, target: TargetId, data: &[u8]) -> Result<(), ResourceError> {
        let entry = self
            .targets
            .get(&target)
            .ok_or(ResourceError::UnknownTarget(target))?;
        let descriptor = &entry.descriptor;
        if descriptor.format.is_depth() {
            return Err(ResourceError::DepthUpload(descriptor.label.clone()));
        }
        if data.len() != descriptor.byte_len() {
            return Err(ResourceError::UploadSize {
                label: descriptor.label.clone(),
                expected: descriptor.byte_len(),
                actual: data.len(),
            });
        }

        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(descriptor.width * descriptor.format.bytes_per_pixel()),
                rows_per_image: Some(descriptor.height),
            },
            wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn destroy_target(&mut self, target: TargetId) {
        if let Some(entry) = self.targets.remove(&target) {
            entry.texture.destroy();
        }
    }

    fn target_size(&self, target: TargetId) -> Option<(u32, u32)> {
        self.targets
            .get(&target)
            .map(|t| (t.descriptor.width, t.descriptor.height))
    }

    fn compile(&mut self, program: &ShaderProgram) -> Result<ProgramId, CompileError> {
        let source = program.source()?;
        let compile_error = |message: String| CompileError {
            label: program.label.clone(),
            message,
            merged_source: source.clone(),
        };

        let features = self.gpu.device.features();
        if let Some(missing) = program
            .extensions
            .iter()
            .find(|ext| !features.contains(ext.feature()))
        {
            return Err(compile_error(format!(
                "device does not support the '{}' extension",
                missing.wgsl_name()
            )));
        }
        validate_wgsl(&source).map_err(compile_error)?;

        let device = &self.gpu.device;
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&program.label),
            source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
        });

        let entries: Vec<wgpu::BindGroupLayoutEntry> = program
            .textures
            .iter()
            .enumerate()
            .map(|(i, slot)| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: match slot.kind {
                        TextureKind::Color => wgpu::TextureSampleType::Float { filterable: true },
                        TextureKind::Depth => wgpu::TextureSampleType::Depth,
                    },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} textures", program.label)),
            entries: &entries,
        });

        let frame_layout = if program.uniforms.is_empty() {
            &self.frame_layout
        } else {
            &self.frame_params_layout
        };
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&program.label),
            bind_group_layouts: &[frame_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let id = ProgramId::new(self.next_raw());
        self.programs.insert(
            id,
            GpuProgram {
                label: program.label.clone(),
                module,
                layout,
                texture_layout,
                textures: program.textures.iter().map(|slot| slot.kind).collect(),
                params_size: program.uniforms.size(),
                pipelines: HashMap::new(),
            },
        );
        log::debug!("compiled program '{}'", program.label);
        Ok(id)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn begin_frame(&mut self) -> bool {
        if self.frame.is_some() {
            return true;
        }

        let (surface, view) = if self.gpu.surface.is_none() {
            (None, self.screen_texture())
        } else {
            let acquired = match &self.gpu.surface {
                Some(surface) => surface.get_current_texture(),
                None => return false,
            };
            match acquired {
                Ok(texture) => {
                    let view = texture
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    (Some(texture), view)
                }
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::warn!("surface lost, reconfiguring");
                    self.gpu.reconfigure();
                    return false;
                }
                Err(err) => {
                    log::warn!("skipping frame: {err}");
                    return false;
                }
            }
        };

        let encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("postfx frame"),
            });
        self.frame = Some(Frame {
            encoder,
            surface,
            view,
        });
        true
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), PassError> {
        let Self {
            gpu,
            targets,
            programs,
            sampler,
            frame_layout,
            frame_params_layout,
            fallback_color,
            fallback_depth,
            frame,
            ..
        } = self;

        let frame = frame
            .as_mut()
            .ok_or_else(|| PassError::Draw(format!("'{}' drew outside of a frame", call.label)))?;
        let program = programs
            .get_mut(&call.program)
            .ok_or_else(|| PassError::Draw(format!("'{}' uses an unknown program", call.label)))?;
        if call.params.len() != program.params_size {
            return Err(PassError::Draw(format!(
                "'{}' passes {} parameter bytes, program expects {}",
                call.label,
                call.params.len(),
                program.params_size
            )));
        }

        let lookup = |target: TargetId, role: &str| {
            targets.get(&target).ok_or_else(|| {
                PassError::Draw(format!("'{}' uses destroyed {role} target {target:?}", call.label))
            })
        };

        let (output_view, format) = match call.output {
            Output::Screen => (&frame.view, gpu.config.format),
            Output::Target(id) => {
                let target = lookup(id, "output")?;
                if target.descriptor.format.is_depth() {
                    return Err(PassError::Draw(format!(
                        "'{}' cannot draw color into depth target '{}'",
                        call.label, target.descriptor.label
                    )));
                }
                (&target.view, texture_format(target.descriptor.format))
            }
        };
        let input_view = match call.input {
            Some(id) => &lookup(id, "input")?.view,
            None => &*fallback_color,
        };

        let device = &gpu.device;
        let pipeline = program
            .pipelines
            .entry(format)
            .or_insert_with(|| create_pipeline(device, &program.label, &program.module, &program.layout, format));

        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("postfx frame uniforms"),
            contents: bytemuck::bytes_of(&call.frame),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let params_buffer = (!call.params.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("postfx params"),
                contents: call.params,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let mut frame_entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: frame_buffer.as_entire_binding(),
        }];
        if let Some(params) = &params_buffer {
            frame_entries.push(wgpu::BindGroupEntry {
                binding: 1,
                resource: params.as_entire_binding(),
            });
        }
        frame_entries.push(wgpu::BindGroupEntry {
            binding: 2,
            resource: wgpu::BindingResource::TextureView(input_view),
        });
        frame_entries.push(wgpu::BindGroupEntry {
            binding: 3,
            resource: wgpu::BindingResource::Sampler(&*sampler),
        });
        let frame_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(call.label),
            layout: if params_buffer.is_some() {
                &*frame_params_layout
            } else {
                &*frame_layout
            },
            entries: &frame_entries,
        });

        let mut texture_entries = Vec::with_capacity(program.textures.len());
        for (i, kind) in program.textures.iter().enumerate() {
            let view = match call.textures.get(i).copied().flatten() {
                Some(id) => &lookup(id, "texture")?.view,
                None => match kind {
                    TextureKind::Color => &*fallback_color,
                    TextureKind::Depth => &*fallback_depth,
                },
            };
            texture_entries.push(wgpu::BindGroupEntry {
                binding: i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let texture_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(call.label),
            layout: &program.texture_layout,
            entries: &texture_entries,
        });

        let load = match call.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };
        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(call.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &frame_group, &[]);
        pass.set_bind_group(1, &texture_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn clear(&mut self, output: Output, color: [f32; 4]) -> Result<(), PassError> {
        let Self { targets, frame, .. } = self;
        let frame = frame
            .as_mut()
            .ok_or_else(|| PassError::Draw("clear outside of a frame".to_string()))?;

        let (view, depth) = match output {
            Output::Screen => (&frame.view, false),
            Output::Target(id) => {
                let target = targets
                    .get(&id)
                    .ok_or_else(|| PassError::Draw(format!("clear of destroyed target {id:?}")))?;
                (&target.view, target.descriptor.format.is_depth())
            }
        };

        if depth {
            frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("postfx clear depth"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        } else {
            let [r, g, b, a] = color;
            frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("postfx clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        Ok(())
    }

    fn end_frame(&mut self) {
        let Some(frame) = self.frame.take() else {
            return;
        };
        self.gpu.queue.submit(Some(frame.encoder.finish()));
        if let Some(surface) = frame.surface {
            surface.present();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn texture_format(format: TargetFormat) -> wgpu::TextureFormat {
    match format {
        TargetFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TargetFormat::R16Float => wgpu::TextureFormat::R16Float,
        TargetFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn frame_bind_group_layout(device: &wgpu::Device, with_params: bool) -> wgpu::BindGroupLayout {
    let uniform = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };

    let mut entries = vec![uniform(0)];
    if with_params {
        entries.push(uniform(1));
    }
    // Input texture
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 2,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    });
    // Sampler
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 3,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(if with_params {
            "postfx frame+params layout"
        } else {
            "postfx frame layout"
        }),
        entries: &entries,
    })
}

/// A 1×1 texture bound wherever a draw leaves a slot empty.
fn fallback_texture(gpu: &GpuContext, format: wgpu::TextureFormat) -> wgpu::TextureView {
    let depth = format == wgpu::TextureFormat::Depth32Float;
    let usage = if depth {
        wgpu::TextureUsages::TEXTURE_BINDING
    } else {
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
    };
    let size = wgpu::Extent3d {
        width: 1,
        height: 1,
        depth_or_array_layers: 1,
    };
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("postfx fallback"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    if !depth {
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[0, 0, 0, 255],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            size,
        );
    }
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    module: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    log::debug!("creating pipeline '{label}' for {format:?}");
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
