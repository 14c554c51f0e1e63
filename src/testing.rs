//! An in-memory [`Renderer`].
//!
//! [`RecordingRenderer`] never touches a GPU. It hands out handles, validates programs
//! with naga, and records every draw and clear, so pipelines can be tested headless.
//! Draws are checked against the live resources: reading or writing a destroyed target
//! or an unknown program fails the draw, as does a draw that samples its own output.

use std::any::Any;
use std::collections::HashMap;

use crate::error::{CompileError, PassError, ResourceError};
use crate::renderer::{
    DrawCall, FrameUniforms, Output, ProgramId, Renderer, TargetDescriptor, TargetId,
};
use crate::shader::{ShaderProgram, validate_wgsl};

/// A draw as it reached the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub label: String,
    pub program: ProgramId,
    pub frame: FrameUniforms,
    pub params: Vec<u8>,
    pub input: Option<TargetId>,
    pub textures: Vec<Option<TargetId>>,
    pub output: Output,
    pub clear: Option<[f32; 4]>,
}

#[derive(Debug)]
struct Target {
    descriptor: TargetDescriptor,
    data: Option<Vec<u8>>,
}

pub struct RecordingRenderer {
    size: (u32, u32),
    pixel_ratio: f32,
    validate: bool,
    fail_allocations: bool,
    presentable: bool,
    rejected: Vec<String>,
    next_id: u64,
    targets: HashMap<TargetId, Target>,
    programs: HashMap<ProgramId, ShaderProgram>,
    compiled: Vec<String>,
    draws: Vec<RecordedDraw>,
    clears: Vec<(Output, [f32; 4])>,
    frames: u64,
}

impl RecordingRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            pixel_ratio: 1.0,
            validate: true,
            fail_allocations: false,
            presentable: true,
            rejected: Vec::new(),
            next_id: 1,
            targets: HashMap::new(),
            programs: HashMap::new(),
            compiled: Vec::new(),
            draws: Vec::new(),
            clears: Vec::new(),
            frames: 0,
        }
    }

    /// Physical pixels per logical pixel.
    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = ratio;
        self
    }

    /// Accepts every program without running naga.
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Makes every following `create_target` fail.
    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// When false, `begin_frame` reports that there is nothing to render into.
    pub fn set_presentable(&mut self, presentable: bool) {
        self.presentable = presentable;
    }

    /// Makes every following compile of a program with this label fail.
    pub fn reject_program(&mut self, label: impl Into<String>) {
        self.rejected.push(label.into());
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn take_draws(&mut self) -> Vec<RecordedDraw> {
        std::mem::take(&mut self.draws)
    }

    pub fn clears(&self) -> &[(Output, [f32; 4])] {
        &self.clears
    }

    /// Labels of every successful compile, in order.
    pub fn compiled_labels(&self) -> &[String] {
        &self.compiled
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn target(&self, id: TargetId) -> Option<&TargetDescriptor> {
        self.targets.get(&id).map(|t| &t.descriptor)
    }

    /// Bytes last written with `write_target`.
    pub fn target_data(&self, id: TargetId) -> Option<&[u8]> {
        self.targets.get(&id).and_then(|t| t.data.as_deref())
    }

    pub fn program(&self, id: ProgramId) -> Option<&ShaderProgram> {
        self.programs.get(&id)
    }

    /// Number of completed frames.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn next_raw(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_target(&self, call: &DrawCall<'_>, target: TargetId, role: &str) -> Result<(), PassError> {
        if self.targets.contains_key(&target) {
            Ok(())
        } else {
            Err(PassError::Draw(format!(
                "'{}' uses destroyed {role} target {target:?}",
                call.label
            )))
        }
    }
}

impl Renderer for RecordingRenderer {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.pixel_ratio).round() as u32).max(1);
        (scale(self.size.0), scale(self.size.1))
    }

    fn set_size(&mut self, width: u32, height: u32, _update_style: bool) {
        self.size = (width, height);
    }

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> Result<TargetId, ResourceError> {
        if self.fail_allocations {
            return Err(ResourceError::Allocation {
                label: descriptor.label.clone(),
                width: descriptor.width,
                height: descriptor.height,
                reason: "allocation disabled".to_string(),
            });
        }
        let id = TargetId::new(self.next_raw());
        self.targets.insert(
            id,
            Target {
                descriptor: descriptor.clone(),
                data: None,
            },
        );
        Ok(id)
    }

    fn write_target(&mut self, target: TargetId, data: &[u8]) -> Result<(), ResourceError> {
        let entry = self
            .targets
            .get_mut(&target)
            .ok_or(ResourceError::UnknownTarget(target))?;
        if entry.descriptor.format.is_depth() {
            return Err(ResourceError::DepthUpload(entry.descriptor.label.clone()));
        }
        let expected = entry.descriptor.byte_len();
        if data.len() != expected {
            return Err(ResourceError::UploadSize {
                label: entry.descriptor.label.clone(),
                expected,
                actual: data.len(),
            });
        }
        entry.data = Some(data.to_vec());
        Ok(())
    }

    fn destroy_target(&mut self, target: TargetId) {
        self.targets.remove(&target);
    }

    fn target_size(&self, target: TargetId) -> Option<(u32, u32)> {
        self.targets
            .get(&target)
            .map(|t| (t.descriptor.width, t.descriptor.height))
    }

    fn compile(&mut self, program: &ShaderProgram) -> Result<ProgramId, CompileError> {
        let source = program.source()?;
        if self.rejected.contains(&program.label) {
            return Err(CompileError {
                label: program.label.clone(),
                message: "rejected by the recording renderer".to_string(),
                merged_source: source,
            });
        }
        if self.validate {
            validate_wgsl(&source).map_err(|message| CompileError {
                label: program.label.clone(),
                message,
                merged_source: source.clone(),
            })?;
        }
        let id = ProgramId::new(self.next_raw());
        self.programs.insert(id, program.clone());
        self.compiled.push(program.label.clone());
        Ok(id)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn begin_frame(&mut self) -> bool {
        self.presentable
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), PassError> {
        let program = self
            .programs
            .get(&call.program)
            .ok_or_else(|| PassError::Draw(format!("'{}' uses an unknown program", call.label)))?;
        if call.textures.len() != program.textures.len() {
            return Err(PassError::Draw(format!(
                "'{}' binds {} textures, program declares {}",
                call.label,
                call.textures.len(),
                program.textures.len()
            )));
        }
        if call.params.len() != program.uniforms.size() {
            return Err(PassError::Draw(format!(
                "'{}' passes {} parameter bytes, program expects {}",
                call.label,
                call.params.len(),
                program.uniforms.size()
            )));
        }

        if let Some(input) = call.input {
            self.check_target(call, input, "input")?;
        }
        for texture in call.textures.iter().flatten() {
            self.check_target(call, *texture, "texture")?;
        }
        if let Output::Target(output) = call.output {
            self.check_target(call, output, "output")?;
            let sampled = call.input == Some(output) || call.textures.contains(&Some(output));
            if sampled {
                return Err(PassError::Draw(format!(
                    "'{}' samples its own output {output:?}",
                    call.label
                )));
            }
        }

        self.draws.push(RecordedDraw {
            label: call.label.to_string(),
            program: call.program,
            frame: call.frame,
            params: call.params.to_vec(),
            input: call.input,
            textures: call.textures.to_vec(),
            output: call.output,
            clear: call.clear,
        });
        Ok(())
    }

    fn clear(&mut self, output: Output, color: [f32; 4]) -> Result<(), PassError> {
        if let Output::Target(target) = output {
            if !self.targets.contains_key(&target) {
                return Err(PassError::Draw(format!("clear of destroyed target {target:?}")));
            }
        }
        self.clears.push((output, color));
        Ok(())
    }

    fn end_frame(&mut self) {
        self.frames += 1;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::TargetFormat;
    use crate::uniform::UniformLayout;

    const COPY: &str = "@fragment\nfn fs(in: VertexOutput) -> @location(0) vec4f {\n    return textureSample(input_buffer, input_sampler, in.uv);\n}\n";
    const BROKEN: &str = "@fragment\nfn fs(in: VertexOutput) -> @location(0) vec4f {\n    return nope;\n}\n";

    #[test]
    fn invalid_programs_report_the_merged_source() {
        let mut renderer = RecordingRenderer::new(4, 4);
        let program = ShaderProgram::material("Broken", BROKEN, UniformLayout::new(), Vec::new());
        let err = renderer.compile(&program).unwrap_err();
        assert_eq!(err.label, "Broken");
        assert!(err.merged_source.contains("return nope;"));
        assert!(renderer.compiled_labels().is_empty());
    }

    #[test]
    fn drawing_from_a_destroyed_target_fails() {
        let mut renderer = RecordingRenderer::new(4, 4);
        let program = renderer
            .compile(&ShaderProgram::material("Copy", COPY, UniformLayout::new(), Vec::new()))
            .unwrap();
        let target = renderer
            .create_target(&TargetDescriptor::new("t", 4, 4, TargetFormat::Rgba8Unorm))
            .unwrap();
        renderer.destroy_target(target);

        let result = renderer.draw(&DrawCall {
            label: "copy",
            program,
            frame: FrameUniforms::new(4, 4, 0.0),
            params: &[],
            input: Some(target),
            textures: &[],
            output: Output::Screen,
            clear: None,
        });
        assert!(matches!(result, Err(PassError::Draw(_))));
    }

    #[test]
    fn uploads_must_match_the_target_size() {
        let mut renderer = RecordingRenderer::new(4, 4);
        let target = renderer
            .create_target(&TargetDescriptor::new("lut", 2, 2, TargetFormat::Rgba8Unorm))
            .unwrap();
        assert!(renderer.write_target(target, &[0; 15]).is_err());
        renderer.write_target(target, &[7; 16]).unwrap();
        assert_eq!(renderer.target_data(target).map(<[u8]>::len), Some(16));
    }

    #[test]
    fn pixel_ratio_scales_drawing_buffer() {
        let renderer = RecordingRenderer::new(100, 50).with_pixel_ratio(2.0);
        assert_eq!(renderer.drawing_buffer_size(), (200, 100));
        assert_eq!(renderer.size(), (100, 50));
    }
}
