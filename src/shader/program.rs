use std::collections::{BTreeMap, BTreeSet};

use super::preprocess::preprocess;
use super::template::{DECLARATIONS, EFFECT_VERTEX, ENABLES, FRAGMENT_SUPPORT};
use super::{Extension, SectionMap, ShaderTemplate, merge_sections};
use crate::error::CompileError;
use crate::uniform::UniformLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// `texture_2d<f32>`, filterable.
    Color,
    /// `texture_depth_2d`, read with `textureLoad`.
    Depth,
}

/// An extra texture bound at `@group(1) @binding(index)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureSlot {
    pub name: String,
    pub kind: TextureKind,
}

impl TextureSlot {
    pub fn color(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TextureKind::Color,
        }
    }

    pub fn depth(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TextureKind::Depth,
        }
    }
}

/// A full-screen vertex/fragment program plus everything a renderer needs to bind it.
///
/// Binding convention:
///
/// | group | binding | resource |
/// |-------|---------|----------|
/// | 0 | 0 | `frame: FrameUniforms` |
/// | 0 | 1 | `params: Params` (only when `uniforms` is not empty) |
/// | 0 | 2 | `input_buffer: texture_2d<f32>` |
/// | 0 | 3 | `input_sampler: sampler` |
/// | 1 | i | `textures[i]` |
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderProgram {
    pub label: String,
    pub vertex: String,
    pub fragment: String,
    pub defines: BTreeMap<String, String>,
    pub extensions: BTreeSet<Extension>,
    pub uniforms: UniformLayout,
    pub textures: Vec<TextureSlot>,
}

impl ShaderProgram {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            vertex: String::new(),
            fragment: String::new(),
            defines: BTreeMap::new(),
            extensions: BTreeSet::new(),
            uniforms: UniformLayout::new(),
            textures: Vec::new(),
        }
    }

    /// A standalone program: the built-in full-screen vertex stage plus a complete
    /// fragment stage that defines `fn fs(in: VertexOutput) -> @location(0) vec4f`.
    pub fn material(
        label: impl Into<String>,
        fragment: &str,
        uniforms: UniformLayout,
        textures: Vec<TextureSlot>,
    ) -> Self {
        let template = ShaderTemplate::new(EFFECT_VERTEX, fragment.to_string());
        Self::new(label)
            .with_uniforms(uniforms)
            .with_textures(textures)
            .assemble(&template, &SectionMap::new(), "")
    }

    pub fn with_uniforms(mut self, uniforms: UniformLayout) -> Self {
        self.uniforms = uniforms;
        self
    }

    pub fn with_textures(mut self, textures: Vec<TextureSlot>) -> Self {
        self.textures = textures;
        self
    }

    pub fn with_defines(mut self, defines: BTreeMap<String, String>) -> Self {
        self.defines = defines;
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    pub fn with_extensions(mut self, extensions: BTreeSet<Extension>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Fills the template. Uniforms, textures and extensions must be set first since
    /// they generate the declarations.
    pub fn assemble(mut self, template: &ShaderTemplate, sections: &SectionMap, support: &str) -> Self {
        let filled = ShaderTemplate::new(
            template
                .vertex
                .replace(ENABLES, &self.enables())
                .replace(DECLARATIONS, &self.declarations()),
            template.fragment.replace(FRAGMENT_SUPPORT, support),
        );
        let (vertex, fragment) = merge_sections(&filled, sections);
        self.vertex = vertex;
        self.fragment = fragment;
        self
    }

    /// The complete module after preprocessing, as handed to the compiler.
    pub fn source(&self) -> Result<String, CompileError> {
        let raw = self.raw_source();
        preprocess(&raw, &self.defines).map_err(|message| CompileError {
            label: self.label.clone(),
            message,
            merged_source: raw,
        })
    }

    /// Vertex and fragment text before preprocessing.
    pub fn raw_source(&self) -> String {
        format!("{}\n{}", self.vertex, self.fragment)
    }

    pub fn texture_index(&self, name: &str) -> Option<usize> {
        self.textures.iter().position(|slot| slot.name == name)
    }

    fn enables(&self) -> String {
        self.extensions
            .iter()
            .map(|ext| format!("enable {};\n", ext.wgsl_name()))
            .collect()
    }

    fn declarations(&self) -> String {
        let mut out = String::new();
        if !self.uniforms.is_empty() {
            out.push('\n');
            out.push_str(&self.uniforms.wgsl_struct("Params"));
            out.push_str("\n@group(0) @binding(1) var<uniform> params: Params;\n");
        }
        if !self.textures.is_empty() {
            out.push('\n');
        }
        for (i, slot) in self.textures.iter().enumerate() {
            let ty = match slot.kind {
                TextureKind::Color => "texture_2d<f32>",
                TextureKind::Depth => "texture_depth_2d",
            };
            out.push_str(&format!("@group(1) @binding({i}) var {}: {ty};\n", slot.name));
        }
        out
    }
}
