//! Shader templates, section merging and program assembly.
//!
//! Programs are WGSL. The merge step is plain string work and needs no GPU:
//! [`merge_sections`] substitutes section tokens, [`ShaderProgram`] adds the generated
//! declarations, and [`validate_wgsl`] runs naga over the result.

pub(crate) mod lexer;
mod preprocess;
mod program;
pub mod template;
mod validate;

pub use preprocess::preprocess;
pub use program::{ShaderProgram, TextureKind, TextureSlot};
pub use validate::validate_wgsl;

use std::borrow::Cow;
use std::collections::BTreeMap;

/// A named slot in the effect template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderSection {
    /// Module-scope vertex declarations.
    VertexHead,
    /// Statements at the end of `vs`, with `uv` and `out` in scope.
    VertexMainSupport,
    /// Module-scope fragment declarations.
    FragmentHead,
    /// Statements that may rewrite `uv` before the input is sampled.
    FragmentMainUv,
    /// Statements that compute the effect color.
    FragmentMainImage,
}

impl ShaderSection {
    pub const ALL: [ShaderSection; 5] = [
        ShaderSection::VertexHead,
        ShaderSection::VertexMainSupport,
        ShaderSection::FragmentHead,
        ShaderSection::FragmentMainUv,
        ShaderSection::FragmentMainImage,
    ];

    /// The placeholder this section replaces in a template.
    pub fn token(self) -> &'static str {
        match self {
            ShaderSection::VertexHead => "{{VERTEX_HEAD}}",
            ShaderSection::VertexMainSupport => "{{VERTEX_MAIN_SUPPORT}}",
            ShaderSection::FragmentHead => "{{FRAGMENT_HEAD}}",
            ShaderSection::FragmentMainUv => "{{FRAGMENT_MAIN_UV}}",
            ShaderSection::FragmentMainImage => "{{FRAGMENT_MAIN_IMAGE}}",
        }
    }
}

pub type SectionMap = BTreeMap<ShaderSection, String>;

/// A required WGSL language extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Extension {
    ShaderF16,
    DualSourceBlending,
    ClipDistances,
}

impl Extension {
    pub fn wgsl_name(self) -> &'static str {
        match self {
            Extension::ShaderF16 => "f16",
            Extension::DualSourceBlending => "dual_source_blending",
            Extension::ClipDistances => "clip_distances",
        }
    }

    /// Device feature that has to be enabled for the extension.
    pub fn feature(self) -> wgpu::Features {
        match self {
            Extension::ShaderF16 => wgpu::Features::SHADER_F16,
            Extension::DualSourceBlending => wgpu::Features::DUAL_SOURCE_BLENDING,
            Extension::ClipDistances => wgpu::Features::CLIP_DISTANCES,
        }
    }
}

/// Vertex and fragment template text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderTemplate {
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl ShaderTemplate {
    pub fn new(vertex: impl Into<Cow<'static, str>>, fragment: impl Into<Cow<'static, str>>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// The template every effect pass is built from.
    pub fn effect() -> Self {
        Self::new(template::EFFECT_VERTEX, template::EFFECT_FRAGMENT)
    }
}

/// Replaces every section token in `template` with the matching text from `sections`.
/// Missing sections become empty. Pure: the same input always yields the same output.
pub fn merge_sections(template: &ShaderTemplate, sections: &SectionMap) -> (String, String) {
    let mut vertex = template.vertex.to_string();
    let mut fragment = template.fragment.to_string();

    for section in ShaderSection::ALL {
        let text = sections.get(&section).map(String::as_str).unwrap_or("");
        vertex = vertex.replace(section.token(), text);
        fragment = fragment.replace(section.token(), text);
    }

    (vertex, fragment)
}
