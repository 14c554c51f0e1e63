//! The effect authoring contract.
//!
//! An effect is data: shader text per [`ShaderSection`], defines, uniforms, required
//! extensions, [`EffectAttribute`] flags and a [`BlendMode`]. Everything that changes
//! the generated shader goes through a mutator on [`EffectDescriptor`] which bumps its
//! revision, so the owning [`EffectPass`](crate::EffectPass) can tell when it has to
//! recompile. Uniform values that keep their type are read every frame and never
//! trigger a recompile.
//!
//! Behaviour (per-frame uniform updates, private sub-passes) comes from implementing
//! [`Effect`]. [`ShaderEffect`] covers the common case of an effect that is only data.

mod bloom;
mod depth;
mod lut;

pub use bloom::BloomEffect;
pub use depth::DepthEffect;
pub use lut::{LutEffect, LutTable};

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::rc::Rc;

use crate::blending::{BlendFunction, BlendMode};
use crate::buffer::BufferKind;
use crate::error::PassError;
use crate::pass::{PassId, ResourceContext};
use crate::renderer::{Renderer, TargetId};
use crate::shader::{Extension, SectionMap, ShaderSection};
use crate::timer::Timer;
use crate::uniform::{TextureSource, UniformValue};

/// Capability flags the merger inspects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EffectAttribute(u32);

impl EffectAttribute {
    pub const NONE: Self = Self(0);

    /// Samples the input at other texels. Only one such effect may live in a pass,
    /// since every other effect only sees the running color at its own texel.
    pub const CONVOLUTION: Self = Self(1 << 0);

    /// Reads scene depth. Requires an upstream pass producing [`BufferKind::Depth`].
    pub const DEPTH: Self = Self(1 << 1);

    /// Reads scene normals. Requires an upstream pass producing [`BufferKind::Normal`].
    pub const NORMALS: Self = Self(1 << 2);

    /// Attributes that at most one effect per pass may declare.
    pub const EXCLUSIVE: Self = Self::CONVOLUTION;

    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Buffers an effect with these attributes needs as input.
    pub fn required_buffers(self) -> impl Iterator<Item = BufferKind> {
        [
            (Self::DEPTH, BufferKind::Depth),
            (Self::NORMALS, BufferKind::Normal),
        ]
        .into_iter()
        .filter(move |(flag, _)| self.contains(*flag))
        .map(|(_, kind)| kind)
    }
}

impl BitOr for EffectAttribute {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EffectAttribute {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EffectAttribute {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for EffectAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::CONVOLUTION, "CONVOLUTION"),
            (Self::DEPTH, "DEPTH"),
            (Self::NORMALS, "NORMALS"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();

        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join(" | "))
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    #[default]
    Linear,
    Srgb,
}

/// Everything the merger needs to know about one effect.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectDescriptor {
    name: String,
    blend_mode: BlendMode,
    sections: SectionMap,
    defines: BTreeMap<String, String>,
    uniforms: BTreeMap<String, UniformValue>,
    extensions: BTreeSet<Extension>,
    attributes: EffectAttribute,
    input_color_space: Option<ColorSpace>,
    output_color_space: Option<ColorSpace>,
    revision: u64,
    owner: Option<PassId>,
}

impl EffectDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blend_mode: BlendMode::default(),
            sections: SectionMap::new(),
            defines: BTreeMap::new(),
            uniforms: BTreeMap::new(),
            extensions: BTreeSet::new(),
            attributes: EffectAttribute::NONE,
            input_color_space: None,
            output_color_space: None,
            revision: 0,
            owner: None,
        }
    }

    /// Fragment-stage declarations.
    ///
    /// Declaring `fn main_image(input_color: vec4f, uv: vec2f) -> vec4f` (with a third
    /// `depth: f32` parameter for [`EffectAttribute::DEPTH`] effects) or
    /// `fn main_uv(uv: vec2f) -> vec2f` is enough: the calls are generated unless the
    /// matching section is set explicitly.
    pub fn with_fragment_shader(mut self, source: impl Into<String>) -> Self {
        self.sections.insert(ShaderSection::FragmentHead, source.into());
        self
    }

    /// Vertex-stage declarations. `fn main_support(uv: vec2f)` is called at the end of
    /// the vertex stage when declared.
    pub fn with_vertex_shader(mut self, source: impl Into<String>) -> Self {
        self.sections.insert(ShaderSection::VertexHead, source.into());
        self
    }

    pub fn with_section(mut self, section: ShaderSection, source: impl Into<String>) -> Self {
        self.sections.insert(section, source.into());
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }

    pub fn with_uniform(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.uniforms.insert(name.into(), value.into());
        self
    }

    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extensions.insert(extension);
        self
    }

    pub fn with_attributes(mut self, attributes: EffectAttribute) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_blend_function(mut self, function: BlendFunction) -> Self {
        self.blend_mode = BlendMode::new(function).with_opacity(self.blend_mode.opacity());
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.blend_mode.set_opacity(opacity);
        self
    }

    pub fn with_input_color_space(mut self, space: ColorSpace) -> Self {
        self.input_color_space = Some(space);
        self
    }

    pub fn with_output_color_space(mut self, space: ColorSpace) -> Self {
        self.output_color_space = Some(space);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blend_mode(&self) -> &BlendMode {
        &self.blend_mode
    }

    /// Function changes are picked up through [`revision`](Self::revision).
    pub fn blend_mode_mut(&mut self) -> &mut BlendMode {
        &mut self.blend_mode
    }

    pub fn section(&self, section: ShaderSection) -> Option<&str> {
        self.sections.get(&section).map(String::as_str)
    }

    pub fn sections(&self) -> &SectionMap {
        &self.sections
    }

    pub fn set_section(&mut self, section: ShaderSection, source: Option<String>) {
        let changed = match source {
            Some(source) => self.sections.insert(section, source.clone()) != Some(source),
            None => self.sections.remove(&section).is_some(),
        };
        self.touch(changed);
    }

    pub fn defines(&self) -> &BTreeMap<String, String> {
        &self.defines
    }

    pub fn define(&self, name: &str) -> Option<&str> {
        self.defines.get(name).map(String::as_str)
    }

    pub fn set_define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let changed = self.defines.insert(name.into(), value.clone()) != Some(value);
        self.touch(changed);
    }

    pub fn remove_define(&mut self, name: &str) {
        let changed = self.defines.remove(name).is_some();
        self.touch(changed);
    }

    pub fn uniforms(&self) -> &BTreeMap<String, UniformValue> {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }

    /// Sets a uniform value. Only adding a uniform or changing its type affects the
    /// shader.
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        let value = value.into();
        let ty = value.uniform_type();
        let previous = self.uniforms.insert(name.into(), value);
        let changed = previous.is_none_or(|prev| prev.uniform_type() != ty);
        self.touch(changed);
    }

    pub fn remove_uniform(&mut self, name: &str) {
        let changed = self.uniforms.remove(name).is_some();
        self.touch(changed);
    }

    pub fn extensions(&self) -> &BTreeSet<Extension> {
        &self.extensions
    }

    pub fn add_extension(&mut self, extension: Extension) {
        let changed = self.extensions.insert(extension);
        self.touch(changed);
    }

    pub fn remove_extension(&mut self, extension: Extension) {
        let changed = self.extensions.remove(&extension);
        self.touch(changed);
    }

    pub fn attributes(&self) -> EffectAttribute {
        self.attributes
    }

    pub fn set_attributes(&mut self, attributes: EffectAttribute) {
        let changed = self.attributes != attributes;
        self.attributes = attributes;
        self.touch(changed);
    }

    pub fn input_color_space(&self) -> Option<ColorSpace> {
        self.input_color_space
    }

    pub fn set_input_color_space(&mut self, space: Option<ColorSpace>) {
        let changed = self.input_color_space != space;
        self.input_color_space = space;
        self.touch(changed);
    }

    pub fn output_color_space(&self) -> Option<ColorSpace> {
        self.output_color_space
    }

    pub fn set_output_color_space(&mut self, space: Option<ColorSpace>) {
        let changed = self.output_color_space != space;
        self.output_color_space = space;
        self.touch(changed);
    }

    /// Counts changes that alter the generated shader, blend function changes included.
    /// Use [`shader_key`](Self::shader_key) to compare against an earlier state, since a
    /// replaced [`BlendMode`] starts counting from zero again.
    pub fn revision(&self) -> u64 {
        self.revision + self.blend_mode.revision()
    }

    /// Identifies the generated shader: the descriptor's own revision and the blend
    /// function. Opacity is a uniform and not part of it.
    pub fn shader_key(&self) -> (u64, BlendFunction) {
        (self.revision, self.blend_mode.function())
    }

    /// Buffers this effect reads: attribute inputs plus texture uniforms bound to
    /// shared buffers.
    pub fn required_inputs(&self) -> BTreeSet<BufferKind> {
        let mut kinds: BTreeSet<BufferKind> = self.attributes.required_buffers().collect();
        for value in self.uniforms.values() {
            if let Some(TextureSource::Buffer(kind)) = value.texture_source() {
                kinds.insert(kind);
            }
        }
        kinds
    }

    /// The effect pass this effect is attached to.
    pub fn owner(&self) -> Option<PassId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<PassId>) {
        self.owner = owner;
    }

    fn touch(&mut self, changed: bool) {
        if changed {
            self.revision += 1;
        }
    }
}

/// What an effect sees while its pass renders.
pub struct EffectContext<'a> {
    pub renderer: &'a mut dyn Renderer,
    pub timer: &'a Timer,
    /// The pass input, if any.
    pub input: Option<TargetId>,
    pub width: u32,
    pub height: u32,
}

/// A leaf visual transformation that can be merged into an effect pass.
pub trait Effect {
    fn descriptor(&self) -> &EffectDescriptor;

    fn descriptor_mut(&mut self) -> &mut EffectDescriptor;

    /// Called once the owning pass has a renderer.
    fn initialize(&mut self, _ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        Ok(())
    }

    /// Called every frame before the owning pass checks whether it has to recompile.
    /// Changes that affect the shader (defines, uniform types, texture slots) belong
    /// here, so they are compiled before the next draw.
    fn prepare(&mut self, _ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        Ok(())
    }

    /// Called every frame before the merged draw. Private sub-passes render here.
    /// Only uniform values may change; a shader change here skips the frame's draw.
    fn update(&mut self, _ctx: &mut EffectContext<'_>) -> Result<(), PassError> {
        Ok(())
    }

    fn on_resolution_change(
        &mut self,
        _ctx: &mut ResourceContext<'_>,
        _width: u32,
        _height: u32,
    ) -> Result<(), PassError> {
        Ok(())
    }

    /// Frees GPU resources before the renderer is replaced. The effect is initialized
    /// again against the new renderer, so CPU state and pending work are kept.
    fn release(&mut self, renderer: &mut dyn Renderer) {
        self.dispose(renderer);
    }

    /// Frees resources the effect owns privately and drops pending work.
    fn dispose(&mut self, _renderer: &mut dyn Renderer) {}
}

/// Effects are shared between the application and the pass that merges them.
pub type EffectRef = Rc<RefCell<dyn Effect>>;

/// Wraps an effect for sharing. Keep the typed handle and pass a clone to the pass.
///
/// ```
/// use postfx::{EffectRef, ShaderEffect, shared};
///
/// let vignette = shared(ShaderEffect::new("Vignette"));
/// let effects: Vec<EffectRef> = vec![vignette.clone()];
/// assert_eq!(effects.len(), 1);
/// ```
pub fn shared<E: Effect + 'static>(effect: E) -> Rc<RefCell<E>> {
    Rc::new(RefCell::new(effect))
}

/// An effect defined entirely by its descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderEffect {
    descriptor: EffectDescriptor,
}

impl ShaderEffect {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: EffectDescriptor::new(name),
        }
    }

    pub fn from_descriptor(descriptor: EffectDescriptor) -> Self {
        Self { descriptor }
    }

    /// A fragment-only effect.
    pub fn fragment(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::from_descriptor(EffectDescriptor::new(name).with_fragment_shader(source))
    }
}

impl Effect for ShaderEffect {
    fn descriptor(&self) -> &EffectDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut EffectDescriptor {
        &mut self.descriptor
    }
}
