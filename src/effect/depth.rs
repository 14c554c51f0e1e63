use super::{Effect, EffectAttribute, EffectDescriptor};
use crate::blending::BlendFunction;

const DEPTH_FRAGMENT: &str = r#"
fn main_image(input_color: vec4f, uv: vec2f, depth: f32) -> vec4f {
#ifdef INVERTED
    let d = 1.0 - depth;
#else
    let d = depth;
#endif
    return vec4f(vec3f(d), input_color.a);
}
"#;

/// Shows the depth buffer as grayscale.
pub struct DepthEffect {
    descriptor: EffectDescriptor,
}

impl Default for DepthEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthEffect {
    pub fn new() -> Self {
        Self {
            descriptor: EffectDescriptor::new("DepthEffect")
                .with_fragment_shader(DEPTH_FRAGMENT)
                .with_attributes(EffectAttribute::DEPTH)
                .with_blend_function(BlendFunction::Src),
        }
    }

    pub fn inverted(mut self, inverted: bool) -> Self {
        self.set_inverted(inverted);
        self
    }

    pub fn is_inverted(&self) -> bool {
        self.descriptor.define("INVERTED").is_some()
    }

    /// Changes a define, so the owning pass recompiles.
    pub fn set_inverted(&mut self, inverted: bool) {
        if inverted {
            self.descriptor.set_define("INVERTED", "");
        } else {
            self.descriptor.remove_define("INVERTED");
        }
    }
}

impl Effect for DepthEffect {
    fn descriptor(&self) -> &EffectDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut EffectDescriptor {
        &mut self.descriptor
    }
}
