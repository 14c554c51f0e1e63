//! Combines effect descriptors into one shader program.
//!
//! Every effect gets a namespace `e{index}_`. Its top-level declarations, defines and
//! texture uniforms are renamed into that namespace, and its value uniforms become
//! fields `e{index}_name` of the shared `params` block. Two effects can therefore use
//! the same names without clashing, and the result only depends on the ordered list.
//!
//! The fragment stage threads one running `color` through the effects:
//!
//! ```text
//! {
//!     let input_color = color;
//!     var output_color = input_color;
//!     output_color = e0_main_image(input_color, uv);
//!     color = blend_screen(input_color, output_color, params.blend0_opacity);
//! }
//! ```

use std::collections::{BTreeSet, HashMap};

use crate::blending::BlendFunction;
use crate::buffer::BufferKind;
use crate::camera::Camera;
use crate::effect::{ColorSpace, EffectAttribute, EffectDescriptor};
use crate::error::ConfigError;
use crate::shader::lexer::{rename_identifiers, top_level_declarations};
use crate::shader::{
    SectionMap, ShaderProgram, ShaderSection, ShaderTemplate, TextureSlot,
};
use crate::uniform::{UniformLayout, UniformType};

/// Names provided by the template. Effects may use them but not declare them.
pub const RESERVED_IDENTIFIERS: &[&str] = &[
    "frame",
    "params",
    "Params",
    "FrameUniforms",
    "VertexOutput",
    "vs",
    "fs",
    "in",
    "out",
    "uv",
    "color",
    "input_color",
    "output_color",
    "input_buffer",
    "input_sampler",
    "depth_buffer",
    "normal_buffer",
    "read_depth",
    "read_normal",
    "depth_to_view_z",
    "linear_to_srgb",
    "srgb_to_linear",
    "READ_DEPTH",
    "READ_NORMALS",
    "PERSPECTIVE_CAMERA",
];

const COLOR_SPACE_SUPPORT: &str = r#"fn linear_to_srgb(c: vec3f) -> vec3f {
    let lo = c * 12.92;
    let hi = 1.055 * pow(max(c, vec3f(0.0)), vec3f(1.0 / 2.4)) - 0.055;
    return select(hi, lo, c <= vec3f(0.0031308));
}

fn srgb_to_linear(c: vec3f) -> vec3f {
    let lo = c / 12.92;
    let hi = pow((max(c, vec3f(0.0)) + 0.055) / 1.055, vec3f(2.4));
    return select(hi, lo, c <= vec3f(0.04045));
}
"#;

/// Where the value of a `params` field comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformBinding {
    pub effect: usize,
    /// The effect uniform, or `None` for the blend opacity.
    pub uniform: Option<String>,
    pub field: String,
}

/// Where a texture slot gets its target from. Texture uniforms are looked up on every
/// draw, so rebinding one never needs a recompile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextureBinding {
    Buffer(BufferKind),
    Uniform { effect: usize, name: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct MergedEffects {
    pub program: ShaderProgram,
    pub attributes: EffectAttribute,
    pub required_inputs: BTreeSet<BufferKind>,
    pub uniforms: Vec<UniformBinding>,
    /// Parallel to `program.textures`.
    pub textures: Vec<TextureBinding>,
    pub output_color_space: ColorSpace,
}

/// Checks that the effects can share one pass.
pub fn validate_effects(effects: &[&EffectDescriptor]) -> Result<(), ConfigError> {
    let mut exclusive_owner: Option<&EffectDescriptor> = None;
    let mut color_space_owner: Option<&EffectDescriptor> = None;

    for effect in effects {
        if effect.attributes().intersects(EffectAttribute::EXCLUSIVE) {
            if let Some(first) = exclusive_owner {
                let shared = first.attributes() & effect.attributes() & EffectAttribute::EXCLUSIVE;
                if !shared.is_empty() {
                    return Err(ConfigError::AttributeConflict {
                        attribute: "CONVOLUTION",
                        first: first.name().to_string(),
                        second: effect.name().to_string(),
                    });
                }
            }
            exclusive_owner = Some(effect);
        }

        if effect.output_color_space().is_some() {
            if let Some(first) = color_space_owner {
                return Err(ConfigError::ColorSpaceConflict {
                    first: first.name().to_string(),
                    second: effect.name().to_string(),
                });
            }
            color_space_owner = Some(effect);
        }
    }

    Ok(())
}

/// Builds the merged program for `effects`, in list order.
///
/// Deterministic: the same descriptors and camera kind always produce byte-identical
/// source.
pub fn merge_effects(
    label: &str,
    effects: &[&EffectDescriptor],
    camera: Option<&Camera>,
) -> Result<MergedEffects, ConfigError> {
    validate_effects(effects)?;

    let mut attributes = EffectAttribute::NONE;
    let mut required_inputs = BTreeSet::new();
    let mut extensions = BTreeSet::new();
    let mut defines = std::collections::BTreeMap::new();
    let mut layout = UniformLayout::new();
    let mut uniforms = Vec::new();
    let mut effect_textures: Vec<(TextureSlot, TextureBinding)> = Vec::new();

    let mut vertex_heads = Vec::new();
    let mut vertex_support = Vec::new();
    let mut fragment_heads = Vec::new();
    let mut main_uvs = Vec::new();
    let mut main_images = Vec::new();

    let mut blend_functions = BTreeSet::new();
    let mut color_space = ColorSpace::Linear;
    let mut converts_color = false;

    for (index, effect) in effects.iter().enumerate() {
        let prefix = format!("e{index}_");
        let heads = [
            effect.section(ShaderSection::VertexHead).unwrap_or(""),
            effect.section(ShaderSection::FragmentHead).unwrap_or(""),
        ];
        let declared: Vec<String> = heads.iter().flat_map(|h| top_level_declarations(h)).collect();

        check_names(effect, &declared)?;

        let mut renames: HashMap<String, String> = HashMap::new();
        for name in &declared {
            renames.insert(name.clone(), format!("{prefix}{name}"));
        }
        for (name, value) in effect.defines() {
            renames.insert(name.clone(), format!("{prefix}{name}"));
            defines.insert(format!("{prefix}{name}"), value.clone());
        }
        for (name, value) in effect.uniforms() {
            let field = format!("{prefix}{name}");
            match value.texture_source() {
                Some(_) => {
                    renames.insert(name.clone(), field.clone());
                    let binding = TextureBinding::Uniform {
                        effect: index,
                        name: name.clone(),
                    };
                    effect_textures.push((TextureSlot::color(field), binding));
                }
                None => {
                    renames.insert(name.clone(), format!("params.{field}"));
                    layout.push(field.clone(), value.uniform_type());
                    uniforms.push(UniformBinding {
                        effect: index,
                        uniform: Some(name.clone()),
                        field,
                    });
                }
            }
        }

        attributes |= effect.attributes();
        required_inputs.extend(effect.required_inputs());
        extensions.extend(effect.extensions().iter().copied());

        let banner = format!("// {}: {}", prefix.trim_end_matches('_'), effect.name());
        if !heads[0].trim().is_empty() {
            vertex_heads.push(format!("{banner}\n{}", rename_identifiers(heads[0], &renames)));
        }
        if !heads[1].trim().is_empty() {
            fragment_heads.push(format!("{banner}\n{}", rename_identifiers(heads[1], &renames)));
        }

        let support = effect
            .section(ShaderSection::VertexMainSupport)
            .map(str::to_string)
            .or_else(|| declares(&declared, "main_support").then(|| "main_support(uv);".to_string()));
        if let Some(text) = support {
            vertex_support.push(block(&banner, &rename_identifiers(&text, &renames), None));
        }

        let main_uv = effect
            .section(ShaderSection::FragmentMainUv)
            .map(str::to_string)
            .or_else(|| declares(&declared, "main_uv").then(|| "uv = main_uv(uv);".to_string()));
        if let Some(text) = main_uv {
            main_uvs.push(block(&banner, &rename_identifiers(&text, &renames), None));
        }

        let function = effect.blend_mode().function();
        if function.skips_effect() {
            continue;
        }

        let main_image = effect
            .section(ShaderSection::FragmentMainImage)
            .map(str::to_string)
            .or_else(|| {
                declares(&declared, "main_image").then(|| {
                    if effect.attributes().contains(EffectAttribute::DEPTH) {
                        "output_color = main_image(input_color, uv, read_depth(uv));".to_string()
                    } else {
                        "output_color = main_image(input_color, uv);".to_string()
                    }
                })
            });

        let Some(text) = main_image else {
            continue;
        };

        if let Some(wanted) = effect.input_color_space() {
            if wanted != color_space {
                main_images.push(convert_color(color_space, wanted));
                color_space = wanted;
                converts_color = true;
            }
        }

        let opacity_field = format!("blend{index}_opacity");
        layout.push(opacity_field.clone(), UniformType::Float);
        uniforms.push(UniformBinding {
            effect: index,
            uniform: None,
            field: opacity_field.clone(),
        });
        blend_functions.insert(function);

        let blend = format!(
            "color = {}(input_color, output_color, params.{opacity_field});",
            function.function_name()
        );
        main_images.push(block(&banner, &rename_identifiers(&text, &renames), Some(&blend)));

        if let Some(space) = effect.output_color_space() {
            color_space = space;
        }
    }

    let mut textures = Vec::new();
    let mut bindings = Vec::new();
    if attributes.contains(EffectAttribute::DEPTH) {
        textures.push(TextureSlot::depth("depth_buffer"));
        bindings.push(TextureBinding::Buffer(BufferKind::Depth));
        defines.insert("READ_DEPTH".to_string(), String::new());
    }
    if attributes.contains(EffectAttribute::NORMALS) {
        textures.push(TextureSlot::color("normal_buffer"));
        bindings.push(TextureBinding::Buffer(BufferKind::Normal));
        defines.insert("READ_NORMALS".to_string(), String::new());
    }
    for (slot, binding) in effect_textures {
        textures.push(slot);
        bindings.push(binding);
    }
    if camera.is_some_and(Camera::is_perspective) {
        defines.insert("PERSPECTIVE_CAMERA".to_string(), String::new());
    }

    let mut support = String::new();
    if blend_functions.iter().any(|f: &BlendFunction| f.requires_hsl()) {
        support.push_str(BlendFunction::hsl_support());
        support.push('\n');
    }
    for function in &blend_functions {
        support.push_str(&function.shader_code());
        support.push('\n');
    }
    if converts_color {
        support.push_str(COLOR_SPACE_SUPPORT);
    }

    let mut sections = SectionMap::new();
    for (section, parts, separator) in [
        (ShaderSection::VertexHead, vertex_heads, "\n\n"),
        (ShaderSection::VertexMainSupport, vertex_support, "\n"),
        (ShaderSection::FragmentHead, fragment_heads, "\n\n"),
        (ShaderSection::FragmentMainUv, main_uvs, "\n"),
        (ShaderSection::FragmentMainImage, main_images, "\n"),
    ] {
        if !parts.is_empty() {
            sections.insert(section, parts.join(separator));
        }
    }

    let program = ShaderProgram::new(label)
        .with_uniforms(layout)
        .with_textures(textures)
        .with_defines(defines)
        .with_extensions(extensions)
        .assemble(&ShaderTemplate::effect(), &sections, &support);

    Ok(MergedEffects {
        program,
        attributes,
        required_inputs,
        uniforms,
        textures: bindings,
        output_color_space: color_space,
    })
}

fn check_names(effect: &EffectDescriptor, declared: &[String]) -> Result<(), ConfigError> {
    let reserved = |name: &str| {
        if RESERVED_IDENTIFIERS.contains(&name) {
            Err(ConfigError::ReservedIdentifier {
                effect: effect.name().to_string(),
                name: name.to_string(),
            })
        } else {
            Ok(())
        }
    };
    let collision = |name: &str| ConfigError::NameCollision {
        effect: effect.name().to_string(),
        name: name.to_string(),
    };

    for name in declared {
        reserved(name)?;
    }
    for name in effect.uniforms().keys() {
        reserved(name)?;
        if declared.iter().any(|d| d == name) {
            return Err(collision(name));
        }
    }
    for name in effect.defines().keys() {
        reserved(name)?;
        if declared.iter().any(|d| d == name) || effect.uniforms().contains_key(name) {
            return Err(collision(name));
        }
    }
    Ok(())
}

fn declares(declared: &[String], name: &str) -> bool {
    declared.iter().any(|d| d == name)
}

/// Wraps statements in their own scope so locals cannot leak between effects.
fn block(banner: &str, body: &str, tail: Option<&str>) -> String {
    let mut out = format!("    {banner}\n    {{\n");
    if tail.is_some() {
        out.push_str("        let input_color = color;\n");
        out.push_str("        var output_color = input_color;\n");
    }
    for line in body.lines() {
        if line.trim().is_empty() {
            out.push('\n');
        } else {
            out.push_str("        ");
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }
    if let Some(tail) = tail {
        out.push_str("        ");
        out.push_str(tail);
        out.push('\n');
    }
    out.push_str("    }");
    out
}

fn convert_color(from: ColorSpace, to: ColorSpace) -> String {
    let function = match (from, to) {
        (ColorSpace::Linear, ColorSpace::Srgb) => "linear_to_srgb",
        _ => "srgb_to_linear",
    };
    format!("    color = vec4f({function}(color.rgb), color.a);")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::validate_wgsl;

    const VIGNETTE: &str = r#"
fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {
    let d = distance(uv, vec2f(0.5));
    return vec4f(input_color.rgb * (1.0 - d * strength), input_color.a);
}
"#;

    const TINT: &str = r#"
const WEIGHT: f32 = 0.5;

fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {
    return vec4f(mix(input_color.rgb, input_color.rgb * tint, WEIGHT * strength), input_color.a);
}
"#;

    fn vignette() -> EffectDescriptor {
        EffectDescriptor::new("Vignette")
            .with_fragment_shader(VIGNETTE)
            .with_uniform("strength", 0.8f32)
    }

    fn tint() -> EffectDescriptor {
        EffectDescriptor::new("Tint")
            .with_fragment_shader(TINT)
            .with_uniform("strength", 1.0f32)
            .with_uniform("tint", [1.0f32, 0.5, 0.25])
            .with_blend_function(BlendFunction::Multiply)
    }

    #[test]
    fn same_uniform_name_is_namespaced_per_effect() {
        let (a, b) = (vignette(), tint());
        let merged = merge_effects("test", &[&a, &b], None).unwrap();
        let fields: Vec<_> = merged
            .program
            .uniforms
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .collect();

        assert_eq!(
            fields,
            vec!["e0_strength", "blend0_opacity", "e1_strength", "e1_tint", "blend1_opacity"]
        );
        let source = merged.program.source().unwrap();
        assert!(source.contains("params.e0_strength"));
        assert!(source.contains("WEIGHT * params.e1_strength"));
        assert!(source.contains("const e1_WEIGHT"));
        validate_wgsl(&source).unwrap();
    }

    #[test]
    fn locals_parameters_and_members_may_shadow_uniforms() {
        let effect = EffectDescriptor::new("Shadow")
            .with_uniform("strength", 0.5f32)
            .with_fragment_shader(
                r#"
struct Weights {
    strength: f32,
}

fn boost(strength: f32) -> f32 {
    return strength * 2.0;
}

fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {
    let w = Weights(boost(strength));
    var scaled = w.strength;
    {
        let strength = scaled * 0.5;
        scaled = strength;
    }
    return input_color * (scaled + strength);
}
"#,
            );
        let merged = merge_effects("shadow", &[&effect], None).unwrap();
        let source = merged.program.source().unwrap();

        assert!(source.contains("struct e0_Weights {\n    strength: f32,"));
        assert!(source.contains("fn e0_boost(strength: f32) -> f32 {\n    return strength * 2.0;"));
        assert!(source.contains("let w = e0_Weights(e0_boost(params.e0_strength));"));
        assert!(source.contains("let strength = scaled * 0.5;\n        scaled = strength;"));
        assert!(source.contains("return input_color * (scaled + params.e0_strength);"));
        validate_wgsl(&source).unwrap();
    }

    #[test]
    fn main_images_appear_in_list_order() {
        let (a, b) = (vignette(), tint());
        let merged = merge_effects("test", &[&a, &b], None).unwrap();
        let source = merged.program.source().unwrap();

        let first = source.find("output_color = e0_main_image(input_color, uv);").unwrap();
        let second = source.find("output_color = e1_main_image(input_color, uv);").unwrap();
        assert!(first < second);
        assert!(source.contains("color = blend_normal(input_color, output_color, params.blend0_opacity);"));
        assert!(source.contains("color = blend_multiply(input_color, output_color, params.blend1_opacity);"));
    }

    #[test]
    fn merging_is_deterministic() {
        let (a, b) = (vignette(), tint());
        let first = merge_effects("test", &[&a, &b], None).unwrap();
        let second = merge_effects("test", &[&a.clone(), &b.clone()], None).unwrap();
        assert_eq!(first.program.raw_source(), second.program.raw_source());
    }

    #[test]
    fn two_convolutions_conflict() {
        let a = EffectDescriptor::new("Blur").with_attributes(EffectAttribute::CONVOLUTION);
        let b = EffectDescriptor::new("Sharpen").with_attributes(EffectAttribute::CONVOLUTION);
        let err = merge_effects("test", &[&a, &b], None).unwrap_err();
        assert!(matches!(err, ConfigError::AttributeConflict { .. }));
    }

    #[test]
    fn two_output_color_space_converters_conflict() {
        let a = EffectDescriptor::new("A").with_output_color_space(ColorSpace::Srgb);
        let b = EffectDescriptor::new("B").with_output_color_space(ColorSpace::Srgb);
        assert!(matches!(
            validate_effects(&[&a, &b]),
            Err(ConfigError::ColorSpaceConflict { .. })
        ));
    }

    #[test]
    fn reserved_and_colliding_names_are_rejected() {
        let reserved = EffectDescriptor::new("Bad").with_uniform("color", 1.0f32);
        assert!(matches!(
            merge_effects("test", &[&reserved], None),
            Err(ConfigError::ReservedIdentifier { .. })
        ));

        let collision = EffectDescriptor::new("Bad")
            .with_fragment_shader("fn strength() -> f32 { return 1.0; }")
            .with_uniform("strength", 1.0f32);
        assert!(matches!(
            merge_effects("test", &[&collision], None),
            Err(ConfigError::NameCollision { .. })
        ));
    }

    #[test]
    fn depth_effects_get_depth_slot_and_defines() {
        let fog = EffectDescriptor::new("Fog")
            .with_attributes(EffectAttribute::DEPTH)
            .with_fragment_shader(
                "fn main_image(input_color: vec4f, uv: vec2f, depth: f32) -> vec4f {\n    let z = -depth_to_view_z(depth);\n    return mix(input_color, vec4f(0.5), saturate(z / 100.0));\n}\n",
            );
        let merged = merge_effects("fog", &[&fog], Some(&Camera::default())).unwrap();

        assert_eq!(merged.program.textures[0], TextureSlot::depth("depth_buffer"));
        assert_eq!(merged.textures[0], TextureBinding::Buffer(BufferKind::Depth));
        assert!(merged.required_inputs.contains(&BufferKind::Depth));
        assert!(merged.program.defines.contains_key("READ_DEPTH"));
        assert!(merged.program.defines.contains_key("PERSPECTIVE_CAMERA"));

        let source = merged.program.source().unwrap();
        assert!(source.contains("e0_main_image(input_color, uv, read_depth(uv))"));
        validate_wgsl(&source).unwrap();
    }

    #[test]
    fn dst_effects_keep_declarations_but_skip_main_image() {
        let hidden = vignette().with_blend_function(BlendFunction::Dst);
        let merged = merge_effects("test", &[&hidden], None).unwrap();
        let source = merged.program.source().unwrap();

        assert!(source.contains("fn e0_main_image"));
        assert!(!source.contains("output_color = e0_main_image"));
        assert!(merged.program.uniforms.field("blend0_opacity").is_none());
        validate_wgsl(&source).unwrap();
    }

    #[test]
    fn effect_defines_are_namespaced() {
        let effect = EffectDescriptor::new("Grain")
            .with_define("SAMPLES", "4")
            .with_define("ANIMATED", "")
            .with_fragment_shader(
                "fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {\n#ifdef ANIMATED\n    let n = f32(SAMPLES) * frame.time;\n#else\n    let n = f32(SAMPLES);\n#endif\n    return input_color * fract(n);\n}\n",
            );
        let merged = merge_effects("grain", &[&effect], None).unwrap();
        assert_eq!(merged.program.defines.get("e0_SAMPLES").map(String::as_str), Some("4"));

        let source = merged.program.source().unwrap();
        assert!(source.contains("let n = f32(4) * frame.time;"));
        validate_wgsl(&source).unwrap();
    }

    #[test]
    fn color_space_conversion_is_inserted_once() {
        let grade = EffectDescriptor::new("Grade")
            .with_input_color_space(ColorSpace::Srgb)
            .with_fragment_shader(
                "fn main_image(input_color: vec4f, uv: vec2f) -> vec4f { return input_color; }",
            );
        let merged = merge_effects("grade", &[&grade], None).unwrap();
        let source = merged.program.source().unwrap();
        assert_eq!(source.matches("color = vec4f(linear_to_srgb(color.rgb), color.a);").count(), 1);
        assert_eq!(merged.output_color_space, ColorSpace::Srgb);
        validate_wgsl(&source).unwrap();
    }

    #[test]
    fn hsl_blend_pulls_in_helpers() {
        let effect = vignette().with_blend_function(BlendFunction::Hue);
        let merged = merge_effects("hue", &[&effect], None).unwrap();
        let source = merged.program.source().unwrap();
        assert_eq!(source.matches("fn blend_rgb_to_hsl").count(), 1);
        validate_wgsl(&source).unwrap();
    }

    #[test]
    fn empty_list_is_a_passthrough() {
        let merged = merge_effects("empty", &[], None).unwrap();
        assert!(merged.program.uniforms.is_empty());
        validate_wgsl(&merged.program.source().unwrap()).unwrap();
    }
}
