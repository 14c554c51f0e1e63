//! The built-in full-screen templates.
//!
//! `{{VERTEX_HEAD}}`, `{{VERTEX_MAIN_SUPPORT}}`, `{{FRAGMENT_HEAD}}`,
//! `{{FRAGMENT_MAIN_UV}}` and `{{FRAGMENT_MAIN_IMAGE}}` are filled with effect code.
//! `{{ENABLES}}`, `{{DECLARATIONS}}` and `{{FRAGMENT_SUPPORT}}` are filled by the engine.

pub(crate) const ENABLES: &str = "{{ENABLES}}";
pub(crate) const DECLARATIONS: &str = "{{DECLARATIONS}}";
pub(crate) const FRAGMENT_SUPPORT: &str = "{{FRAGMENT_SUPPORT}}";

pub const EFFECT_VERTEX: &str = r#"{{ENABLES}}
struct FrameUniforms {
    resolution: vec4f,
    camera_params: vec4f,
    time: f32,
    pad0: f32,
    pad1: f32,
    pad2: f32,
}

@group(0) @binding(0) var<uniform> frame: FrameUniforms;
@group(0) @binding(2) var input_buffer: texture_2d<f32>;
@group(0) @binding(3) var input_sampler: sampler;
{{DECLARATIONS}}
struct VertexOutput {
    @builtin(position) position: vec4f,
    @location(0) uv: vec2f,
}

{{VERTEX_HEAD}}

@vertex
fn vs(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    // Full-screen triangle: (-1, -1), (3, -1), (-1, 3)
    let x = f32(i32(vertex_index & 1u) * 4 - 1);
    let y = f32(i32(vertex_index >> 1u) * 4 - 1);

    var out: VertexOutput;
    out.position = vec4f(x, y, 0.0, 1.0);
    out.uv = vec2f(x * 0.5 + 0.5, 0.5 - y * 0.5);
    let uv = out.uv;
{{VERTEX_MAIN_SUPPORT}}
    return out;
}
"#;

pub const EFFECT_FRAGMENT: &str = r#"
#ifdef READ_DEPTH
fn read_depth(uv: vec2f) -> f32 {
    let dims = vec2i(textureDimensions(depth_buffer));
    let coord = clamp(vec2i(uv * vec2f(dims)), vec2i(0), dims - vec2i(1));
    return textureLoad(depth_buffer, coord, 0);
}

fn depth_to_view_z(depth: f32) -> f32 {
    let z_near = frame.camera_params.x;
    let z_far = frame.camera_params.y;
#ifdef PERSPECTIVE_CAMERA
    return (z_near * z_far) / ((z_far - z_near) * depth - z_far);
#else
    return depth * (z_near - z_far) - z_near;
#endif
}
#endif

#ifdef READ_NORMALS
fn read_normal(uv: vec2f) -> vec3f {
    return textureSampleLevel(normal_buffer, input_sampler, uv, 0.0).xyz * 2.0 - 1.0;
}
#endif

{{FRAGMENT_SUPPORT}}

{{FRAGMENT_HEAD}}

@fragment
fn fs(in: VertexOutput) -> @location(0) vec4f {
    var uv = in.uv;
{{FRAGMENT_MAIN_UV}}
    var color = textureSample(input_buffer, input_sampler, uv);
{{FRAGMENT_MAIN_IMAGE}}
    return color;
}
"#;
