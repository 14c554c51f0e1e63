//! WGSL bodies for the color operators.
//!
//! Every operator works on `a` (the running color) and `b` (the effect output) and
//! binds its result to `z`. The caller wraps the body into a function that mixes `z`
//! back into the running color by opacity.

use super::BlendFunction;

pub(super) const HSL_SUPPORT: &str = r#"fn blend_rgb_to_hsl(c: vec3f) -> vec3f {
    let max_c = max(max(c.r, c.g), c.b);
    let min_c = min(min(c.r, c.g), c.b);
    let l = (max_c + min_c) * 0.5;
    let d = max_c - min_c;
    if (d <= 0.0) {
        return vec3f(0.0, 0.0, l);
    }
    let s = select(d / (2.0 - max_c - min_c), d / (max_c + min_c), l < 0.5);
    var h: f32;
    if (max_c == c.r) {
        h = (c.g - c.b) / d + select(0.0, 6.0, c.g < c.b);
    } else if (max_c == c.g) {
        h = (c.b - c.r) / d + 2.0;
    } else {
        h = (c.r - c.g) / d + 4.0;
    }
    return vec3f(h / 6.0, s, l);
}

fn blend_hue_to_rgb(p: f32, q: f32, h: f32) -> f32 {
    let t = fract(h);
    if (t < 1.0 / 6.0) {
        return p + (q - p) * 6.0 * t;
    }
    if (t < 0.5) {
        return q;
    }
    if (t < 2.0 / 3.0) {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    return p;
}

fn blend_hsl_to_rgb(c: vec3f) -> vec3f {
    if (c.y <= 0.0) {
        return vec3f(c.z);
    }
    let q = select(c.z + c.y - c.z * c.y, c.z * (1.0 + c.y), c.z < 0.5);
    let p = 2.0 * c.z - q;
    return vec3f(
        blend_hue_to_rgb(p, q, c.x + 1.0 / 3.0),
        blend_hue_to_rgb(p, q, c.x),
        blend_hue_to_rgb(p, q, c.x - 1.0 / 3.0),
    );
}
"#;

/// Statements computing `z` from `a` and `b`, or `None` for the operators that work on
/// the full `vec4f`.
pub(super) fn rgb_body(function: BlendFunction) -> Option<&'static str> {
    use BlendFunction::*;

    let body = match function {
        Normal | Alpha | Src | Dst => return None,
        Add => "let z = a + b;",
        Average => "let z = (a + b) * 0.5;",
        Color => {
            "let ha = blend_rgb_to_hsl(a);
    let hb = blend_rgb_to_hsl(b);
    let z = blend_hsl_to_rgb(vec3f(hb.xy, ha.z));"
        }
        ColorBurn => {
            "let z = select(max(vec3f(1.0) - (vec3f(1.0) - a) / max(b, vec3f(1e-6)), vec3f(0.0)), b, b == vec3f(0.0));"
        }
        ColorDodge => {
            "let z = select(min(a / max(vec3f(1.0) - b, vec3f(1e-6)), vec3f(1.0)), b, b == vec3f(1.0));"
        }
        Darken => "let z = min(a, b);",
        Difference => "let z = abs(a - b);",
        Divide => {
            "let z = select(min(a / max(b, vec3f(1e-6)), vec3f(1.0)), vec3f(1.0), b <= vec3f(0.0));"
        }
        Exclusion => "let z = a + b - 2.0 * a * b;",
        HardLight => {
            "let z = select(vec3f(1.0) - 2.0 * (vec3f(1.0) - a) * (vec3f(1.0) - b), 2.0 * a * b, b < vec3f(0.5));"
        }
        HardMix => "let z = step(vec3f(1.0), a + b);",
        Hue => {
            "let ha = blend_rgb_to_hsl(a);
    let hb = blend_rgb_to_hsl(b);
    let z = blend_hsl_to_rgb(vec3f(hb.x, ha.yz));"
        }
        Invert => "let z = vec3f(1.0) - b;",
        InvertRgb => "let z = b * (vec3f(1.0) - a);",
        Lighten => "let z = max(a, b);",
        LinearBurn => "let z = clamp(a + b - vec3f(1.0), vec3f(0.0), vec3f(1.0));",
        LinearDodge => "let z = min(a + b, vec3f(1.0));",
        LinearLight => "let z = clamp(2.0 * b + a - vec3f(1.0), vec3f(0.0), vec3f(1.0));",
        Luminosity => {
            "let ha = blend_rgb_to_hsl(a);
    let hb = blend_rgb_to_hsl(b);
    let z = blend_hsl_to_rgb(vec3f(ha.xy, hb.z));"
        }
        Multiply => "let z = a * b;",
        Negation => "let z = vec3f(1.0) - abs(vec3f(1.0) - a - b);",
        Overlay => {
            "let z = select(vec3f(1.0) - 2.0 * (vec3f(1.0) - a) * (vec3f(1.0) - b), 2.0 * a * b, a < vec3f(0.5));"
        }
        PinLight => {
            "let z = select(max(a, 2.0 * b - vec3f(1.0)), min(a, 2.0 * b), b < vec3f(0.5));"
        }
        Reflect => {
            "let z = select(min(a * a / max(vec3f(1.0) - b, vec3f(1e-6)), vec3f(1.0)), b, b == vec3f(1.0));"
        }
        Saturation => {
            "let ha = blend_rgb_to_hsl(a);
    let hb = blend_rgb_to_hsl(b);
    let z = blend_hsl_to_rgb(vec3f(ha.x, hb.y, ha.z));"
        }
        Screen => "let z = a + b - a * b;",
        SoftLight => "let z = (vec3f(1.0) - 2.0 * b) * a * a + 2.0 * b * a;",
        Subtract => "let z = max(a - b, vec3f(0.0));",
        VividLight => {
            "let burn = max(vec3f(1.0) - (vec3f(1.0) - a) / max(2.0 * b, vec3f(1e-6)), vec3f(0.0));
    let dodge = min(a / max(2.0 * (vec3f(1.0) - b), vec3f(1e-6)), vec3f(1.0));
    let z = select(dodge, burn, b < vec3f(0.5));"
        }
    };

    Some(body)
}

/// Body for the operators that do not go through `rgb_body`.
pub(super) fn rgba_body(function: BlendFunction) -> &'static str {
    match function {
        BlendFunction::Alpha => "return mix(x, y, min(y.a, opacity));",
        BlendFunction::Src => "return y;",
        BlendFunction::Dst => "return x;",
        _ => "return mix(x, y, opacity);",
    }
}
