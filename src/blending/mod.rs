//! Blend operators used to composite each effect onto the running color.
//!
//! A [`BlendMode`] pairs a [`BlendFunction`] with an opacity. The function decides which
//! WGSL helper the merged shader calls; the opacity is a per-frame uniform.
//!
//! Every helper has the signature
//!
//! ```text
//! fn blend_<name>(x: vec4f, y: vec4f, opacity: f32) -> vec4f
//! ```
//!
//! where `x` is the running color and `y` is the effect output.

mod functions;

use std::fmt;

/// A named compositing operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlendFunction {
    Add,
    Alpha,
    Average,
    Color,
    ColorBurn,
    ColorDodge,
    Darken,
    Difference,
    Divide,
    /// Keeps the running color. The effect's main image is not evaluated.
    Dst,
    Exclusion,
    HardLight,
    HardMix,
    Hue,
    Invert,
    InvertRgb,
    Lighten,
    LinearBurn,
    LinearDodge,
    LinearLight,
    Luminosity,
    Multiply,
    Negation,
    #[default]
    Normal,
    Overlay,
    PinLight,
    Reflect,
    Saturation,
    Screen,
    SoftLight,
    /// Replaces the running color with the effect output, ignoring opacity.
    Src,
    Subtract,
    VividLight,
}

impl BlendFunction {
    pub const ALL: [BlendFunction; 33] = [
        BlendFunction::Add,
        BlendFunction::Alpha,
        BlendFunction::Average,
        BlendFunction::Color,
        BlendFunction::ColorBurn,
        BlendFunction::ColorDodge,
        BlendFunction::Darken,
        BlendFunction::Difference,
        BlendFunction::Divide,
        BlendFunction::Dst,
        BlendFunction::Exclusion,
        BlendFunction::HardLight,
        BlendFunction::HardMix,
        BlendFunction::Hue,
        BlendFunction::Invert,
        BlendFunction::InvertRgb,
        BlendFunction::Lighten,
        BlendFunction::LinearBurn,
        BlendFunction::LinearDodge,
        BlendFunction::LinearLight,
        BlendFunction::Luminosity,
        BlendFunction::Multiply,
        BlendFunction::Negation,
        BlendFunction::Normal,
        BlendFunction::Overlay,
        BlendFunction::PinLight,
        BlendFunction::Reflect,
        BlendFunction::Saturation,
        BlendFunction::Screen,
        BlendFunction::SoftLight,
        BlendFunction::Src,
        BlendFunction::Subtract,
        BlendFunction::VividLight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BlendFunction::Add => "add",
            BlendFunction::Alpha => "alpha",
            BlendFunction::Average => "average",
            BlendFunction::Color => "color",
            BlendFunction::ColorBurn => "color_burn",
            BlendFunction::ColorDodge => "color_dodge",
            BlendFunction::Darken => "darken",
            BlendFunction::Difference => "difference",
            BlendFunction::Divide => "divide",
            BlendFunction::Dst => "dst",
            BlendFunction::Exclusion => "exclusion",
            BlendFunction::HardLight => "hard_light",
            BlendFunction::HardMix => "hard_mix",
            BlendFunction::Hue => "hue",
            BlendFunction::Invert => "invert",
            BlendFunction::InvertRgb => "invert_rgb",
            BlendFunction::Lighten => "lighten",
            BlendFunction::LinearBurn => "linear_burn",
            BlendFunction::LinearDodge => "linear_dodge",
            BlendFunction::LinearLight => "linear_light",
            BlendFunction::Luminosity => "luminosity",
            BlendFunction::Multiply => "multiply",
            BlendFunction::Negation => "negation",
            BlendFunction::Normal => "normal",
            BlendFunction::Overlay => "overlay",
            BlendFunction::PinLight => "pin_light",
            BlendFunction::Reflect => "reflect",
            BlendFunction::Saturation => "saturation",
            BlendFunction::Screen => "screen",
            BlendFunction::SoftLight => "soft_light",
            BlendFunction::Src => "src",
            BlendFunction::Subtract => "subtract",
            BlendFunction::VividLight => "vivid_light",
        }
    }

    /// Name of the WGSL helper, e.g. `blend_soft_light`.
    pub fn function_name(self) -> String {
        format!("blend_{}", self.name())
    }

    /// Whether the helper depends on the shared HSL conversion functions.
    pub fn requires_hsl(self) -> bool {
        matches!(
            self,
            BlendFunction::Color
                | BlendFunction::Hue
                | BlendFunction::Luminosity
                | BlendFunction::Saturation
        )
    }

    /// Whether the effect using this function can be left out of the main image stage.
    pub fn skips_effect(self) -> bool {
        self == BlendFunction::Dst
    }

    /// The WGSL helper implementing this function. A pure function of `self`.
    pub fn shader_code(self) -> String {
        let name = self.function_name();
        let body = match functions::rgb_body(self) {
            Some(rgb) => format!(
                "    let a = x.rgb;\n    let b = y.rgb;\n    {rgb}\n    return mix(x, vec4f(z, y.a), opacity);"
            ),
            None => format!("    {}", functions::rgba_body(self)),
        };
        format!("fn {name}(x: vec4f, y: vec4f, opacity: f32) -> vec4f {{\n{body}\n}}\n")
    }

    /// HSL helpers shared by [`Color`](Self::Color), [`Hue`](Self::Hue),
    /// [`Luminosity`](Self::Luminosity) and [`Saturation`](Self::Saturation).
    pub fn hsl_support() -> &'static str {
        functions::HSL_SUPPORT
    }
}

impl fmt::Display for BlendFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Blend function plus opacity.
///
/// Changing the function changes the merged shader, so it bumps the revision that the
/// owning effect pass compares against. Opacity is a uniform and does not.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendMode {
    function: BlendFunction,
    opacity: f32,
    revision: u64,
}

impl Default for BlendMode {
    fn default() -> Self {
        Self::new(BlendFunction::Normal)
    }
}

impl BlendMode {
    pub fn new(function: BlendFunction) -> Self {
        Self {
            function,
            opacity: 1.0,
            revision: 0,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn function(&self) -> BlendFunction {
        self.function
    }

    pub fn set_function(&mut self, function: BlendFunction) {
        if self.function != function {
            self.function = function;
            self.revision += 1;
        }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn shader_code(&self) -> String {
        self.function.shader_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::validate_wgsl;

    #[test]
    fn every_function_has_a_unique_name() {
        let mut names: Vec<_> = BlendFunction::ALL.iter().map(|f| f.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), BlendFunction::ALL.len());
    }

    #[test]
    fn every_function_compiles() {
        for function in BlendFunction::ALL {
            let mut src = String::new();
            if function.requires_hsl() {
                src.push_str(BlendFunction::hsl_support());
            }
            src.push_str(&function.shader_code());
            if let Err(msg) = validate_wgsl(&src) {
                panic!("{function} does not compile:\n{msg}\n{src}");
            }
        }
    }

    #[test]
    fn normal_mixes_by_opacity() {
        let code = BlendFunction::Normal.shader_code();
        assert!(code.starts_with("fn blend_normal(x: vec4f, y: vec4f, opacity: f32) -> vec4f"));
        assert!(code.contains("mix(x, y, opacity)"));
    }

    #[test]
    fn function_change_bumps_revision_but_opacity_does_not() {
        let mut mode = BlendMode::new(BlendFunction::Screen);
        mode.set_opacity(0.25);
        assert_eq!(mode.revision(), 0);

        mode.set_function(BlendFunction::Screen);
        assert_eq!(mode.revision(), 0);

        mode.set_function(BlendFunction::Multiply);
        assert_eq!(mode.revision(), 1);
        assert_eq!(mode.function(), BlendFunction::Multiply);
    }
}
