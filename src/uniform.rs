//! Uniform values and their WGSL uniform-buffer layout.

use crate::buffer::BufferKind;
use crate::renderer::TargetId;

/// What a texture uniform samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// Bound to a 1×1 fallback.
    #[default]
    None,
    /// A shared buffer produced by an earlier pass.
    Buffer(BufferKind),
    /// A target the effect owns.
    Target(TargetId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Int,
    UInt,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Texture,
}

impl UniformType {
    pub fn wgsl_name(self) -> &'static str {
        match self {
            UniformType::Float => "f32",
            UniformType::Int => "i32",
            UniformType::UInt => "u32",
            UniformType::Vec2 => "vec2f",
            UniformType::Vec3 => "vec3f",
            UniformType::Vec4 => "vec4f",
            UniformType::Mat3 => "mat3x3f",
            UniformType::Mat4 => "mat4x4f",
            UniformType::Texture => "texture_2d<f32>",
        }
    }

    /// `(align, size)` in bytes, per the WGSL host-shareable layout rules.
    pub fn layout(self) -> (usize, usize) {
        match self {
            UniformType::Float | UniformType::Int | UniformType::UInt => (4, 4),
            UniformType::Vec2 => (8, 8),
            UniformType::Vec3 => (16, 12),
            UniformType::Vec4 => (16, 16),
            UniformType::Mat3 => (16, 48),
            UniformType::Mat4 => (16, 64),
            UniformType::Texture => (0, 0),
        }
    }

    pub fn is_texture(self) -> bool {
        self == UniformType::Texture
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major.
    Mat3([f32; 9]),
    /// Column-major.
    Mat4([f32; 16]),
    Texture(TextureSource),
}

impl UniformValue {
    pub fn uniform_type(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::UInt(_) => UniformType::UInt,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat3(_) => UniformType::Mat3,
            UniformValue::Mat4(_) => UniformType::Mat4,
            UniformValue::Texture(_) => UniformType::Texture,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn texture_source(&self) -> Option<TextureSource> {
        match self {
            UniformValue::Texture(source) => Some(*source),
            _ => None,
        }
    }

    /// Writes the value into `out`, which starts at the field offset.
    fn write(&self, out: &mut [u8]) {
        match self {
            UniformValue::Float(v) => put(out, 0, bytemuck::bytes_of(v)),
            UniformValue::Int(v) => put(out, 0, bytemuck::bytes_of(v)),
            UniformValue::UInt(v) => put(out, 0, bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => put(out, 0, bytemuck::cast_slice(v)),
            UniformValue::Vec3(v) => put(out, 0, bytemuck::cast_slice(v)),
            UniformValue::Vec4(v) => put(out, 0, bytemuck::cast_slice(v)),
            UniformValue::Mat3(m) => {
                // Each column is padded to 16 bytes.
                for (col, chunk) in m.chunks_exact(3).enumerate() {
                    put(out, col * 16, bytemuck::cast_slice(chunk));
                }
            }
            UniformValue::Mat4(m) => put(out, 0, bytemuck::cast_slice(m)),
            UniformValue::Texture(_) => {}
        }
    }
}

fn put(out: &mut [u8], offset: usize, bytes: &[u8]) {
    if let Some(dst) = out.get_mut(offset..offset + bytes.len()) {
        dst.copy_from_slice(bytes);
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<u32> for UniformValue {
    fn from(v: u32) -> Self {
        UniformValue::UInt(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<glam::Vec2> for UniformValue {
    fn from(v: glam::Vec2) -> Self {
        UniformValue::Vec2(v.to_array())
    }
}

impl From<glam::Vec3> for UniformValue {
    fn from(v: glam::Vec3) -> Self {
        UniformValue::Vec3(v.to_array())
    }
}

impl From<glam::Vec4> for UniformValue {
    fn from(v: glam::Vec4) -> Self {
        UniformValue::Vec4(v.to_array())
    }
}

impl From<glam::Mat3> for UniformValue {
    fn from(m: glam::Mat3) -> Self {
        UniformValue::Mat3(m.to_cols_array())
    }
}

impl From<glam::Mat4> for UniformValue {
    fn from(m: glam::Mat4) -> Self {
        UniformValue::Mat4(m.to_cols_array())
    }
}

impl From<TextureSource> for UniformValue {
    fn from(source: TextureSource) -> Self {
        UniformValue::Texture(source)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformField {
    pub name: String,
    pub ty: UniformType,
    pub offset: usize,
}

/// Fields of one WGSL uniform struct, laid out in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniformLayout {
    fields: Vec<UniformField>,
    end: usize,
    align: usize,
}

impl UniformLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field and returns its byte offset. Texture types take no space and are
    /// ignored.
    pub fn push(&mut self, name: impl Into<String>, ty: UniformType) -> Option<usize> {
        if ty.is_texture() {
            return None;
        }
        let (align, size) = ty.layout();
        let offset = self.end.next_multiple_of(align);
        self.fields.push(UniformField {
            name: name.into(),
            ty,
            offset,
        });
        self.end = offset + size;
        self.align = self.align.max(align);
        Some(offset)
    }

    pub fn with(mut self, name: impl Into<String>, ty: UniformType) -> Self {
        self.push(name, ty);
        self
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Struct size, rounded up to 16 bytes so it can back a uniform binding.
    pub fn size(&self) -> usize {
        if self.fields.is_empty() {
            return 0;
        }
        self.end.next_multiple_of(self.align.max(16))
    }

    /// A zeroed buffer of [`size`](Self::size) bytes.
    pub fn zeroed(&self) -> Vec<u8> {
        vec![0; self.size()]
    }

    /// Writes `value` at the field's offset. Mismatched types are skipped.
    pub fn write(&self, buffer: &mut [u8], name: &str, value: &UniformValue) -> bool {
        match self.field(name) {
            Some(field) if field.ty == value.uniform_type() => {
                write_at(buffer, field.offset, value);
                true
            }
            _ => false,
        }
    }

    /// WGSL struct declaration for this layout.
    pub fn wgsl_struct(&self, struct_name: &str) -> String {
        let mut out = format!("struct {struct_name} {{\n");
        for field in &self.fields {
            out.push_str(&format!("    {}: {},\n", field.name, field.ty.wgsl_name()));
        }
        out.push_str("}\n");
        out
    }
}

/// Writes `value` into `buffer` at `offset`.
pub fn write_at(buffer: &mut [u8], offset: usize, value: &UniformValue) {
    if let Some(slot) = buffer.get_mut(offset..) {
        value.write(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_wgsl_alignment() {
        let mut layout = UniformLayout::new();
        assert_eq!(layout.push("a", UniformType::Float), Some(0));
        assert_eq!(layout.push("b", UniformType::Vec3), Some(16));
        assert_eq!(layout.push("c", UniformType::Float), Some(28));
        assert_eq!(layout.push("d", UniformType::Vec2), Some(32));
        assert_eq!(layout.push("e", UniformType::Mat3), Some(48));
        assert_eq!(layout.size(), 96);
    }

    #[test]
    fn textures_take_no_space() {
        let mut layout = UniformLayout::new();
        assert_eq!(layout.push("lut", UniformType::Texture), None);
        assert!(layout.is_empty());
        assert_eq!(layout.size(), 0);
    }

    #[test]
    fn size_is_padded_to_sixteen() {
        let layout = UniformLayout::new().with("x", UniformType::Float);
        assert_eq!(layout.size(), 16);
    }

    #[test]
    fn mat3_columns_are_padded() {
        let layout = UniformLayout::new().with("m", UniformType::Mat3);
        let mut buf = layout.zeroed();
        let m = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        assert!(layout.write(&mut buf, "m", &UniformValue::Mat3(m)));

        let floats: Vec<f32> = buf
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(floats[3], 0.0);
        assert_eq!(&floats[4..7], &[4.0, 5.0, 6.0]);
        assert_eq!(&floats[8..11], &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn write_rejects_type_mismatch() {
        let layout = UniformLayout::new().with("x", UniformType::Float);
        let mut buf = layout.zeroed();
        assert!(!layout.write(&mut buf, "x", &UniformValue::Int(3)));
        assert!(!layout.write(&mut buf, "missing", &UniformValue::Float(1.0)));
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn struct_declaration_lists_fields() {
        let layout = UniformLayout::new()
            .with("e0_intensity", UniformType::Float)
            .with("e0_tint", UniformType::Vec3);
        assert_eq!(
            layout.wgsl_struct("Params"),
            "struct Params {\n    e0_intensity: f32,\n    e0_tint: vec3f,\n}\n"
        );
    }
}
