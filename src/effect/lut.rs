use std::path::Path;

use super::{Effect, EffectDescriptor};
use crate::error::{Error, PassError, TaskError};
use crate::math::lerp;
use crate::pass::ResourceContext;
use crate::renderer::{Renderer, TargetDescriptor, TargetFormat, TargetId};
use crate::task::{BackgroundTask, TaskStatus};
use crate::uniform::TextureSource;

const LUT_FRAGMENT: &str = r#"
fn lut_lookup(c: vec3f) -> vec3f {
    let n = lut_size;
    let scaled = saturate(c) * (n - 1.0);
    let slice = floor(scaled.b);
    let t = scaled.b - slice;
    let xy = (scaled.rg + 0.5) / vec2f(n * n, n);
    let a = textureSampleLevel(lut, input_sampler, vec2f(xy.x + slice / n, xy.y), 0.0).rgb;
    let b = textureSampleLevel(lut, input_sampler, vec2f(xy.x + min(slice + 1.0, n - 1.0) / n, xy.y), 0.0).rgb;
    return mix(a, b, t);
}

fn main_image(input_color: vec4f, uv: vec2f) -> vec4f {
#ifdef LUT_READY
    return vec4f(lut_lookup(input_color.rgb), input_color.a);
#else
    return input_color;
#endif
}
"#;

/// A 3D color lookup table stored as a horizontal strip of `size` slices.
///
/// The strip is `size * size` texels wide and `size` high, RGBA8. Red runs along x
/// inside a slice, green along y, blue selects the slice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LutTable {
    size: u32,
    data: Vec<u8>,
}

impl LutTable {
    /// Maps every color to itself.
    pub fn identity(size: u32) -> Self {
        let size = size.max(2);
        let max = (size - 1) as f32;
        let mut data = Vec::with_capacity((size * size * size * 4) as usize);
        for g in 0..size {
            for b in 0..size {
                for r in 0..size {
                    for v in [r, g, b] {
                        data.push((v as f32 / max * 255.0).round() as u8);
                    }
                    data.push(255);
                }
            }
        }
        Self { size, data }
    }

    pub fn from_rgba(size: u32, data: Vec<u8>) -> Result<Self, Error> {
        let expected = (size as usize).pow(3) * 4;
        if size < 2 || data.len() != expected {
            return Err(Error::InvalidLut(format!(
                "size {size} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self { size, data })
    }

    /// Loads a strip image (`size * size` wide, `size` high).
    pub fn from_image(path: impl AsRef<Path>) -> Result<Self, Error> {
        let image = image::open(path.as_ref())?.to_rgba8();
        let (width, height) = image.dimensions();
        if width != height * height {
            return Err(Error::InvalidLut(format!(
                "{}: expected a {}x{height} strip, got {width}x{height}",
                path.as_ref().display(),
                height * height
            )));
        }
        Self::from_rgba(height, image.into_raw())
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn texel(&self, r: u32, g: u32, b: u32) -> [f32; 3] {
        let i = ((g * self.size * self.size + b * self.size + r) * 4) as usize;
        [
            self.data[i] as f32 / 255.0,
            self.data[i + 1] as f32 / 255.0,
            self.data[i + 2] as f32 / 255.0,
        ]
    }

    /// Trilinear lookup of a color in `[0, 1]`.
    pub fn sample(&self, color: [f32; 3]) -> [f32; 3] {
        let max = (self.size - 1) as f32;
        let mut lo = [0u32; 3];
        let mut hi = [0u32; 3];
        let mut t = [0f32; 3];
        for axis in 0..3 {
            let x = color[axis].clamp(0.0, 1.0) * max;
            lo[axis] = x.floor() as u32;
            hi[axis] = (lo[axis] + 1).min(self.size - 1);
            t[axis] = x - x.floor();
        }

        let corner = |r: bool, g: bool, b: bool| {
            self.texel(
                if r { hi[0] } else { lo[0] },
                if g { hi[1] } else { lo[1] },
                if b { hi[2] } else { lo[2] },
            )
        };
        let mix3 = |a: [f32; 3], b: [f32; 3], t: f32| {
            [lerp(a[0], b[0], t), lerp(a[1], b[1], t), lerp(a[2], b[2], t)]
        };

        let c00 = mix3(corner(false, false, false), corner(true, false, false), t[0]);
        let c10 = mix3(corner(false, true, false), corner(true, true, false), t[0]);
        let c01 = mix3(corner(false, false, true), corner(true, false, true), t[0]);
        let c11 = mix3(corner(false, true, true), corner(true, true, true), t[0]);
        mix3(mix3(c00, c10, t[1]), mix3(c01, c11, t[1]), t[2])
    }

    /// Resamples the table to `size` slices.
    pub fn expand(&self, size: u32) -> LutTable {
        let size = size.max(2);
        let max = (size - 1) as f32;
        let mut data = Vec::with_capacity((size * size * size * 4) as usize);
        for g in 0..size {
            for b in 0..size {
                for r in 0..size {
                    let c = self.sample([r as f32 / max, g as f32 / max, b as f32 / max]);
                    data.extend(c.map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8));
                    data.push(255);
                }
            }
        }
        LutTable { size, data }
    }
}

/// Color grading through a [`LutTable`].
///
/// Until the table has been uploaded the effect passes its input through unchanged.
/// The upload happens in [`Effect::prepare`] and sets the `LUT_READY` define, so the
/// owning pass recompiles once before the first graded draw.
pub struct LutEffect {
    descriptor: EffectDescriptor,
    table: Option<LutTable>,
    pending: Option<BackgroundTask<LutTable>>,
    target: Option<TargetId>,
}

impl LutEffect {
    pub fn new(table: LutTable) -> Self {
        let mut effect = Self::empty();
        effect.table = Some(table);
        effect
    }

    /// Expands `table` to `size` slices on a background thread.
    pub fn expanded(table: LutTable, size: u32) -> Result<Self, TaskError> {
        let mut effect = Self::empty();
        effect.pending = Some(BackgroundTask::spawn("lut-expand", move || {
            Ok(table.expand(size))
        })?);
        Ok(effect)
    }

    fn empty() -> Self {
        Self {
            descriptor: EffectDescriptor::new("LutEffect")
                .with_fragment_shader(LUT_FRAGMENT)
                .with_uniform("lut", TextureSource::None)
                .with_uniform("lut_size", 2.0f32),
            table: None,
            pending: None,
            target: None,
        }
    }

    /// Whether the table is on the GPU.
    pub fn is_ready(&self) -> bool {
        self.target.is_some()
    }

    pub fn table(&self) -> Option<&LutTable> {
        self.table.as_ref()
    }

    fn poll(&mut self) {
        let Some(task) = &mut self.pending else {
            return;
        };
        match task.poll() {
            TaskStatus::Pending => {}
            TaskStatus::Ready(table) => {
                log::debug!("LUT expanded to {} slices", table.size());
                self.table = Some(table);
                self.pending = None;
            }
            TaskStatus::Failed(err) => {
                log::error!("{err}");
                self.pending = None;
            }
            TaskStatus::Finished => self.pending = None,
        }
    }

    fn upload(&mut self, renderer: &mut dyn Renderer) -> Result<(), PassError> {
        let Some(table) = &self.table else {
            return Ok(());
        };
        if self.target.is_some() {
            return Ok(());
        }

        let size = table.size();
        let target = renderer.create_target(&TargetDescriptor::new(
            "LutEffect.lut",
            size * size,
            size,
            TargetFormat::Rgba8Unorm,
        ))?;
        if let Err(err) = renderer.write_target(target, table.data()) {
            renderer.destroy_target(target);
            return Err(err.into());
        }

        self.target = Some(target);
        self.descriptor
            .set_uniform("lut", TextureSource::Target(target));
        self.descriptor.set_uniform("lut_size", size as f32);
        self.descriptor.set_define("LUT_READY", "");
        Ok(())
    }
}

impl Effect for LutEffect {
    fn descriptor(&self) -> &EffectDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut EffectDescriptor {
        &mut self.descriptor
    }

    fn initialize(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        self.poll();
        self.upload(ctx.renderer)
    }

    fn prepare(&mut self, ctx: &mut ResourceContext<'_>) -> Result<(), PassError> {
        self.poll();
        self.upload(ctx.renderer)
    }

    fn release(&mut self, renderer: &mut dyn Renderer) {
        if let Some(target) = self.target.take() {
            renderer.destroy_target(target);
        }
        self.descriptor.set_uniform("lut", TextureSource::None);
        self.descriptor.remove_define("LUT_READY");
    }

    fn dispose(&mut self, renderer: &mut dyn Renderer) {
        self.release(renderer);
        if let Some(mut task) = self.pending.take() {
            task.cancel();
        }
        self.table = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferManager;
    use crate::config::FrameBufferType;
    use crate::testing::RecordingRenderer;
    use std::time::Duration;

    fn approx(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1.0 / 255.0 + 1e-4)
    }

    #[test]
    fn identity_samples_to_itself() {
        let lut = LutTable::identity(8);
        assert_eq!(lut.data().len(), 8 * 8 * 8 * 4);
        for color in [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.25, 0.5, 0.75]] {
            assert!(approx(lut.sample(color), color), "{color:?}");
        }
    }

    #[test]
    fn expanding_identity_stays_identity() {
        let expanded = LutTable::identity(4).expand(16);
        assert_eq!(expanded.size(), 16);
        assert_eq!(expanded, LutTable::identity(16));
    }

    #[test]
    fn rejects_mismatched_data() {
        assert!(matches!(
            LutTable::from_rgba(4, vec![0; 10]),
            Err(Error::InvalidLut(_))
        ));
    }

    #[test]
    fn becomes_ready_after_upload() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let mut buffers = BufferManager::new(FrameBufferType::Standard);
        let mut effect = LutEffect::new(LutTable::identity(4));
        assert!(!effect.is_ready());
        let before = effect.descriptor().revision();

        effect
            .initialize(&mut ResourceContext {
                renderer: &mut renderer,
                buffers: &mut buffers,
            })
            .unwrap();

        assert!(effect.is_ready());
        assert!(effect.descriptor().define("LUT_READY").is_some());
        assert!(effect.descriptor().revision() > before);
        assert_eq!(renderer.live_targets(), 1);

        effect.dispose(&mut renderer);
        assert_eq!(renderer.live_targets(), 0);
        assert!(!effect.is_ready());
    }

    /// Calls `prepare` until the effect is ready or `frames` have passed.
    fn prepare_frames(effect: &mut LutEffect, renderer: &mut RecordingRenderer, frames: usize) {
        let mut buffers = BufferManager::new(FrameBufferType::Standard);
        for _ in 0..frames {
            effect
                .prepare(&mut ResourceContext {
                    renderer: &mut *renderer,
                    buffers: &mut buffers,
                })
                .unwrap();
            if effect.is_ready() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn background_expansion_is_picked_up_by_prepare() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let mut effect = LutEffect::expanded(LutTable::identity(2), 8).unwrap();
        prepare_frames(&mut effect, &mut renderer, 500);

        assert!(effect.is_ready());
        assert_eq!(effect.table().map(LutTable::size), Some(8));
    }

    #[test]
    fn result_arriving_after_dispose_is_discarded() {
        let mut renderer = RecordingRenderer::new(8, 8);
        let mut effect = LutEffect::expanded(LutTable::identity(2), 8).unwrap();
        effect.dispose(&mut renderer);

        std::thread::sleep(Duration::from_millis(50));
        prepare_frames(&mut effect, &mut renderer, 20);

        assert!(!effect.is_ready());
        assert!(effect.table().is_none());
        assert!(effect.descriptor().define("LUT_READY").is_none());
        assert_eq!(renderer.live_targets(), 0);
    }

    #[test]
    fn release_keeps_the_table_for_the_next_renderer() {
        let mut old = RecordingRenderer::new(8, 8);
        let mut effect = LutEffect::new(LutTable::identity(4));
        prepare_frames(&mut effect, &mut old, 1);
        assert!(effect.is_ready());

        effect.release(&mut old);
        assert_eq!(old.live_targets(), 0);
        assert!(!effect.is_ready());

        let mut new = RecordingRenderer::new(8, 8);
        prepare_frames(&mut effect, &mut new, 1);
        assert!(effect.is_ready());
        assert_eq!(new.live_targets(), 1);
    }
}
