//! Render size bookkeeping.

/// Base size times a scale factor, with an optional preferred size override.
///
/// The effective size is what passes allocate their targets with. It never drops
/// below 1×1. Every change to the effective size bumps [`revision`](Self::revision),
/// and the mutators report whether such a change happened.
///
/// ```
/// use postfx::Resolution;
///
/// let mut res = Resolution::new(1920, 1080);
/// res.set_scale(0.5);
/// assert_eq!((res.width(), res.height()), (960, 540));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    base_width: u32,
    base_height: u32,
    scale: f32,
    preferred_width: Option<u32>,
    preferred_height: Option<u32>,
    revision: u64,
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            base_width: width,
            base_height: height,
            scale: 1.0,
            preferred_width: None,
            preferred_height: None,
            revision: 0,
        }
    }

    /// A resolution with a fixed scale, for passes that render at a fraction of the frame.
    pub fn scaled(scale: f32) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }

    pub fn base_width(&self) -> u32 {
        self.base_width
    }

    pub fn base_height(&self) -> u32 {
        self.base_height
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn preferred_size(&self) -> (Option<u32>, Option<u32>) {
        (self.preferred_width, self.preferred_height)
    }

    /// Effective width in pixels.
    pub fn width(&self) -> u32 {
        self.effective().0
    }

    /// Effective height in pixels.
    pub fn height(&self) -> u32 {
        self.effective().1
    }

    pub fn size(&self) -> (u32, u32) {
        self.effective()
    }

    pub fn aspect(&self) -> f32 {
        let (w, h) = self.effective();
        w as f32 / h as f32
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_base_size(&mut self, width: u32, height: u32) -> bool {
        self.mutate(|res| {
            res.base_width = width;
            res.base_height = height;
        })
    }

    pub fn set_scale(&mut self, scale: f32) -> bool {
        self.mutate(|res| res.scale = scale)
    }

    /// Overrides the scaled size. A missing dimension follows the base aspect ratio.
    pub fn set_preferred_size(&mut self, width: Option<u32>, height: Option<u32>) -> bool {
        self.mutate(|res| {
            res.preferred_width = width;
            res.preferred_height = height;
        })
    }

    fn mutate(&mut self, f: impl FnOnce(&mut Self)) -> bool {
        let before = self.effective();
        f(self);
        let changed = before != self.effective();
        if changed {
            self.revision += 1;
        }
        changed
    }

    fn effective(&self) -> (u32, u32) {
        let base_w = self.base_width.max(1) as f64;
        let base_h = self.base_height.max(1) as f64;
        let scale = self.scale as f64;

        let (w, h) = match (self.preferred_width, self.preferred_height) {
            (Some(w), Some(h)) => (w as f64, h as f64),
            (Some(w), None) => (w as f64, w as f64 * base_h / base_w),
            (None, Some(h)) => (h as f64 * base_w / base_h, h as f64),
            (None, None) => (self.base_width as f64 * scale, self.base_height as f64 * scale),
        };

        (to_pixels(w), to_pixels(h))
    }
}

fn to_pixels(x: f64) -> u32 {
    if x.is_finite() {
        x.round().clamp(1.0, u32::MAX as f64) as u32
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_size_is_rounded_product() {
        let mut res = Resolution::new(1001, 500);
        res.set_scale(0.5);
        assert_eq!(res.width(), 501);
        assert_eq!(res.height(), 250);
    }

    #[test]
    fn effective_size_never_drops_below_one() {
        let mut res = Resolution::new(10, 10);
        res.set_scale(0.0);
        assert_eq!(res.size(), (1, 1));
        res.set_base_size(0, 0);
        res.set_scale(1.0);
        assert_eq!(res.size(), (1, 1));
    }

    #[test]
    fn revision_only_moves_when_the_effective_size_changes() {
        let mut res = Resolution::new(800, 600);
        assert!(!res.set_base_size(800, 600));
        assert_eq!(res.revision(), 0);

        assert!(res.set_base_size(1024, 768));
        assert_eq!(res.revision(), 1);

        // Preferred size hides base changes.
        res.set_preferred_size(Some(256), Some(256));
        let rev = res.revision();
        assert!(!res.set_base_size(640, 480));
        assert_eq!(res.revision(), rev);
    }

    #[test]
    fn preferred_dimension_follows_aspect_ratio() {
        let mut res = Resolution::new(1920, 1080);
        res.set_preferred_size(None, Some(540));
        assert_eq!(res.size(), (960, 540));

        res.set_preferred_size(Some(480), None);
        assert_eq!(res.size(), (480, 270));
    }

    #[test]
    fn preferred_size_ignores_scale() {
        let mut res = Resolution::new(1920, 1080);
        res.set_scale(0.25);
        res.set_preferred_size(Some(100), Some(50));
        assert_eq!(res.size(), (100, 50));
    }
}
