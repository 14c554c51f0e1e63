use glam::{Mat4, Vec3};

/// How the camera projects the scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    /// Vertical field of view in radians.
    Perspective { fov: f32 },
    /// Height of the view volume in world units.
    Orthographic { height: f32 },
}

/// The scene camera as seen by post-processing.
///
/// Effects only need the clip planes and the projection kind to linearize depth.
/// `EffectPass` forwards them through the frame uniforms and defines
/// `PERSPECTIVE_CAMERA` for perspective cameras.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            projection: Projection::Perspective {
                fov: std::f32::consts::FRAC_PI_2, // 90 degrees
            },
            near: 0.3,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn looking_at(mut self, target_x: f32, target_y: f32, target_z: f32) -> Self {
        let target = Vec3::new(target_x, target_y, target_z);
        self.forward = (target - self.position).normalize_or_zero();
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.projection = Projection::Perspective {
            fov: fov_degrees.to_radians(),
        };
        self
    }

    pub fn orthographic(mut self, height: f32) -> Self {
        self.projection = Projection::Orthographic { height };
        self
    }

    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn is_perspective(&self) -> bool {
        matches!(self.projection, Projection::Perspective { .. })
    }

    /// Compute the right vector from forward and up.
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }

    /// Recompute up to be orthogonal to forward and right.
    pub fn orthogonal_up(&self) -> Vec3 {
        self.right().cross(self.forward).normalize_or_zero()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    /// Projection into wgpu clip space (depth in `[0, 1]`).
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov } => {
                Mat4::perspective_rh(fov, aspect, self.near, self.far)
            }
            Projection::Orthographic { height } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        }
    }

    /// `(near, far, aspect, 1.0 if perspective else 0.0)`, as laid out in the frame uniforms.
    pub fn params(&self, aspect: f32) -> [f32; 4] {
        let perspective = if self.is_perspective() { 1.0 } else { 0.0 };
        [self.near, self.far, aspect, perspective]
    }
}
