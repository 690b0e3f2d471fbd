use crate::{Mat4, Vec3};

/// Pitch stays just short of straight up/down so `look_to_rh` keeps a valid basis.
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// First-person fly camera (right-handed, Y up).
/// Yaw 0 looks down -Z; positive pitch looks up.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// World units per `move_*` step of magnitude 1.
    pub move_speed: f32,
    /// Radians per pixel of mouse motion.
    pub sensitivity: f32,
}

impl Camera {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            fov_y_rad: 60f32.to_radians(),
            z_near: 0.1,
            z_far: 1000.0,
            move_speed: 0.05,
            sensitivity: 0.002,
        }
    }

    /// Unit view direction.
    #[inline]
    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(sy * cp, sp, -cy * cp)
    }

    /// Unit right vector, always horizontal.
    #[inline]
    pub fn right(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        Vec3::new(cy, 0.0, sy)
    }

    /// Turn left/right by a mouse delta in pixels.
    pub fn pan(&mut self, dx: f32) {
        self.yaw += dx * self.sensitivity;
    }

    /// Look up/down by a mouse delta in pixels (screen Y grows downward).
    pub fn tilt(&mut self, dy: f32) {
        self.pitch = (self.pitch - dy * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn move_forward(&mut self, dir: f32) {
        self.position += self.forward() * dir * self.move_speed;
    }

    pub fn move_right(&mut self, dir: f32) {
        self.position += self.right() * dir * self.move_speed;
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    /// Perspective projection with 0..1 depth, as wgpu expects.
    #[inline]
    pub fn proj(&self, width: u32, height: u32) -> Mat4 {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        Mat4::perspective_rh(self.fov_y_rad, aspect, self.z_near, self.z_far)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0))
    }
}
