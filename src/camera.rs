//! Orbit camera and cursor rays.

use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};

/// Orbit step per frame while a rotation key is held, in radians.
pub const KEY_ORBIT_SPEED: f32 = 0.04;
/// Orbit per dragged pixel, in radians.
pub const MOUSE_ORBIT_SPEED: f32 = 0.005;
/// Closest and farthest orbit distance.
pub const MIN_DISTANCE: f32 = 0.5;
pub const MAX_DISTANCE: f32 = 100.0;
/// Pitch stays just inside ±90° so the view basis never degenerates.
pub const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 1e-3;

/// A half-line with a unit direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction: direction.normalize_or(Vec3::NEG_Z) }
    }

    /// Projection of `p` onto the ray's line.
    #[inline]
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        self.origin + self.direction * (p - self.origin).dot(self.direction)
    }

    /// Perpendicular distance from `p` to the ray's line.
    #[inline]
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        (p - self.closest_point(p)).length()
    }
}

/// Orbit camera around a target point.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Horizontal rotation angle in radians.
    pub yaw: f32,
    /// Vertical rotation angle in radians.
    pub pitch: f32,
    /// Distance from the target point.
    pub distance: f32,
    /// Point the camera orbits around.
    pub target: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.3,
            distance: 6.0,
            target: Vec3::ZERO,
            fov_y: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.05,
            far: 500.0,
        }
    }

    /// Camera at `position` looking at `target`.
    pub fn looking_at(position: Vec3, target: Vec3, fov_y: f32) -> Self {
        let offset = position - target;
        let distance = offset.length().clamp(MIN_DISTANCE, MAX_DISTANCE);
        let (yaw, pitch) = if offset.length() > 1e-6 {
            let dir = offset.normalize();
            (dir.x.atan2(dir.z), dir.y.clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT))
        } else {
            (0.0, 0.0)
        };
        Self { yaw, pitch, distance, target, fov_y, ..Self::new() }
    }

    /// Calculate the camera's world position.
    pub fn position(&self) -> Vec3 {
        let x = self.distance * self.pitch.cos() * self.yaw.sin();
        let y = self.distance * self.pitch.sin();
        let z = self.distance * self.pitch.cos() * self.yaw.cos();
        self.target + Vec3::new(x, y, z)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn orbit(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw += d_yaw;
        self.pitch = (self.pitch + d_pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Move along the view axis; positive `amount` moves closer.
    pub fn zoom(&mut self, amount: f32) {
        self.distance = (self.distance * 0.9f32.powf(amount)).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    /// World-space ray through a point in normalized device coordinates.
    pub fn cursor_ray(&self, ndc: Vec2) -> Ray {
        let inv = self.view_proj().inverse();
        let near = inv * ndc.extend(0.0).extend(1.0);
        let far = inv * ndc.extend(1.0).extend(1.0);
        let near = near.xyz() / near.w;
        let far = far.xyz() / far.w;
        Ray::new(self.position(), far - near)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}
