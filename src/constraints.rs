//! Position-based constraint math on host vectors.
//!
//! These functions are the reference for the WGSL kernels in
//! `gpu/cloth.wgsl`: the CPU solver calls them directly and the kernels
//! implement the same formulas line for line.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Gravity in m/s².
pub const GRAVITY: Vec3 = Vec3::new(0.0, -9.82, 0.0);

/// Below this a length or denominator counts as zero.
pub const EPSILON: f32 = 1e-6;

/// A static collision half-space `{ p | normal · p >= offset }`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    #[serde(default)]
    pub offset: f32,
}

impl Plane {
    /// The ground plane `y = 0`.
    pub const GROUND: Plane = Plane { normal: Vec3::Y, offset: 0.0 };

    pub fn new(normal: Vec3, offset: f32) -> Self {
        Self { normal: normal.normalize_or(Vec3::Y), offset }
    }

    /// `(normal.xyz, offset)` for the uniform buffer.
    pub fn to_gpu(&self) -> PlaneGpu {
        PlaneGpu { plane: self.normal.extend(self.offset).to_array() }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct PlaneGpu {
    pub plane: [f32; 4],
}

impl From<PlaneGpu> for Vec4 {
    fn from(p: PlaneGpu) -> Self {
        Vec4::from_array(p.plane)
    }
}

/// Integrate gravity into the velocity and advance the position.
/// Pinned vertices (`inv_mass == 0`) stay where they are.
#[inline]
pub fn predict(position: Vec3, velocity: Vec3, inv_mass: f32, dt: f32) -> Vec3 {
    if inv_mass == 0.0 {
        return position;
    }
    let v = velocity + GRAVITY * dt;
    position + v * dt
}

/// Project a point that lies behind a plane back onto it.
#[inline]
pub fn clip_to_plane(p: Vec3, plane: &Plane) -> Vec3 {
    let dist = plane.normal.dot(p);
    if dist < plane.offset {
        p + (plane.offset - dist) * plane.normal
    } else {
        p
    }
}

/// Stretch corrections for the two endpoints of an edge.
pub fn stretch_corrections(
    p0: Vec3,
    p1: Vec3,
    w0: f32,
    w1: f32,
    rest_length: f32,
    k: f32,
) -> [Vec3; 2] {
    let w_sum = w0 + w1;
    let d = p0 - p1;
    let len = d.length();
    if w_sum <= 0.0 || len < EPSILON {
        return [Vec3::ZERO; 2];
    }
    let n = d / len;
    let c = len - rest_length;
    [-k * (w0 / w_sum) * c * n, k * (w1 / w_sum) * c * n]
}

/// Dihedral angle between the two triangles `(p[0], p[1], p[2])` and
/// `(p[0], p[1], p[3])` hinged on the edge `p[0]–p[1]`.
///
/// Returns `None` when either triangle is degenerate.
pub fn dihedral_angle(p: [Vec3; 4]) -> Option<f32> {
    let e = p[1] - p[0];
    let n1 = e.cross(p[2] - p[0]);
    let n2 = e.cross(p[3] - p[0]);
    let (l1, l2) = (n1.length(), n2.length());
    if l1 < EPSILON || l2 < EPSILON {
        return None;
    }
    Some((n1 / l1).dot(n2 / l2).clamp(-1.0, 1.0).acos())
}

/// Bend corrections for the four vertices of a hinge.
///
/// `p[0]`, `p[1]` are the edge endpoints and `p[2]`, `p[3]` the vertices
/// opposite the edge in its two triangles. Gradients follow the dihedral
/// constraint of Müller et al., "Position Based Dynamics" (2006), appendix A.
pub fn bend_corrections(p: [Vec3; 4], w: [f32; 4], rest_angle: f32, k: f32) -> [Vec3; 4] {
    let p2 = p[1] - p[0];
    let p3 = p[2] - p[0];
    let p4 = p[3] - p[0];

    let c23 = p2.cross(p3);
    let c24 = p2.cross(p4);
    let (l23, l24) = (c23.length(), c24.length());
    if l23 < EPSILON || l24 < EPSILON {
        return [Vec3::ZERO; 4];
    }
    let n1 = c23 / l23;
    let n2 = c24 / l24;
    let d = n1.dot(n2).clamp(-1.0, 1.0);

    let q3 = (p2.cross(n2) + n1.cross(p2) * d) / l23;
    let q4 = (p2.cross(n1) + n2.cross(p2) * d) / l24;
    let q2 = -(p3.cross(n2) + n1.cross(p3) * d) / l23 - (p4.cross(n1) + n2.cross(p4) * d) / l24;
    let q1 = -q2 - q3 - q4;
    let q = [q1, q2, q3, q4];

    let denom: f32 = q.iter().zip(w).map(|(qi, wi)| wi * qi.length_squared()).sum();
    if denom < EPSILON {
        return [Vec3::ZERO; 4];
    }
    let c = d.acos() - rest_angle;
    let s = -k * (1.0 - d * d).sqrt() * c / denom;
    [q[0] * s * w[0], q[1] * s * w[1], q[2] * s * w[2], q[3] * s * w[3]]
}

/// Velocity-consistent end of a frame: returns `(position, velocity)`.
#[inline]
pub fn finalize(position: Vec3, predicted: Vec3, dt: f32) -> (Vec3, Vec3) {
    (predicted, (predicted - position) / dt)
}

/// Area of a triangle.
#[inline]
pub fn triangle_area(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    0.5 * (b - a).cross(c - a).length()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_pinned_stays() {
        let x = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(predict(x, Vec3::new(5.0, 5.0, 5.0), 0.0, 0.1), x);
    }

    #[test]
    fn test_predict_falls() {
        let p = predict(Vec3::ZERO, Vec3::ZERO, 1.0, 0.1);
        assert!((p.y - (-0.0982)).abs() < 1e-6);
    }

    #[test]
    fn test_clip_projects_onto_ground() {
        let p = clip_to_plane(Vec3::new(1.0, -0.5, 2.0), &Plane::GROUND);
        assert_eq!(p, Vec3::new(1.0, 0.0, 2.0));
        let q = Vec3::new(1.0, 0.5, 2.0);
        assert_eq!(clip_to_plane(q, &Plane::GROUND), q);
    }

    #[test]
    fn test_clip_with_offset() {
        let wall = Plane::new(Vec3::new(-1.0, 0.0, 0.0), -2.0);
        let p = clip_to_plane(Vec3::new(3.0, 0.0, 0.0), &wall);
        assert!((p.x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_stretch_pulls_together() {
        let [d0, d1] = stretch_corrections(Vec3::ZERO, Vec3::new(1.2, 0.0, 0.0), 1.0, 1.0, 1.0, 1.0);
        assert!(d0.x > 0.0);
        assert!(d1.x < 0.0);
        assert!((d0.x - 0.1).abs() < 1e-6);
        assert!((d1.x + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_stretch_respects_pinned_endpoint() {
        let [d0, d1] = stretch_corrections(Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), 0.0, 1.0, 1.0, 1.0);
        assert_eq!(d0, Vec3::ZERO);
        assert!((d1.x + 1.0).abs() < 1e-6);

        let both = stretch_corrections(Vec3::ZERO, Vec3::X, 0.0, 0.0, 0.5, 1.0);
        assert_eq!(both, [Vec3::ZERO; 2]);
    }

    #[test]
    fn test_flat_hinge_angle_is_pi() {
        let p = [Vec3::ZERO, Vec3::X, Vec3::Z, -Vec3::Z];
        let angle = dihedral_angle(p).unwrap();
        assert!((angle - std::f32::consts::PI).abs() < 1e-5);
    }

    #[test]
    fn test_bend_unfolds_towards_rest() {
        // 90° fold, rest flat
        let p = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
        let rest = std::f32::consts::PI;
        let before = dihedral_angle(p).unwrap();
        let dp = bend_corrections(p, [1.0; 4], rest, 0.1);
        let moved = [p[0] + dp[0], p[1] + dp[1], p[2] + dp[2], p[3] + dp[3]];
        let after = dihedral_angle(moved).unwrap();
        assert!(after > before, "angle {} should grow towards {}", after, rest);
    }

    #[test]
    fn test_bend_at_rest_is_zero() {
        let p = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
        let rest = dihedral_angle(p).unwrap();
        for dp in bend_corrections(p, [1.0; 4], rest, 1.0) {
            assert!(dp.length() < 1e-6);
        }
    }

    #[test]
    fn test_bend_degenerate_is_zero() {
        let p = [Vec3::ZERO, Vec3::X, Vec3::X * 2.0, Vec3::Z];
        assert_eq!(bend_corrections(p, [1.0; 4], 1.0, 1.0), [Vec3::ZERO; 4]);
        assert!(dihedral_angle(p).is_none());
    }

    #[test]
    fn test_finalize_derives_velocity() {
        let (x, v) = finalize(Vec3::ZERO, Vec3::new(0.0, -0.1, 0.0), 0.01);
        assert_eq!(x, Vec3::new(0.0, -0.1, 0.0));
        assert!((v.y + 10.0).abs() < 1e-4);
    }
}
