//! Uniform spatial bin grid.
//!
//! Each cloth gets a grid descriptor sized to its rest configuration, plus
//! device buffers for per-bin counts and start indices (see
//! [`GridBuffers`](crate::gpu::GridBuffers)). No solver kernel consumes the
//! grid yet; it is the extension point for broad-phase self-collision.

use glam::{UVec3, Vec3};

/// Upper bound on bins per axis.
pub const MAX_BINS_PER_AXIS: u32 = 128;

/// Grid centered on the origin, covering `[-half_dimensions, half_dimensions]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grid {
    pub half_dimensions: Vec3,
    pub bin_size: f32,
    pub bin_count_3d: UVec3,
    pub bin_count: u32,
}

impl Grid {
    pub fn new(half_dimensions: Vec3, bin_size: f32) -> Self {
        let bin_size = bin_size.max(1e-3);
        let per_axis = |half: f32| ((2.0 * half / bin_size).ceil() as u32).clamp(1, MAX_BINS_PER_AXIS);
        let bin_count_3d = UVec3::new(
            per_axis(half_dimensions.x),
            per_axis(half_dimensions.y),
            per_axis(half_dimensions.z),
        );
        Self {
            half_dimensions,
            bin_size,
            bin_count_3d,
            bin_count: bin_count_3d.x * bin_count_3d.y * bin_count_3d.z,
        }
    }

    /// Grid enclosing the bounds `(min, max)` with one bin of margin.
    pub fn enclosing(min: Vec3, max: Vec3, bin_size: f32) -> Self {
        let half = min.abs().max(max.abs()) + Vec3::splat(bin_size);
        Self::new(half, bin_size)
    }

    /// 3D bin coordinates of a point, or `None` outside the grid.
    pub fn bin_coords(&self, p: Vec3) -> Option<UVec3> {
        let local = (p + self.half_dimensions) / self.bin_size;
        if local.min_element() < 0.0 {
            return None;
        }
        let c = local.floor().as_uvec3();
        if c.cmpge(self.bin_count_3d).any() {
            return None;
        }
        Some(c)
    }

    /// Linear bin index, x fastest.
    pub fn bin_index(&self, p: Vec3) -> Option<u32> {
        self.bin_coords(p).map(|c| {
            c.x + self.bin_count_3d.x * (c.y + self.bin_count_3d.y * c.z)
        })
    }

    /// Grid parameters as WGSL constants.
    pub fn wgsl_constants(&self) -> String {
        format!(
            "const HALF_DIMS: vec3<f32> = vec3<f32>({:?}, {:?}, {:?});\n\
             const BIN_SIZE: f32 = {:?};\n\
             const BIN_COUNT_3D: vec3<u32> = vec3<u32>({}u, {}u, {}u);\n\
             const BIN_COUNT: u32 = {}u;\n",
            self.half_dimensions.x,
            self.half_dimensions.y,
            self.half_dimensions.z,
            self.bin_size,
            self.bin_count_3d.x,
            self.bin_count_3d.y,
            self.bin_count_3d.z,
            self.bin_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_counts() {
        let grid = Grid::new(Vec3::new(1.0, 0.5, 2.0), 0.5);
        assert_eq!(grid.bin_count_3d, UVec3::new(4, 2, 8));
        assert_eq!(grid.bin_count, 64);
    }

    #[test]
    fn test_bin_index() {
        let grid = Grid::new(Vec3::splat(1.0), 1.0);
        assert_eq!(grid.bin_index(Vec3::splat(-0.5)), Some(0));
        assert_eq!(grid.bin_index(Vec3::new(0.5, -0.5, -0.5)), Some(1));
        assert_eq!(grid.bin_index(Vec3::splat(0.5)), Some(7));
        assert_eq!(grid.bin_index(Vec3::new(1.5, 0.0, 0.0)), None);
        assert_eq!(grid.bin_index(Vec3::new(0.0, -1.5, 0.0)), None);
    }

    #[test]
    fn test_bins_are_capped() {
        let grid = Grid::new(Vec3::splat(1000.0), 0.01);
        assert_eq!(grid.bin_count_3d, UVec3::splat(MAX_BINS_PER_AXIS));
    }

    #[test]
    fn test_enclosing_contains_bounds() {
        let grid = Grid::enclosing(Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0), 0.25);
        assert!(grid.bin_index(Vec3::new(-1.0, 0.0, -1.0)).is_some());
        assert!(grid.bin_index(Vec3::new(1.0, 2.0, 1.0)).is_some());
    }

    #[test]
    fn test_wgsl_constants_parse() {
        let src = Grid::new(Vec3::ONE, 0.5).wgsl_constants();
        let module = naga::front::wgsl::parse_str(&src).unwrap();
        assert_eq!(module.constants.len(), 4);
    }
}
