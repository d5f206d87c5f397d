//! Host-side mesh geometry.
//!
//! A [`HostMesh`] is plain triangle-soup data: vertices with position,
//! normal, texture coordinate and color, plus index triples. It is what the
//! loaders produce and what the cloth builder and the renderer consume.

pub mod obj;

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Quat, Vec2, Vec3, Vec4};

use crate::error::MeshError;

/// GPU-compatible vertex.
///
/// Layout matches the WGSL `Vertex` struct used by both the solver kernels
/// and the render shaders (vec3 fields are padded to 16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub _pad0: f32,
    pub normal: [f32; 3],
    pub _pad1: f32,
    pub tex_coord: [f32; 2],
    pub _pad2: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position: position.to_array(),
            _pad0: 0.0,
            normal: normal.to_array(),
            _pad1: 0.0,
            tex_coord: tex_coord.to_array(),
            _pad2: [0.0; 2],
            color: Vec4::ONE.to_array(),
        }
    }

    #[inline]
    pub fn pos(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    #[inline]
    pub fn set_pos(&mut self, p: Vec3) {
        self.position = p.to_array();
    }

    /// WGSL struct definition matching this layout.
    pub const WGSL_STRUCT: &'static str = r#"struct Vertex {
    position: vec3<f32>,
    _pad0: f32,
    normal: vec3<f32>,
    _pad1: f32,
    tex_coord: vec2<f32>,
    _pad2: vec2<f32>,
    color: vec4<f32>,
};"#;
}

/// Three vertex indices. Forms the index buffer for rendering.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Triangle {
    pub vertices: [u32; 3],
}

impl Triangle {
    pub const fn new(a: u32, b: u32, c: u32) -> Self {
        Self { vertices: [a, b, c] }
    }
}

/// Marker for a missing triangle or opposite vertex in an [`Edge`].
pub const NONE: i32 = -1;

/// Largest `builtin:grid` sheet, in vertices.
pub const MAX_GRID_VERTICES: u32 = 1 << 22;

/// An edge between two vertices with up to two adjacent triangles.
///
/// `opposite[k]` is the vertex of `triangles[k]` that is not on the edge.
/// Boundary edges have `triangles[1] == NONE` and `opposite[1] == NONE`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Edge {
    pub vertices: [u32; 2],
    pub triangles: [i32; 2],
    pub opposite: [i32; 2],
    pub _pad: [u32; 2],
}

impl Edge {
    pub fn is_boundary(&self) -> bool {
        self.triangles[1] == NONE
    }
}

/// Triangle soup in host memory.
#[derive(Clone, Debug, Default)]
pub struct HostMesh {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
}

/// `(cols + 1) * (rows + 1)`, or `None` on overflow.
fn grid_vertex_count(cols: u32, rows: u32) -> Option<u32> {
    cols.checked_add(1)?.checked_mul(rows.checked_add(1)?)
}

impl HostMesh {
    pub fn new(vertices: Vec<Vertex>, triangles: Vec<Triangle>) -> Self {
        Self { vertices, triangles }
    }

    /// Load a mesh from a path.
    ///
    /// `builtin:grid:<cols>x<rows>` produces a procedural sheet, anything
    /// else is read as a Wavefront OBJ file.
    pub fn load(path: &str, base_dir: &Path) -> Result<Self, MeshError> {
        if let Some(rest) = path.strip_prefix("builtin:") {
            return Self::builtin(rest);
        }
        obj::load_obj(&base_dir.join(path))
    }

    fn builtin(name: &str) -> Result<Self, MeshError> {
        let unknown = || MeshError::UnknownBuiltin(name.to_string());
        let dims = name.strip_prefix("grid:").ok_or_else(unknown)?;
        let (cols, rows) = dims.split_once('x').ok_or_else(unknown)?;
        let cols: u32 = cols.trim().parse().map_err(|_| unknown())?;
        let rows: u32 = rows.trim().parse().map_err(|_| unknown())?;
        if cols == 0 || rows == 0 {
            return Err(unknown());
        }
        match grid_vertex_count(cols, rows) {
            Some(n) if n <= MAX_GRID_VERTICES => Ok(Self::grid(cols, rows)),
            _ => Err(MeshError::GridTooLarge { cols, rows }),
        }
    }

    /// A unit sheet in the XZ plane centered at the origin, facing +Y.
    ///
    /// The sheet has `cols × rows` quads and `(cols + 1) × (rows + 1)`
    /// vertices; vertex `(c, r)` has index `r * (cols + 1) + c` and row 0
    /// lies at `z = -0.5`. Callers keep the vertex count within `u32`;
    /// scene paths are checked against [`MAX_GRID_VERTICES`].
    pub fn grid(cols: u32, rows: u32) -> Self {
        let width = cols + 1;
        let mut vertices = Vec::with_capacity((width * (rows + 1)) as usize);
        for r in 0..=rows {
            for c in 0..=cols {
                let u = c as f32 / cols as f32;
                let v = r as f32 / rows as f32;
                vertices.push(Vertex::new(
                    Vec3::new(u - 0.5, 0.0, v - 0.5),
                    Vec3::Y,
                    Vec2::new(u, v),
                ));
            }
        }

        let mut triangles = Vec::with_capacity((cols * rows * 2) as usize);
        for r in 0..rows {
            for c in 0..cols {
                let i0 = r * width + c;
                let i1 = i0 + 1;
                let i2 = i0 + width;
                let i3 = i2 + 1;
                triangles.push(Triangle::new(i0, i2, i1));
                triangles.push(Triangle::new(i1, i2, i3));
            }
        }

        Self { vertices, triangles }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Flip every normal and swap the winding of every triangle so that
    /// face culling still matches the normals.
    pub fn flip_normals(&mut self) {
        for vertex in &mut self.vertices {
            vertex.normal = (-Vec3::from_array(vertex.normal)).to_array();
        }
        for triangle in &mut self.triangles {
            triangle.vertices.swap(1, 2);
        }
    }

    /// Bake a scale, an XYZ Euler rotation (degrees) and a translation into
    /// the vertex data.
    pub fn transform(&mut self, translation: Vec3, orientation_deg: Vec3, scale: f32) {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            orientation_deg.x.to_radians(),
            orientation_deg.y.to_radians(),
            orientation_deg.z.to_radians(),
        );
        for vertex in &mut self.vertices {
            let p = translation + rotation * (vertex.pos() * scale);
            vertex.set_pos(p);
            let n = rotation * Vec3::from_array(vertex.normal);
            vertex.normal = n.normalize_or_zero().to_array();
        }
    }

    /// Recompute smooth, area-weighted vertex normals from the triangles.
    pub fn recompute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.vertices.len()];
        for tri in &self.triangles {
            let [a, b, c] = tri.vertices.map(|i| i as usize);
            let pa = self.vertices[a].pos();
            let n = (self.vertices[b].pos() - pa).cross(self.vertices[c].pos() - pa);
            normals[a] += n;
            normals[b] += n;
            normals[c] += n;
        }
        for (vertex, n) in self.vertices.iter_mut().zip(normals) {
            vertex.normal = n.normalize_or_zero().to_array();
        }
    }

    /// Axis-aligned bounds `(min, max)`, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.vertices.first()?.pos();
        Some(self.vertices.iter().fold((first, first), |(lo, hi), v| {
            (lo.min(v.pos()), hi.max(v.pos()))
        }))
    }
}
