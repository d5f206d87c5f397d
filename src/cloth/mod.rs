//! Cloth State Store, host stage.
//!
//! A [`HostCloth`] owns everything a cloth instance needs before it reaches
//! the device: the mesh in world space, its constraint topology and the
//! per-vertex, per-edge and per-triangle simulation records with their
//! initial values. It is consumed by
//! [`HostCloth::upload`] (GPU) or [`CpuCloth::from_host`](crate::solver::CpuCloth::from_host)
//! (CPU), so host arrays cannot be touched once a committed stage exists.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::constraints::{dihedral_angle, triangle_area};
use crate::error::TopologyError;
use crate::grid::Grid;
use crate::mesh::HostMesh;
use crate::topology::{build_topology, Topology};

/// Mass per unit area.
pub const DEFAULT_DENSITY: f32 = 1.0;

/// Per-vertex simulation attributes. `inv_mass == 0` pins the vertex.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ClothVertexData {
    pub vertex_id: u32,
    pub mass: f32,
    pub inv_mass: f32,
    pub _pad: f32,
}

impl ClothVertexData {
    pub fn is_pinned(&self) -> bool {
        self.inv_mass == 0.0
    }
}

/// Per-edge rest state, captured once from the as-loaded geometry.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ClothEdgeData {
    pub rest_length: f32,
    pub rest_angle: f32,
    pub _pad: [f32; 2],
}

/// Per-triangle record: id, neighbour per slot (`-1` on a boundary), mass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ClothTriangleData {
    pub triangle_id: u32,
    pub neighbours: [i32; 3],
    pub mass: f32,
    pub _pad: [f32; 3],
}

/// Staging stage of a cloth instance.
#[derive(Clone, Debug)]
pub struct HostCloth {
    pub name: String,
    pub mesh: HostMesh,
    pub topology: Topology,
    pub vertex_data: Vec<ClothVertexData>,
    pub edge_data: Vec<ClothEdgeData>,
    pub triangle_data: Vec<ClothTriangleData>,
    pub grid: Grid,
}

impl HostCloth {
    /// Build topology and initial values for a mesh already in world space.
    pub fn new(name: impl Into<String>, mesh: HostMesh, pinned: &[u32]) -> Result<Self, TopologyError> {
        Self::with_density(name, mesh, pinned, DEFAULT_DENSITY)
    }

    pub fn with_density(
        name: impl Into<String>,
        mesh: HostMesh,
        pinned: &[u32],
        density: f32,
    ) -> Result<Self, TopologyError> {
        let name = name.into();
        let topology = build_topology(mesh.num_vertices(), &mesh.triangles)?;

        let mut cloth = Self {
            name,
            vertex_data: (0..mesh.num_vertices() as u32)
                .map(|vertex_id| ClothVertexData { vertex_id, ..Default::default() })
                .collect(),
            edge_data: vec![ClothEdgeData::default(); topology.num_edges()],
            triangle_data: Vec::with_capacity(mesh.num_triangles()),
            grid: Grid::new(Vec3::ONE, 1.0),
            mesh,
            topology,
        };
        cloth.distribute_mass(density);
        for &v in pinned {
            cloth.pin(v);
        }
        cloth.capture_rest_state();

        log::info!(
            "Cloth '{}': {} vertices, {} edges, {} triangles, {} pinned",
            cloth.name,
            cloth.num_vertices(),
            cloth.num_edges(),
            cloth.num_triangles(),
            cloth.vertex_data.iter().filter(|v| v.is_pinned()).count()
        );
        Ok(cloth)
    }

    pub fn num_vertices(&self) -> usize {
        self.mesh.num_vertices()
    }

    pub fn num_edges(&self) -> usize {
        self.topology.num_edges()
    }

    pub fn num_triangles(&self) -> usize {
        self.mesh.num_triangles()
    }

    /// Accumulate one third of every triangle's mass into each of its
    /// vertices, then derive inverse masses.
    fn distribute_mass(&mut self, density: f32) {
        let positions: Vec<Vec3> = self.mesh.vertices.iter().map(|v| v.pos()).collect();
        self.triangle_data.clear();
        for (t, tri) in self.mesh.triangles.iter().enumerate() {
            let [a, b, c] = tri.vertices.map(|i| i as usize);
            let mass = density * triangle_area(positions[a], positions[b], positions[c]);
            for &v in &[a, b, c] {
                self.vertex_data[v].mass += mass / 3.0;
            }
            self.triangle_data.push(ClothTriangleData {
                triangle_id: t as u32,
                neighbours: self.topology.triangle_neighbours[t],
                mass,
                _pad: [0.0; 3],
            });
        }
        for data in &mut self.vertex_data {
            data.inv_mass = if data.mass > 0.0 { 1.0 / data.mass } else { 0.0 };
        }
    }

    /// Rest length and rest dihedral angle per edge, plus the bin grid.
    fn capture_rest_state(&mut self) {
        let positions: Vec<Vec3> = self.mesh.vertices.iter().map(|v| v.pos()).collect();
        let mut max_length = 0.0f32;
        for (edge, data) in self.topology.edges.iter().zip(&mut self.edge_data) {
            let p0 = positions[edge.vertices[0] as usize];
            let p1 = positions[edge.vertices[1] as usize];
            data.rest_length = p0.distance(p1);
            max_length = max_length.max(data.rest_length);
            data.rest_angle = if edge.is_boundary() {
                0.0
            } else {
                let p2 = positions[edge.opposite[0] as usize];
                let p3 = positions[edge.opposite[1] as usize];
                dihedral_angle([p0, p1, p2, p3]).unwrap_or(0.0)
            };
        }
        if let Some((lo, hi)) = self.mesh.bounds() {
            self.grid = Grid::enclosing(lo, hi, max_length.max(1e-2));
        }
    }

    /// Make a vertex immovable. Out-of-range indices are ignored.
    pub fn pin(&mut self, vertex: u32) {
        match self.vertex_data.get_mut(vertex as usize) {
            Some(data) => data.inv_mass = 0.0,
            None => log::warn!("Cloth '{}': cannot pin vertex {} (out of range)", self.name, vertex),
        }
    }

    pub fn total_vertex_mass(&self) -> f32 {
        self.vertex_data.iter().map(|v| v.mass).sum()
    }

    pub fn total_triangle_mass(&self) -> f32 {
        self.triangle_data.iter().map(|t| t.mass).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Triangle, Vertex};
    use glam::Vec2;

    fn right_triangle() -> HostMesh {
        let v = |x, y, z| Vertex::new(Vec3::new(x, y, z), Vec3::Z, Vec2::ZERO);
        HostMesh::new(
            vec![v(0.0, 0.0, 0.0), v(2.0, 0.0, 0.0), v(0.0, 3.0, 0.0)],
            vec![Triangle::new(0, 1, 2)],
        )
    }

    #[test]
    fn test_record_layouts() {
        assert_eq!(std::mem::size_of::<ClothVertexData>(), 16);
        assert_eq!(std::mem::size_of::<ClothEdgeData>(), 16);
        assert_eq!(std::mem::size_of::<ClothTriangleData>(), 32);
    }

    #[test]
    fn test_mass_split_in_thirds() {
        let cloth = HostCloth::new("tri", right_triangle(), &[]).unwrap();
        assert!((cloth.triangle_data[0].mass - 3.0).abs() < 1e-6);
        for v in &cloth.vertex_data {
            assert!((v.mass - 1.0).abs() < 1e-6);
            assert!((v.inv_mass - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pinned_has_zero_inverse_mass() {
        let cloth = HostCloth::new("tri", right_triangle(), &[1, 99]).unwrap();
        assert!(cloth.vertex_data[1].is_pinned());
        assert!(cloth.vertex_data[1].mass > 0.0);
        assert!(!cloth.vertex_data[0].is_pinned());
    }

    #[test]
    fn test_rest_lengths() {
        let cloth = HostCloth::new("tri", right_triangle(), &[]).unwrap();
        let lengths: Vec<f32> = cloth.edge_data.iter().map(|e| e.rest_length).collect();
        // edges (0,1), (1,2), (0,2)
        assert!((lengths[0] - 2.0).abs() < 1e-6);
        assert!((lengths[1] - 13f32.sqrt()).abs() < 1e-6);
        assert!((lengths[2] - 3.0).abs() < 1e-6);
        assert!(cloth.edge_data.iter().all(|e| e.rest_angle == 0.0));
    }

    #[test]
    fn test_flat_sheet_rest_angle() {
        let cloth = HostCloth::new("sheet", HostMesh::grid(2, 2), &[]).unwrap();
        for (edge, data) in cloth.topology.edges.iter().zip(&cloth.edge_data) {
            if !edge.is_boundary() {
                assert!((data.rest_angle - std::f32::consts::PI).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_triangle_neighbours_copied() {
        let cloth = HostCloth::new("sheet", HostMesh::grid(1, 1), &[]).unwrap();
        assert_eq!(cloth.triangle_data[0].neighbours, cloth.topology.triangle_neighbours[0]);
        assert_eq!(cloth.triangle_data[1].triangle_id, 1);
    }
}
