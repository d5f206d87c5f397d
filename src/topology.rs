//! Constraint topology derived from a triangle list.
//!
//! [`build_topology`] turns the index buffer of a cloth mesh into:
//!
//! - the edge set, one [`Edge`] per unordered vertex pair, in order of first
//!   appearance, each with its (up to two) adjacent triangles and the vertex
//!   opposite the edge in each of them,
//! - the triangle adjacency table, one neighbour per triangle edge,
//! - per-vertex gather lists used by the solver so every vertex sums its own
//!   corrections and normals without write conflicts.
//!
//! # Neighbour slots
//!
//! For a triangle with sorted vertices `(min, median, max)`:
//!
//! | slot | edge |
//! |------|------|
//! | 0 | `(min, median)` |
//! | 1 | `(median, max)` |
//! | 2 | `(min, max)` |

use std::collections::HashMap;

use crate::error::TopologyError;
use crate::mesh::{Edge, Triangle, NONE};

/// Role of a vertex in an edge constraint, packed into the low two bits of a
/// gather reference.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstraintRole {
    /// `edge.vertices[0]`: stretch and bend.
    Endpoint0 = 0,
    /// `edge.vertices[1]`: stretch and bend.
    Endpoint1 = 1,
    /// `edge.opposite[0]`: bend only.
    Opposite0 = 2,
    /// `edge.opposite[1]`: bend only.
    Opposite1 = 3,
}

impl ConstraintRole {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => ConstraintRole::Endpoint0,
            1 => ConstraintRole::Endpoint1,
            2 => ConstraintRole::Opposite0,
            _ => ConstraintRole::Opposite1,
        }
    }
}

/// Pack an edge index and a role into one gather reference.
#[inline]
pub fn pack_ref(edge: u32, role: ConstraintRole) -> u32 {
    (edge << 2) | role as u32
}

/// Inverse of [`pack_ref`].
#[inline]
pub fn unpack_ref(packed: u32) -> (u32, ConstraintRole) {
    (packed >> 2, ConstraintRole::from_bits(packed))
}

/// Compressed per-vertex adjacency list.
///
/// Items for vertex `v` are `items[offsets[v]..offsets[v + 1]]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Csr {
    pub offsets: Vec<u32>,
    pub items: Vec<u32>,
}

impl Csr {
    fn from_buckets(buckets: Vec<Vec<u32>>) -> Self {
        let mut offsets = Vec::with_capacity(buckets.len() + 1);
        let mut items = Vec::with_capacity(buckets.iter().map(Vec::len).sum());
        offsets.push(0);
        for bucket in buckets {
            items.extend(bucket);
            offsets.push(items.len() as u32);
        }
        Self { offsets, items }
    }

    pub fn get(&self, v: usize) -> &[u32] {
        &self.items[self.offsets[v] as usize..self.offsets[v + 1] as usize]
    }
}

/// Adjacency structures for one cloth mesh. Immutable once built.
#[derive(Clone, Debug)]
pub struct Topology {
    pub num_vertices: usize,
    pub edges: Vec<Edge>,
    /// Edge index for each triangle slot.
    pub triangle_edges: Vec<[u32; 3]>,
    /// Neighbouring triangle for each triangle slot, or [`NONE`].
    pub triangle_neighbours: Vec<[i32; 3]>,
    /// Per vertex: packed `(edge, role)` references of every constraint that
    /// moves it.
    pub vertex_constraints: Csr,
    /// Per vertex: incident triangles.
    pub vertex_triangles: Csr,
}

/// Sort a triangle's vertices and return its three slot edges with the
/// vertex opposite each one.
fn slot_edges(tri: &Triangle) -> [((u32, u32), u32); 3] {
    let mut s = tri.vertices;
    s.sort_unstable();
    let [lo, mid, hi] = s;
    [((lo, mid), hi), ((mid, hi), lo), ((lo, hi), mid)]
}

fn validate(num_vertices: usize, triangles: &[Triangle]) -> Result<(), TopologyError> {
    for (t, tri) in triangles.iter().enumerate() {
        for &v in &tri.vertices {
            if v as usize >= num_vertices {
                return Err(TopologyError::VertexOutOfRange {
                    triangle: t as u32,
                    vertex: v,
                    vertex_count: num_vertices as u32,
                });
            }
        }
        let [a, b, c] = tri.vertices;
        if a == b || b == c || a == c {
            return Err(TopologyError::DegenerateTriangle { triangle: t as u32 });
        }
    }
    Ok(())
}

/// Build the constraint topology of a triangle mesh.
///
/// Fails on out-of-range indices, degenerate triangles and edges shared by
/// more than two triangles.
pub fn build_topology(num_vertices: usize, triangles: &[Triangle]) -> Result<Topology, TopologyError> {
    validate(num_vertices, triangles)?;

    let mut edges: Vec<Edge> = Vec::with_capacity(triangles.len() * 3 / 2 + 1);
    let mut edge_map: HashMap<(u32, u32), u32> = HashMap::with_capacity(triangles.len() * 2);
    let mut triangle_edges = Vec::with_capacity(triangles.len());

    for (t, tri) in triangles.iter().enumerate() {
        let t = t as i32;
        let mut slots = [0u32; 3];
        for (slot, ((a, b), opposite)) in slot_edges(tri).into_iter().enumerate() {
            let index = match edge_map.get(&(a, b)) {
                None => {
                    let index = edges.len() as u32;
                    edges.push(Edge {
                        vertices: [a, b],
                        triangles: [t, NONE],
                        opposite: [opposite as i32, NONE],
                        _pad: [0; 2],
                    });
                    edge_map.insert((a, b), index);
                    index
                }
                Some(&index) => {
                    let edge = &mut edges[index as usize];
                    if edge.triangles[1] != NONE {
                        return Err(TopologyError::NonManifoldEdge {
                            a,
                            b,
                            triangles: vec![edge.triangles[0] as u32, edge.triangles[1] as u32, t as u32],
                        });
                    }
                    edge.triangles[1] = t;
                    edge.opposite[1] = opposite as i32;
                    index
                }
            };
            slots[slot] = index;
        }
        triangle_edges.push(slots);
    }

    let triangle_neighbours: Vec<[i32; 3]> = triangle_edges
        .iter()
        .enumerate()
        .map(|(t, slots)| {
            slots.map(|e| {
                let edge = &edges[e as usize];
                if edge.triangles[0] == t as i32 {
                    edge.triangles[1]
                } else {
                    edge.triangles[0]
                }
            })
        })
        .collect();

    let mut constraint_buckets = vec![Vec::new(); num_vertices];
    for (e, edge) in edges.iter().enumerate() {
        let e = e as u32;
        constraint_buckets[edge.vertices[0] as usize].push(pack_ref(e, ConstraintRole::Endpoint0));
        constraint_buckets[edge.vertices[1] as usize].push(pack_ref(e, ConstraintRole::Endpoint1));
        if !edge.is_boundary() {
            constraint_buckets[edge.opposite[0] as usize].push(pack_ref(e, ConstraintRole::Opposite0));
            constraint_buckets[edge.opposite[1] as usize].push(pack_ref(e, ConstraintRole::Opposite1));
        }
    }

    let mut triangle_buckets = vec![Vec::new(); num_vertices];
    for (t, tri) in triangles.iter().enumerate() {
        for &v in &tri.vertices {
            triangle_buckets[v as usize].push(t as u32);
        }
    }

    let topology = Topology {
        num_vertices,
        edges,
        triangle_edges,
        triangle_neighbours,
        vertex_constraints: Csr::from_buckets(constraint_buckets),
        vertex_triangles: Csr::from_buckets(triangle_buckets),
    };
    debug_assert!(topology.is_symmetric(), "triangle adjacency is not symmetric");

    log::debug!(
        "Topology: {} vertices, {} triangles, {} edges ({} boundary)",
        num_vertices,
        triangles.len(),
        topology.edges.len(),
        topology.boundary_edge_count()
    );
    Ok(topology)
}

impl Topology {
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.triangle_edges.len()
    }

    /// Edges with a single owning triangle.
    pub fn boundary_edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_boundary()).count()
    }

    /// Every neighbour relation is mirrored across the same edge.
    pub fn is_symmetric(&self) -> bool {
        self.triangle_neighbours.iter().enumerate().all(|(t, neighbours)| {
            neighbours.iter().enumerate().all(|(slot, &n)| {
                if n == NONE {
                    return true;
                }
                let Some(other) = self.triangle_neighbours.get(n as usize) else {
                    return false;
                };
                let edge = self.triangle_edges[t][slot];
                self.triangle_edges[n as usize]
                    .iter()
                    .zip(other)
                    .any(|(&e, &back)| e == edge && back == t as i32)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::HostMesh;

    fn tetrahedron() -> Vec<Triangle> {
        vec![
            Triangle::new(0, 2, 1),
            Triangle::new(0, 1, 3),
            Triangle::new(1, 2, 3),
            Triangle::new(0, 3, 2),
        ]
    }

    #[test]
    fn test_single_triangle_is_all_boundary() {
        let topo = build_topology(3, &[Triangle::new(2, 0, 1)]).unwrap();
        assert_eq!(topo.num_edges(), 3);
        assert_eq!(topo.boundary_edge_count(), 3);
        assert_eq!(topo.triangle_neighbours[0], [NONE; 3]);
        // slot order (min, median), (median, max), (min, max)
        assert_eq!(topo.edges[0].vertices, [0, 1]);
        assert_eq!(topo.edges[1].vertices, [1, 2]);
        assert_eq!(topo.edges[2].vertices, [0, 2]);
        assert_eq!(topo.edges[0].opposite, [2, NONE]);
    }

    #[test]
    fn test_two_triangles_share_one_edge() {
        let topo = build_topology(4, &[Triangle::new(0, 1, 2), Triangle::new(1, 3, 2)]).unwrap();
        assert_eq!(topo.num_edges(), 5);
        assert_eq!(topo.boundary_edge_count(), 4);

        let shared = topo.edges.iter().find(|e| !e.is_boundary()).unwrap();
        assert_eq!(shared.vertices, [1, 2]);
        assert_eq!(shared.triangles, [0, 1]);
        assert_eq!(shared.opposite, [0, 3]);

        assert_eq!(topo.triangle_neighbours[0], [NONE, 1, NONE]);
        assert_eq!(topo.triangle_neighbours[1], [0, NONE, NONE]);
        assert!(topo.is_symmetric());
    }

    #[test]
    fn test_closed_mesh_has_no_boundary() {
        let topo = build_topology(4, &tetrahedron()).unwrap();
        assert_eq!(topo.num_edges(), 6);
        assert_eq!(topo.boundary_edge_count(), 0);
        assert!(topo.is_symmetric());
        for n in &topo.triangle_neighbours {
            assert!(n.iter().all(|&x| x != NONE));
        }
    }

    #[test]
    fn test_grid_boundary_count() {
        let mesh = HostMesh::grid(4, 3);
        let topo = build_topology(mesh.num_vertices(), &mesh.triangles).unwrap();
        assert_eq!(topo.boundary_edge_count(), 2 * (4 + 3));
        // V - E + F = 1 for a disk
        let euler = mesh.num_vertices() as i64 - topo.num_edges() as i64 + mesh.num_triangles() as i64;
        assert_eq!(euler, 1);
    }

    #[test]
    fn test_non_manifold_edge_is_rejected() {
        let tris = [Triangle::new(0, 1, 2), Triangle::new(0, 1, 3), Triangle::new(1, 0, 4)];
        let err = build_topology(5, &tris).unwrap_err();
        assert_eq!(
            err,
            TopologyError::NonManifoldEdge { a: 0, b: 1, triangles: vec![0, 1, 2] }
        );
    }

    #[test]
    fn test_invalid_indices_are_rejected() {
        assert!(matches!(
            build_topology(3, &[Triangle::new(0, 1, 3)]),
            Err(TopologyError::VertexOutOfRange { vertex: 3, .. })
        ));
        assert!(matches!(
            build_topology(3, &[Triangle::new(0, 1, 1)]),
            Err(TopologyError::DegenerateTriangle { triangle: 0 })
        ));
    }

    #[test]
    fn test_gather_lists_cover_every_constraint() {
        let mesh = HostMesh::grid(2, 2);
        let topo = build_topology(mesh.num_vertices(), &mesh.triangles).unwrap();

        let interior = topo.num_edges() - topo.boundary_edge_count();
        assert_eq!(topo.vertex_constraints.items.len(), 2 * topo.num_edges() + 2 * interior);
        assert_eq!(topo.vertex_triangles.items.len(), 3 * mesh.num_triangles());

        for v in 0..topo.num_vertices {
            for &packed in topo.vertex_constraints.get(v) {
                let (e, role) = unpack_ref(packed);
                let edge = &topo.edges[e as usize];
                let owner = match role {
                    ConstraintRole::Endpoint0 => edge.vertices[0] as i32,
                    ConstraintRole::Endpoint1 => edge.vertices[1] as i32,
                    ConstraintRole::Opposite0 => edge.opposite[0],
                    ConstraintRole::Opposite1 => edge.opposite[1],
                };
                assert_eq!(owner, v as i32);
            }
        }
    }

    #[test]
    fn test_pack_roundtrip() {
        let packed = pack_ref(12345, ConstraintRole::Opposite1);
        assert_eq!(unpack_ref(packed), (12345, ConstraintRole::Opposite1));
    }
}
