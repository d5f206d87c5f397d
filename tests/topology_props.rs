//! Property-based tests for constraint topology using proptest
//!
//! Meshes are random subsets of grid sheets with shuffled vertex numbering,
//! which keeps every edge shared by at most two triangles:
//! - Neighbour relations are mirrored across the same edge
//! - Boundary edges are exactly the edges owned by one triangle
//! - Every edge constraint is gathered by each vertex it moves

use pbd_cloth::mesh::{HostMesh, Triangle, NONE};
use pbd_cloth::topology::{build_topology, unpack_ref, ConstraintRole};
use proptest::prelude::*;
use std::collections::HashMap;

const MAX_COLS: u32 = 8;
const MAX_ROWS: u32 = 8;

/// A grid sheet with some triangles removed and vertices renumbered.
fn manifold_mesh() -> impl Strategy<Value = (usize, Vec<Triangle>)> {
    (1..=MAX_COLS, 1..=MAX_ROWS).prop_flat_map(|(cols, rows)| {
        let grid = HostMesh::grid(cols, rows);
        let num_vertices = grid.num_vertices();
        let num_triangles = grid.num_triangles();
        (
            Just(grid.triangles),
            proptest::collection::vec(any::<bool>(), num_triangles),
            Just((0..num_vertices as u32).collect::<Vec<_>>()).prop_shuffle(),
        )
            .prop_map(move |(triangles, keep, permutation)| {
                let triangles = triangles
                    .into_iter()
                    .zip(keep)
                    .filter(|(_, keep)| *keep)
                    .map(|(tri, _)| Triangle { vertices: tri.vertices.map(|v| permutation[v as usize]) })
                    .collect();
                (num_vertices, triangles)
            })
    })
}

/// Number of triangles using each unordered vertex pair.
fn edge_use_counts(triangles: &[Triangle]) -> HashMap<(u32, u32), usize> {
    let mut counts = HashMap::new();
    for tri in triangles {
        let [a, b, c] = tri.vertices;
        for (x, y) in [(a, b), (b, c), (c, a)] {
            *counts.entry((x.min(y), x.max(y))).or_insert(0) += 1;
        }
    }
    counts
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn neighbours_are_symmetric((num_vertices, triangles) in manifold_mesh()) {
        let topology = build_topology(num_vertices, &triangles).unwrap();
        prop_assert!(topology.is_symmetric());

        for (t, neighbours) in topology.triangle_neighbours.iter().enumerate() {
            for (slot, &n) in neighbours.iter().enumerate() {
                if n == NONE {
                    continue;
                }
                prop_assert_ne!(n as usize, t);
                let edge = topology.triangle_edges[t][slot];
                let back = topology.triangle_edges[n as usize].iter().position(|&e| e == edge);
                prop_assert!(back.is_some());
                prop_assert_eq!(topology.triangle_neighbours[n as usize][back.unwrap()], t as i32);
            }
        }
    }

    #[test]
    fn boundary_edges_match_single_use((num_vertices, triangles) in manifold_mesh()) {
        let topology = build_topology(num_vertices, &triangles).unwrap();
        let counts = edge_use_counts(&triangles);

        prop_assert_eq!(topology.num_edges(), counts.len());
        prop_assert_eq!(
            topology.boundary_edge_count(),
            counts.values().filter(|&&c| c == 1).count()
        );

        let open_slots = topology
            .triangle_neighbours
            .iter()
            .flatten()
            .filter(|&&n| n == NONE)
            .count();
        prop_assert_eq!(open_slots, topology.boundary_edge_count());
    }

    #[test]
    fn constraints_gathered_by_every_moved_vertex((num_vertices, triangles) in manifold_mesh()) {
        let topology = build_topology(num_vertices, &triangles).unwrap();

        let mut expected = 0;
        for edge in &topology.edges {
            expected += if edge.is_boundary() { 2 } else { 4 };
        }
        prop_assert_eq!(topology.vertex_constraints.items.len(), expected);

        for v in 0..num_vertices {
            for &packed in topology.vertex_constraints.get(v) {
                let (e, role) = unpack_ref(packed);
                let edge = &topology.edges[e as usize];
                let owner = match role {
                    ConstraintRole::Endpoint0 => edge.vertices[0] as i64,
                    ConstraintRole::Endpoint1 => edge.vertices[1] as i64,
                    ConstraintRole::Opposite0 => edge.opposite[0] as i64,
                    ConstraintRole::Opposite1 => edge.opposite[1] as i64,
                };
                prop_assert_eq!(owner, v as i64);
            }
        }
    }
}
