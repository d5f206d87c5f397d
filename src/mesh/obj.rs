//! Minimal Wavefront OBJ reader.
//!
//! Supports `v`, `vt`, `vn` and `f` records. Polygons are fan-triangulated and
//! identical `(position, uv, normal)` index triples are merged into a single
//! vertex. Everything else (materials, groups, smoothing) is ignored.

use std::collections::HashMap;
use std::path::Path;

use glam::{Vec2, Vec3};

use super::{HostMesh, Triangle, Vertex};
use crate::error::MeshError;

/// Read and parse an OBJ file.
pub fn load_obj(path: &Path) -> Result<HostMesh, MeshError> {
    let source = std::fs::read_to_string(path).map_err(|source| MeshError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mesh = parse_obj(&source)?;
    log::info!(
        "Loaded {} ({} vertices, {} triangles)",
        path.display(),
        mesh.num_vertices(),
        mesh.num_triangles()
    );
    Ok(mesh)
}

/// Parse OBJ text into a mesh.
pub fn parse_obj(source: &str) -> Result<HostMesh, MeshError> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut tex_coords: Vec<Vec2> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();

    let mut vertices = Vec::new();
    let mut triangles = Vec::new();
    let mut lookup: HashMap<(usize, Option<usize>, Option<usize>), u32> = HashMap::new();
    let mut has_normals = true;

    for (line_idx, raw) in source.lines().enumerate() {
        let line_no = line_idx + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        let mut parts = line.split_whitespace();
        let Some(tag) = parts.next() else { continue };

        match tag {
            "v" => positions.push(parse_vec3(&mut parts, line_no)?),
            "vn" => normals.push(parse_vec3(&mut parts, line_no)?),
            "vt" => {
                let u = parse_f32(parts.next(), line_no)?;
                let v = parse_f32(parts.next(), line_no)?;
                tex_coords.push(Vec2::new(u, v));
            }
            "f" => {
                let mut corners = Vec::with_capacity(4);
                for token in parts {
                    let key = parse_corner(
                        token,
                        line_no,
                        positions.len(),
                        tex_coords.len(),
                        normals.len(),
                    )?;
                    let index = *lookup.entry(key).or_insert_with(|| {
                        let (p, t, n) = key;
                        has_normals &= n.is_some();
                        vertices.push(Vertex::new(
                            positions[p],
                            n.map(|n| normals[n]).unwrap_or(Vec3::ZERO),
                            t.map(|t| tex_coords[t]).unwrap_or(Vec2::ZERO),
                        ));
                        (vertices.len() - 1) as u32
                    });
                    corners.push(index);
                }
                if corners.len() < 3 {
                    return Err(MeshError::Parse {
                        line: line_no,
                        message: format!("face has {} corners", corners.len()),
                    });
                }
                for i in 1..corners.len() - 1 {
                    triangles.push(Triangle::new(corners[0], corners[i], corners[i + 1]));
                }
            }
            _ => {}
        }
    }

    if triangles.is_empty() {
        return Err(MeshError::Empty);
    }

    let mut mesh = HostMesh::new(vertices, triangles);
    if !has_normals {
        mesh.recompute_normals();
    }
    Ok(mesh)
}

fn parse_f32(token: Option<&str>, line: usize) -> Result<f32, MeshError> {
    let token = token.ok_or_else(|| MeshError::Parse {
        line,
        message: "missing component".into(),
    })?;
    token.parse().map_err(|_| MeshError::Parse {
        line,
        message: format!("'{}' is not a number", token),
    })
}

fn parse_vec3<'a>(parts: &mut impl Iterator<Item = &'a str>, line: usize) -> Result<Vec3, MeshError> {
    Ok(Vec3::new(
        parse_f32(parts.next(), line)?,
        parse_f32(parts.next(), line)?,
        parse_f32(parts.next(), line)?,
    ))
}

/// Resolve a 1-based (or negative, relative) OBJ index.
fn resolve_index(token: &str, len: usize, line: usize) -> Result<usize, MeshError> {
    let bad = || MeshError::Parse {
        line,
        message: format!("invalid index '{}'", token),
    };
    let raw: i64 = token.parse().map_err(|_| bad())?;
    let resolved = if raw > 0 { raw - 1 } else { len as i64 + raw };
    if raw == 0 || resolved < 0 || resolved >= len as i64 {
        return Err(bad());
    }
    Ok(resolved as usize)
}

fn parse_corner(
    token: &str,
    line: usize,
    num_positions: usize,
    num_tex_coords: usize,
    num_normals: usize,
) -> Result<(usize, Option<usize>, Option<usize>), MeshError> {
    let mut fields = token.split('/');
    let p = resolve_index(fields.next().unwrap_or(""), num_positions, line)?;
    let t = match fields.next() {
        Some(s) if !s.is_empty() => Some(resolve_index(s, num_tex_coords, line)?),
        _ => None,
    };
    let n = match fields.next() {
        Some(s) if !s.is_empty() => Some(resolve_index(s, num_normals, line)?),
        _ => None,
    };
    Ok((p, t, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# unit quad
v 0 0 0
v 1 0 0
v 1 0 1
v 0 0 1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 1 0
f 1/1/1 4/4/1 3/3/1 2/2/1
";

    #[test]
    fn test_quad_is_fan_triangulated() {
        let mesh = parse_obj(QUAD).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_triangles(), 2);
        assert_eq!(mesh.triangles[0].vertices, [0, 1, 2]);
        assert_eq!(mesh.triangles[1].vertices, [0, 2, 3]);
        assert_eq!(mesh.vertices[2].tex_coord, [1.0, 1.0]);
    }

    #[test]
    fn test_shared_corners_are_merged() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nf 1 2 3\nf 2 4 3\n";
        let mesh = parse_obj(src).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_triangles(), 2);
    }

    #[test]
    fn test_missing_normals_are_computed() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = parse_obj(src).unwrap();
        for v in &mesh.vertices {
            assert_eq!(v.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_negative_indices() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = parse_obj(src).unwrap();
        assert_eq!(mesh.triangles[0].vertices, [0, 1, 2]);
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        match parse_obj("v 0 0 0\nv 1 0 x\n") {
            Err(MeshError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
        match parse_obj("v 0 0 0\nf 1 2 3\n") {
            Err(MeshError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(matches!(parse_obj("v 0 0 0\n"), Err(MeshError::Empty)));
    }
}
