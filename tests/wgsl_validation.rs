//! Integration tests for the bundled shaders.
//!
//! Every WGSL source the crate can hand to wgpu is parsed and validated
//! with naga, so shader regressions show up without an adapter.

use std::path::Path;

use pbd_cloth::gpu::{
    marker_shader_source, mesh_shader_source, CHECKERBOARD_WGSL, CLOTH_KERNELS_WGSL, MESH_WGSL,
};
use pbd_cloth::mesh::Vertex;

// ============================================================================
// Helpers
// ============================================================================

fn validate(label: &str, source: &str) -> Result<naga::Module, String> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| format!("{}: WGSL parse error: {}", label, e.emit_to_string(source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("{}: WGSL validation error: {:?}", label, e))?;

    Ok(module)
}

fn entry_points(module: &naga::Module) -> Vec<(&str, naga::ShaderStage)> {
    module.entry_points.iter().map(|ep| (ep.name.as_str(), ep.stage)).collect()
}

// ============================================================================
// Solver Kernels
// ============================================================================

#[test]
fn test_cloth_kernels_validate() {
    let module = validate("cloth kernels", CLOTH_KERNELS_WGSL).unwrap();
    let entries = entry_points(&module);

    for name in [
        "apply_grab",
        "predict",
        "clip_planes",
        "compute_corrections",
        "apply_corrections",
        "finalize",
        "update_normals",
        "pick_distance",
    ] {
        assert!(
            entries.contains(&(name, naga::ShaderStage::Compute)),
            "missing compute entry point {}",
            name
        );
    }
}

#[test]
fn test_kernel_vertex_struct_matches_host_layout() {
    assert!(CLOTH_KERNELS_WGSL.contains(Vertex::WGSL_STRUCT));
    assert_eq!(std::mem::size_of::<Vertex>(), 64);
}

// ============================================================================
// Render Programs
// ============================================================================

fn assert_render_program(label: &str, source: &str) {
    let module = validate(label, source).unwrap();
    let entries = entry_points(&module);
    assert!(entries.contains(&("vs_main", naga::ShaderStage::Vertex)), "{}: no vs_main", label);
    assert!(entries.contains(&("fs_main", naga::ShaderStage::Fragment)), "{}: no fs_main", label);
}

#[test]
fn test_phong_program_validates() {
    assert_render_program("phong", &mesh_shader_source(MESH_WGSL));
}

#[test]
fn test_checkerboard_program_validates() {
    assert_render_program("checkerboard", &mesh_shader_source(CHECKERBOARD_WGSL));
}

#[test]
fn test_marker_program_validates() {
    assert_render_program("marker", &marker_shader_source());
}

#[test]
fn test_asset_shaders_validate_with_prelude() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/shaders");

    let vertex = std::fs::read_to_string(dir.join("normals.vert.wgsl")).unwrap();
    let module = validate("normals.vert", &mesh_shader_source(&vertex)).unwrap();
    assert!(entry_points(&module).contains(&("vs_main", naga::ShaderStage::Vertex)));

    let fragment = std::fs::read_to_string(dir.join("normals.frag.wgsl")).unwrap();
    let module = validate("normals.frag", &mesh_shader_source(&fragment)).unwrap();
    assert!(entry_points(&module).contains(&("fs_main", naga::ShaderStage::Fragment)));
}

#[test]
fn test_broken_program_is_rejected() {
    let source = mesh_shader_source("@vertex fn vs_main(in: VertexInput) -> VertexOutput { return 1.0; }");
    assert!(validate("broken", &source).is_err());
}
