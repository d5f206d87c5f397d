//! Device solver tests.
//!
//! These need a GPU adapter and return early without one, so they pass on
//! headless CI machines.

use pbd_cloth::gpu::{BufferOwner, GpuContext};
use pbd_cloth::prelude::*;

fn init_solver() -> Option<GpuSolver> {
    match pollster::block_on(GpuContext::headless()) {
        Ok((device, queue)) => Some(GpuSolver::new(device, queue)),
        Err(e) => {
            eprintln!("skipping GPU test: {}", e);
            None
        }
    }
}

fn hanging_sheet() -> HostCloth {
    let mut mesh = HostMesh::grid(4, 4);
    mesh.transform(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, 1.0);
    HostCloth::new("sheet", mesh, &[0, 4]).unwrap()
}

#[test]
fn test_kernels_build() {
    let Some(solver) = init_solver() else { return };
    assert!(!solver.state().is_faulted(), "{:?}", solver.state());
}

#[test]
fn test_pick_matches_host() {
    let Some(mut gpu) = init_solver() else { return };
    gpu.add(hanging_sheet()).unwrap();
    let mut cpu = CpuSolver::from_cloths([hanging_sheet()]);

    let ray = Ray::new(Vec3::new(0.1, 3.0, 0.2), Vec3::new(0.05, -1.0, 0.0));
    let device = gpu.ray_distances(0, &ray).unwrap();
    let host = cpu.ray_distances(0, &ray).unwrap();
    assert_eq!(device.len(), host.len());
    for (d, h) in device.iter().zip(&host) {
        assert!((d - h).abs() < 1e-4, "device {} vs host {}", d, h);
    }

    let device_hit = pick(&mut gpu, &ray).unwrap().unwrap();
    let host_hit = pick(&mut cpu, &ray).unwrap().unwrap();
    assert_eq!(device_hit.vertex, host_hit.vertex);
}

#[test]
fn test_pinned_vertices_hold_on_device() {
    let Some(mut solver) = init_solver() else { return };
    let cloth = hanging_sheet();
    let pinned = cloth.mesh.vertices[0].pos();
    let free = cloth.mesh.vertices[24].pos();
    solver.add(cloth).unwrap();

    for _ in 0..50 {
        solver.step(&ClothSimParams::default(), &[Plane::GROUND], None).unwrap();
    }
    assert_eq!(solver.cloths()[0].owner(), BufferOwner::Renderer);

    // A vertical ray through a vertex's starting point measures how far it
    // drifted sideways; a ray along x through the free corner measures sag.
    let distances = solver.ray_distances(0, &Ray::new(pinned + Vec3::Y, Vec3::NEG_Y)).unwrap();
    assert!(distances[0] < 1e-5, "pinned vertex drifted by {}", distances[0]);

    let distances = solver.ray_distances(0, &Ray::new(free, Vec3::X)).unwrap();
    assert!(distances[24] > 0.05, "free corner only moved {}", distances[24]);
}

#[test]
fn test_upload_returns_instance_index() {
    let Some(mut solver) = init_solver() else { return };
    assert_eq!(solver.add(hanging_sheet()).unwrap(), 0);
    assert_eq!(solver.add(hanging_sheet()).unwrap(), 1);
    assert_eq!(solver.num_vertices(1), 25);
}

#[test]
fn test_invalid_params_rejected_before_dispatch() {
    let Some(mut solver) = init_solver() else { return };
    solver.add(hanging_sheet()).unwrap();

    let params = ClothSimParams { delta_time: 0.0, ..Default::default() };
    let result = solver.step(&params, &[Plane::GROUND], None);
    assert!(matches!(result, Err(SolverError::Params(_))), "{:?}", result);
    assert!(!solver.state().is_faulted());
    assert_eq!(solver.cloths()[0].owner(), BufferOwner::Renderer);

    solver.step(&ClothSimParams::default(), &[Plane::GROUND], None).unwrap();
}
