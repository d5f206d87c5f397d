//! Benchmarks for cloth setup and the host solver.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;

use pbd_cloth::prelude::*;
use pbd_cloth::topology::build_topology;

fn sheet(n: u32) -> HostMesh {
    let mut mesh = HostMesh::grid(n, n);
    mesh.transform(Vec3::new(0.0, 2.0, 0.0), Vec3::ZERO, 2.0);
    mesh
}

fn bench_topology(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_topology");

    for n in [16u32, 64, 128] {
        let mesh = sheet(n);
        group.bench_with_input(BenchmarkId::new("grid", n), &mesh, |b, mesh| {
            b.iter(|| black_box(build_topology(mesh.num_vertices(), &mesh.triangles)))
        });
    }

    group.finish();
}

fn bench_cloth_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("cloth_setup");

    for n in [16u32, 64] {
        let mesh = sheet(n);
        group.bench_with_input(BenchmarkId::new("grid", n), &mesh, |b, mesh| {
            b.iter(|| black_box(HostCloth::new("sheet", mesh.clone(), &[0, n])))
        });
    }

    group.finish();
}

fn bench_cpu_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_frame");
    let planes = [Plane::GROUND];

    for sub_steps in [5u32, 20] {
        let params = ClothSimParams { num_sub_steps: sub_steps, ..Default::default() };
        group.bench_with_input(BenchmarkId::new("substeps", sub_steps), &params, |b, params| {
            let cloth = HostCloth::new("sheet", sheet(32), &[0, 32]).unwrap();
            let mut solver = CpuSolver::from_cloths([cloth]);
            b.iter(|| black_box(solver.step(params, &planes, None)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_topology, bench_cloth_setup, bench_cpu_frame);
criterion_main!(benches);
