//! Constraint solver.
//!
//! Both backends run the same per-frame pipeline on every cloth instance:
//!
//! 1. apply the interactive grab (if any)
//! 2. predict positions from velocity and gravity
//! 3. `num_sub_steps` times: clip to planes, gather corrections, apply them
//! 4. finalize positions and derive velocities
//! 5. recompute vertex normals
//!
//! [`CpuSolver`] runs it on host arrays; [`GpuSolver`](crate::gpu::GpuSolver)
//! records it as compute passes into a single submission.

mod cpu;

pub use cpu::{CpuCloth, CpuSolver};

use crate::camera::Ray;
use crate::constraints::Plane;
use crate::error::SolverError;
use crate::params::ClothSimParams;

/// Where the solver is within a frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SolverState {
    #[default]
    Idle,
    Predicting,
    Correcting { substep: u32 },
    Finalizing,
    /// Kernels or buffers failed to build. Steps are refused until a rebuild
    /// succeeds.
    Faulted(String),
}

impl SolverState {
    pub fn is_faulted(&self) -> bool {
        matches!(self, SolverState::Faulted(_))
    }
}

/// A vertex being dragged along the cursor ray this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrabRequest {
    pub instance: usize,
    pub vertex: u32,
    pub ray: Ray,
}

/// Operations the interaction layer and the app need from a solver backend.
pub trait ClothBackend {
    fn state(&self) -> &SolverState;

    fn num_instances(&self) -> usize;

    fn num_vertices(&self, instance: usize) -> usize;

    /// Run one frame on every instance.
    fn step(
        &mut self,
        params: &ClothSimParams,
        planes: &[Plane],
        grab: Option<&GrabRequest>,
    ) -> Result<(), SolverError>;

    /// Perpendicular distance from every vertex of `instance` to `ray`.
    fn ray_distances(&mut self, instance: usize, ray: &Ray) -> Result<Vec<f32>, SolverError>;

    /// Make a vertex immovable until the scene is reset.
    fn pin(&mut self, instance: usize, vertex: u32);
}
