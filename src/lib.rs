//! # pbd-cloth
//!
//! Interactive cloth simulation with Position-Based Dynamics on the GPU.
//!
//! Triangle meshes marked as cloth are turned into stretch and bend
//! constraints, uploaded once, and advanced every frame by a chain of wgpu
//! compute kernels. The same pipeline runs on the host in [`CpuSolver`] for
//! headless runs and tests.
//!
//! ## Quick Start
//!
//! ```ignore
//! use pbd_cloth::prelude::*;
//!
//! let mesh = HostMesh::grid(20, 20);
//! let cloth = HostCloth::new("sheet", mesh, &[0, 20])?;
//! let mut solver = CpuSolver::from_cloths([cloth]);
//!
//! let params = ClothSimParams::default();
//! for _ in 0..100 {
//!     solver.step(&params, &[Plane::GROUND], None)?;
//! }
//! ```
//!
//! ## Frame Pipeline
//!
//! | Stage | Kernel | Notes |
//! |-------|--------|-------|
//! | Grab | `apply_grab` | pulls the grabbed vertex towards the cursor ray |
//! | Predict | `predict` | explicit Euler step under gravity |
//! | Correct ×N | `clip_planes`, `compute_corrections`, `apply_corrections` | Jacobi iteration, gathered per vertex |
//! | Finalize | `finalize` | commits positions, derives velocities |
//! | Normals | `update_normals` | area-weighted vertex normals |
//!
//! Corrections are gathered per vertex through a precomputed constraint
//! adjacency, so no two threads ever write the same vertex.
//!
//! ## Scenes
//!
//! Scenes are JSON documents; see [`scene`]. Cloth meshes are either OBJ
//! files or `builtin:grid:<cols>x<rows>` sheets.

pub mod app;
pub mod camera;
pub mod cloth;
pub mod constraints;
pub mod error;
pub mod gpu;
pub mod grid;
pub mod input;
pub mod interaction;
pub mod mesh;
pub mod params;
pub mod scene;
pub mod solver;
pub mod time;
pub mod topology;
pub mod ui;

pub use bytemuck;
pub use glam::{Vec2, Vec3, Vec4};

pub use camera::{Camera, Ray};
pub use cloth::HostCloth;
pub use constraints::Plane;
pub use error::{AppError, GpuError, MeshError, ParamsError, SceneError, SolverError, TextureError, TopologyError};
pub use gpu::{DeviceCloth, GpuSolver};
pub use interaction::{Interaction, PickHit};
pub use mesh::HostMesh;
pub use params::ClothSimParams;
pub use scene::{Scene, SceneDescription, TextureCache};
pub use solver::{ClothBackend, CpuSolver, SolverState};
pub use topology::{build_topology, Topology};

/// Common imports.
///
/// ```ignore
/// use pbd_cloth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::camera::{Camera, Ray};
    pub use crate::cloth::HostCloth;
    pub use crate::constraints::Plane;
    pub use crate::error::SolverError;
    pub use crate::gpu::{GpuContext, GpuSolver};
    pub use crate::interaction::{pick, Interaction};
    pub use crate::mesh::HostMesh;
    pub use crate::params::ClothSimParams;
    pub use crate::scene::{Scene, TextureCache};
    pub use crate::solver::{ClothBackend, CpuSolver, GrabRequest};
    pub use crate::{Vec2, Vec3, Vec4};
}
