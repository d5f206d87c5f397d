//! Host reference backend.

use glam::Vec3;

use super::{ClothBackend, GrabRequest, SolverState};
use crate::camera::Ray;
use crate::cloth::{ClothEdgeData, ClothTriangleData, ClothVertexData, HostCloth};
use crate::constraints::{self, Plane};
use crate::error::SolverError;
use crate::interaction::GRAB_PULL_FRACTION;
use crate::mesh::{Triangle, Vertex};
use crate::params::ClothSimParams;
use crate::topology::{unpack_ref, ConstraintRole, Topology};

/// Committed host stage of a cloth instance, with solver scratch arrays.
#[derive(Clone, Debug)]
pub struct CpuCloth {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
    pub topology: Topology,
    pub vertex_data: Vec<ClothVertexData>,
    pub edge_data: Vec<ClothEdgeData>,
    pub triangle_data: Vec<ClothTriangleData>,
    pub velocities: Vec<Vec3>,
    predicted: Vec<Vec3>,
    corrections: Vec<Vec3>,
}

impl CpuCloth {
    pub fn from_host(host: HostCloth) -> Self {
        let n = host.num_vertices();
        Self {
            name: host.name,
            vertices: host.mesh.vertices,
            triangles: host.mesh.triangles,
            topology: host.topology,
            vertex_data: host.vertex_data,
            edge_data: host.edge_data,
            triangle_data: host.triangle_data,
            velocities: vec![Vec3::ZERO; n],
            predicted: vec![Vec3::ZERO; n],
            corrections: vec![Vec3::ZERO; n],
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn position(&self, vertex: usize) -> Vec3 {
        self.vertices[vertex].pos()
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.vertices.iter().map(Vertex::pos).collect()
    }

    fn apply_grab(&mut self, vertex: u32, ray: &Ray) {
        let Some(v) = self.vertices.get_mut(vertex as usize) else {
            return;
        };
        let p = v.pos();
        v.set_pos(p + GRAB_PULL_FRACTION * (ray.closest_point(p) - p));
        self.velocities[vertex as usize] = Vec3::ZERO;
    }

    fn predict(&mut self, dt: f32) {
        for i in 0..self.vertices.len() {
            self.predicted[i] = constraints::predict(
                self.vertices[i].pos(),
                self.velocities[i],
                self.vertex_data[i].inv_mass,
                dt,
            );
            self.corrections[i] = Vec3::ZERO;
        }
    }

    fn clip(&mut self, planes: &[Plane]) {
        for (p, data) in self.predicted.iter_mut().zip(&self.vertex_data) {
            if data.is_pinned() {
                continue;
            }
            for plane in planes {
                *p = constraints::clip_to_plane(*p, plane);
            }
        }
    }

    /// Correction contribution of one edge constraint to the vertex playing
    /// `role` in it.
    fn edge_contribution(&self, edge_index: u32, role: ConstraintRole, params: &ClothSimParams) -> Vec3 {
        let edge = &self.topology.edges[edge_index as usize];
        let data = &self.edge_data[edge_index as usize];
        let [i0, i1] = edge.vertices.map(|v| v as usize);
        let mut sum = Vec3::ZERO;

        if matches!(role, ConstraintRole::Endpoint0 | ConstraintRole::Endpoint1) {
            let dp = constraints::stretch_corrections(
                self.predicted[i0],
                self.predicted[i1],
                self.vertex_data[i0].inv_mass,
                self.vertex_data[i1].inv_mass,
                data.rest_length,
                params.k_stretch,
            );
            sum += dp[role as usize];
        }

        if !edge.is_boundary() {
            let ids = [i0, i1, edge.opposite[0] as usize, edge.opposite[1] as usize];
            let dp = constraints::bend_corrections(
                ids.map(|i| self.predicted[i]),
                ids.map(|i| self.vertex_data[i].inv_mass),
                data.rest_angle,
                params.k_bend,
            );
            sum += dp[role as usize];
        }
        sum
    }

    fn compute_corrections(&mut self, params: &ClothSimParams) {
        let corrections: Vec<Vec3> = (0..self.vertices.len())
            .map(|i| {
                self.topology
                    .vertex_constraints
                    .get(i)
                    .iter()
                    .map(|&packed| {
                        let (edge, role) = unpack_ref(packed);
                        self.edge_contribution(edge, role, params)
                    })
                    .sum()
            })
            .collect();
        self.corrections = corrections;
    }

    fn apply_corrections(&mut self) {
        for (p, dp) in self.predicted.iter_mut().zip(&mut self.corrections) {
            *p += *dp;
            *dp = Vec3::ZERO;
        }
    }

    fn finalize(&mut self, dt: f32) {
        for i in 0..self.vertices.len() {
            let (x, v) = constraints::finalize(self.vertices[i].pos(), self.predicted[i], dt);
            self.vertices[i].set_pos(x);
            self.velocities[i] = v;
        }
    }

    fn update_normals(&mut self) {
        let normals: Vec<Vec3> = (0..self.vertices.len())
            .map(|i| {
                self.topology
                    .vertex_triangles
                    .get(i)
                    .iter()
                    .map(|&t| {
                        let [a, b, c] = self.triangles[t as usize].vertices.map(|v| self.vertices[v as usize].pos());
                        (b - a).cross(c - a)
                    })
                    .sum()
            })
            .collect();
        for (vertex, n) in self.vertices.iter_mut().zip(normals) {
            if n.length() > constraints::EPSILON {
                vertex.normal = n.normalize().to_array();
            }
        }
    }
}

/// Runs the solver pipeline on the host.
#[derive(Debug, Default)]
pub struct CpuSolver {
    cloths: Vec<CpuCloth>,
    state: SolverState,
}

impl CpuSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cloths(cloths: impl IntoIterator<Item = HostCloth>) -> Self {
        let mut solver = Self::new();
        for cloth in cloths {
            solver.add(cloth);
        }
        solver
    }

    /// Commit a host cloth to this backend.
    pub fn add(&mut self, cloth: HostCloth) -> usize {
        self.cloths.push(CpuCloth::from_host(cloth));
        self.cloths.len() - 1
    }

    pub fn cloths(&self) -> &[CpuCloth] {
        &self.cloths
    }

    pub fn cloth(&self, instance: usize) -> Option<&CpuCloth> {
        self.cloths.get(instance)
    }

    /// Run the correction loop once on every cloth without predicting or
    /// finalizing, starting from the current positions.
    pub fn substep_in_place(&mut self, params: &ClothSimParams) {
        for cloth in &mut self.cloths {
            for i in 0..cloth.vertices.len() {
                cloth.predicted[i] = cloth.vertices[i].pos();
            }
            cloth.compute_corrections(params);
            cloth.apply_corrections();
            for i in 0..cloth.vertices.len() {
                let p = cloth.predicted[i];
                cloth.vertices[i].set_pos(p);
            }
        }
    }
}

impl ClothBackend for CpuSolver {
    fn state(&self) -> &SolverState {
        &self.state
    }

    fn num_instances(&self) -> usize {
        self.cloths.len()
    }

    fn num_vertices(&self, instance: usize) -> usize {
        self.cloths.get(instance).map_or(0, CpuCloth::num_vertices)
    }

    fn step(
        &mut self,
        params: &ClothSimParams,
        planes: &[Plane],
        grab: Option<&GrabRequest>,
    ) -> Result<(), SolverError> {
        params.validate()?;
        if let SolverState::Faulted(msg) = &self.state {
            return Err(SolverError::Faulted(msg.clone()));
        }
        let dt = params.delta_time;

        if let Some(grab) = grab {
            if let Some(cloth) = self.cloths.get_mut(grab.instance) {
                cloth.apply_grab(grab.vertex, &grab.ray);
            }
        }

        self.state = SolverState::Predicting;
        for cloth in &mut self.cloths {
            cloth.predict(dt);
        }

        for substep in 0..params.num_sub_steps {
            self.state = SolverState::Correcting { substep };
            for cloth in &mut self.cloths {
                cloth.clip(planes);
                cloth.compute_corrections(params);
                cloth.apply_corrections();
            }
        }

        self.state = SolverState::Finalizing;
        for cloth in &mut self.cloths {
            cloth.finalize(dt);
            cloth.update_normals();
        }

        self.state = SolverState::Idle;
        log::trace!("CPU step: {} cloths, {} substeps", self.cloths.len(), params.num_sub_steps);
        Ok(())
    }

    fn ray_distances(&mut self, instance: usize, ray: &Ray) -> Result<Vec<f32>, SolverError> {
        Ok(self
            .cloths
            .get(instance)
            .map(|c| c.vertices.iter().map(|v| ray.distance_to_point(v.pos())).collect())
            .unwrap_or_default())
    }

    fn pin(&mut self, instance: usize, vertex: u32) {
        if let Some(data) = self
            .cloths
            .get_mut(instance)
            .and_then(|c| c.vertex_data.get_mut(vertex as usize))
        {
            data.inv_mass = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::HostMesh;

    fn hanging_sheet() -> CpuSolver {
        let mut mesh = HostMesh::grid(4, 4);
        mesh.transform(Vec3::new(0.0, 2.0, 0.0), Vec3::new(90.0, 0.0, 0.0), 1.0);
        let pinned: Vec<u32> = (0..5).collect();
        CpuSolver::from_cloths([HostCloth::new("sheet", mesh, &pinned).unwrap()])
    }

    #[test]
    fn test_step_returns_to_idle() {
        let mut solver = hanging_sheet();
        solver.step(&ClothSimParams::default(), &[Plane::GROUND], None).unwrap();
        assert_eq!(solver.state(), &SolverState::Idle);
    }

    #[test]
    fn test_faulted_refuses_step() {
        let mut solver = hanging_sheet();
        solver.state = SolverState::Faulted("no kernels".into());
        let before = solver.cloths()[0].positions();
        let result = solver.step(&ClothSimParams::default(), &[], None);
        assert!(matches!(result, Err(SolverError::Faulted(_))));
        assert_eq!(solver.cloths()[0].positions(), before);
    }

    #[test]
    fn test_invalid_params_leave_cloth_untouched() {
        let mut solver = hanging_sheet();
        let before = solver.cloths()[0].positions();

        for params in [
            ClothSimParams { delta_time: 0.0, ..Default::default() },
            ClothSimParams { num_sub_steps: 0, ..Default::default() },
            ClothSimParams { k_bend: f32::NAN, ..Default::default() },
        ] {
            let result = solver.step(&params, &[Plane::GROUND], None);
            assert!(matches!(result, Err(SolverError::Params(_))));
        }
        assert_eq!(solver.cloths()[0].positions(), before);
        assert_eq!(solver.state(), &SolverState::Idle);

        solver.step(&ClothSimParams::default(), &[Plane::GROUND], None).unwrap();
        assert!(solver.cloths()[0].positions().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_ground_plane_holds_cloth() {
        let mesh = HostMesh::grid(3, 3);
        let mut solver = CpuSolver::from_cloths([HostCloth::new("floor", mesh, &[]).unwrap()]);
        let params = ClothSimParams::default();
        for _ in 0..50 {
            solver.step(&params, &[Plane::GROUND], None).unwrap();
        }
        for p in solver.cloths()[0].positions() {
            assert!(p.y >= -1e-5, "vertex fell through the ground: {}", p);
        }
    }

    #[test]
    fn test_velocity_matches_displacement() {
        let mut solver = hanging_sheet();
        let params = ClothSimParams::default();
        let before = solver.cloths()[0].positions();
        solver.step(&params, &[], None).unwrap();
        let cloth = &solver.cloths()[0];
        for (i, p) in cloth.positions().iter().enumerate() {
            let expected = (*p - before[i]) / params.delta_time;
            assert!((cloth.velocities[i] - expected).length() < 1e-3);
        }
    }

    #[test]
    fn test_grab_pulls_towards_ray() {
        let mut solver = hanging_sheet();
        let vertex = 24u32;
        let start = solver.cloths()[0].position(vertex as usize);
        // Ray passing one unit above the vertex
        let grab = GrabRequest { instance: 0, vertex, ray: Ray::new(start + Vec3::Y, Vec3::Z) };
        let params = ClothSimParams { k_stretch: 0.0, k_bend: 0.0, ..Default::default() };

        solver.step(&params, &[], Some(&grab)).unwrap();
        let after = solver.cloths()[0].position(vertex as usize);
        assert!(after.y > start.y + 0.7, "grabbed vertex moved from {} to {}", start, after);
    }

    #[test]
    fn test_pin_freezes_vertex() {
        let mut solver = hanging_sheet();
        solver.pin(0, 24);
        let start = solver.cloths()[0].position(24);
        for _ in 0..10 {
            solver.step(&ClothSimParams::default(), &[], None).unwrap();
        }
        assert_eq!(solver.cloths()[0].position(24), start);
    }

    #[test]
    fn test_ray_distances_for_missing_instance() {
        let mut solver = CpuSolver::new();
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(solver.ray_distances(3, &ray).unwrap().is_empty());
    }
}
