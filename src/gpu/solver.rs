//! Device backend of the constraint solver.
//!
//! All passes of a frame go into one command encoder and one submission.
//! The control thread then blocks until the queue reports the work done,
//! which is the only suspension point of the frame. Until then every
//! cloth's shared buffers are leased to the solver.

use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use super::cloth_buffers::{ClothLayouts, DeviceCloth, StepUniforms, MAX_PLANES, NO_GRAB};
use super::{await_buffer_map, capture_device_errors, capture_validation};
use crate::camera::Ray;
use crate::cloth::HostCloth;
use crate::constraints::{Plane, GRAVITY};
use crate::error::{GpuError, SolverError};
use crate::interaction::GRAB_PULL_FRACTION;
use crate::params::ClothSimParams;
use crate::solver::{ClothBackend, GrabRequest, SolverState};

/// Embedded kernel source.
pub const CLOTH_KERNELS_WGSL: &str = include_str!("cloth.wgsl");

const WORKGROUP_SIZE: u32 = 64;

/// One compute pipeline per kernel entry point.
struct Kernels {
    apply_grab: wgpu::ComputePipeline,
    predict: wgpu::ComputePipeline,
    clip_planes: wgpu::ComputePipeline,
    compute_corrections: wgpu::ComputePipeline,
    apply_corrections: wgpu::ComputePipeline,
    finalize: wgpu::ComputePipeline,
    update_normals: wgpu::ComputePipeline,
    pick_distance: wgpu::ComputePipeline,
}

impl Kernels {
    fn build(device: &wgpu::Device, layouts: &ClothLayouts, source: &str) -> Result<Self, GpuError> {
        capture_validation(device, "cloth kernels", || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Cloth Kernels"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Cloth Kernel Layout"),
                bind_group_layouts: &[&layouts.topology, &layouts.simulation, &layouts.uniforms],
                push_constant_ranges: &[],
            });
            let make = |entry: &str| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry),
                    layout: Some(&layout),
                    module: &module,
                    entry_point: Some(entry),
                    compilation_options: Default::default(),
                    cache: None,
                })
            };
            Kernels {
                apply_grab: make("apply_grab"),
                predict: make("predict"),
                clip_planes: make("clip_planes"),
                compute_corrections: make("compute_corrections"),
                apply_corrections: make("apply_corrections"),
                finalize: make("finalize"),
                update_normals: make("update_normals"),
                pick_distance: make("pick_distance"),
            }
        })
    }
}

fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    cloth: &DeviceCloth,
    workgroups: u32,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, &cloth.topology_bind_group, &[]);
    pass.set_bind_group(1, &cloth.simulation_bind_group, &[]);
    pass.set_bind_group(2, &cloth.uniform_bind_group, &[]);
    pass.dispatch_workgroups(workgroups, 1, 1);
}

/// Workgroups needed to cover `num_vertices`, or an error when a single
/// dispatch dimension cannot hold them.
fn workgroup_count(name: &str, num_vertices: u32, max_per_dimension: u32) -> Result<u32, SolverError> {
    let groups = num_vertices.div_ceil(WORKGROUP_SIZE);
    if groups > max_per_dimension {
        return Err(SolverError::TooManyVertices {
            name: name.to_string(),
            vertices: num_vertices,
            max_vertices: max_per_dimension as u64 * WORKGROUP_SIZE as u64,
        });
    }
    Ok(groups)
}

/// Block until everything submitted so far has finished.
fn wait_idle(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<(), GpuError> {
    let (tx, rx) = mpsc::channel();
    queue.on_submitted_work_done(move || {
        let _ = tx.send(());
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv().map_err(|_| GpuError::DeviceLost)
}

/// GPU constraint solver owning the device stage of every cloth instance.
pub struct GpuSolver {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    layouts: ClothLayouts,
    kernels: Option<Kernels>,
    cloths: Vec<DeviceCloth>,
    state: SolverState,
    /// Optional on-disk kernel source used by [`GpuSolver::reload_kernels`].
    kernel_path: Option<PathBuf>,
}

impl GpuSolver {
    /// Build the kernels. A build failure leaves the solver `Faulted`.
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let layouts = ClothLayouts::new(&device);
        let mut solver = Self {
            device,
            queue,
            layouts,
            kernels: None,
            cloths: Vec::new(),
            state: SolverState::Idle,
            kernel_path: None,
        };
        solver.build_kernels(CLOTH_KERNELS_WGSL);
        solver
    }

    pub fn with_kernel_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kernel_path = Some(path.into());
        self
    }

    fn build_kernels(&mut self, source: &str) {
        match Kernels::build(&self.device, &self.layouts, source) {
            Ok(kernels) => {
                self.kernels = Some(kernels);
                self.state = SolverState::Idle;
                log::info!("Cloth kernels built");
            }
            Err(e) => {
                log::error!("{}", e);
                self.kernels = None;
                self.state = SolverState::Faulted(e.to_string());
            }
        }
    }

    /// Rebuild the kernels from the kernel file if set, else from the
    /// embedded source.
    pub fn reload_kernels(&mut self) -> Result<(), SolverError> {
        let source = match &self.kernel_path {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(src) => src,
                Err(e) => {
                    log::warn!("Could not read {}: {}; using embedded kernels", path.display(), e);
                    CLOTH_KERNELS_WGSL.to_string()
                }
            },
            None => CLOTH_KERNELS_WGSL.to_string(),
        };
        self.build_kernels(&source);
        match &self.state {
            SolverState::Faulted(msg) => Err(SolverError::Faulted(msg.clone())),
            _ => Ok(()),
        }
    }

    /// Commit a host cloth to the device.
    pub fn add(&mut self, cloth: HostCloth) -> Result<usize, SolverError> {
        let max_groups = self.device.limits().max_compute_workgroups_per_dimension;
        workgroup_count(&cloth.name, cloth.num_vertices() as u32, max_groups)?;

        let label = format!("upload '{}'", cloth.name);
        let uploaded = capture_device_errors(&self.device, &label, || {
            cloth.upload(&self.device, &self.layouts)
        })?;
        self.cloths.push(uploaded);
        Ok(self.cloths.len() - 1)
    }

    /// Drop every cloth instance.
    pub fn clear(&mut self) {
        self.cloths.clear();
    }

    pub fn cloths(&self) -> &[DeviceCloth] {
        &self.cloths
    }

    fn uniforms(
        cloth: &DeviceCloth,
        params: &ClothSimParams,
        planes: &[Plane],
        ray: Option<&Ray>,
        grab_vertex: u32,
    ) -> StepUniforms {
        let mut gpu_planes = [[0.0; 4]; MAX_PLANES];
        for (slot, plane) in gpu_planes.iter_mut().zip(planes) {
            *slot = plane.to_gpu().plane;
        }
        let (origin, direction) = ray.map_or(([0.0; 4], [0.0, 0.0, -1.0, 0.0]), |r| {
            (r.origin.extend(0.0).to_array(), r.direction.extend(0.0).to_array())
        });
        StepUniforms {
            gravity: GRAVITY.extend(0.0).to_array(),
            ray_origin: origin,
            ray_direction: direction,
            planes: gpu_planes,
            delta_time: params.delta_time,
            k_stretch: params.k_stretch,
            k_bend: params.k_bend,
            pull_fraction: GRAB_PULL_FRACTION,
            num_vertices: cloth.num_vertices,
            num_edges: cloth.num_edges,
            num_planes: planes.len().min(MAX_PLANES) as u32,
            grab_vertex,
        }
    }
}

impl ClothBackend for GpuSolver {
    fn state(&self) -> &SolverState {
        &self.state
    }

    fn num_instances(&self) -> usize {
        self.cloths.len()
    }

    fn num_vertices(&self, instance: usize) -> usize {
        self.cloths.get(instance).map_or(0, |c| c.num_vertices as usize)
    }

    fn step(
        &mut self,
        params: &ClothSimParams,
        planes: &[Plane],
        grab: Option<&GrabRequest>,
    ) -> Result<(), SolverError> {
        params.validate()?;
        if planes.len() > MAX_PLANES {
            log::warn!("Only the first {} of {} collision planes are used", MAX_PLANES, planes.len());
        }
        if let SolverState::Faulted(msg) = &self.state {
            return Err(SolverError::Faulted(msg.clone()));
        }
        let Some(kernels) = &self.kernels else {
            return Err(SolverError::Faulted("kernels not built".into()));
        };

        let leases: Vec<_> = self.cloths.iter_mut().map(DeviceCloth::acquire_for_simulation).collect();
        let (device, queue, state) = (&self.device, &self.queue, &mut self.state);

        let submitted = capture_device_errors(device, "cloth step", || {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Cloth Step Encoder"),
            });
            for (instance, lease) in leases.iter().enumerate() {
                let grabbed = grab.filter(|g| g.instance == instance);
                let uniforms = Self::uniforms(
                    lease,
                    params,
                    planes,
                    grabbed.map(|g| &g.ray),
                    grabbed.map_or(NO_GRAB, |g| g.vertex),
                );
                queue.write_buffer(&lease.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

                let groups = lease.num_vertices.div_ceil(WORKGROUP_SIZE);
                *state = SolverState::Predicting;
                if grabbed.is_some() {
                    dispatch(&mut encoder, "Apply Grab", &kernels.apply_grab, lease, 1);
                }
                dispatch(&mut encoder, "Predict", &kernels.predict, lease, groups);
                for substep in 0..params.num_sub_steps {
                    *state = SolverState::Correcting { substep };
                    dispatch(&mut encoder, "Clip Planes", &kernels.clip_planes, lease, groups);
                    dispatch(&mut encoder, "Compute Corrections", &kernels.compute_corrections, lease, groups);
                    dispatch(&mut encoder, "Apply Corrections", &kernels.apply_corrections, lease, groups);
                }
                *state = SolverState::Finalizing;
                dispatch(&mut encoder, "Finalize", &kernels.finalize, lease, groups);
                dispatch(&mut encoder, "Update Normals", &kernels.update_normals, lease, groups);
            }
            queue.submit(Some(encoder.finish()));
        });
        let result = submitted.and_then(|()| wait_idle(device, queue));
        drop(leases);

        match result {
            Ok(()) => {
                self.state = SolverState::Idle;
                Ok(())
            }
            Err(e) => {
                log::error!("Cloth step aborted: {}", e);
                self.state = SolverState::Faulted(e.to_string());
                Err(SolverError::Gpu(e))
            }
        }
    }

    fn ray_distances(&mut self, instance: usize, ray: &Ray) -> Result<Vec<f32>, SolverError> {
        let Some(kernels) = &self.kernels else {
            return Err(SolverError::Faulted("kernels not built".into()));
        };
        let Some(cloth) = self.cloths.get(instance) else {
            return Ok(Vec::new());
        };
        if cloth.num_vertices == 0 {
            return Ok(Vec::new());
        }

        let uniforms = Self::uniforms(cloth, &ClothSimParams::default(), &[], Some(ray), NO_GRAB);
        self.queue.write_buffer(&cloth.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Cloth Pick Encoder"),
        });
        let groups = cloth.num_vertices.div_ceil(WORKGROUP_SIZE);
        dispatch(&mut encoder, "Pick Distance", &kernels.pick_distance, cloth, groups);
        let bytes = cloth.num_vertices as u64 * 4;
        encoder.copy_buffer_to_buffer(&cloth.pick_distances, 0, &cloth.pick_staging, 0, bytes);
        self.queue.submit(Some(encoder.finish()));

        let slice = cloth.pick_staging.slice(..bytes);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        await_buffer_map(rx)?;

        let distances = bytemuck::cast_slice::<u8, f32>(&slice.get_mapped_range()).to_vec();
        cloth.pick_staging.unmap();
        Ok(distances)
    }

    fn pin(&mut self, instance: usize, vertex: u32) {
        if let Some(cloth) = self.cloths.get(instance) {
            cloth.pin(&self.queue, vertex);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_count_rounds_up() {
        assert_eq!(workgroup_count("sheet", 0, 65_535).unwrap(), 0);
        assert_eq!(workgroup_count("sheet", 1, 65_535).unwrap(), 1);
        assert_eq!(workgroup_count("sheet", 64, 65_535).unwrap(), 1);
        assert_eq!(workgroup_count("sheet", 65, 65_535).unwrap(), 2);
    }

    #[test]
    fn test_workgroup_count_at_dimension_limit() {
        let max_vertices = 65_535 * WORKGROUP_SIZE;
        assert_eq!(workgroup_count("sheet", max_vertices, 65_535).unwrap(), 65_535);

        match workgroup_count("sheet", max_vertices + 1, 65_535) {
            Err(SolverError::TooManyVertices { name, vertices, max_vertices: max }) => {
                assert_eq!(name, "sheet");
                assert_eq!(vertices, max_vertices + 1);
                assert_eq!(max, max_vertices as u64);
            }
            other => panic!("expected TooManyVertices, got {:?}", other),
        }
    }
}
