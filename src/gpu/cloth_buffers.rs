//! Cloth State Store, device stage.
//!
//! [`HostCloth::upload`] consumes the host stage and returns a
//! [`DeviceCloth`] holding only device handles. Buffers shared by the
//! solver and the renderer are handed over through
//! [`DeviceCloth::acquire_for_simulation`]; the returned
//! [`SimulationLease`] gives them back when dropped.

use std::ops::Deref;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::cloth::{ClothVertexData, HostCloth};
use crate::grid::Grid;

/// Collision planes that fit in the step uniforms.
pub const MAX_PLANES: usize = 4;

/// Marks "no grabbed vertex" in [`StepUniforms::grab_vertex`].
pub const NO_GRAB: u32 = u32::MAX;

/// Per-cloth uniforms for every solver kernel.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct StepUniforms {
    pub gravity: [f32; 4],
    pub ray_origin: [f32; 4],
    pub ray_direction: [f32; 4],
    pub planes: [[f32; 4]; MAX_PLANES],
    pub delta_time: f32,
    pub k_stretch: f32,
    pub k_bend: f32,
    pub pull_fraction: f32,
    pub num_vertices: u32,
    pub num_edges: u32,
    pub num_planes: u32,
    pub grab_vertex: u32,
}

/// Which subsystem may touch the shared buffers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferOwner {
    Renderer,
    Solver,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Bind group layouts shared by every cloth and every solver kernel.
///
/// Group 0 holds read-only topology, group 1 read-write simulation state,
/// group 2 the step uniforms.
pub struct ClothLayouts {
    pub topology: wgpu::BindGroupLayout,
    pub simulation: wgpu::BindGroupLayout,
    pub uniforms: wgpu::BindGroupLayout,
}

impl ClothLayouts {
    pub const TOPOLOGY_BINDINGS: u32 = 8;
    pub const SIMULATION_BINDINGS: u32 = 5;

    pub fn new(device: &wgpu::Device) -> Self {
        let topology_entries: Vec<_> = (0..Self::TOPOLOGY_BINDINGS).map(|b| storage_entry(b, true)).collect();
        let simulation_entries: Vec<_> =
            (0..Self::SIMULATION_BINDINGS).map(|b| storage_entry(b, false)).collect();

        let topology = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cloth Topology Layout"),
            entries: &topology_entries,
        });
        let simulation = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cloth Simulation Layout"),
            entries: &simulation_entries,
        });
        let uniforms = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cloth Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        Self { topology, simulation, uniforms }
    }
}

/// Bin grid buffers. Allocated per cloth, not yet read by any kernel.
pub struct GridBuffers {
    pub grid: Grid,
    pub bin_counts: wgpu::Buffer,
    pub bin_starts: wgpu::Buffer,
    pub vertex_bins: wgpu::Buffer,
}

impl GridBuffers {
    pub fn new(device: &wgpu::Device, grid: Grid, num_vertices: u32) -> Self {
        let make = |label: &str, count: u32| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: (count.max(1) as u64) * 4,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        Self {
            grid,
            bin_counts: make("Grid Bin Counts", grid.bin_count),
            bin_starts: make("Grid Bin Starts", grid.bin_count),
            vertex_bins: make("Grid Vertex Bins", num_vertices),
        }
    }
}

/// Storage buffer from bytes; empty arrays get one zeroed word so the
/// binding stays valid.
fn storage_init(device: &wgpu::Device, label: &str, bytes: &[u8], extra: wgpu::BufferUsages) -> wgpu::Buffer {
    let padded;
    let contents = if bytes.is_empty() {
        padded = [0u8; 4];
        &padded[..]
    } else {
        bytes
    };
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::STORAGE | extra,
    })
}

fn scratch(device: &wgpu::Device, label: &str, size: u64, extra: wgpu::BufferUsages) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size.max(4),
        usage: wgpu::BufferUsages::STORAGE | extra,
        mapped_at_creation: false,
    })
}

/// Committed device stage of a cloth instance.
pub struct DeviceCloth {
    pub name: String,
    pub num_vertices: u32,
    pub num_edges: u32,
    pub num_triangles: u32,
    owner: BufferOwner,

    /// Vertex buffer, bound as vertex input when drawing and as storage in
    /// the solver.
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    vertex_data_buffer: wgpu::Buffer,
    pub pick_distances: wgpu::Buffer,
    pub pick_staging: wgpu::Buffer,
    pub uniform_buffer: wgpu::Buffer,

    pub topology_bind_group: wgpu::BindGroup,
    pub simulation_bind_group: wgpu::BindGroup,
    pub uniform_bind_group: wgpu::BindGroup,

    pub grid: GridBuffers,
}

impl HostCloth {
    /// Copy host arrays to the device and drop them.
    pub fn upload(self, device: &wgpu::Device, layouts: &ClothLayouts) -> DeviceCloth {
        let num_vertices = self.num_vertices() as u32;
        let num_edges = self.num_edges() as u32;
        let num_triangles = self.num_triangles() as u32;
        let vec4_bytes = num_vertices as u64 * 16;

        let vertex_buffer = storage_init(
            device,
            "Cloth Vertices",
            bytemuck::cast_slice(&self.mesh.vertices),
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        );
        let index_buffer = storage_init(
            device,
            "Cloth Triangles",
            bytemuck::cast_slice(&self.mesh.triangles),
            wgpu::BufferUsages::INDEX,
        );
        let vertex_data_buffer = storage_init(
            device,
            "Cloth Vertex Data",
            bytemuck::cast_slice(&self.vertex_data),
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        );
        let none = wgpu::BufferUsages::empty();
        let edges = storage_init(device, "Cloth Edges", bytemuck::cast_slice(&self.topology.edges), none);
        let edge_data = storage_init(device, "Cloth Edge Data", bytemuck::cast_slice(&self.edge_data), none);
        let constraint_offsets = storage_init(
            device,
            "Cloth Constraint Offsets",
            bytemuck::cast_slice(&self.topology.vertex_constraints.offsets),
            none,
        );
        let constraint_refs = storage_init(
            device,
            "Cloth Constraint Refs",
            bytemuck::cast_slice(&self.topology.vertex_constraints.items),
            none,
        );
        let triangle_offsets = storage_init(
            device,
            "Cloth Vertex Triangle Offsets",
            bytemuck::cast_slice(&self.topology.vertex_triangles.offsets),
            none,
        );
        let triangle_refs = storage_init(
            device,
            "Cloth Vertex Triangles",
            bytemuck::cast_slice(&self.topology.vertex_triangles.items),
            none,
        );

        let predicted = scratch(device, "Cloth Predicted", vec4_bytes, none);
        let velocities = scratch(device, "Cloth Velocities", vec4_bytes, wgpu::BufferUsages::COPY_DST);
        let corrections = scratch(device, "Cloth Corrections", vec4_bytes, none);
        let pick_distances = scratch(
            device,
            "Cloth Pick Distances",
            num_vertices as u64 * 4,
            wgpu::BufferUsages::COPY_SRC,
        );
        let pick_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cloth Pick Staging"),
            size: (num_vertices as u64 * 4).max(4),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cloth Step Uniforms"),
            size: std::mem::size_of::<StepUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        fn entries<'a>(buffers: &[&'a wgpu::Buffer]) -> Vec<wgpu::BindGroupEntry<'a>> {
            buffers
                .iter()
                .enumerate()
                .map(|(i, b)| wgpu::BindGroupEntry { binding: i as u32, resource: b.as_entire_binding() })
                .collect()
        }

        let topology_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cloth Topology Bind Group"),
            layout: &layouts.topology,
            entries: &entries(&[
                &vertex_data_buffer,
                &edges,
                &edge_data,
                &index_buffer,
                &constraint_offsets,
                &constraint_refs,
                &triangle_offsets,
                &triangle_refs,
            ]),
        });
        let simulation_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cloth Simulation Bind Group"),
            layout: &layouts.simulation,
            entries: &entries(&[&vertex_buffer, &predicted, &velocities, &corrections, &pick_distances]),
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cloth Uniform Bind Group"),
            layout: &layouts.uniforms,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() }],
        });

        let grid = GridBuffers::new(device, self.grid, num_vertices);

        log::debug!("Uploaded cloth '{}' ({} vertices) to the device", self.name, num_vertices);

        DeviceCloth {
            name: self.name,
            num_vertices,
            num_edges,
            num_triangles,
            owner: BufferOwner::Renderer,
            vertex_buffer,
            index_buffer,
            vertex_data_buffer,
            pick_distances,
            pick_staging,
            uniform_buffer,
            topology_bind_group,
            simulation_bind_group,
            uniform_bind_group,
            grid,
        }
    }
}

impl DeviceCloth {
    pub fn owner(&self) -> BufferOwner {
        self.owner
    }

    /// Hand the shared buffers to the solver until the lease is dropped.
    pub fn acquire_for_simulation(&mut self) -> SimulationLease<'_> {
        debug_assert_eq!(self.owner, BufferOwner::Renderer, "cloth '{}' already leased", self.name);
        self.owner = BufferOwner::Solver;
        SimulationLease { cloth: self }
    }

    /// Vertex and index buffers for drawing.
    pub fn render_buffers(&self) -> (&wgpu::Buffer, &wgpu::Buffer, u32) {
        debug_assert_eq!(self.owner, BufferOwner::Renderer, "cloth '{}' is held by the solver", self.name);
        (&self.vertex_buffer, &self.index_buffer, self.num_triangles * 3)
    }

    /// Set a vertex's inverse mass to zero on the device.
    pub fn pin(&self, queue: &wgpu::Queue, vertex: u32) {
        if vertex >= self.num_vertices {
            return;
        }
        let offset = vertex as u64 * std::mem::size_of::<ClothVertexData>() as u64
            + std::mem::offset_of!(ClothVertexData, inv_mass) as u64;
        queue.write_buffer(&self.vertex_data_buffer, offset, bytemuck::bytes_of(&0.0f32));
    }
}

/// Exclusive solver access to one cloth's shared buffers.
pub struct SimulationLease<'a> {
    cloth: &'a mut DeviceCloth,
}

impl SimulationLease<'_> {
    /// Return the buffers to the renderer.
    pub fn release(self) {}
}

impl Deref for SimulationLease<'_> {
    type Target = DeviceCloth;

    fn deref(&self) -> &DeviceCloth {
        self.cloth
    }
}

impl Drop for SimulationLease<'_> {
    fn drop(&mut self) {
        self.cloth.owner = BufferOwner::Renderer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_uniforms_size() {
        assert_eq!(std::mem::size_of::<StepUniforms>(), 144);
    }
}
